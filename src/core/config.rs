use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::env;

/// Per-exchange client configuration: credentials plus endpoint overrides.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub api_key: Secret<String>,
    pub secret_key: Secret<String>,
    /// API version selecting the converter tables, `None` for the adapter default
    pub version: Option<String>,
    pub base_url: Option<String>,
    pub ws_url: Option<String>,
}

// Secrets never leave the process through serialization
impl Serialize for ExchangeConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ExchangeConfig", 5)?;
        state.serialize_field("api_key", "[REDACTED]")?;
        state.serialize_field("secret_key", "[REDACTED]")?;
        state.serialize_field("version", &self.version)?;
        state.serialize_field("base_url", &self.base_url)?;
        state.serialize_field("ws_url", &self.ws_url)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ExchangeConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ExchangeConfigHelper {
            #[serde(default)]
            api_key: String,
            #[serde(default)]
            secret_key: String,
            version: Option<String>,
            base_url: Option<String>,
            ws_url: Option<String>,
        }

        let helper = ExchangeConfigHelper::deserialize(deserializer)?;
        Ok(Self {
            api_key: Secret::new(helper.api_key),
            secret_key: Secret::new(helper.secret_key),
            version: helper.version,
            base_url: helper.base_url,
            ws_url: helper.ws_url,
        })
    }
}

impl ExchangeConfig {
    /// Create a new configuration with API credentials
    #[must_use]
    pub fn new(api_key: String, secret_key: String) -> Self {
        Self {
            api_key: Secret::new(api_key),
            secret_key: Secret::new(secret_key),
            version: None,
            base_url: None,
            ws_url: None,
        }
    }

    /// Configuration for public market data only
    #[must_use]
    pub fn read_only() -> Self {
        Self::new(String::new(), String::new())
    }

    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `{EXCHANGE}_API_KEY` and `{EXCHANGE}_SECRET_KEY` (both optional;
    ///   missing credentials yield a read-only configuration)
    /// - `{EXCHANGE}_VERSION`, `{EXCHANGE}_BASE_URL`, `{EXCHANGE}_WS_URL` (optional)
    pub fn from_env(exchange_prefix: &str) -> Result<Self, ConfigError> {
        let prefix = exchange_prefix.to_uppercase();
        let var = |suffix: &str| env::var(format!("{}_{}", prefix, suffix)).ok();

        let api_key = var("API_KEY").unwrap_or_default();
        let secret_key = var("SECRET_KEY").unwrap_or_default();
        if api_key.is_empty() != secret_key.is_empty() {
            return Err(ConfigError::InvalidConfiguration(format!(
                "{prefix}_API_KEY and {prefix}_SECRET_KEY must be set together"
            )));
        }

        Ok(Self {
            api_key: Secret::new(api_key),
            secret_key: Secret::new(secret_key),
            version: var("VERSION"),
            base_url: var("BASE_URL"),
            ws_url: var("WS_URL"),
        })
    }

    /// Load a `.env` file (when present) and then read the environment
    ///
    /// **Security Warning**: Never commit .env files to version control!
    #[cfg(feature = "env-file")]
    pub fn from_env_file(exchange_prefix: &str) -> Result<Self, ConfigError> {
        Self::from_env_file_with_path(exchange_prefix, ".env")
    }

    #[cfg(feature = "env-file")]
    pub fn from_env_file_with_path(
        exchange_prefix: &str,
        env_file_path: &str,
    ) -> Result<Self, ConfigError> {
        match dotenv::from_path(env_file_path) {
            Ok(_) => {}
            Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {
                // fall back to the process environment
            }
            Err(e) => {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "Failed to load .env file '{}': {}",
                    env_file_path, e
                )));
            }
        }

        Self::from_env(exchange_prefix)
    }

    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.api_key.expose_secret().is_empty() && !self.secret_key.expose_secret().is_empty()
    }

    /// Credentials for signing, `None` in read-only mode
    pub fn credentials(&self) -> Option<Credentials> {
        self.has_credentials().then(|| Credentials {
            api_key: self.api_key.clone(),
            secret_key: self.secret_key.clone(),
        })
    }

    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    #[must_use]
    pub fn base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    #[must_use]
    pub fn ws_url(mut self, ws_url: String) -> Self {
        self.ws_url = Some(ws_url);
        self
    }
}

/// API key pair handed to clients that sign their requests
#[derive(Debug, Clone)]
pub struct Credentials {
    api_key: Secret<String>,
    secret_key: Secret<String>,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            api_key: Secret::new(api_key.into()),
            secret_key: Secret::new(secret_key.into()),
        }
    }

    /// Get API key (use carefully - exposes secret)
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    /// Get secret key (use carefully - exposes secret)
    pub fn secret_key(&self) -> &str {
        self.secret_key.expose_secret()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_redacts_secrets() {
        let config = ExchangeConfig::new("key".to_string(), "secret".to_string()).version("1");
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("[REDACTED]"));
        assert!(!json.contains("secret\""));
        assert!(json.contains("\"version\":\"1\""));
    }

    #[test]
    fn test_read_only_has_no_credentials() {
        let config = ExchangeConfig::read_only();
        assert!(!config.has_credentials());
        assert!(config.credentials().is_none());

        let config = ExchangeConfig::new("key".to_string(), "secret".to_string());
        let credentials = config.credentials().unwrap();
        assert_eq!(credentials.api_key(), "key");
        assert_eq!(credentials.secret_key(), "secret");
    }

    #[test]
    fn test_from_env_reads_prefixed_variables() {
        env::set_var("HFTESTEX_API_KEY", "k");
        env::set_var("HFTESTEX_SECRET_KEY", "s");
        env::set_var("HFTESTEX_VERSION", "1");
        let config = ExchangeConfig::from_env("hftestex").unwrap();
        assert!(config.has_credentials());
        assert_eq!(config.version.as_deref(), Some("1"));

        env::remove_var("HFTESTEX_SECRET_KEY");
        assert!(ExchangeConfig::from_env("hftestex").is_err());
        env::remove_var("HFTESTEX_API_KEY");
        env::remove_var("HFTESTEX_VERSION");
    }
}
