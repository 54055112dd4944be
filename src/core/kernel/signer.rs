use crate::core::config::Credentials;
use crate::core::errors::ExchangeError;
use std::time::{SystemTime, UNIX_EPOCH};

/// Pluggable request signing function.
///
/// The core never implements a signature scheme itself; every exchange
/// adapter supplies one. Any closure with the matching shape is a signer.
pub trait Signer: Send + Sync {
    /// Sign `(method, path, nonce, body)` with the API secret
    ///
    /// # Arguments
    /// * `secret` - API secret
    /// * `method` - HTTP method (GET, POST, etc.)
    /// * `path` - Request path, including the query string when the exchange signs it
    /// * `nonce` - Timestamp, nonce or expiry value sent alongside the signature
    /// * `body` - Raw request body, empty for GET
    fn sign(
        &self,
        secret: &str,
        method: &str,
        path: &str,
        nonce: u64,
        body: &str,
    ) -> Result<String, ExchangeError>;
}

impl<F> Signer for F
where
    F: Fn(&str, &str, &str, u64, &str) -> Result<String, ExchangeError> + Send + Sync,
{
    fn sign(
        &self,
        secret: &str,
        method: &str,
        path: &str,
        nonce: u64,
        body: &str,
    ) -> Result<String, ExchangeError> {
        self(secret, method, path, nonce, body)
    }
}

/// Where the signed fields of a REST request go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestAuth {
    Headers {
        api_key: &'static str,
        nonce: &'static str,
        signature: &'static str,
    },
    Query {
        api_key: &'static str,
        nonce: &'static str,
        signature: &'static str,
    },
}

/// Header names used to authenticate a WebSocket handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsAuth {
    /// Path the signature is computed over
    pub path: &'static str,
    pub expires_header: &'static str,
    pub signature_header: &'static str,
    pub api_key_header: &'static str,
    /// Lifetime of the signature in seconds
    pub expiry_secs: u64,
}

/// Signed fields of one request: (headers, query params)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignedParts {
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
}

/// Sign a REST request and place the result according to `auth`
pub fn sign_rest_request(
    auth: &RestAuth,
    credentials: &Credentials,
    signer: &dyn Signer,
    method: &str,
    path: &str,
    body: &str,
) -> Result<SignedParts, ExchangeError> {
    let nonce = current_millis()?;
    let signature = signer.sign(credentials.secret_key(), method, path, nonce, body)?;

    let (api_key, nonce_name, signature_name) = match auth {
        RestAuth::Headers {
            api_key,
            nonce,
            signature,
        }
        | RestAuth::Query {
            api_key,
            nonce,
            signature,
        } => (*api_key, *nonce, *signature),
    };
    let fields = vec![
        (api_key.to_string(), credentials.api_key().to_string()),
        (nonce_name.to_string(), nonce.to_string()),
        (signature_name.to_string(), signature),
    ];

    Ok(match auth {
        RestAuth::Headers { .. } => SignedParts {
            headers: fields,
            query: Vec::new(),
        },
        RestAuth::Query { .. } => SignedParts {
            headers: Vec::new(),
            query: fields,
        },
    })
}

/// Build the handshake headers for an authenticated WebSocket connection
pub fn sign_ws_handshake(
    auth: &WsAuth,
    credentials: &Credentials,
    signer: &dyn Signer,
) -> Result<Vec<(String, String)>, ExchangeError> {
    let expires = current_secs()? + auth.expiry_secs;
    let signature = signer.sign(credentials.secret_key(), "GET", auth.path, expires, "")?;

    Ok(vec![
        (auth.expires_header.to_string(), expires.to_string()),
        (auth.signature_header.to_string(), signature),
        (auth.api_key_header.to_string(), credentials.api_key().to_string()),
    ])
}

fn since_epoch() -> Result<std::time::Duration, ExchangeError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| ExchangeError::AuthError(format!("Failed to get timestamp: {}", e)))
}

pub fn current_millis() -> Result<u64, ExchangeError> {
    since_epoch().map(|d| d.as_millis() as u64)
}

pub fn current_secs() -> Result<u64, ExchangeError> {
    since_epoch().map(|d| d.as_secs())
}
