use crate::core::errors::ExchangeError;
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;
use tracing::{instrument, trace};

/// One HTTP call as seen by the transport
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>, query: Vec<(String, String)>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            query,
            body: None,
        }
    }
}

/// Raw response: status plus decoded payload.
///
/// Bodies that are not JSON are delivered as a JSON string so that the
/// converter can still report them verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub payload: Value,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP transport boundary.
///
/// Non-2xx statuses are not errors at this level: they come back as a
/// response so that the converter can classify them. `Err` means the request
/// never produced a response (timeout, reset, DNS...).
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ExchangeError>;
}

/// Configuration for the REST client and its transport
#[derive(Clone, Debug)]
pub struct RestClientConfig {
    /// Exchange name for logging and tracing
    pub exchange_name: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string to include in requests
    pub user_agent: String,
    /// First rate-limit backoff delay; doubles with every consecutive rate-limit error
    pub backoff_base_ms: u64,
    /// Upper bound for the rate-limit backoff delay
    pub backoff_max_ms: u64,
    /// Hard cap on pages fetched by one history call
    pub max_pages: usize,
}

impl RestClientConfig {
    pub fn new(exchange_name: String) -> Self {
        Self {
            exchange_name,
            timeout_seconds: 30,
            user_agent: "hyperfeed/0.1".to_string(),
            backoff_base_ms: 1_000,
            backoff_max_ms: 60_000,
            max_pages: 1_000,
        }
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base_ms = base.as_millis() as u64;
        self.backoff_max_ms = max.as_millis() as u64;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }
}

/// `HttpTransport` backed by reqwest
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: Client,
    exchange_name: String,
}

impl ReqwestTransport {
    pub fn new(config: &RestClientConfig) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                ExchangeError::ConfigurationError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            exchange_name: config.exchange_name.clone(),
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    #[instrument(skip(self, request), fields(exchange = %self.exchange_name, method = %request.method, url = %request.url))]
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ExchangeError> {
        let mut builder = self.client.request(request.method, &request.url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder
                .header("Content-Type", "application/json")
                .body(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ExchangeError::ConnectionTimeout(format!("Request timed out: {}", e))
            } else {
                ExchangeError::NetworkError(format!("Request failed: {}", e))
            }
        })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| {
            ExchangeError::NetworkError(format!("Failed to read response body: {}", e))
        })?;
        trace!(status, "Response body: {}", text);

        let payload = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok(HttpResponse { status, payload })
    }
}
