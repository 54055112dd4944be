use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::{JsonCodec, WsCodec};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, instrument, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Capacity of the event channel handed to the caller
    pub message_buffer_size: usize,
    /// Reconnection attempts after an unexpected disconnect, 0 for unlimited
    pub max_reconnect_attempts: u32,
    /// First reconnection delay in milliseconds; doubles with every attempt
    pub reconnect_delay_ms: u64,
    /// Upper bound for the reconnection delay
    pub max_reconnect_delay_ms: u64,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            message_buffer_size: 1024,
            max_reconnect_attempts: 10,
            reconnect_delay_ms: 1_000,
            max_reconnect_delay_ms: 60_000,
        }
    }
}

impl WsConfig {
    pub fn with_reconnect(mut self, max_attempts: u32, delay: Duration, max_delay: Duration) -> Self {
        self.max_reconnect_attempts = max_attempts;
        self.reconnect_delay_ms = delay.as_millis() as u64;
        self.max_reconnect_delay_ms = max_delay.as_millis() as u64;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.message_buffer_size = size;
        self
    }
}

/// WebSocket transport boundary: one connection at a time.
#[async_trait]
pub trait WsTransport: Send + 'static {
    /// Open a connection, replacing any previous one
    async fn connect(&mut self, url: &str, headers: &[(String, String)])
        -> Result<(), ExchangeError>;

    /// Send one JSON frame
    async fn send(&mut self, frame: &Value) -> Result<(), ExchangeError>;

    /// Wait for the next data frame.
    ///
    /// `None` means the connection ended; an `Err` means it broke.
    async fn next_frame(&mut self) -> Option<Result<Value, ExchangeError>>;

    async fn close(&mut self) -> Result<(), ExchangeError>;

    fn is_connected(&self) -> bool;
}

/// Tungstenite-based transport; frames are decoded by `C`
pub struct TungsteniteWs<C: WsCodec = JsonCodec> {
    stream: Option<WsStream>,
    exchange_name: String,
    codec: C,
    connect_timeout: Duration,
}

impl TungsteniteWs<JsonCodec> {
    pub fn new(exchange_name: String, config: &WsConfig) -> Self {
        Self::with_codec(exchange_name, config, JsonCodec)
    }
}

impl<C: WsCodec> TungsteniteWs<C> {
    pub fn with_codec(exchange_name: String, config: &WsConfig, codec: C) -> Self {
        Self {
            stream: None,
            exchange_name,
            codec,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
        }
    }
}

#[async_trait]
impl<C: WsCodec> WsTransport for TungsteniteWs<C> {
    #[instrument(skip(self, headers), fields(exchange = %self.exchange_name, url = %url))]
    async fn connect(
        &mut self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<(), ExchangeError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| ExchangeError::ConfigurationError(format!("Invalid WebSocket URL: {}", e)))?;
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ExchangeError::AuthError(format!("Invalid header name: {}", e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ExchangeError::AuthError(format!("Invalid header value: {}", e)))?;
            request.headers_mut().insert(name, value);
        }

        let (stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| {
                ExchangeError::ConnectionTimeout("WebSocket connection timeout".to_string())
            })?
            .map_err(|e| {
                ExchangeError::NetworkError(format!("WebSocket connection failed: {}", e))
            })?;

        self.stream = Some(stream);
        Ok(())
    }

    #[instrument(skip(self, frame), fields(exchange = %self.exchange_name))]
    async fn send(&mut self, frame: &Value) -> Result<(), ExchangeError> {
        let message = self.codec.encode(frame)?;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| ExchangeError::NetworkError("WebSocket not connected".to_string()))?;

        if let Err(e) = stream.send(message).await {
            self.stream = None;
            return Err(ExchangeError::NetworkError(format!(
                "Failed to send WebSocket message: {}",
                e
            )));
        }
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<Value, ExchangeError>> {
        loop {
            let stream = self.stream.as_mut()?;
            match stream.next().await {
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = stream.send(Message::Pong(data)).await {
                        warn!("Failed to send pong response: {}", e);
                    }
                }
                Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    debug!(exchange = %self.exchange_name, ?frame, "WebSocket closed by server");
                    self.stream = None;
                    return None;
                }
                Some(Ok(message)) => match self.codec.decode(message) {
                    Ok(Some(frame)) => return Some(Ok(frame)),
                    Ok(None) => {}
                    Err(e) => return Some(Err(e)),
                },
                Some(Err(e)) => {
                    self.stream = None;
                    return Some(Err(ExchangeError::NetworkError(format!(
                        "WebSocket error: {}",
                        e
                    ))));
                }
                None => {
                    self.stream = None;
                    return None;
                }
            }
        }
    }

    #[instrument(skip(self), fields(exchange = %self.exchange_name))]
    async fn close(&mut self) -> Result<(), ExchangeError> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}
