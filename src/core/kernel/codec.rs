use crate::core::errors::ExchangeError;
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

/// Converts between raw WebSocket messages and JSON frames.
///
/// Control messages (ping, pong, close) are handled by the transport and never
/// reach the codec.
pub trait WsCodec: Send + Sync + 'static {
    /// Encode an outgoing command frame
    fn encode(&self, frame: &Value) -> Result<Message, ExchangeError>;

    /// Decode an incoming data message
    ///
    /// # Returns
    /// - `Ok(Some(frame))` - Successfully decoded frame
    /// - `Ok(None)` - Message carries nothing to dispatch (heartbeat text, empty binary)
    /// - `Err(error)` - Message could not be decoded
    fn decode(&self, message: Message) -> Result<Option<Value>, ExchangeError>;
}

/// Codec for exchanges speaking plain JSON text frames
#[derive(Debug, Clone, Default)]
pub struct JsonCodec;

impl WsCodec for JsonCodec {
    fn encode(&self, frame: &Value) -> Result<Message, ExchangeError> {
        Ok(Message::Text(frame.to_string()))
    }

    fn decode(&self, message: Message) -> Result<Option<Value>, ExchangeError> {
        let text = match message {
            Message::Text(text) => text,
            Message::Binary(data) => String::from_utf8(data).map_err(|e| {
                ExchangeError::ParseError(format!("Invalid UTF-8 in binary message: {}", e))
            })?,
            _ => return Ok(None),
        };

        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == "pong" {
            return Ok(None);
        }

        serde_json::from_str(trimmed)
            .map(Some)
            .map_err(|e| ExchangeError::ParseError(format!("Failed to parse JSON: {}: {}", e, text)))
    }
}
