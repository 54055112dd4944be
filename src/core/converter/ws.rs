use crate::core::converter::Converter;
use crate::core::kernel::signer::WsAuth;
use crate::core::types::{Endpoint, Parsed, Platform, Subscription};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// WebSocket-only adapter data
#[derive(Debug, Clone)]
pub struct WsSettings {
    /// Frame field naming the event; its value selects the endpoint
    pub event_type_param: &'static str,
    pub event_lookup: HashMap<&'static str, Endpoint>,
    /// Channel name per endpoint, `{symbol}` is substituted
    pub channel_templates: HashMap<Endpoint, &'static str>,
    pub command_field: &'static str,
    pub args_field: &'static str,
    pub subscribe_command: &'static str,
    pub unsubscribe_command: &'static str,
    /// `false` means subscriptions travel in the connection URL
    pub subscription_command_supported: bool,
    pub url_subscription_param: &'static str,
    pub auth: Option<WsAuth>,
}

impl Default for WsSettings {
    fn default() -> Self {
        Self {
            event_type_param: "table",
            event_lookup: HashMap::new(),
            channel_templates: HashMap::new(),
            command_field: "op",
            args_field: "args",
            subscribe_command: "subscribe",
            unsubscribe_command: "unsubscribe",
            subscription_command_supported: true,
            url_subscription_param: "subscribe",
            auth: None,
        }
    }
}

/// Converter specialization driving a `WsClient`: frame dispatch and
/// subscription shaping.
#[derive(Debug, Clone)]
pub struct WsConverter {
    converter: Converter,
    settings: Arc<WsSettings>,
}

impl WsConverter {
    pub fn new(converter: Converter, settings: WsSettings) -> Self {
        Self {
            converter,
            settings: Arc::new(settings),
        }
    }

    pub fn converter(&self) -> &Converter {
        &self.converter
    }

    pub fn platform(&self) -> Platform {
        self.converter.platform()
    }

    pub fn settings(&self) -> &WsSettings {
        &self.settings
    }

    pub fn subscription_command_supported(&self) -> bool {
        self.settings.subscription_command_supported
    }

    pub fn auth(&self) -> Option<&WsAuth> {
        self.settings.auth.as_ref()
    }

    pub fn channel(&self, subscription: &Subscription) -> Option<String> {
        self.settings
            .channel_templates
            .get(&subscription.endpoint)
            .map(|template| template.replace("{symbol}", &subscription.symbol))
    }

    pub fn channels<'a>(
        &self,
        subscriptions: impl IntoIterator<Item = &'a Subscription>,
    ) -> Vec<String> {
        subscriptions
            .into_iter()
            .filter_map(|subscription| self.channel(subscription))
            .collect()
    }

    fn command(&self, command: &str, channels: Vec<String>) -> Option<Value> {
        if channels.is_empty() {
            return None;
        }
        let mut frame = serde_json::Map::new();
        frame.insert(self.settings.command_field.to_string(), json!(command));
        frame.insert(self.settings.args_field.to_string(), json!(channels));
        Some(Value::Object(frame))
    }

    /// Command frame subscribing to `subscriptions`; `None` when nothing maps
    pub fn subscribe_command<'a>(
        &self,
        subscriptions: impl IntoIterator<Item = &'a Subscription>,
    ) -> Option<Value> {
        self.command(self.settings.subscribe_command, self.channels(subscriptions))
    }

    pub fn unsubscribe_command<'a>(
        &self,
        subscriptions: impl IntoIterator<Item = &'a Subscription>,
    ) -> Option<Value> {
        self.command(self.settings.unsubscribe_command, self.channels(subscriptions))
    }

    /// Connection URL; URL-style platforms embed the subscription set
    pub fn url_for<'a>(
        &self,
        base_url: &str,
        subscriptions: impl IntoIterator<Item = &'a Subscription>,
    ) -> String {
        if self.settings.subscription_command_supported {
            return base_url.to_string();
        }
        let channels = self.channels(subscriptions);
        if channels.is_empty() {
            return base_url.to_string();
        }
        let separator = if base_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}{}={}",
            base_url,
            separator,
            self.settings.url_subscription_param,
            channels.join(",")
        )
    }

    /// Parse one decoded frame.
    ///
    /// Frames whose event type is unknown (acknowledgements, info messages)
    /// yield no entities.
    pub fn parse_frame(&self, frame: &Value) -> Parsed {
        if self.converter.is_error_payload(frame) {
            return Parsed::Error(self.converter.parse_error(Some(frame), None));
        }

        let endpoint = frame
            .get(self.settings.event_type_param)
            .and_then(Value::as_str)
            .and_then(|event| self.settings.event_lookup.get(event).copied());

        match endpoint {
            Some(endpoint) => self.converter.parse(endpoint, frame),
            None => {
                trace!(platform = %self.platform(), "Ignoring frame without a known event type: {}", frame);
                Parsed::Entities(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::converter::{ConverterConfig, FieldMapping};
    use crate::core::types::{Direction, EntityKind, Field};

    fn settings(command_supported: bool) -> WsSettings {
        WsSettings {
            event_lookup: HashMap::from([("trade", Endpoint::Trade)]),
            channel_templates: HashMap::from([(Endpoint::Trade, "trade:{symbol}")]),
            subscription_command_supported: command_supported,
            ..WsSettings::default()
        }
    }

    fn ws_converter(command_supported: bool) -> WsConverter {
        let config = ConverterConfig {
            field_mappings: HashMap::from([(
                EntityKind::Trade,
                FieldMapping::Keyed(vec![
                    ("timestamp", Field::Timestamp),
                    ("id", Field::ItemId),
                    ("symbol", Field::Symbol),
                    ("price", Field::Price),
                    ("size", Field::Amount),
                    ("side", Field::Direction),
                ]),
            )]),
            ..ConverterConfig::new(Platform::Okex, "wss://stream.test/ws/v{version}")
        };
        WsConverter::new(Converter::new(config, "1"), settings(command_supported))
    }

    fn subscriptions() -> Vec<Subscription> {
        vec![
            Subscription::new(Endpoint::Trade, "ltc_btc"),
            Subscription::new(Endpoint::Trade, "eth_btc"),
            // no channel template: silently skipped
            Subscription::new(Endpoint::Candle, "ltc_btc"),
        ]
    }

    #[test]
    fn test_subscribe_command_shape() {
        let converter = ws_converter(true);
        let command = converter.subscribe_command(&subscriptions()).unwrap();
        assert_eq!(
            command,
            json!({"op": "subscribe", "args": ["trade:ltc_btc", "trade:eth_btc"]})
        );

        let unsubscribe = converter
            .unsubscribe_command(&subscriptions()[..1])
            .unwrap();
        assert_eq!(unsubscribe["op"], "unsubscribe");
        assert!(converter.subscribe_command(&Vec::<Subscription>::new()).is_none());
    }

    #[test]
    fn test_url_embedding() {
        let base = "wss://stream.test/ws/v1";
        assert_eq!(ws_converter(true).url_for(base, &subscriptions()), base);
        assert_eq!(
            ws_converter(false).url_for(base, &subscriptions()),
            "wss://stream.test/ws/v1?subscribe=trade:ltc_btc,trade:eth_btc"
        );
        assert_eq!(ws_converter(false).url_for(base, &Vec::<Subscription>::new()), base);
    }

    #[test]
    fn test_parse_frame_dispatches_on_event_type() {
        let converter = ws_converter(true);
        let frame = json!({
            "table": "trade",
            "data": [{"timestamp": 5, "id": "x1", "symbol": "ltc_btc", "price": "0.01", "size": 3, "side": "Buy"}]
        });
        let trades = converter.parse_frame(&frame).into_entities().unwrap();
        assert_eq!(trades.len(), 1);
        let trade = trades[0].clone().into_trade().unwrap();
        assert_eq!(trade.direction, Direction::Buy);
        assert_eq!(trade.amount, "3");

        let ack = json!({"success": true, "subscribe": "trade:ltc_btc"});
        assert_eq!(converter.parse_frame(&ack), Parsed::Entities(Vec::new()));

        let error = json!({"status": 400, "error": "Unknown table"});
        assert!(converter.parse_frame(&error).is_error());
    }
}
