use crate::core::converter::{
    Converter, ConverterConfig, ConverterHooks, FieldMapping, TimeEncoding, WsConverter,
    WsSettings,
};
use crate::core::errors::ExchangeError;
use crate::core::kernel::WsAuth;
use crate::core::types::{ApiError, Endpoint, Entity, EntityKind, Field, Platform};
use serde_json::Value;
use std::collections::HashMap;

const WS_BASE_URL: &str = "wss://real.okex.com:10440/ws/v{version}";

/// Index and meta instruments start with this marker
const INDEX_SYMBOL_PREFIX: char = '.';

/// WebSocket converter for one OKEx API version
pub fn ws_converter(version: &str) -> Result<WsConverter, ExchangeError> {
    match version {
        "1" => Ok(WsConverter::new(
            Converter::new(ws_config_v1(), version).with_hooks(OkexWsHooks),
            ws_settings_v1(),
        )),
        other => Err(ExchangeError::ConfigurationError(format!(
            "Unsupported OKEx WebSocket API version: {}",
            other
        ))),
    }
}

fn ws_config_v1() -> ConverterConfig {
    ConverterConfig {
        field_mappings: HashMap::from([(
            EntityKind::Trade,
            FieldMapping::Keyed(vec![
                ("trdMatchID", Field::ItemId),
                ("timestamp", Field::Timestamp),
                ("symbol", Field::Symbol),
                ("price", Field::Price),
                ("size", Field::Amount),
                ("side", Field::Direction),
            ]),
        )]),
        error_mapping: FieldMapping::Keyed(vec![
            ("status", Field::Code),
            ("error", Field::Message),
        ]),
        error_marker_fields: vec!["error"],
        time_encoding: TimeEncoding::TimeString,
        ..ConverterConfig::new(Platform::Okex, WS_BASE_URL)
    }
}

fn ws_settings_v1() -> WsSettings {
    WsSettings {
        event_type_param: "table",
        event_lookup: HashMap::from([("trade", Endpoint::Trade)]),
        channel_templates: HashMap::from([(Endpoint::Trade, "trade:{symbol}")]),
        subscription_command_supported: true,
        auth: Some(WsAuth {
            path: "/realtime",
            expires_header: "api-expires",
            signature_header: "api-signature",
            api_key_header: "api-key",
            expiry_secs: 3_600,
        }),
        ..WsSettings::default()
    }
}

#[derive(Debug, Clone, Copy)]
struct OkexWsHooks;

impl ConverterHooks for OkexWsHooks {
    fn process_item(&self, _endpoint: Endpoint, entity: Entity) -> Option<Entity> {
        if entity.symbol().starts_with(INDEX_SYMBOL_PREFIX) {
            return None;
        }
        Some(entity)
    }

    // the rejected command is echoed back; keep it for diagnosis
    fn process_error(&self, payload: Option<&Value>, mut error: ApiError) -> ApiError {
        if let Some(request) = payload.and_then(|payload| payload.get("request")) {
            error.message = format!("{} request: {}", error.message, request);
        }
        error
    }
}
