use crate::core::converter::{
    Converter, ConverterConfig, ConverterHooks, FieldMapping, RestConverter, RestSettings,
    TimeEncoding,
};
use crate::core::errors::ExchangeError;
use crate::core::kernel::RestAuth;
use crate::core::types::{
    ApiError, CursorField, Endpoint, EntityKind, ErrorCode, Field, Interval, ParamName,
    ParamValue, Platform,
};
use serde_json::Value;
use std::collections::HashMap;

const REST_BASE_URL: &str = "https://www.okex.com/api/v{version}/";
const MAX_LIMIT: u32 = 1_000;

/// Error value OKEx sends instead of a numeric code when throttling
const RATE_LIMIT_ERROR: &str = "ERR_RATE_LIMIT";

/// REST converter for one OKEx API version
pub fn rest_converter(version: &str) -> Result<RestConverter, ExchangeError> {
    match version {
        "1" => Ok(RestConverter::new(
            Converter::new(rest_config_v1(), version).with_hooks(OkexRestHooks),
            rest_settings_v1(),
        )),
        other => Err(ExchangeError::ConfigurationError(format!(
            "Unsupported OKEx REST API version: {}",
            other
        ))),
    }
}

fn rest_config_v1() -> ConverterConfig {
    ConverterConfig {
        endpoint_lookup: HashMap::from([
            (Endpoint::Trade, "trades.do"),
            (Endpoint::TradeHistory, "trades.do"),
            (Endpoint::Candle, "kline.do"),
        ]),
        param_name_lookup: HashMap::from([
            (ParamName::Symbol, Some("symbol")),
            (ParamName::Limit, Some("size")),
            (ParamName::Interval, Some("type")),
            (ParamName::FromItem, Some("since")),
            (ParamName::Sorting, None),
            (ParamName::ToItem, None),
            (ParamName::FromTime, None),
            (ParamName::ToTime, None),
        ]),
        interval_lookup: HashMap::from([
            (Interval::Min1, "1min"),
            (Interval::Min3, "3min"),
            (Interval::Min5, "5min"),
            (Interval::Min15, "15min"),
            (Interval::Min30, "30min"),
            (Interval::Hrs1, "1hour"),
            (Interval::Hrs2, "2hour"),
            (Interval::Hrs4, "4hour"),
            (Interval::Hrs6, "6hour"),
            (Interval::Hrs12, "12hour"),
            (Interval::Day1, "1day"),
            (Interval::Day3, "3day"),
            (Interval::Week1, "1week"),
        ]),
        item_cursor: CursorField::Timestamp,
        field_mappings: HashMap::from([
            (
                EntityKind::Trade,
                FieldMapping::Keyed(vec![
                    ("date_ms", Field::Timestamp),
                    ("tid", Field::ItemId),
                    ("amount", Field::Amount),
                    ("price", Field::Price),
                    ("type", Field::Direction),
                ]),
            ),
            (
                EntityKind::Candle,
                FieldMapping::Positional(vec![
                    Some(Field::Timestamp),
                    Some(Field::Open),
                    Some(Field::High),
                    Some(Field::Low),
                    Some(Field::Close),
                    None,
                ]),
            ),
        ]),
        error_mapping: FieldMapping::Keyed(vec![
            ("error_code", Field::Code),
            ("error", Field::Code),
            ("message", Field::Message),
        ]),
        error_marker_fields: vec!["error_code", "error"],
        error_code_by_platform_error_code: HashMap::from([
            ("10020", ErrorCode::WrongLimit),
            ("11010", ErrorCode::RateLimit),
        ]),
        time_encoding: TimeEncoding::Milliseconds,
        direction_from_amount_sign: true,
        ..ConverterConfig::new(Platform::Okex, REST_BASE_URL)
    }
}

fn rest_settings_v1() -> RestSettings {
    RestSettings {
        max_limit_by_endpoint: HashMap::from([
            (Endpoint::Trade, MAX_LIMIT),
            (Endpoint::TradeHistory, MAX_LIMIT),
            (Endpoint::Candle, MAX_LIMIT),
        ]),
        default_from_item: Some(ParamValue::Int(0)),
        auth: Some(RestAuth::Headers {
            api_key: "api-key",
            nonce: "api-nonce",
            signature: "api-signature",
        }),
    }
}

/// Throttling reported as a text error instead of a numeric code
#[derive(Debug, Clone, Copy)]
struct OkexRestHooks;

impl ConverterHooks for OkexRestHooks {
    fn process_error(&self, payload: Option<&Value>, mut error: ApiError) -> ApiError {
        let throttled = payload
            .and_then(|payload| payload.get("error"))
            .and_then(Value::as_str)
            == Some(RATE_LIMIT_ERROR);
        if throttled {
            error.error_code = ErrorCode::RateLimit;
            error.message = format!("{}: {}", ErrorCode::RateLimit.description(), error.message);
        }
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Direction, Entity, Params, Trade};
    use serde_json::json;

    fn converter() -> RestConverter {
        rest_converter("1").unwrap()
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        assert!(matches!(
            rest_converter("5"),
            Err(ExchangeError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_trade_history_params() {
        let converter = converter();
        let cursor = Trade {
            timestamp: 1_536_000_000_123,
            item_id: "55".to_string(),
            symbol: "ltc_btc".to_string(),
            price: "0.01".to_string(),
            amount: "1".to_string(),
            direction: Direction::Buy,
        };
        let params = Params::from([
            (ParamName::Symbol, ParamValue::from("ltc_btc")),
            (ParamName::Limit, ParamValue::Int(200)),
            (ParamName::FromItem, ParamValue::from(cursor)),
            (ParamName::ToTime, ParamValue::Int(1_536_000_100_000)),
        ]);

        let (url, query) = converter
            .prepare_request(&converter.base_url(), Endpoint::TradeHistory, &params)
            .unwrap();
        assert_eq!(url, "https://www.okex.com/api/v1/trades.do");
        assert_eq!(
            query,
            vec![
                ("symbol".to_string(), "ltc_btc".to_string()),
                ("size".to_string(), "200".to_string()),
                ("since".to_string(), "1536000000123".to_string()),
            ]
        );
    }

    #[test]
    fn test_candle_params_map_interval() {
        let params = Params::from([
            (ParamName::Symbol, ParamValue::from("ltc_btc")),
            (ParamName::Interval, ParamValue::from(Interval::Hrs4)),
        ]);
        let (path, query) = converter()
            .converter()
            .prepare_params(Endpoint::Candle, &params)
            .unwrap();
        assert_eq!(path, "kline.do");
        assert!(query.contains(&("type".to_string(), "4hour".to_string())));
    }

    #[test]
    fn test_parse_trades() {
        let payload: Value = serde_json::from_str(
            r#"[
                {"date": 1536000000, "date_ms": 1536000000123, "amount": 0.00000001, "price": 123456.789, "tid": 101, "type": "sell"},
                {"date": 1536000001, "date_ms": 1536000001000, "amount": "2.5", "price": "0.0165", "tid": 102, "type": "buy"}
            ]"#,
        )
        .unwrap();

        let trades: Vec<Trade> = converter()
            .parse(Endpoint::TradeHistory, &payload)
            .into_entities()
            .unwrap()
            .into_iter()
            .filter_map(Entity::into_trade)
            .collect();

        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].timestamp, 1_536_000_000_123);
        assert_eq!(trades[0].item_id, "101");
        assert_eq!(trades[0].amount, "0.00000001");
        assert_eq!(trades[0].price, "123456.789");
        assert_eq!(trades[0].direction, Direction::Sell);
        assert_eq!(trades[1].direction, Direction::Buy);
    }

    #[test]
    fn test_parse_candles() {
        let payload: Value =
            serde_json::from_str(r#"[[1536000000000, "0.0165", "0.0170", "0.0160", "0.0168", "1024.5"]]"#)
                .unwrap();
        let candles = converter()
            .parse(Endpoint::Candle, &payload)
            .into_entities()
            .unwrap();
        let candle = candles[0].clone().into_candle().unwrap();
        assert_eq!(candle.timestamp, 1_536_000_000_000);
        assert_eq!(candle.low, "0.0160");
        assert_eq!(candle.close, "0.0168");
    }

    #[test]
    fn test_error_codes() {
        let converter = converter();

        let limit = converter.parse(
            Endpoint::TradeHistory,
            &json!({"result": false, "error_code": 10020}),
        );
        let Err(limit) = limit.into_entities() else {
            panic!("expected error");
        };
        assert_eq!(limit.error_code, ErrorCode::WrongLimit);
        assert_eq!(limit.code, "10020");

        let throttled = converter.parse_error(Some(&json!({"error": "ERR_RATE_LIMIT"})), None);
        assert_eq!(throttled.error_code, ErrorCode::RateLimit);

        let unknown = converter.parse_error(
            Some(&json!({"error_code": 20001, "message": "User does not exist"})),
            Some(200),
        );
        assert_eq!(unknown.error_code, ErrorCode::Unknown);
        assert_eq!(unknown.message, "User does not exist");
    }
}
