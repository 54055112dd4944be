//! Translation between the canonical request/response model and platform
//! payloads.
//!
//! One generic [`Converter`] is parameterized by a [`ConverterConfig`] holding
//! the per-exchange lookup tables. Exchange adapters supply the tables and,
//! where a quirk cannot be expressed as data, a [`ConverterHooks`]
//! implementation. The REST and WebSocket specializations live in [`rest`] and
//! [`ws`].

use crate::core::types::{
    ApiError, Candle, CursorField, CursorValue, Direction, Endpoint, Entity, EntityKind, ErrorCode,
    Field, Interval, ParamName, ParamValue, Params, Parsed, Platform, Sorting, Trade,
};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

pub mod rest;
pub mod ws;

pub use rest::{RestConverter, RestSettings};
pub use ws::{WsConverter, WsSettings};

/// Longest payload excerpt carried in diagnostic error messages
const MAX_PAYLOAD_EXCERPT: usize = 512;

/// How a platform encodes timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeEncoding {
    Milliseconds,
    Seconds,
    /// ISO-8601 / RFC 3339 strings
    TimeString,
}

/// Declarative mapping from a platform item to canonical fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldMapping {
    /// Object payloads: platform field name to canonical field
    Keyed(Vec<(&'static str, Field)>),
    /// Array payloads: position to canonical field, `None` discards the position
    Positional(Vec<Option<Field>>),
}

/// Why a single item could not become a canonical entity
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConvertError {
    #[error("missing required field `{0}`")]
    MissingField(Field),
    #[error("invalid value for `{field}`: {value}")]
    InvalidField { field: Field, value: String },
    #[error("no field mapping for {0:?} items")]
    NoMapping(EntityKind),
    #[error("unexpected item shape: {0}")]
    UnexpectedShape(String),
}

/// Per-exchange post-processing that the lookup tables cannot express.
///
/// Hooks only reshape or filter values; they never drive requests.
pub trait ConverterHooks: Send + Sync {
    /// Runs after generic post-processing; `None` drops the item
    fn process_item(&self, _endpoint: Endpoint, entity: Entity) -> Option<Entity> {
        Some(entity)
    }

    /// Runs after the error maps were applied
    fn process_error(&self, _payload: Option<&Value>, error: ApiError) -> ApiError {
        error
    }
}

/// Hooks that leave everything as the tables produced it
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl ConverterHooks for NoHooks {}

/// Lookup tables and flags describing one platform API version
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    pub platform: Platform,
    /// Base URL, `{version}` is replaced by the converter version
    pub base_url: &'static str,
    /// Platform resource per endpoint; may contain a `{symbol}` placeholder
    pub endpoint_lookup: HashMap<Endpoint, &'static str>,
    /// `Some(name)` renames, `None` drops a parameter the platform does not
    /// support, a missing entry passes it through under its canonical name
    pub param_name_lookup: HashMap<ParamName, Option<&'static str>>,
    pub sorting_lookup: HashMap<Sorting, &'static str>,
    pub default_sorting: Sorting,
    /// Empty means every interval is sent under its canonical name
    pub interval_lookup: HashMap<Interval, &'static str>,
    /// Field a cursor entity is reduced to when sent as a parameter
    pub item_cursor: CursorField,
    pub field_mappings: HashMap<EntityKind, FieldMapping>,
    pub error_mapping: FieldMapping,
    /// A payload object holding any of these keys is an error
    pub error_marker_fields: Vec<&'static str>,
    pub error_code_by_platform_error_code: HashMap<&'static str, ErrorCode>,
    pub error_code_by_http_status: HashMap<u16, ErrorCode>,
    pub time_encoding: TimeEncoding,
    /// Lower-case platform side names
    pub direction_lookup: HashMap<&'static str, Direction>,
    /// Infer the side from the sign of the raw amount when no side field is mapped
    pub direction_from_amount_sign: bool,
    /// Envelope field wrapping the item list
    pub items_field: Option<&'static str>,
}

impl ConverterConfig {
    pub fn new(platform: Platform, base_url: &'static str) -> Self {
        Self {
            platform,
            base_url,
            endpoint_lookup: HashMap::new(),
            param_name_lookup: HashMap::new(),
            sorting_lookup: HashMap::new(),
            default_sorting: Sorting::DEFAULT_SORTING,
            interval_lookup: HashMap::new(),
            item_cursor: CursorField::Timestamp,
            field_mappings: HashMap::new(),
            error_mapping: FieldMapping::Keyed(vec![("code", Field::Code), ("message", Field::Message)]),
            error_marker_fields: vec!["error"],
            error_code_by_platform_error_code: HashMap::new(),
            error_code_by_http_status: HashMap::from([
                (401, ErrorCode::Unauthorized),
                (403, ErrorCode::Unauthorized),
                (429, ErrorCode::RateLimit),
            ]),
            time_encoding: TimeEncoding::Milliseconds,
            direction_lookup: HashMap::from([
                ("buy", Direction::Buy),
                ("bid", Direction::Buy),
                ("sell", Direction::Sell),
                ("ask", Direction::Sell),
            ]),
            direction_from_amount_sign: false,
            items_field: Some("data"),
        }
    }
}

/// Stateless translator between canonical and platform shapes.
///
/// Cheap to clone; tables are shared.
#[derive(Clone)]
pub struct Converter {
    config: Arc<ConverterConfig>,
    hooks: Arc<dyn ConverterHooks>,
    version: String,
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("platform", &self.config.platform)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl Converter {
    pub fn new(config: ConverterConfig, version: impl Into<String>) -> Self {
        Self {
            config: Arc::new(config),
            hooks: Arc::new(NoHooks),
            version: version.into(),
        }
    }

    pub fn with_hooks(mut self, hooks: impl ConverterHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    pub fn platform(&self) -> Platform {
        self.config.platform
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn base_url(&self) -> String {
        self.config.base_url.replace("{version}", &self.version)
    }

    /// Whether the platform accepts `name` under a name of its own
    pub fn supports_param(&self, name: &ParamName) -> bool {
        matches!(self.config.param_name_lookup.get(name), Some(Some(_)))
    }

    /// Translate a canonical request into a resource path and query parameters
    pub fn prepare_params(
        &self,
        endpoint: Endpoint,
        params: &Params,
    ) -> Result<(String, Vec<(String, String)>), ApiError> {
        let mut path = self
            .config
            .endpoint_lookup
            .get(&endpoint)
            .map(|resource| (*resource).to_string())
            .ok_or_else(|| {
                ApiError::new(
                    ErrorCode::WrongParam,
                    format!("{} does not support the {} endpoint", self.platform(), endpoint),
                )
            })?;

        let mut query = Vec::with_capacity(params.len());
        for (name, value) in params {
            let key = match name {
                ParamName::Other(key) => key.clone(),
                _ => match self.config.param_name_lookup.get(name) {
                    Some(Some(key)) => (*key).to_string(),
                    Some(None) => {
                        debug!(param = %name, platform = %self.platform(), "Parameter not supported, dropped");
                        continue;
                    }
                    None => name.as_str().to_string(),
                },
            };
            let value = self.process_param_value(name, value)?;

            if *name == ParamName::Symbol && path.contains("{symbol}") {
                path = path.replace("{symbol}", &value);
            } else {
                query.push((key, value));
            }
        }

        Ok((path, query))
    }

    /// Render one canonical parameter value in platform form
    pub fn process_param_value(
        &self,
        name: &ParamName,
        value: &ParamValue,
    ) -> Result<String, ApiError> {
        match value {
            ParamValue::Text(text) => Ok(text.clone()),
            ParamValue::Int(number) => Ok(number.to_string()),
            ParamValue::Sorting(sorting) => Ok(self
                .config
                .sorting_lookup
                .get(sorting)
                .copied()
                .unwrap_or_else(|| sorting.as_str())
                .to_string()),
            ParamValue::Interval(interval) if self.config.interval_lookup.is_empty() => {
                Ok(interval.as_str().to_string())
            }
            ParamValue::Interval(interval) => self
                .config
                .interval_lookup
                .get(interval)
                .map(|value| (*value).to_string())
                .ok_or_else(|| {
                    ApiError::new(
                        ErrorCode::WrongParam,
                        format!(
                            "{} does not support the {} interval for {}",
                            self.platform(),
                            interval,
                            name
                        ),
                    )
                }),
            ParamValue::Item(entity) => Ok(match entity.cursor(self.config.item_cursor) {
                CursorValue::Timestamp(timestamp) => timestamp.to_string(),
                CursorValue::ItemId(item_id) => item_id,
            }),
        }
    }

    pub fn is_error_payload(&self, payload: &Value) -> bool {
        payload.as_object().is_some_and(|object| {
            self.config
                .error_marker_fields
                .iter()
                .any(|marker| object.get(*marker).is_some_and(|value| !value.is_null()))
        })
    }

    /// Parse a response payload for `endpoint` into canonical entities or an error
    pub fn parse(&self, endpoint: Endpoint, payload: &Value) -> Parsed {
        if self.is_error_payload(payload) {
            return Parsed::Error(self.parse_error(Some(payload), None));
        }

        let data = self.extract_items(payload);
        let parsed = match data {
            Value::Array(items) if self.is_item_list(endpoint, items) => items
                .iter()
                .map(|item| self.parse_item(endpoint, item))
                .collect::<Result<Vec<_>, _>>()
                .map(|entities| Parsed::Entities(entities.into_iter().flatten().collect())),
            item => self
                .parse_item(endpoint, item)
                .map(|entity| entity.map_or_else(|| Parsed::Entities(Vec::new()), Parsed::Entity)),
        };

        parsed.unwrap_or_else(|err| Parsed::Error(malformed(&err, payload)))
    }

    fn extract_items<'a>(&self, payload: &'a Value) -> &'a Value {
        self.config
            .items_field
            .and_then(|field| payload.get(field))
            .unwrap_or(payload)
    }

    fn is_item_list(&self, endpoint: Endpoint, items: &[Value]) -> bool {
        match self.config.field_mappings.get(&endpoint.entity_kind()) {
            // a positional item is itself an array: only an array of arrays is a list
            Some(FieldMapping::Positional(_)) => items.first().map_or(true, Value::is_array),
            _ => true,
        }
    }

    /// Map one item; `Ok(None)` means the item was filtered out on purpose
    pub fn parse_item(
        &self,
        endpoint: Endpoint,
        item: &Value,
    ) -> Result<Option<Entity>, ConvertError> {
        let kind = endpoint.entity_kind();
        let mapping = self
            .config
            .field_mappings
            .get(&kind)
            .ok_or(ConvertError::NoMapping(kind))?;
        let fields = map_fields(mapping, item)?;

        let entity = match kind {
            EntityKind::Trade => Entity::Trade(self.build_trade(&fields)?),
            EntityKind::Candle => Entity::Candle(self.build_candle(&fields)?),
        };
        Ok(self.hooks.process_item(endpoint, entity))
    }

    /// Classify an error payload and/or HTTP status.
    ///
    /// The platform code map wins over the HTTP status map; anything unmapped
    /// is `Unknown` with the platform message kept verbatim.
    pub fn parse_error(&self, payload: Option<&Value>, http_status: Option<u16>) -> ApiError {
        let fields = payload
            .and_then(|payload| map_fields(&self.config.error_mapping, payload).ok())
            .unwrap_or_default();
        let code = fields
            .get(&Field::Code)
            .map(|value| scalar_text(value))
            .unwrap_or_default();
        let message = fields
            .get(&Field::Message)
            .map(|value| scalar_text(value))
            .filter(|message| !message.is_empty());

        let error_code = self
            .config
            .error_code_by_platform_error_code
            .get(code.as_str())
            .copied()
            .or_else(|| {
                http_status.and_then(|status| {
                    self.config.error_code_by_http_status.get(&status).copied()
                })
            })
            .unwrap_or(ErrorCode::Unknown);

        let message = message.unwrap_or_else(|| match payload {
            Some(payload) if !payload.is_null() => excerpt(payload),
            _ => error_code.description().to_string(),
        });

        let error = ApiError {
            code,
            error_code,
            message,
            http_status,
        };
        self.hooks.process_error(payload, error)
    }

    fn build_trade(&self, fields: &HashMap<Field, &Value>) -> Result<Trade, ConvertError> {
        let timestamp = self.required_timestamp(fields, Field::Timestamp)?;
        let item_id = required(fields, Field::ItemId, text)?;
        let symbol = optional(fields, Field::Symbol, text)?.unwrap_or_default();
        let price = required(fields, Field::Price, decimal)?;
        let amount = required(fields, Field::Amount, decimal)?;

        let direction = match fields.get(&Field::Direction) {
            Some(raw) => self.direction(raw)?,
            None if self.config.direction_from_amount_sign => {
                if amount.negative {
                    Direction::Sell
                } else {
                    Direction::Buy
                }
            }
            None => return Err(ConvertError::MissingField(Field::Direction)),
        };

        Ok(Trade {
            timestamp,
            item_id,
            symbol,
            price: price.signed,
            amount: amount.magnitude,
            direction,
        })
    }

    fn build_candle(&self, fields: &HashMap<Field, &Value>) -> Result<Candle, ConvertError> {
        let trades_count = optional(fields, Field::TradesCount, |field, raw| {
            text(field, raw)?
                .parse::<u64>()
                .map_err(|_| invalid(field, raw))
        })?;

        Ok(Candle {
            timestamp: self.required_timestamp(fields, Field::Timestamp)?,
            start: self.optional_timestamp(fields, Field::Start)?,
            end: self.optional_timestamp(fields, Field::End)?,
            symbol: optional(fields, Field::Symbol, text)?.unwrap_or_default(),
            interval: None,
            open: required(fields, Field::Open, decimal)?.signed,
            high: required(fields, Field::High, decimal)?.signed,
            low: required(fields, Field::Low, decimal)?.signed,
            close: required(fields, Field::Close, decimal)?.signed,
            trades_count,
        })
    }

    fn direction(&self, raw: &Value) -> Result<Direction, ConvertError> {
        raw.as_str()
            .and_then(|side| {
                self.config
                    .direction_lookup
                    .get(side.to_lowercase().as_str())
                    .copied()
            })
            .ok_or_else(|| invalid(Field::Direction, raw))
    }

    fn required_timestamp(
        &self,
        fields: &HashMap<Field, &Value>,
        field: Field,
    ) -> Result<i64, ConvertError> {
        self.optional_timestamp(fields, field)?
            .ok_or(ConvertError::MissingField(field))
    }

    fn optional_timestamp(
        &self,
        fields: &HashMap<Field, &Value>,
        field: Field,
    ) -> Result<Option<i64>, ConvertError> {
        optional(fields, field, |field, raw| self.normalize_timestamp(field, raw))
    }

    /// Convert a platform timestamp to epoch milliseconds
    pub fn normalize_timestamp(&self, field: Field, raw: &Value) -> Result<i64, ConvertError> {
        match (self.config.time_encoding, raw) {
            (TimeEncoding::TimeString, Value::String(time)) => {
                parse_time_string(time).ok_or_else(|| invalid(field, raw))
            }
            (TimeEncoding::Seconds, _) => (number(field, raw)? * Decimal::from(1_000))
                .round()
                .to_i64()
                .ok_or_else(|| invalid(field, raw)),
            // numeric values under a time-string encoding are taken as milliseconds
            (TimeEncoding::Milliseconds | TimeEncoding::TimeString, _) => number(field, raw)?
                .trunc()
                .to_i64()
                .ok_or_else(|| invalid(field, raw)),
        }
    }
}

/// A decimal rendered as text exactly as the source wrote it
struct DecimalText {
    signed: String,
    magnitude: String,
    negative: bool,
}

fn map_fields<'a>(
    mapping: &FieldMapping,
    item: &'a Value,
) -> Result<HashMap<Field, &'a Value>, ConvertError> {
    match (mapping, item) {
        (FieldMapping::Keyed(pairs), Value::Object(object)) => Ok(pairs
            .iter()
            .filter_map(|(name, field)| {
                object
                    .get(*name)
                    .filter(|value| !value.is_null())
                    .map(|value| (*field, value))
            })
            .collect()),
        (FieldMapping::Positional(positions), Value::Array(values)) => Ok(positions
            .iter()
            .zip(values)
            .filter_map(|(field, value)| field.filter(|_| !value.is_null()).map(|f| (f, value)))
            .collect()),
        _ => Err(ConvertError::UnexpectedShape(excerpt(item))),
    }
}

fn required<T>(
    fields: &HashMap<Field, &Value>,
    field: Field,
    convert: impl Fn(Field, &Value) -> Result<T, ConvertError>,
) -> Result<T, ConvertError> {
    optional(fields, field, convert)?.ok_or(ConvertError::MissingField(field))
}

fn optional<T>(
    fields: &HashMap<Field, &Value>,
    field: Field,
    convert: impl Fn(Field, &Value) -> Result<T, ConvertError>,
) -> Result<Option<T>, ConvertError> {
    fields.get(&field).map(|raw| convert(field, *raw)).transpose()
}

fn invalid(field: Field, raw: &Value) -> ConvertError {
    ConvertError::InvalidField {
        field,
        value: excerpt(raw),
    }
}

fn text(field: Field, raw: &Value) -> Result<String, ConvertError> {
    match raw {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        _ => Err(invalid(field, raw)),
    }
}

fn parse_decimal_text(text: &str) -> Option<(Decimal, String)> {
    let text = text.trim();
    if text.contains(['e', 'E']) {
        return Decimal::from_scientific(text)
            .ok()
            .map(|value| (value.normalize(), value.normalize().to_string()));
    }
    Decimal::from_str(text)
        .ok()
        .map(|value| (value, text.trim_start_matches('+').to_string()))
}

fn number(field: Field, raw: &Value) -> Result<Decimal, ConvertError> {
    let text = text(field, raw)?;
    parse_decimal_text(&text)
        .map(|(value, _)| value)
        .ok_or_else(|| invalid(field, raw))
}

fn decimal(field: Field, raw: &Value) -> Result<DecimalText, ConvertError> {
    let (value, signed) = parse_decimal_text(&text(field, raw)?).ok_or_else(|| invalid(field, raw))?;
    let negative = value.is_sign_negative() && !value.is_zero();
    let magnitude = signed.strip_prefix('-').unwrap_or(&signed).to_string();
    Ok(DecimalText {
        signed,
        magnitude,
        negative,
    })
}

fn parse_time_string(time: &str) -> Option<i64> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(time) {
        return Some(parsed.timestamp_millis());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(time, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive).timestamp_millis())
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn excerpt(payload: &Value) -> String {
    let mut text = scalar_text(payload);
    if text.len() > MAX_PAYLOAD_EXCERPT {
        let mut end = MAX_PAYLOAD_EXCERPT;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
        text.push_str("...");
    }
    text
}

fn malformed(err: &ConvertError, payload: &Value) -> ApiError {
    ApiError::new(
        ErrorCode::Unknown,
        format!("Malformed payload: {}; payload: {}", err, excerpt(payload)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct DropIndexSymbols;

    impl ConverterHooks for DropIndexSymbols {
        fn process_item(&self, _endpoint: Endpoint, entity: Entity) -> Option<Entity> {
            (!entity.symbol().starts_with('.')).then_some(entity)
        }
    }

    fn test_config() -> ConverterConfig {
        ConverterConfig {
            endpoint_lookup: HashMap::from([
                (Endpoint::TradeHistory, "trades"),
                (Endpoint::Candle, "candles/{symbol}"),
            ]),
            param_name_lookup: HashMap::from([
                (ParamName::Symbol, Some("pair")),
                (ParamName::FromItem, Some("since")),
                (ParamName::Sorting, None),
            ]),
            interval_lookup: HashMap::from([(Interval::Min1, "1min")]),
            field_mappings: HashMap::from([
                (
                    EntityKind::Trade,
                    FieldMapping::Keyed(vec![
                        ("ts", Field::Timestamp),
                        ("id", Field::ItemId),
                        ("pair", Field::Symbol),
                        ("px", Field::Price),
                        ("qty", Field::Amount),
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
            error_mapping: FieldMapping::Keyed(vec![("code", Field::Code), ("msg", Field::Message)]),
            error_marker_fields: vec!["code"],
            error_code_by_platform_error_code: HashMap::from([("10020", ErrorCode::WrongLimit)]),
            direction_from_amount_sign: true,
            ..ConverterConfig::new(Platform::Okex, "https://api.test/v{version}/")
        }
    }

    fn converter() -> Converter {
        Converter::new(test_config(), "2")
    }

    fn raw(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    fn trades(parsed: Parsed) -> Vec<Trade> {
        parsed
            .into_entities()
            .unwrap()
            .into_iter()
            .filter_map(Entity::into_trade)
            .collect()
    }

    #[test]
    fn test_base_url_uses_version() {
        assert_eq!(converter().base_url(), "https://api.test/v2/");
    }

    #[test]
    fn test_decimal_strings_reproduce_source_exactly() {
        let converter = converter();
        for source in ["0.00000001", "123456.789", "1.10", "0.1", "99999999.99999999", "42"] {
            let payload = raw(&format!(
                r#"[{{"ts": 1, "id": 7, "px": {source}, "qty": {source}}}]"#
            ));
            let trade = trades(converter.parse(Endpoint::TradeHistory, &payload)).remove(0);
            assert_eq!(trade.price, source);
            assert_eq!(trade.amount, source);
        }
    }

    #[test]
    fn test_direction_follows_amount_sign() {
        let payload = raw(
            r#"[
                {"ts": 1, "id": 1, "px": 10.5, "qty": -0.25},
                {"ts": 2, "id": 2, "px": "10.5", "qty": "2.5"},
                {"ts": 3, "id": 3, "px": 1, "qty": "-1e-8"}
            ]"#,
        );
        let trades = trades(converter().parse(Endpoint::TradeHistory, &payload));

        assert_eq!(trades[0].direction, Direction::Sell);
        assert_eq!(trades[0].amount, "0.25");
        assert_eq!(trades[1].direction, Direction::Buy);
        assert_eq!(trades[1].amount, "2.5");
        assert_eq!(trades[2].direction, Direction::Sell);
        assert_eq!(trades[2].amount, "0.00000001");
        for trade in &trades {
            assert!(!trade.amount.starts_with('-'));
        }
    }

    #[test]
    fn test_explicit_side_wins_over_sign() {
        let mut config = test_config();
        config.field_mappings.insert(
            EntityKind::Trade,
            FieldMapping::Keyed(vec![
                ("ts", Field::Timestamp),
                ("id", Field::ItemId),
                ("px", Field::Price),
                ("qty", Field::Amount),
                ("side", Field::Direction),
            ]),
        );
        let converter = Converter::new(config, "2");
        let payload = json!({"ts": 1, "id": "a", "px": "1", "qty": "3", "side": "Sell"});

        let Parsed::Entity(Entity::Trade(trade)) = converter.parse(Endpoint::TradeHistory, &payload)
        else {
            panic!("expected a single trade");
        };
        assert_eq!(trade.direction, Direction::Sell);
        assert_eq!(trade.item_id, "a");
    }

    #[test]
    fn test_positional_candles_discard_unmapped_positions() {
        let payload = raw(r#"[[1537000000000, "1.1", 2.2, "0.9", 1.5, "999"]]"#);
        let parsed = converter().parse(Endpoint::Candle, &payload);
        let candle = parsed
            .into_entities()
            .unwrap()
            .remove(0)
            .into_candle()
            .unwrap();

        assert_eq!(candle.timestamp, 1_537_000_000_000);
        assert_eq!(candle.open, "1.1");
        assert_eq!(candle.high, "2.2");
        assert_eq!(candle.close, "1.5");
        assert_eq!(candle.trades_count, None);
    }

    #[test]
    fn test_time_normalization() {
        let mut config = test_config();
        config.time_encoding = TimeEncoding::Seconds;
        let seconds = Converter::new(config.clone(), "1");
        assert_eq!(
            seconds
                .normalize_timestamp(Field::Timestamp, &raw("1537.5"))
                .unwrap(),
            1_537_500
        );

        config.time_encoding = TimeEncoding::TimeString;
        let strings = Converter::new(config, "1");
        assert_eq!(
            strings
                .normalize_timestamp(Field::Timestamp, &json!("2018-09-12T10:20:30.123Z"))
                .unwrap(),
            1_536_747_630_123
        );
        assert_eq!(
            strings
                .normalize_timestamp(Field::Timestamp, &json!("2018-09-12 10:20:30"))
                .unwrap(),
            1_536_747_630_000
        );
        assert!(strings
            .normalize_timestamp(Field::Timestamp, &json!("yesterday"))
            .is_err());

        assert_eq!(
            converter()
                .normalize_timestamp(Field::Timestamp, &json!("1536747630123"))
                .unwrap(),
            1_536_747_630_123
        );
    }

    #[test]
    fn test_prepare_params_renames_drops_and_passes_through() {
        let cursor = Trade {
            timestamp: 1_500,
            item_id: "77".to_string(),
            symbol: "ltc_btc".to_string(),
            price: "1".to_string(),
            amount: "1".to_string(),
            direction: Direction::Buy,
        };
        let params = Params::from([
            (ParamName::Symbol, ParamValue::from("ltc_btc")),
            (ParamName::FromItem, ParamValue::from(cursor)),
            (ParamName::Sorting, ParamValue::from(Sorting::Ascending)),
            (ParamName::Limit, ParamValue::from(50)),
            (ParamName::Other("type".to_string()), ParamValue::from("1min")),
        ]);

        let (path, query) = converter()
            .prepare_params(Endpoint::TradeHistory, &params)
            .unwrap();

        assert_eq!(path, "trades");
        assert_eq!(
            query,
            vec![
                ("pair".to_string(), "ltc_btc".to_string()),
                ("limit".to_string(), "50".to_string()),
                ("since".to_string(), "1500".to_string()),
                ("type".to_string(), "1min".to_string()),
            ]
        );
    }

    #[test]
    fn test_prepare_params_path_placeholder_and_unsupported_values() {
        let converter = converter();
        let params = Params::from([
            (ParamName::Symbol, ParamValue::from("eth_btc")),
            (ParamName::Interval, ParamValue::from(Interval::Min1)),
        ]);
        let (path, query) = converter.prepare_params(Endpoint::Candle, &params).unwrap();
        assert_eq!(path, "candles/eth_btc");
        assert_eq!(query, vec![("interval".to_string(), "1min".to_string())]);

        let params = Params::from([(ParamName::Interval, ParamValue::from(Interval::Day3))]);
        let err = converter
            .prepare_params(Endpoint::Candle, &params)
            .unwrap_err();
        assert_eq!(err.error_code, ErrorCode::WrongParam);

        let err = converter
            .prepare_params(Endpoint::Trade, &Params::new())
            .unwrap_err();
        assert_eq!(err.error_code, ErrorCode::WrongParam);
    }

    #[test]
    fn test_parse_error_precedence_and_unknown() {
        let converter = converter();

        let mapped = converter.parse_error(Some(&json!({"code": 10020, "msg": "bad size"})), Some(429));
        assert_eq!(mapped.error_code, ErrorCode::WrongLimit);
        assert_eq!(mapped.code, "10020");
        assert_eq!(mapped.message, "bad size");
        assert_eq!(mapped.http_status, Some(429));

        let by_status = converter.parse_error(Some(&json!({"code": 1, "msg": "slow"})), Some(429));
        assert_eq!(by_status.error_code, ErrorCode::RateLimit);

        let unknown = converter.parse_error(Some(&json!({"code": "E42", "msg": "Strange thing"})), None);
        assert_eq!(unknown.error_code, ErrorCode::Unknown);
        assert_eq!(unknown.message, "Strange thing");

        let bare = converter.parse_error(Some(&json!("<html>bad gateway</html>")), Some(502));
        assert_eq!(bare.error_code, ErrorCode::Unknown);
        assert_eq!(bare.message, "<html>bad gateway</html>");
    }

    #[test]
    fn test_error_payload_is_detected_by_parse() {
        let parsed = converter().parse(
            Endpoint::TradeHistory,
            &json!({"result": false, "code": 10020}),
        );
        let Parsed::Error(err) = parsed else {
            panic!("expected error");
        };
        assert_eq!(err.error_code, ErrorCode::WrongLimit);
        assert!(err.message.contains("10020"));
    }

    #[test]
    fn test_malformed_item_yields_unknown_error_with_payload() {
        let payload = json!([{"ts": 1, "id": 1, "px": "1", "qty": "1"}, {"ts": 2, "id": 2, "qty": "1"}]);
        let Parsed::Error(err) = converter().parse(Endpoint::TradeHistory, &payload) else {
            panic!("expected error");
        };
        assert_eq!(err.error_code, ErrorCode::Unknown);
        assert!(err.message.contains("price"));
        assert!(err.message.contains("\"qty\""));

        let payload = json!([{"ts": 1, "id": 1, "px": "abc", "qty": "1"}]);
        assert!(converter().parse(Endpoint::TradeHistory, &payload).is_error());
    }

    #[test]
    fn test_data_envelope_and_hook_filtering() {
        let converter = converter().with_hooks(DropIndexSymbols);
        let payload = json!({"data": [
            {"ts": 1, "id": 1, "pair": ".BXBT", "px": "1", "qty": "1"},
            {"ts": 2, "id": 2, "pair": "XBTUSD", "px": "1", "qty": "1"}
        ]});
        let trades = trades(converter.parse(Endpoint::TradeHistory, &payload));
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].symbol, "XBTUSD");

        let single = json!({"ts": 1, "id": 1, "pair": ".BXBT", "px": "1", "qty": "1"});
        assert_eq!(
            converter.parse(Endpoint::TradeHistory, &single),
            Parsed::Entities(Vec::new())
        );
    }
}
