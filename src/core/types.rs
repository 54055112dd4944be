use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Exchanges with an adapter in this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum Platform {
    Okex,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Okex => "okex",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical endpoints a caller can request or subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Endpoint {
    Trade,
    TradeHistory,
    Candle,
}

impl Endpoint {
    /// The entity class every item of this endpoint is parsed into
    pub const fn entity_kind(self) -> EntityKind {
        match self {
            Self::Trade | Self::TradeHistory => EntityKind::Trade,
            Self::Candle => EntityKind::Candle,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Trade => "trade",
            Self::TradeHistory => "trade_history",
            Self::Candle => "candle",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Trade,
    Candle,
}

/// Canonical request parameter names.
///
/// `Other` carries exchange-specific extensions; they are passed through to the
/// platform under their own name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamName {
    Symbol,
    Limit,
    Sorting,
    Interval,
    FromItem,
    ToItem,
    FromTime,
    ToTime,
    Other(String),
}

impl ParamName {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Symbol => "symbol",
            Self::Limit => "limit",
            Self::Sorting => "sorting",
            Self::Interval => "interval",
            Self::FromItem => "from_item",
            Self::ToItem => "to_item",
            Self::FromTime => "from_time",
            Self::ToTime => "to_time",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for ParamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical entity fields targeted by the platform field mappings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Timestamp,
    ItemId,
    Symbol,
    Price,
    Amount,
    Direction,
    Start,
    End,
    Open,
    High,
    Low,
    Close,
    TradesCount,
    // Error payloads
    Code,
    Message,
}

impl Field {
    pub const fn is_timestamp(self) -> bool {
        matches!(self, Self::Timestamp | Self::Start | Self::End)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timestamp => "timestamp",
            Self::ItemId => "item_id",
            Self::Symbol => "symbol",
            Self::Price => "price",
            Self::Amount => "amount",
            Self::Direction => "direction",
            Self::Start => "start",
            Self::End => "end",
            Self::Open => "open",
            Self::High => "high",
            Self::Low => "low",
            Self::Close => "close",
            Self::TradesCount => "trades_count",
            Self::Code => "code",
            Self::Message => "message",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sorting {
    Ascending,
    Descending,
}

impl Sorting {
    /// Order in which history pagination walks
    pub const DEFAULT_SORTING: Self = Self::Ascending;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ascending => "asc",
            Self::Descending => "desc",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => f.write_str("BUY"),
            Self::Sell => f.write_str("SELL"),
        }
    }
}

/// Candle intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    Min1,
    Min3,
    Min5,
    Min15,
    Min30,
    Hrs1,
    Hrs2,
    Hrs4,
    Hrs6,
    Hrs12,
    Day1,
    Day3,
    Week1,
    Month1,
}

impl Interval {
    /// Compact name used when a platform has no interval lookup of its own
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Min1 => "1m",
            Self::Min3 => "3m",
            Self::Min5 => "5m",
            Self::Min15 => "15m",
            Self::Min30 => "30m",
            Self::Hrs1 => "1h",
            Self::Hrs2 => "2h",
            Self::Hrs4 => "4h",
            Self::Hrs6 => "6h",
            Self::Hrs12 => "12h",
            Self::Day1 => "1d",
            Self::Day3 => "3d",
            Self::Week1 => "1w",
            Self::Month1 => "1M",
        }
    }

    /// Nominal length in milliseconds (a month counts as 30 days)
    pub const fn as_millis(&self) -> i64 {
        const MINUTE: i64 = 60_000;
        match self {
            Self::Min1 => MINUTE,
            Self::Min3 => 3 * MINUTE,
            Self::Min5 => 5 * MINUTE,
            Self::Min15 => 15 * MINUTE,
            Self::Min30 => 30 * MINUTE,
            Self::Hrs1 => 60 * MINUTE,
            Self::Hrs2 => 120 * MINUTE,
            Self::Hrs4 => 240 * MINUTE,
            Self::Hrs6 => 360 * MINUTE,
            Self::Hrs12 => 720 * MINUTE,
            Self::Day1 => 1_440 * MINUTE,
            Self::Day3 => 3 * 1_440 * MINUTE,
            Self::Week1 => 7 * 1_440 * MINUTE,
            Self::Month1 => 30 * 1_440 * MINUTE,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthorized,
    WrongParam,
    WrongLimit,
    RateLimit,
    Network,
    Timeout,
    Unknown,
}

impl ErrorCode {
    pub fn description(&self) -> &'static str {
        match self {
            Self::Unauthorized => "Unauthorized or wrong api key",
            Self::WrongParam => "Wrong or unsupported parameter",
            Self::WrongLimit => "Wrong limit",
            Self::RateLimit => "Rate limit exceeded",
            Self::Network => "Network failure",
            Self::Timeout => "Request timed out",
            Self::Unknown => "Unknown error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::WrongParam => "WRONG_PARAM",
            Self::WrongLimit => "WRONG_LIMIT",
            Self::RateLimit => "RATE_LIMIT",
            Self::Network => "NETWORK",
            Self::Timeout => "TIMEOUT",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Epoch milliseconds
    pub timestamp: i64,
    pub item_id: String,
    pub symbol: String,
    pub price: String,
    /// Always a non-negative magnitude; the side lives in `direction`
    pub amount: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub symbol: String,
    pub interval: Option<Interval>,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub trades_count: Option<u64>,
}

/// Canonical error record.
///
/// `error_code` is always a defined classification, `Unknown` when nothing maps.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{error_code} (code: {code}): {message}")]
pub struct ApiError {
    pub code: String,
    pub error_code: ErrorCode,
    pub message: String,
    pub http_status: Option<u16>,
}

impl ApiError {
    pub fn new(error_code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: String::new(),
            error_code,
            message: message.into(),
            http_status: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Entity {
    Trade(Trade),
    Candle(Candle),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Trade(_) => EntityKind::Trade,
            Self::Candle(_) => EntityKind::Candle,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Self::Trade(trade) => trade.timestamp,
            Self::Candle(candle) => candle.timestamp,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Self::Trade(trade) => &trade.symbol,
            Self::Candle(candle) => &candle.symbol,
        }
    }

    /// Canonical pagination cursor of this item
    pub fn cursor(&self, field: CursorField) -> CursorValue {
        match (field, self) {
            (CursorField::ItemId, Self::Trade(trade)) => CursorValue::ItemId(trade.item_id.clone()),
            _ => CursorValue::Timestamp(self.timestamp()),
        }
    }

    /// Key telling apart items that share a cursor
    pub fn identity(&self) -> String {
        match self {
            Self::Trade(trade) => trade.item_id.clone(),
            Self::Candle(candle) => candle.timestamp.to_string(),
        }
    }

    pub fn into_trade(self) -> Option<Trade> {
        match self {
            Self::Trade(trade) => Some(trade),
            Self::Candle(_) => None,
        }
    }

    pub fn into_candle(self) -> Option<Candle> {
        match self {
            Self::Candle(candle) => Some(candle),
            Self::Trade(_) => None,
        }
    }

    pub(crate) fn fill_symbol(&mut self, symbol: &str) {
        let current = match self {
            Self::Trade(trade) => &mut trade.symbol,
            Self::Candle(candle) => &mut candle.symbol,
        };
        if current.is_empty() {
            *current = symbol.to_string();
        }
    }
}

impl From<Trade> for Entity {
    fn from(trade: Trade) -> Self {
        Self::Trade(trade)
    }
}

impl From<Candle> for Entity {
    fn from(candle: Candle) -> Self {
        Self::Candle(candle)
    }
}

/// Which canonical field identifies the next page of history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorField {
    Timestamp,
    ItemId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorValue {
    Timestamp(i64),
    ItemId(String),
}

impl CursorValue {
    /// Whether `self` lies strictly after `other` in ascending order.
    ///
    /// Item ids are opaque: they are compared numerically when both parse as
    /// integers, otherwise only inequality counts as progress.
    pub fn is_after(&self, other: &Self) -> bool {
        self.compare(other) == Some(Ordering::Greater)
    }

    /// Whether `self` lies strictly before `other`; never true for unequal opaque ids
    pub fn is_before(&self, other: &Self) -> bool {
        self.compare(other) == Some(Ordering::Less)
    }

    fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            (Self::ItemId(a), Self::ItemId(b)) => match (a.parse::<i64>(), b.parse::<i64>()) {
                (Ok(a), Ok(b)) => Some(a.cmp(&b)),
                _ if a == b => Some(Ordering::Equal),
                _ => Some(Ordering::Greater),
            },
            _ => None,
        }
    }
}

/// Result of parsing one platform payload.
///
/// The variant is chosen by the converter before construction, callers never
/// need to inspect the payload themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    Error(ApiError),
    Entity(Entity),
    Entities(Vec<Entity>),
}

impl Parsed {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn into_entities(self) -> Result<Vec<Entity>, ApiError> {
        match self {
            Self::Error(err) => Err(err),
            Self::Entity(entity) => Ok(vec![entity]),
            Self::Entities(entities) => Ok(entities),
        }
    }
}

/// Canonical request parameter value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Text(String),
    Int(i64),
    Sorting(Sorting),
    Interval(Interval),
    Item(Box<Entity>),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<Sorting> for ParamValue {
    fn from(value: Sorting) -> Self {
        Self::Sorting(value)
    }
}

impl From<Interval> for ParamValue {
    fn from(value: Interval) -> Self {
        Self::Interval(value)
    }
}

impl From<Entity> for ParamValue {
    fn from(value: Entity) -> Self {
        Self::Item(Box::new(value))
    }
}

impl From<Trade> for ParamValue {
    fn from(value: Trade) -> Self {
        Self::Item(Box::new(Entity::Trade(value)))
    }
}

/// Canonical request parameters, ordered for deterministic query strings
pub type Params = BTreeMap<ParamName, ParamValue>;

/// One WebSocket channel the client must keep alive
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subscription {
    pub endpoint: Endpoint,
    pub symbol: String,
}

impl Subscription {
    pub fn new(endpoint: Endpoint, symbol: impl Into<String>) -> Self {
        Self {
            endpoint,
            symbol: symbol.into(),
        }
    }
}

/// Outcome of a paginated history call.
///
/// Items fetched before a failing page are kept and returned next to the
/// error that stopped pagination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct History<T> {
    pub items: Vec<T>,
    pub error: Option<ApiError>,
}

impl<T> History<T> {
    pub fn failed(error: ApiError) -> Self {
        Self {
            items: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    pub fn filter_map<U>(self, f: impl FnMut(T) -> Option<U>) -> History<U> {
        History {
            items: self.items.into_iter().filter_map(f).collect(),
            error: self.error,
        }
    }

    pub fn into_result(self) -> Result<Vec<T>, ApiError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.items),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(timestamp: i64, item_id: &str) -> Entity {
        Entity::Trade(Trade {
            timestamp,
            item_id: item_id.to_string(),
            symbol: String::new(),
            price: "1".to_string(),
            amount: "1".to_string(),
            direction: Direction::Buy,
        })
    }

    #[test]
    fn test_cursor_ordering() {
        let a = trade(10, "99");
        let b = trade(11, "100");
        assert!(b
            .cursor(CursorField::Timestamp)
            .is_after(&a.cursor(CursorField::Timestamp)));
        // numeric ids compare as numbers, not strings
        assert!(b
            .cursor(CursorField::ItemId)
            .is_after(&a.cursor(CursorField::ItemId)));
        assert!(!a
            .cursor(CursorField::ItemId)
            .is_after(&a.cursor(CursorField::ItemId)));
        assert!(a
            .cursor(CursorField::Timestamp)
            .is_before(&b.cursor(CursorField::Timestamp)));

        let opaque = |id: &str| CursorValue::ItemId(id.to_string());
        assert!(!opaque("a1f").is_before(&opaque("b2e")));
        assert!(!opaque("b2e").is_before(&opaque("a1f")));
    }

    #[test]
    fn test_identity_separates_trades_in_one_millisecond() {
        let first = trade(1_000, "1");
        let second = trade(1_000, "2");
        assert_eq!(
            first.cursor(CursorField::Timestamp),
            second.cursor(CursorField::Timestamp)
        );
        assert_ne!(first.identity(), second.identity());
    }

    #[test]
    fn test_fill_symbol_keeps_platform_value() {
        let mut entity = trade(1, "1");
        entity.fill_symbol("ltc_btc");
        assert_eq!(entity.symbol(), "ltc_btc");
        entity.fill_symbol("eth_btc");
        assert_eq!(entity.symbol(), "ltc_btc");
    }

    #[test]
    fn test_history_keeps_items_next_to_error() {
        let history = History {
            items: vec![trade(1, "1"), trade(2, "2")],
            error: Some(ApiError::new(ErrorCode::RateLimit, "slow down")),
        };
        assert!(!history.is_complete());
        let trades = history.filter_map(Entity::into_trade);
        assert_eq!(trades.items.len(), 2);
        assert_eq!(trades.error.unwrap().error_code, ErrorCode::RateLimit);
    }
}
