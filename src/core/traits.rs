use crate::core::kernel::rest::HttpTransport;
use crate::core::rest_client::{HistoryQuery, RestClient};
use crate::core::types::{
    ApiError, Candle, Endpoint, Entity, History, Interval, ParamName, ParamValue, Params, Trade,
};
use async_trait::async_trait;

/// Canonical market-data request surface
#[async_trait]
pub trait MarketDataSource {
    /// Most recent trades
    ///
    /// # Arguments
    /// * `symbol` - Platform symbol, e.g. `ltc_btc`
    /// * `limit` - Number of trades; clamped to the endpoint maximum
    async fn fetch_trades(&self, symbol: &str, limit: Option<i64>) -> Result<Vec<Trade>, ApiError>;

    /// Trade history walked forward from `query.from_item`
    async fn fetch_trades_history(&self, query: HistoryQuery) -> History<Trade>;

    /// Candles of one interval in a single call
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        limit: Option<i64>,
        from_time: Option<i64>,
        to_time: Option<i64>,
    ) -> Result<Vec<Candle>, ApiError>;

    /// Generic paginated history for any endpoint
    async fn fetch_history(&self, query: HistoryQuery) -> History<Entity>;
}

#[async_trait]
impl<T: HttpTransport> MarketDataSource for RestClient<T> {
    async fn fetch_trades(&self, symbol: &str, limit: Option<i64>) -> Result<Vec<Trade>, ApiError> {
        let mut params = Params::from([(ParamName::Symbol, ParamValue::from(symbol))]);
        if let Some(limit) = self.single_call_limit(Endpoint::Trade, limit)? {
            params.insert(ParamName::Limit, ParamValue::Int(limit));
        }

        let entities = self.request(Endpoint::Trade, &params).await.into_entities()?;
        Ok(entities.into_iter().filter_map(Entity::into_trade).collect())
    }

    async fn fetch_trades_history(&self, mut query: HistoryQuery) -> History<Trade> {
        query.endpoint = Endpoint::TradeHistory;
        self.paginate(&query).await.filter_map(Entity::into_trade)
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        limit: Option<i64>,
        from_time: Option<i64>,
        to_time: Option<i64>,
    ) -> Result<Vec<Candle>, ApiError> {
        let mut params = Params::from([
            (ParamName::Symbol, ParamValue::from(symbol)),
            (ParamName::Interval, ParamValue::Interval(interval)),
        ]);
        if let Some(limit) = self.single_call_limit(Endpoint::Candle, limit)? {
            params.insert(ParamName::Limit, ParamValue::Int(limit));
        }
        if let Some(from_time) = from_time {
            params.insert(ParamName::FromTime, ParamValue::Int(from_time));
        }
        if let Some(to_time) = to_time {
            params.insert(ParamName::ToTime, ParamValue::Int(to_time));
        }

        let entities = self.request(Endpoint::Candle, &params).await.into_entities()?;
        Ok(entities
            .into_iter()
            .filter_map(Entity::into_candle)
            .map(|mut candle| {
                candle.interval = Some(interval);
                candle
            })
            .collect())
    }

    async fn fetch_history(&self, query: HistoryQuery) -> History<Entity> {
        self.paginate(&query).await
    }
}
