use crate::core::config::Credentials;
use crate::core::converter::RestConverter;
use crate::core::errors::ExchangeError;
use crate::core::kernel::rest::{HttpRequest, HttpTransport, ReqwestTransport, RestClientConfig};
use crate::core::kernel::signer::{sign_rest_request, Signer};
use crate::core::types::{
    ApiError, CursorValue, Endpoint, Entity, ErrorCode, History, Interval, ParamName, ParamValue,
    Params, Parsed, Sorting,
};
use reqwest::Url;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, instrument, warn};

/// Canonical description of one paginated history call
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryQuery {
    pub endpoint: Endpoint,
    pub symbol: String,
    /// Total number of items wanted, `None` walks until the history is exhausted
    pub limit: Option<i64>,
    pub from_item: Option<ParamValue>,
    pub to_item: Option<Entity>,
    pub sorting: Option<Sorting>,
    /// Split the walk into pages of the endpoint's maximum size; off by
    /// default, so pages are sized by the remaining limit alone
    pub is_use_max_limit: bool,
    pub from_time: Option<i64>,
    pub to_time: Option<i64>,
    pub interval: Option<Interval>,
    /// Exchange-specific parameters passed through unchanged
    pub extra: Params,
}

impl HistoryQuery {
    pub fn new(endpoint: Endpoint, symbol: impl Into<String>) -> Self {
        Self {
            endpoint,
            symbol: symbol.into(),
            limit: None,
            from_item: None,
            to_item: None,
            sorting: None,
            is_use_max_limit: false,
            from_time: None,
            to_time: None,
            interval: None,
            extra: Params::new(),
        }
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_from_item(mut self, from_item: impl Into<ParamValue>) -> Self {
        self.from_item = Some(from_item.into());
        self
    }

    pub fn with_to_item(mut self, to_item: impl Into<Entity>) -> Self {
        self.to_item = Some(to_item.into());
        self
    }

    pub fn with_sorting(mut self, sorting: Sorting) -> Self {
        self.sorting = Some(sorting);
        self
    }

    pub fn with_max_limit(mut self, is_use_max_limit: bool) -> Self {
        self.is_use_max_limit = is_use_max_limit;
        self
    }

    pub fn with_time_range(mut self, from_time: Option<i64>, to_time: Option<i64>) -> Self {
        self.from_time = from_time;
        self.to_time = to_time;
        self
    }

    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.extra.insert(ParamName::Other(name.into()), value.into());
        self
    }
}

struct RequestSigning {
    credentials: Credentials,
    signer: Arc<dyn Signer>,
}

/// REST client driven by a `RestConverter`.
///
/// Owns one transport. The only mutable state is the rate-limit counter,
/// which is atomic, so one client can serve concurrent callers.
pub struct RestClient<T: HttpTransport = ReqwestTransport> {
    transport: T,
    converter: RestConverter,
    config: RestClientConfig,
    base_url: String,
    signing: Option<RequestSigning>,
    ratelimit_error_in_row_count: AtomicU32,
}

impl RestClient<ReqwestTransport> {
    /// Client over the default reqwest transport
    pub fn with_reqwest(
        converter: RestConverter,
        config: RestClientConfig,
    ) -> Result<Self, ExchangeError> {
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self::new(converter, transport, config))
    }
}

impl<T: HttpTransport> RestClient<T> {
    pub fn new(converter: RestConverter, transport: T, config: RestClientConfig) -> Self {
        Self {
            base_url: converter.base_url(),
            transport,
            converter,
            config,
            signing: None,
            ratelimit_error_in_row_count: AtomicU32::new(0),
        }
    }

    /// Sign every request with `credentials` through `signer`.
    ///
    /// Fails when the exchange adapter declares no placement for signed fields.
    pub fn with_auth(
        mut self,
        credentials: Credentials,
        signer: Arc<dyn Signer>,
    ) -> Result<Self, ExchangeError> {
        if self.converter.auth().is_none() {
            return Err(ExchangeError::ConfigurationError(format!(
                "{} has no authenticated REST mode",
                self.converter.platform()
            )));
        }
        self.signing = Some(RequestSigning {
            credentials,
            signer,
        });
        Ok(self)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn converter(&self) -> &RestConverter {
        &self.converter
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_authenticated(&self) -> bool {
        self.signing.is_some()
    }

    /// Number of `RateLimit` errors received in a row
    pub fn ratelimit_error_in_row_count(&self) -> u32 {
        self.ratelimit_error_in_row_count.load(Ordering::SeqCst)
    }

    /// Delay applied before the next call after `errors_in_row` rate-limit errors
    pub fn backoff_delay(&self, errors_in_row: u32) -> Duration {
        if errors_in_row == 0 {
            return Duration::ZERO;
        }
        let max_delay = Duration::from_millis(self.config.backoff_max_ms);
        ExponentialBackoff::from_millis(2)
            .factor(self.config.backoff_base_ms / 2)
            .max_delay(max_delay)
            .nth(errors_in_row as usize - 1)
            .unwrap_or(max_delay)
    }

    /// Run one canonical request and parse its response
    #[instrument(skip(self, params), fields(exchange = %self.config.exchange_name, endpoint = %endpoint))]
    pub async fn request(&self, endpoint: Endpoint, params: &Params) -> Parsed {
        let errors_in_row = self.ratelimit_error_in_row_count();
        if errors_in_row > 0 {
            let delay = self.backoff_delay(errors_in_row);
            debug!(errors_in_row, ?delay, "Backing off after rate-limit errors");
            tokio::time::sleep(delay).await;
        }

        let (url, query) = match self
            .converter
            .prepare_request(&self.base_url, endpoint, params)
        {
            Ok(prepared) => prepared,
            Err(err) => return Parsed::Error(err),
        };
        let request = match self.sign(HttpRequest::get(url, query)) {
            Ok(request) => request,
            Err(err) => return Parsed::Error(err.into()),
        };

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!("Transport failure: {}", err);
                return Parsed::Error(err.into());
            }
        };

        let mut parsed = if response.is_success() {
            self.converter.parse(endpoint, &response.payload)
        } else {
            Parsed::Error(
                self.converter
                    .parse_error(Some(&response.payload), Some(response.status)),
            )
        };
        self.record_response(&parsed);

        if let Some(ParamValue::Text(symbol)) = params.get(&ParamName::Symbol) {
            match &mut parsed {
                Parsed::Entity(entity) => entity.fill_symbol(symbol),
                Parsed::Entities(entities) => entities
                    .iter_mut()
                    .for_each(|entity| entity.fill_symbol(symbol)),
                Parsed::Error(_) => {}
            }
        }
        parsed
    }

    fn record_response(&self, parsed: &Parsed) {
        match parsed {
            Parsed::Error(err) if err.error_code == ErrorCode::RateLimit => {
                let count = self
                    .ratelimit_error_in_row_count
                    .fetch_add(1, Ordering::SeqCst)
                    + 1;
                warn!(count, "Rate limit error: {}", err.message);
            }
            _ => self.ratelimit_error_in_row_count.store(0, Ordering::SeqCst),
        }
    }

    fn sign(&self, mut request: HttpRequest) -> Result<HttpRequest, ExchangeError> {
        let (Some(signing), Some(auth)) = (&self.signing, self.converter.auth()) else {
            return Ok(request);
        };

        let url = Url::parse_with_params(&request.url, &request.query)
            .map_err(|e| ExchangeError::ConfigurationError(format!("Invalid request URL: {}", e)))?;
        let path = match url.query().filter(|query| !query.is_empty()) {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        let body = request.body.as_deref().unwrap_or_default();

        let signed = sign_rest_request(
            auth,
            &signing.credentials,
            signing.signer.as_ref(),
            request.method.as_str(),
            &path,
            body,
        )?;
        request.headers.extend(signed.headers);
        request.query.extend(signed.query);
        Ok(request)
    }

    /// Requested limit validated and clamped to the endpoint ceiling
    pub(crate) fn single_call_limit(
        &self,
        endpoint: Endpoint,
        limit: Option<i64>,
    ) -> Result<Option<i64>, ApiError> {
        let Some(limit) = limit else {
            return Ok(None);
        };
        if limit <= 0 {
            return Err(wrong_limit(limit));
        }
        match self.converter.max_limit(endpoint).map(i64::from) {
            Some(max) if limit > max => {
                debug!(limit, max, %endpoint, "Limit above endpoint maximum, clamped");
                Ok(Some(max))
            }
            _ => Ok(Some(limit)),
        }
    }

    /// Walk the history forward page by page.
    ///
    /// Items fetched before a failing page are returned together with the error.
    #[instrument(skip(self, query), fields(exchange = %self.config.exchange_name, endpoint = %query.endpoint, symbol = %query.symbol))]
    pub async fn paginate(&self, query: &HistoryQuery) -> History<Entity> {
        let limit = match query.limit {
            Some(limit) if limit <= 0 => return History::failed(wrong_limit(limit)),
            limit => limit.map(|limit| limit as usize),
        };
        let max_limit = self
            .converter
            .max_limit(query.endpoint)
            .map(|max| max as usize);
        let cursor_field = self.converter.converter().config().item_cursor;
        let to_cursor = query.to_item.as_ref().map(|item| item.cursor(cursor_field));

        let mut from_item = query
            .from_item
            .clone()
            .or_else(|| query.from_time.map(ParamValue::Int))
            .or_else(|| self.converter.default_from_item().cloned());
        // cursor sent with the current page and the items already returned at it
        let mut boundary: Option<CursorValue> = None;
        let mut seen_at_boundary: HashSet<String> = HashSet::new();
        if let Some(ParamValue::Item(item)) = &from_item {
            boundary = Some(item.cursor(cursor_field));
            seen_at_boundary.insert(item.identity());
        }
        let mut items: Vec<Entity> = Vec::new();

        for page in 0..self.config.max_pages {
            let remaining = limit.map(|limit| limit - items.len());
            let page_size = match (remaining, max_limit) {
                (Some(remaining), Some(max)) if query.is_use_max_limit => Some(remaining.min(max)),
                (None, Some(max)) if query.is_use_max_limit => Some(max),
                (remaining, _) => remaining,
            };

            let params = self.page_params(query, from_item.as_ref(), page_size);
            let entities = match self.request(query.endpoint, &params).await.into_entities() {
                Ok(entities) => entities,
                Err(error) => {
                    warn!(page, fetched = items.len(), "History interrupted: {}", error);
                    return History {
                        items,
                        error: Some(error),
                    };
                }
            };
            if entities.is_empty() {
                debug!(page, "History exhausted");
                break;
            }

            let before = items.len();
            let mut crossed_bound = false;
            for entity in entities {
                let cursor = entity.cursor(cursor_field);
                if let Some(boundary) = &boundary {
                    let repeated = cursor == *boundary
                        && seen_at_boundary.contains(&entity.identity());
                    if repeated || cursor.is_before(boundary) {
                        continue;
                    }
                }
                if query.from_time.is_some_and(|from| entity.timestamp() < from) {
                    continue;
                }
                let past_time = query.to_time.is_some_and(|to| entity.timestamp() > to);
                let past_item = to_cursor.as_ref().is_some_and(|to| cursor.is_after(to));
                if past_time || past_item {
                    crossed_bound = true;
                    break;
                }
                items.push(entity);
            }

            if let Some(limit) = limit {
                if items.len() >= limit {
                    items.truncate(limit);
                    break;
                }
            }
            if crossed_bound {
                break;
            }
            match items.last() {
                Some(last) if items.len() > before => {
                    let cursor = last.cursor(cursor_field);
                    seen_at_boundary = items
                        .iter()
                        .rev()
                        .take_while(|item| item.cursor(cursor_field) == cursor)
                        .map(Entity::identity)
                        .collect();
                    boundary = Some(cursor);
                    from_item = Some(ParamValue::from(last.clone()));
                }
                _ => {
                    debug!(page, "Page brought no new items, stopping");
                    break;
                }
            }

            if page + 1 == self.config.max_pages {
                warn!(max_pages = self.config.max_pages, "Page cap reached, history truncated");
            }
        }

        History { items, error: None }
    }

    fn page_params(
        &self,
        query: &HistoryQuery,
        from_item: Option<&ParamValue>,
        page_size: Option<usize>,
    ) -> Params {
        let converter = self.converter.converter();
        let mut params = query.extra.clone();
        params.insert(ParamName::Symbol, ParamValue::from(query.symbol.as_str()));
        if let Some(page_size) = page_size {
            params.insert(ParamName::Limit, ParamValue::Int(page_size as i64));
        }
        let sorting = query.sorting.or_else(|| {
            converter
                .supports_param(&ParamName::Sorting)
                .then_some(converter.config().default_sorting)
        });
        if let Some(sorting) = sorting {
            params.insert(ParamName::Sorting, ParamValue::Sorting(sorting));
        }
        if let Some(interval) = query.interval {
            params.insert(ParamName::Interval, ParamValue::Interval(interval));
        }
        if let Some(from_item) = from_item {
            params.insert(ParamName::FromItem, from_item.clone());
        }
        if let Some(to_item) = &query.to_item {
            params.insert(ParamName::ToItem, ParamValue::from(to_item.clone()));
        }
        if let Some(from_time) = query.from_time {
            params.insert(ParamName::FromTime, ParamValue::Int(from_time));
        }
        if let Some(to_time) = query.to_time {
            params.insert(ParamName::ToTime, ParamValue::Int(to_time));
        }
        params
    }
}

fn wrong_limit(limit: i64) -> ApiError {
    ApiError::new(
        ErrorCode::WrongLimit,
        format!("Limit must be positive, got {}", limit),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::converter::{Converter, ConverterConfig, RestSettings};
    use crate::core::kernel::rest::HttpResponse;
    use crate::core::kernel::signer::RestAuth;
    use crate::core::types::Platform;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        requests: Mutex<Vec<HttpRequest>>,
    }

    #[async_trait]
    impl HttpTransport for Recorder {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ExchangeError> {
            self.requests.lock().unwrap().push(request);
            Ok(HttpResponse {
                status: 200,
                payload: json!([]),
            })
        }
    }

    fn converter(auth: Option<RestAuth>) -> RestConverter {
        let config = ConverterConfig {
            endpoint_lookup: HashMap::from([(Endpoint::Trade, "trades")]),
            ..ConverterConfig::new(Platform::Okex, "https://api.test/v{version}/")
        };
        RestConverter::new(
            Converter::new(config, "1"),
            RestSettings {
                max_limit_by_endpoint: HashMap::from([(Endpoint::Trade, 100)]),
                auth,
                ..RestSettings::default()
            },
        )
    }

    fn client(auth: Option<RestAuth>) -> RestClient<Recorder> {
        let config = RestClientConfig::new("test".to_string())
            .with_backoff(Duration::from_millis(100), Duration::from_millis(1_000));
        RestClient::new(converter(auth), Recorder::default(), config)
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let client = client(None);
        assert_eq!(client.backoff_delay(0), Duration::ZERO);
        assert_eq!(client.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(client.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(client.backoff_delay(3), Duration::from_millis(400));
        assert_eq!(client.backoff_delay(10), Duration::from_millis(1_000));
    }

    #[test]
    fn test_single_call_limit() {
        let client = client(None);
        assert_eq!(client.single_call_limit(Endpoint::Trade, None), Ok(None));
        assert_eq!(client.single_call_limit(Endpoint::Trade, Some(5)), Ok(Some(5)));
        assert_eq!(client.single_call_limit(Endpoint::Trade, Some(500)), Ok(Some(100)));
        assert_eq!(
            client
                .single_call_limit(Endpoint::Trade, Some(0))
                .unwrap_err()
                .error_code,
            ErrorCode::WrongLimit
        );
    }

    #[test]
    fn test_history_query_builder() {
        assert!(!HistoryQuery::new(Endpoint::TradeHistory, "ltc_btc").is_use_max_limit);

        let query = HistoryQuery::new(Endpoint::TradeHistory, "ltc_btc")
            .with_limit(10)
            .with_time_range(Some(1), None)
            .with_max_limit(true)
            .with_param("contract_type", "this_week");
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.from_time, Some(1));
        assert!(query.is_use_max_limit);
        assert_eq!(
            query.extra.get(&ParamName::Other("contract_type".to_string())),
            Some(&ParamValue::from("this_week"))
        );
    }

    #[tokio::test]
    async fn test_auth_requires_adapter_support() {
        let credentials = Credentials::new("key", "secret");
        let signer: Arc<dyn Signer> = Arc::new(
            |_: &str, _: &str, _: &str, _: u64, _: &str| -> Result<String, ExchangeError> {
                Ok("sig".to_string())
            },
        );
        assert!(client(None)
            .with_auth(credentials.clone(), signer.clone())
            .is_err());

        let auth = RestAuth::Query {
            api_key: "api_key",
            nonce: "nonce",
            signature: "sign",
        };
        let client = client(Some(auth)).with_auth(credentials, signer).unwrap();
        let params = Params::from([(ParamName::Symbol, ParamValue::from("ltc_btc"))]);
        client.request(Endpoint::Trade, &params).await;

        let requests = client.transport.requests.lock().unwrap();
        let names: Vec<&str> = requests[0].query.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, ["symbol", "api_key", "nonce", "sign"]);
        assert_eq!(requests[0].query[3].1, "sig");
    }
}
