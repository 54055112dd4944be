use crate::core::converter::Converter;
use crate::core::kernel::signer::RestAuth;
use crate::core::types::{ApiError, Endpoint, ParamValue, Params, Parsed, Platform};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// REST-only adapter data
#[derive(Debug, Clone, Default)]
pub struct RestSettings {
    /// Server-side page size ceiling per endpoint
    pub max_limit_by_endpoint: HashMap<Endpoint, u32>,
    /// Cursor used to start a history walk when the caller gives none
    pub default_from_item: Option<ParamValue>,
    /// Placement of signed fields for authenticated requests
    pub auth: Option<RestAuth>,
}

/// Converter specialization driving a `RestClient`.
///
/// Page-size ceilings are only consulted here; the client enforces them.
#[derive(Debug, Clone)]
pub struct RestConverter {
    converter: Converter,
    settings: Arc<RestSettings>,
}

impl RestConverter {
    pub fn new(converter: Converter, settings: RestSettings) -> Self {
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

    pub fn base_url(&self) -> String {
        self.converter.base_url()
    }

    pub fn max_limit(&self, endpoint: Endpoint) -> Option<u32> {
        self.settings.max_limit_by_endpoint.get(&endpoint).copied()
    }

    pub fn default_from_item(&self) -> Option<&ParamValue> {
        self.settings.default_from_item.as_ref()
    }

    pub fn auth(&self) -> Option<&RestAuth> {
        self.settings.auth.as_ref()
    }

    /// Full request URL and query for a canonical call against `base_url`
    pub fn prepare_request(
        &self,
        base_url: &str,
        endpoint: Endpoint,
        params: &Params,
    ) -> Result<(String, Vec<(String, String)>), ApiError> {
        let (path, query) = self.converter.prepare_params(endpoint, params)?;
        Ok((format!("{}{}", base_url, path), query))
    }

    pub fn parse(&self, endpoint: Endpoint, payload: &Value) -> Parsed {
        self.converter.parse(endpoint, payload)
    }

    pub fn parse_error(&self, payload: Option<&Value>, http_status: Option<u16>) -> ApiError {
        self.converter.parse_error(payload, http_status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::converter::ConverterConfig;
    use crate::core::types::ParamName;

    fn rest_converter() -> RestConverter {
        let config = ConverterConfig {
            endpoint_lookup: HashMap::from([(Endpoint::TradeHistory, "trades.do")]),
            ..ConverterConfig::new(Platform::Okex, "https://www.okex.com/api/v{version}/")
        };
        RestConverter::new(
            Converter::new(config, "1"),
            RestSettings {
                max_limit_by_endpoint: HashMap::from([(Endpoint::TradeHistory, 600)]),
                default_from_item: Some(ParamValue::Int(0)),
                auth: None,
            },
        )
    }

    #[test]
    fn test_prepare_request_builds_absolute_url() {
        let params = Params::from([(ParamName::Symbol, ParamValue::from("ltc_btc"))]);
        let converter = rest_converter();
        let (url, query) = converter
            .prepare_request(&converter.base_url(), Endpoint::TradeHistory, &params)
            .unwrap();

        assert_eq!(url, "https://www.okex.com/api/v1/trades.do");
        assert_eq!(query, vec![("symbol".to_string(), "ltc_btc".to_string())]);
    }

    #[test]
    fn test_limits_and_seed() {
        let converter = rest_converter();
        assert_eq!(converter.max_limit(Endpoint::TradeHistory), Some(600));
        assert_eq!(converter.max_limit(Endpoint::Candle), None);
        assert_eq!(converter.default_from_item(), Some(&ParamValue::Int(0)));
    }
}
