use crate::core::config::ExchangeConfig;
use crate::core::errors::ExchangeError;
use crate::core::kernel::{
    HttpTransport, ReqwestTransport, RestClientConfig, TungsteniteWs, WsConfig, WsTransport,
};
use crate::core::rest_client::RestClient;
use crate::core::ws_client::{WsClient, WsEvent};
use crate::exchanges::okex::signer::OkexSigner;
use crate::exchanges::okex::{rest_converter, ws_converter, DEFAULT_VERSION, EXCHANGE_NAME};
use std::sync::Arc;
use tokio::sync::mpsc;

fn version(config: &ExchangeConfig) -> &str {
    config.version.as_deref().unwrap_or(DEFAULT_VERSION)
}

/// Create an OKEx REST client over reqwest
pub fn build_rest_client(config: ExchangeConfig) -> Result<RestClient, ExchangeError> {
    let rest_config = RestClientConfig::new(EXCHANGE_NAME.to_string());
    let transport = ReqwestTransport::new(&rest_config)?;
    build_rest_client_with_transport(config, transport, rest_config)
}

/// Create an OKEx REST client over any transport; signs requests when the
/// config carries credentials
pub fn build_rest_client_with_transport<T: HttpTransport>(
    config: ExchangeConfig,
    transport: T,
    rest_config: RestClientConfig,
) -> Result<RestClient<T>, ExchangeError> {
    let converter = rest_converter(version(&config))?;
    let mut client = RestClient::new(converter, transport, rest_config);

    if let Some(base_url) = config.base_url.clone() {
        client = client.with_base_url(base_url);
    }
    if let Some(credentials) = config.credentials() {
        client = client.with_auth(credentials, Arc::new(OkexSigner))?;
    }
    Ok(client)
}

/// Spawn an OKEx WebSocket client over tokio-tungstenite
pub fn build_ws_client(
    config: ExchangeConfig,
    ws_config: WsConfig,
) -> Result<(WsClient, mpsc::Receiver<WsEvent>), ExchangeError> {
    let transport = TungsteniteWs::new(EXCHANGE_NAME.to_string(), &ws_config);
    build_ws_client_with_transport(config, transport, ws_config)
}

/// Spawn an OKEx WebSocket client over any transport
pub fn build_ws_client_with_transport<T: WsTransport>(
    config: ExchangeConfig,
    transport: T,
    ws_config: WsConfig,
) -> Result<(WsClient, mpsc::Receiver<WsEvent>), ExchangeError> {
    let converter = ws_converter(version(&config))?;
    let mut builder = WsClient::builder(converter, transport).with_config(ws_config);

    if let Some(ws_url) = config.ws_url.clone() {
        builder = builder.with_url(ws_url);
    }
    if let Some(credentials) = config.credentials() {
        builder = builder.with_auth(credentials, Arc::new(OkexSigner));
    }
    Ok(builder.spawn())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rest_client_defaults() {
        let client = build_rest_client(ExchangeConfig::read_only()).unwrap();
        assert_eq!(client.base_url(), "https://www.okex.com/api/v1/");
        assert!(!client.is_authenticated());
    }

    #[test]
    fn test_rest_client_with_credentials_and_override() {
        let config = ExchangeConfig::new("key".to_string(), "secret".to_string())
            .base_url("http://localhost:8080/api/v1/".to_string());
        let client = build_rest_client(config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080/api/v1/");
        assert!(client.is_authenticated());
    }

    #[test]
    fn test_unsupported_version() {
        let config = ExchangeConfig::read_only().version("3");
        assert!(build_rest_client(config).is_err());
    }
}
