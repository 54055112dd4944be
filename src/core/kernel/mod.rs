/// Transport and signing boundaries shared by every exchange adapter.
///
/// The kernel contains no exchange-specific logic. It defines:
///
/// - `HttpTransport`: one HTTP call in, status plus JSON payload out
///   (`ReqwestTransport` by default)
/// - `WsTransport`: one WebSocket connection carrying JSON frames
///   (`TungsteniteWs` by default, decoding through a `WsCodec`)
/// - `Signer`: the pluggable signature function, plus helpers placing the
///   signed fields into headers or query parameters
///
/// Both transports are traits so that clients can be driven by in-memory
/// doubles in tests.
///
/// ```rust,no_run
/// use hyperfeed::core::kernel::*;
///
/// # fn example() -> Result<(), hyperfeed::core::errors::ExchangeError> {
/// let config = RestClientConfig::new("okex".to_string()).with_timeout(10);
/// let transport = ReqwestTransport::new(&config)?;
/// let ws = TungsteniteWs::new("okex".to_string(), &WsConfig::default());
/// # let _ = (transport, ws);
/// # Ok(())
/// # }
/// ```
pub mod codec;
pub mod rest;
pub mod signer;
pub mod ws;

pub use codec::{JsonCodec, WsCodec};
pub use rest::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, RestClientConfig};
pub use signer::{sign_rest_request, sign_ws_handshake, RestAuth, SignedParts, Signer, WsAuth};
pub use ws::{TungsteniteWs, WsConfig, WsTransport};
