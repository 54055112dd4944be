//! OKEx adapter: lookup tables, post-processing hooks and the request signer.
//!
//! Only API version `1` is described. REST covers recent trades, trade
//! history and candles; the stream covers trades.

pub mod builder;
pub mod rest;
pub mod signer;
pub mod ws;

pub use builder::{
    build_rest_client, build_rest_client_with_transport, build_ws_client,
    build_ws_client_with_transport,
};
pub use rest::rest_converter;
pub use signer::OkexSigner;
pub use ws::ws_converter;

pub const EXCHANGE_NAME: &str = "okex";
pub const DEFAULT_VERSION: &str = "1";
