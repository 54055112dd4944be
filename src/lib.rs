//! Canonical market data across cryptocurrency exchanges.
//!
//! Callers speak one request protocol (`fetch_trades`, `fetch_trades_history`,
//! `fetch_candles`, `fetch_history`, `subscribe`/`unsubscribe`) and receive one
//! data model (`Trade`, `Candle`, `ApiError`). Per-exchange differences live in
//! adapter tables under [`exchanges`].

pub mod core;
pub mod exchanges;

pub use crate::core::{
    config::{Credentials, ExchangeConfig},
    errors::ExchangeError,
    rest_client::{HistoryQuery, RestClient},
    traits::MarketDataSource,
    types::*,
    ws_client::{WsClient, WsEvent, WsState},
};
