use hyperfeed::exchanges::okex;
use hyperfeed::{Endpoint, ExchangeConfig, HistoryQuery, MarketDataSource, WsEvent};
use std::time::Duration;
use tracing::{info, warn, Level};

const SYMBOL: &str = "ltc_btc";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let config = ExchangeConfig::from_env("OKEX")?;
    let client = okex::build_rest_client(config.clone())?;

    let trades = client.fetch_trades(SYMBOL, Some(10)).await?;
    for trade in &trades {
        info!(
            "{} {} {} @ {} ({})",
            trade.timestamp, trade.direction, trade.amount, trade.price, trade.item_id
        );
    }

    let history = client
        .fetch_trades_history(HistoryQuery::new(Endpoint::TradeHistory, SYMBOL).with_limit(50))
        .await;
    info!(fetched = history.items.len(), "Trade history");
    if let Some(error) = history.error {
        warn!("History stopped early: {}", error);
    }

    let (mut stream, mut events) = okex::build_ws_client(config, Default::default())?;
    stream.connect().await?;
    stream.subscribe(Endpoint::Trade, &[SYMBOL]).await?;

    let deadline = tokio::time::sleep(Duration::from_secs(30));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(WsEvent::Data(entity)) => info!(?entity, "Stream"),
                Some(WsEvent::Error(error)) => warn!("Stream error: {}", error),
                None => break,
            },
            _ = &mut deadline => break,
        }
    }

    stream.close().await?;
    Ok(())
}
