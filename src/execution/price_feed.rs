use crate::api::FuturesExchange;
use crate::models::Candle;
use crate::strategy::{augment_klines, SignalConfig};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Market data adapter: candles with indicator columns and entry flags,
/// oldest first. The last candle is the one still forming.
#[async_trait]
pub trait CandleFeed: Send + Sync {
    async fn fetch_candles(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Candle>>;
}

/// Fetches klines from the exchange and computes indicators locally
pub struct IndicatorFeed {
    exchange: Arc<dyn FuturesExchange>,
    config: SignalConfig,
}

impl IndicatorFeed {
    pub fn new(exchange: Arc<dyn FuturesExchange>, config: SignalConfig) -> Self {
        Self { exchange, config }
    }
}

#[async_trait]
impl CandleFeed for IndicatorFeed {
    async fn fetch_candles(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Candle>> {
        let klines = self.exchange.klines(symbol, timeframe, limit).await?;

        if klines.len() < self.config.min_candles_required() {
            // Newly listed symbols; entries simply stay off until history builds up
            tracing::debug!(
                symbol,
                timeframe,
                "Only {} klines, {} needed for warm indicators",
                klines.len(),
                self.config.min_candles_required()
            );
        }

        Ok(augment_klines(&klines, &self.config))
    }
}
