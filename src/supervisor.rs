use crate::api::FuturesExchange;
use crate::config::TradingSettings;
use crate::db::ParameterStore;
use crate::error::TradeError;
use crate::execution::{CandleFeed, SymbolTrader};
use crate::models::TradeParameter;
use crate::risk::RoundingTable;
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Reloads the parameter table once per refresh interval and runs one
/// execution loop per row until the next refresh or a fatal error.
pub struct Supervisor {
    exchange: Arc<dyn FuturesExchange>,
    feed: Arc<dyn CandleFeed>,
    store: Arc<dyn ParameterStore>,
    rounding: RoundingTable,
    settings: TradingSettings,
}

impl Supervisor {
    pub fn new(
        exchange: Arc<dyn FuturesExchange>,
        feed: Arc<dyn CandleFeed>,
        store: Arc<dyn ParameterStore>,
        rounding: RoundingTable,
        settings: TradingSettings,
    ) -> Self {
        Self {
            exchange,
            feed,
            store,
            rounding,
            settings,
        }
    }

    /// Run until a fatal error
    pub async fn run(&self) -> Result<()> {
        loop {
            let parameters = match self.store.active_parameters().await {
                Ok(parameters) => parameters,
                Err(e) if e.is_network() => {
                    tracing::warn!(
                        kind = e.kind().as_str(),
                        error = %e,
                        "Parameter store unreachable, retrying in {}s",
                        self.settings.network_backoff_secs
                    );
                    tokio::time::sleep(self.settings.network_backoff()).await;
                    continue;
                }
                Err(e) => {
                    tracing::error!(kind = e.kind().as_str(), error = %e, "❌ Failed to load trade parameters");
                    return Err(e);
                }
            };

            self.run_cycle(parameters).await?;
        }
    }

    /// One refresh interval: spawn the cohort, then wait for the boundary or
    /// the first fatal error. The cohort is aborted either way.
    pub async fn run_cycle(&self, parameters: Vec<TradeParameter>) -> Result<()> {
        let refresh = self.settings.refresh_interval();

        if parameters.is_empty() {
            tracing::info!(
                "📭 No trade parameters, no trading for the next {}s",
                refresh.as_secs()
            );
            tokio::time::sleep(refresh).await;
            return Ok(());
        }

        warn_on_shared_symbols(&parameters);

        let mut cohort = JoinSet::new();
        for parameter in parameters {
            let profile = self.rounding.profile(&parameter.symbol);
            let trader = SymbolTrader::new(
                self.exchange.clone(),
                self.feed.clone(),
                parameter,
                profile,
                self.settings.clone(),
            );
            cohort.spawn(trader.run());
        }

        tracing::info!("Started {} execution loops", cohort.len());

        let boundary = tokio::time::sleep(refresh);
        tokio::pin!(boundary);

        loop {
            tokio::select! {
                _ = &mut boundary => {
                    tracing::info!("🔄 Refresh boundary reached, replacing {} loops", cohort.len());
                    cohort.shutdown().await;
                    return Ok(());
                }
                joined = cohort.join_next() => match joined {
                    Some(Ok(Ok(()))) => continue,
                    Some(Ok(Err(e))) => {
                        tracing::error!(kind = e.kind().as_str(), error = %e, "❌ Execution loop failed, halting all loops");
                        cohort.shutdown().await;
                        return Err(e);
                    }
                    Some(Err(join_error)) => {
                        tracing::error!(error = %join_error, "❌ Execution loop panicked, halting all loops");
                        cohort.shutdown().await;
                        return Err(TradeError::Task(join_error.to_string()));
                    }
                    None => {
                        // Every loop ended cleanly; hold until the boundary
                        (&mut boundary).await;
                        return Ok(());
                    }
                },
            }
        }
    }
}

/// Loops on the same symbol share one exchange position
fn warn_on_shared_symbols(parameters: &[TradeParameter]) {
    let mut timeframes: HashMap<&str, Vec<&str>> = HashMap::new();
    for parameter in parameters {
        timeframes
            .entry(parameter.symbol.as_str())
            .or_default()
            .push(parameter.timeframe.as_str());
    }

    for (symbol, frames) in timeframes.iter().filter(|(_, frames)| frames.len() > 1) {
        tracing::warn!(
            symbol,
            timeframes = %frames.join(","),
            "Symbol traded on several timeframes; loops share its position"
        );
    }
}
