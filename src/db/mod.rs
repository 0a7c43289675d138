// Read-only access to the optimizer's trade-parameter table
pub mod postgres;

pub use postgres::PostgresParameterStore;

use crate::models::TradeParameter;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashSet;

/// Source of the active (symbol, timeframe) -> multiplier table.
///
/// An empty table is a valid answer and means "no trading".
#[async_trait]
pub trait ParameterStore: Send + Sync {
    async fn active_parameters(&self) -> Result<Vec<TradeParameter>>;
}

/// Drop unusable rows and duplicate (symbol, timeframe) keys.
///
/// Rows are expected most-recent first per key, so the first one wins.
/// The result is sorted by symbol, then timeframe.
pub fn sanitize_parameters(rows: Vec<TradeParameter>) -> Vec<TradeParameter> {
    let mut seen = HashSet::new();
    let mut active = Vec::with_capacity(rows.len());

    for row in rows {
        if !row.is_valid() {
            tracing::warn!(
                symbol = %row.symbol,
                timeframe = %row.timeframe,
                tp = row.tp_multiplier,
                sl = row.sl_multiplier,
                "Skipping invalid parameter row"
            );
            continue;
        }
        if !seen.insert((row.symbol.clone(), row.timeframe.clone())) {
            tracing::debug!(symbol = %row.symbol, timeframe = %row.timeframe, "Skipping older duplicate row");
            continue;
        }
        active.push(row);
    }

    active.sort_by(|a, b| {
        a.symbol
            .cmp(&b.symbol)
            .then_with(|| a.timeframe.cmp(&b.timeframe))
    });
    active
}
