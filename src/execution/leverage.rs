use crate::api::{FuturesExchange, LeverageTier};
use crate::error::TradeError;
use crate::Result;

/// Set the account leverage for `symbol` to the highest tier the exchange
/// offers and return that tier; its notional cap bounds the entry size.
///
/// Called before every entry decision; tiers are never cached.
pub async fn sync_leverage(exchange: &dyn FuturesExchange, symbol: &str) -> Result<LeverageTier> {
    let tiers = exchange.leverage_tiers(symbol).await?;

    let tier = tiers
        .into_iter()
        .filter(|tier| tier.initial_leverage > 0)
        .max_by(|a, b| {
            a.initial_leverage
                .cmp(&b.initial_leverage)
                .then(a.notional_cap.total_cmp(&b.notional_cap))
        })
        .ok_or_else(|| TradeError::Exchange {
            code: 0,
            message: format!("no leverage brackets for {}", symbol),
        })?;

    exchange.set_leverage(symbol, tier.initial_leverage).await?;
    tracing::debug!(
        symbol,
        bracket = tier.bracket,
        leverage = tier.initial_leverage,
        notional_cap = tier.notional_cap,
        "Leverage synchronized"
    );

    Ok(tier)
}
