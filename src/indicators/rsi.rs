use super::moving_average::smma_series;

/// Relative Strength Index (RSI) for every position of `prices`
///
/// RSI measures the magnitude of recent price changes to evaluate
/// overbought or oversold conditions. Average gain and loss are SMMAs of the
/// per-candle changes; the first value appears once `period` changes exist.
///
/// Values:
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
pub fn rsi_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut series = vec![None; prices.len()];
    if period == 0 || prices.len() < period + 1 {
        return series;
    }

    let changes: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
    let gains: Vec<f64> = changes.iter().map(|c| c.max(0.0)).collect();
    let losses: Vec<f64> = changes.iter().map(|c| (-c).max(0.0)).collect();

    let avg_gains = smma_series(&gains, period);
    let avg_losses = smma_series(&losses, period);

    // change j ends at price j + 1
    for (j, (gain, loss)) in avg_gains.iter().zip(avg_losses.iter()).enumerate() {
        if let (Some(gain), Some(loss)) = (gain, loss) {
            series[j + 1] = Some(rsi_value(*gain, *loss));
        }
    }

    series
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }

    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}
