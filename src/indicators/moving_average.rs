/// Exponentially weighted mean over the whole history, normalized by the
/// sum of the weights (`adjust=True` weighting): the weight of the value
/// `k` steps back is `(1 - alpha)^k`, so early values are not dominated
/// by an arbitrary seed.
///
/// Output is aligned with the input; the first `min_periods - 1` entries
/// are None.
fn weighted_series(values: &[f64], alpha: f64, min_periods: usize) -> Vec<Option<f64>> {
    let mut series = vec![None; values.len()];
    if min_periods == 0 || values.len() < min_periods {
        return series;
    }

    let decay = 1.0 - alpha;
    let mut numerator = 0.0;
    let mut denominator = 0.0;

    for (i, value) in values.iter().enumerate() {
        numerator = value + decay * numerator;
        denominator = 1.0 + decay * denominator;
        if i + 1 >= min_periods {
            series[i] = Some(numerator / denominator);
        }
    }

    series
}

/// Exponential Moving Average (EMA) for every position of `prices`
pub fn ema_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    weighted_series(prices, 2.0 / (period as f64 + 1.0), period)
}

/// Smoothed Moving Average (SMMA), alpha `1 / period`; used for SMMA200 and RSI
pub fn smma_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }
    weighted_series(values, 1.0 / period as f64, period)
}

/// Wilder's smoothing seeded with the mean of the first `period` values
pub fn wilder_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut series = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return series;
    }

    let n = period as f64;
    let mut current = values[..period].iter().sum::<f64>() / n;
    series[period - 1] = Some(current);

    for (i, value) in values.iter().enumerate().skip(period) {
        current = (current * (n - 1.0) + value) / n;
        series[i] = Some(current);
    }

    series
}
