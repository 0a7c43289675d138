/// Average True Range (ATR) indicator
///
/// Measures market volatility by averaging true ranges over a period.
/// True Range is the greatest of:
/// - Current High - Current Low
/// - Abs(Current High - Previous Close)
/// - Abs(Current Low - Previous Close)
///
/// The first kline has no previous close, so its true range is High - Low.
/// ATR here is the plain rolling mean of true ranges.
use crate::models::Kline;

pub fn true_range(current: &Kline, previous: Option<&Kline>) -> f64 {
    let range = current.high - current.low;
    match previous {
        Some(prev) => range
            .max((current.high - prev.close).abs())
            .max((current.low - prev.close).abs()),
        None => range,
    }
}

/// True range for every kline
pub fn true_ranges(klines: &[Kline]) -> Vec<f64> {
    klines
        .iter()
        .enumerate()
        .map(|(i, k)| true_range(k, i.checked_sub(1).map(|p| &klines[p])))
        .collect()
}

/// ATR aligned with `klines`; None until `period` true ranges exist
pub fn atr_series(klines: &[Kline], period: usize) -> Vec<Option<f64>> {
    let trs = true_ranges(klines);
    let mut series = vec![None; trs.len()];
    if period == 0 || trs.len() < period {
        return series;
    }

    let mut window_sum: f64 = trs[..period].iter().sum();
    series[period - 1] = Some(window_sum / period as f64);

    for i in period..trs.len() {
        window_sum += trs[i] - trs[i - period];
        series[i] = Some(window_sum / period as f64);
    }

    series
}
