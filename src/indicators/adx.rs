/// Average Directional Index (ADX) - Measures trend strength
///
/// ADX ranges from 0 to 100:
/// - ADX > 25: Strong trend (bull or bear)
/// - ADX 20-25: Moderate trend
/// - ADX < 20: Weak trend / choppy / ranging market
///
/// TR, +DM and -DM are Wilder-smoothed into +DI/-DI, and ADX is the
/// Wilder-smoothed DX, so the first value needs `2 * period` klines.
use super::atr::true_range;
use super::moving_average::wilder_series;
use crate::models::Kline;

/// ADX aligned with `klines`; None during warm-up
pub fn adx_series(klines: &[Kline], period: usize) -> Vec<Option<f64>> {
    let mut series = vec![None; klines.len()];
    if period == 0 || klines.len() < 2 * period {
        return series;
    }

    // Step 1: True Range and Directional Movement for each kline after the first
    let mut true_ranges = Vec::with_capacity(klines.len() - 1);
    let mut plus_dms = Vec::with_capacity(klines.len() - 1);
    let mut minus_dms = Vec::with_capacity(klines.len() - 1);

    for pair in klines.windows(2) {
        let (prev, current) = (&pair[0], &pair[1]);
        true_ranges.push(true_range(current, Some(prev)));

        let up_move = current.high - prev.high;
        let down_move = prev.low - current.low;

        plus_dms.push(if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        });
        minus_dms.push(if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        });
    }

    // Step 2: Wilder smoothing
    let smoothed_tr = wilder_series(&true_ranges, period);
    let smoothed_plus_dm = wilder_series(&plus_dms, period);
    let smoothed_minus_dm = wilder_series(&minus_dms, period);

    // Step 3: DX from +DI / -DI
    let dx: Vec<f64> = smoothed_tr
        .iter()
        .zip(smoothed_plus_dm.iter().zip(smoothed_minus_dm.iter()))
        .filter_map(|(tr, (plus, minus))| match (tr, plus, minus) {
            (Some(tr), Some(plus), Some(minus)) => Some(directional_index(*tr, *plus, *minus)),
            _ => None,
        })
        .collect();

    // Step 4: ADX is the smoothed DX; first DX belongs to kline `period`
    for (k, adx) in wilder_series(&dx, period).into_iter().enumerate() {
        series[period + k] = adx;
    }

    series
}

fn directional_index(smoothed_tr: f64, smoothed_plus_dm: f64, smoothed_minus_dm: f64) -> f64 {
    if smoothed_tr <= 0.0 {
        return 0.0;
    }

    let plus_di = (smoothed_plus_dm / smoothed_tr) * 100.0;
    let minus_di = (smoothed_minus_dm / smoothed_tr) * 100.0;

    let di_sum = plus_di + minus_di;
    if di_sum > 0.0 {
        ((plus_di - minus_di).abs() / di_sum) * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::atr::tests::create_test_klines;

    fn trending(count: usize, step: f64) -> Vec<Kline> {
        let prices: Vec<(f64, f64, f64, f64)> = (0..count)
            .map(|i| {
                let base = 100.0 + step * i as f64;
                (base, base + 2.0, base - 1.0, base + 1.0)
            })
            .collect();
        create_test_klines(&prices)
    }

    #[test]
    fn test_adx_strong_uptrend() {
        let series = adx_series(&trending(30, 3.0), 14);
        let adx = series.last().copied().flatten().unwrap();

        assert!(adx > 99.0, "steady uptrend should max out ADX, got {:.2}", adx);
    }

    #[test]
    fn test_adx_strong_downtrend() {
        let series = adx_series(&trending(30, -3.0), 14);
        let adx = series.last().copied().flatten().unwrap();

        assert!(adx > 99.0, "ADX measures strength, not direction, got {:.2}", adx);
    }

    #[test]
    fn test_adx_flat_market() {
        let klines = create_test_klines(&[(100.0, 101.0, 99.0, 100.0); 30]);
        let adx = adx_series(&klines, 14).last().copied().flatten().unwrap();

        assert_eq!(adx, 0.0);
    }

    #[test]
    fn test_adx_warm_up() {
        let series = adx_series(&trending(28, 1.0), 14);

        assert!(series[26].is_none());
        assert!(series[27].is_some());
        assert!(adx_series(&trending(27, 1.0), 14).iter().all(Option::is_none));
    }
}
