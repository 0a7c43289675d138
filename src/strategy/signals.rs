use crate::indicators::{adx_series, atr_series, ema_series, rsi_series, smma_series};
use crate::models::{Candle, Kline};

/// Indicator lengths and thresholds of the trend-following entry rules
#[derive(Debug, Clone)]
pub struct SignalConfig {
    pub ema_short_period: usize,
    pub ema_mid_period: usize,
    pub ema_long_period: usize,
    pub smma_period: usize,
    pub adx_period: usize,
    pub adx_threshold: f64,
    pub atr_period: usize,
    pub rsi_period: usize,
    /// Longs are skipped at or above this RSI
    pub rsi_long_max: f64,
    /// Shorts are skipped at or below this RSI
    pub rsi_short_min: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            ema_short_period: 9,
            ema_mid_period: 21,
            ema_long_period: 50,
            smma_period: 200,
            adx_period: 14,
            adx_threshold: 20.0,
            atr_period: 14,
            rsi_period: 14,
            rsi_long_max: 75.0,
            rsi_short_min: 20.0,
        }
    }
}

impl SignalConfig {
    /// Candles needed before every indicator on the last closed candle is warm
    ///
    /// # Example
    /// ```
    /// use bracketbot::strategy::signals::SignalConfig;
    ///
    /// let config = SignalConfig::default();
    /// // SMMA200 dominates; one more for the forming candle
    /// assert_eq!(config.min_candles_required(), 201);
    /// ```
    pub fn min_candles_required(&self) -> usize {
        let longest = [
            self.ema_short_period,
            self.ema_mid_period + 1, // crossover looks one candle back
            self.ema_long_period,
            self.smma_period,
            2 * self.adx_period,
            self.atr_period,
            self.rsi_period + 1,
        ]
        .into_iter()
        .max()
        .unwrap_or(0);

        longest + 1
    }
}

/// Indicator values a rule needs; None if any is still warming up
struct Readings {
    close: f64,
    ema_short: f64,
    ema_mid: f64,
    ema_long: f64,
    smma: f64,
    adx: f64,
    rsi: f64,
}

impl Readings {
    fn from_candle(candle: &Candle) -> Option<Self> {
        Some(Self {
            close: candle.close,
            ema_short: candle.ema_short?,
            ema_mid: candle.ema_mid?,
            ema_long: candle.ema_long?,
            smma: candle.smma200?,
            adx: candle.adx?,
            rsi: candle.rsi?,
        })
    }
}

fn crossed_above(previous: &Candle, current: &Readings) -> bool {
    match (previous.ema_short, previous.ema_mid) {
        (Some(short), Some(mid)) => current.ema_short > current.ema_mid && short < mid,
        _ => false,
    }
}

fn crossed_below(previous: &Candle, current: &Readings) -> bool {
    match (previous.ema_short, previous.ema_mid) {
        (Some(short), Some(mid)) => current.ema_short < current.ema_mid && short > mid,
        _ => false,
    }
}

/// Trend up (everything above the SMMA, EMAs stacked), short EMA just crossed
/// above the mid EMA, trend strong and RSI not overbought
pub fn is_long_entry(previous: &Candle, current: &Candle, config: &SignalConfig) -> bool {
    let Some(r) = Readings::from_candle(current) else {
        return false;
    };

    r.close > r.smma
        && r.ema_short > r.smma
        && r.ema_mid > r.smma
        && r.rsi < config.rsi_long_max
        && r.ema_mid > r.ema_long
        && crossed_above(previous, &r)
        && r.adx > config.adx_threshold
        && r.ema_long > r.smma
}

/// Mirror of [`is_long_entry`]
pub fn is_short_entry(previous: &Candle, current: &Candle, config: &SignalConfig) -> bool {
    let Some(r) = Readings::from_candle(current) else {
        return false;
    };

    r.close < r.smma
        && r.ema_short < r.smma
        && r.ema_mid < r.smma
        && r.rsi > config.rsi_short_min
        && r.ema_mid < r.ema_long
        && crossed_below(previous, &r)
        && r.adx > config.adx_threshold
        && r.ema_long < r.smma
}

/// Attach indicator columns and entry flags to raw klines
///
/// Output has one candle per kline, in the same order. The first candle
/// never signals since crossovers need a predecessor.
pub fn augment_klines(klines: &[Kline], config: &SignalConfig) -> Vec<Candle> {
    let closes: Vec<f64> = klines.iter().map(|k| k.close).collect();

    let ema_short = ema_series(&closes, config.ema_short_period);
    let ema_mid = ema_series(&closes, config.ema_mid_period);
    let ema_long = ema_series(&closes, config.ema_long_period);
    let smma = smma_series(&closes, config.smma_period);
    let adx = adx_series(klines, config.adx_period);
    let atr = atr_series(klines, config.atr_period);
    let rsi = rsi_series(&closes, config.rsi_period);

    let mut candles: Vec<Candle> = klines
        .iter()
        .enumerate()
        .map(|(i, kline)| Candle {
            ema_short: ema_short[i],
            ema_mid: ema_mid[i],
            ema_long: ema_long[i],
            smma200: smma[i],
            adx: adx[i],
            atr: atr[i],
            rsi: rsi[i],
            ..Candle::from_kline(kline)
        })
        .collect();

    for i in 1..candles.len() {
        let long_signal = is_long_entry(&candles[i - 1], &candles[i], config);
        let short_signal = is_short_entry(&candles[i - 1], &candles[i], config);
        candles[i].long_signal = long_signal;
        candles[i].short_signal = short_signal;
    }

    candles
}
