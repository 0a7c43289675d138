use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw OHLCV kline as returned by the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Kline augmented with indicator columns and entry signals.
///
/// Indicator fields are None while the indicator is still warming up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub ema_short: Option<f64>,
    pub ema_mid: Option<f64>,
    pub ema_long: Option<f64>,
    pub smma200: Option<f64>,
    pub adx: Option<f64>,
    pub atr: Option<f64>,
    pub rsi: Option<f64>,
    pub long_signal: bool,
    pub short_signal: bool,
}

impl Candle {
    /// Candle with no indicator values and no signals
    pub fn from_kline(kline: &Kline) -> Self {
        Self {
            timestamp: kline.open_time,
            open: kline.open,
            high: kline.high,
            low: kline.low,
            close: kline.close,
            volume: kline.volume,
            ema_short: None,
            ema_mid: None,
            ema_long: None,
            smma200: None,
            adx: None,
            atr: None,
            rsi: None,
            long_signal: false,
            short_signal: false,
        }
    }

    /// Direction this candle signals, long taking precedence
    pub fn signal(&self) -> Option<Direction> {
        if self.long_signal {
            Some(Direction::Long)
        } else if self.short_signal {
            Some(Direction::Short)
        } else {
            None
        }
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Side of the entry order
    pub fn entry_side(&self) -> OrderSide {
        match self {
            Direction::Long => OrderSide::Buy,
            Direction::Short => OrderSide::Sell,
        }
    }

    /// Side of the protective (closing) orders
    pub fn exit_side(&self) -> OrderSide {
        match self {
            Direction::Long => OrderSide::Sell,
            Direction::Short => OrderSide::Buy,
        }
    }

    /// +1 for long, -1 for short
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

/// Take-profit / stop-loss multipliers for one (symbol, timeframe) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeParameter {
    pub symbol: String,
    pub timeframe: String,
    pub tp_multiplier: f64,
    pub sl_multiplier: f64,
}

impl TradeParameter {
    /// Multipliers must be finite and strictly positive, otherwise the
    /// direction-dependent price math no longer holds
    pub fn is_valid(&self) -> bool {
        !self.symbol.is_empty()
            && !self.timeframe.is_empty()
            && self.tp_multiplier.is_finite()
            && self.sl_multiplier.is_finite()
            && self.tp_multiplier > 0.0
            && self.sl_multiplier > 0.0
    }
}

/// Sized entry derived from one signal. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionIntent {
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_price: f64,
    pub take_profit_price: f64,
    pub size: f64,
}

/// Open contracts for a symbol as reported by the exchange
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSnapshot {
    pub symbol: String,
    /// Signed amount, negative when short
    pub amount: f64,
}

impl PositionSnapshot {
    pub fn contracts(&self) -> f64 {
        self.amount.abs()
    }

    pub fn is_flat(&self) -> bool {
        self.contracts() == 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kline() -> Kline {
        Kline {
            open_time: Utc::now(),
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 10.0,
        }
    }

    #[test]
    fn test_candle_from_kline_has_no_signal() {
        let candle = Candle::from_kline(&kline());

        assert_eq!(candle.close, 100.5);
        assert!(candle.atr.is_none());
        assert_eq!(candle.signal(), None);
    }

    #[test]
    fn test_long_signal_takes_precedence() {
        let mut candle = Candle::from_kline(&kline());
        candle.long_signal = true;
        candle.short_signal = true;

        assert_eq!(candle.signal(), Some(Direction::Long));
    }

    #[test]
    fn test_direction_sides() {
        assert_eq!(Direction::Long.entry_side(), OrderSide::Buy);
        assert_eq!(Direction::Long.exit_side(), OrderSide::Sell);
        assert_eq!(Direction::Short.entry_side(), OrderSide::Sell);
        assert_eq!(Direction::Short.exit_side(), OrderSide::Buy);
    }

    #[test]
    fn test_trade_parameter_validation() {
        let mut param = TradeParameter {
            symbol: "BTCUSDT".to_string(),
            timeframe: "15m".to_string(),
            tp_multiplier: 7.0,
            sl_multiplier: 4.0,
        };
        assert!(param.is_valid());

        param.sl_multiplier = 0.0;
        assert!(!param.is_valid());

        param.sl_multiplier = f64::NAN;
        assert!(!param.is_valid());
    }

    #[test]
    fn test_position_snapshot_short_counts_contracts() {
        let position = PositionSnapshot {
            symbol: "ETHUSDT".to_string(),
            amount: -0.5,
        };

        assert_eq!(position.contracts(), 0.5);
        assert!(!position.is_flat());
    }
}
