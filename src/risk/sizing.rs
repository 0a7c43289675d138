/// Risk-based order sizing
///
/// Turns a signal into a concrete bracket: stop and take-profit prices are
/// ATR multiples away from the entry, and the size is chosen so that a stop
/// fill loses a fixed fraction of the account balance.
use super::rounding::{round_down_dp, round_dp, RoundingProfile};
use crate::error::TradeError;
use crate::models::{Direction, PositionIntent};
use crate::Result;

/// Fraction of free balance risked per trade (1%)
pub const RISK_FRACTION: f64 = 0.01;

#[derive(Debug, Clone, PartialEq)]
pub struct SizingInput {
    pub entry_price: f64,
    pub atr: f64,
    pub balance: f64,
    pub direction: Direction,
    pub tp_multiplier: f64,
    pub sl_multiplier: f64,
}

/// Compute stop, take-profit and the un-normalized size for a signal.
///
/// Short trades flip the sign of both multipliers so a single formula
/// serves both directions:
///   stop        = entry - atr * sl
///   take_profit = entry + atr * tp
///
/// The ATR offsets are rounded to the symbol's price precision before they
/// are applied. The returned `size` is the raw risk-based size; pass the
/// intent through [`normalize_size`] before placing orders.
pub fn compute_order(
    input: &SizingInput,
    profile: RoundingProfile,
    risk_fraction: f64,
) -> Result<PositionIntent> {
    let sign = input.direction.sign();
    let sl_multiplier = input.sl_multiplier * sign;
    let tp_multiplier = input.tp_multiplier * sign;

    let entry_price = round_dp(input.entry_price, profile.price_precision);
    let stop_price = entry_price - round_dp(input.atr * sl_multiplier, profile.price_precision);
    let take_profit_price =
        entry_price + round_dp(input.atr * tp_multiplier, profile.price_precision);

    // Subtraction can reintroduce binary noise (e.g. 0.3 - 0.1)
    let stop_price = round_dp(stop_price, profile.price_precision);
    let take_profit_price = round_dp(take_profit_price, profile.price_precision);

    let distance = (entry_price - stop_price).abs();
    if !distance.is_finite() || distance <= 0.0 {
        return Err(TradeError::InvalidRiskDistance {
            entry_price,
            stop_price,
            distance,
        });
    }

    let risk_amount = input.balance * risk_fraction;
    let size = risk_amount / distance;

    tracing::debug!(
        direction = %input.direction,
        entry_price,
        stop_price,
        take_profit_price,
        distance,
        risk_amount,
        size,
        "Computed raw order size"
    );

    Ok(PositionIntent {
        direction: input.direction,
        entry_price,
        stop_price,
        take_profit_price,
        size,
    })
}

/// Account and exchange limits an order has to fit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeLimits {
    /// Free margin balance
    pub balance: f64,
    pub max_leverage: u32,
    /// Largest position notional the exchange allows at `max_leverage`
    pub notional_cap: f64,
    /// Smallest order notional the exchange accepts
    pub min_notional: f64,
}

// Absorbs float noise in size * price after truncation
const NOTIONAL_TOLERANCE: f64 = 1e-9;

/// Fit a raw intent to the account, the leverage tier and the symbol's lot
/// precision.
///
/// The notional is capped at the smaller of `balance * max_leverage` and the
/// tier's notional cap; a capped size is truncated so it never rounds back
/// above the cap, an uncapped one is rounded half away from zero. Returns
/// None when nothing tradable remains: the size rounds to zero (below one
/// lot step), rounding pushed the notional over the cap, or the notional is
/// under the exchange minimum.
pub fn normalize_size(
    intent: PositionIntent,
    limits: &SizeLimits,
    profile: RoundingProfile,
) -> Option<PositionIntent> {
    if limits.max_leverage == 0
        || !limits.balance.is_finite()
        || limits.balance <= 0.0
        || intent.entry_price <= 0.0
    {
        return None;
    }

    let max_notional = (limits.balance * limits.max_leverage as f64).min(limits.notional_cap);
    let max_size = max_notional / intent.entry_price;

    let size = if intent.size > max_size {
        round_down_dp(max_size, profile.position_precision)
    } else {
        round_dp(intent.size, profile.position_precision)
    };

    if !size.is_finite() || size <= 0.0 {
        tracing::debug!(raw_size = intent.size, max_notional, "Size rounds to zero, skipping signal");
        return None;
    }

    let notional = size * intent.entry_price;
    if notional > max_notional * (1.0 + NOTIONAL_TOLERANCE) {
        tracing::debug!(size, notional, max_notional, "Oversized intent discarded");
        return None;
    }

    if notional < limits.min_notional {
        tracing::debug!(
            size,
            notional,
            min_notional = limits.min_notional,
            "Notional under exchange minimum, skipping signal"
        );
        return None;
    }

    Some(PositionIntent { size, ..intent })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(price_precision: u32, position_precision: u32) -> RoundingProfile {
        RoundingProfile {
            price_precision,
            position_precision,
        }
    }

    fn input(direction: Direction) -> SizingInput {
        SizingInput {
            entry_price: 100.0,
            atr: 2.0,
            balance: 100_000.0,
            direction,
            tp_multiplier: 7.0,
            sl_multiplier: 4.0,
        }
    }

    #[test]
    fn test_long_bracket_prices() {
        let intent = compute_order(&input(Direction::Long), profile(2, 2), RISK_FRACTION).unwrap();

        assert_eq!(intent.stop_price, 92.0);
        assert_eq!(intent.take_profit_price, 114.0);
        assert_eq!((intent.entry_price - intent.stop_price).abs(), 8.0);
    }

    #[test]
    fn test_short_bracket_prices() {
        let intent =
            compute_order(&input(Direction::Short), profile(2, 2), RISK_FRACTION).unwrap();

        assert_eq!(intent.stop_price, 108.0);
        assert_eq!(intent.take_profit_price, 86.0);
    }

    #[test]
    fn test_raw_size_risks_one_percent() {
        // 100000 * 0.01 = 1000 risked over a distance of 8
        let intent = compute_order(&input(Direction::Long), profile(2, 2), RISK_FRACTION).unwrap();
        assert_eq!(intent.size, 125.0);
    }

    #[test]
    fn test_stop_and_target_sides_for_any_positive_atr() {
        for atr in [0.05, 0.5, 1.0, 3.7, 250.0] {
            for direction in [Direction::Long, Direction::Short] {
                let mut sizing = input(direction);
                sizing.atr = atr;
                sizing.entry_price = 1000.0;

                let intent = compute_order(&sizing, profile(2, 3), RISK_FRACTION).unwrap();

                match direction {
                    Direction::Long => {
                        assert!(intent.stop_price < intent.entry_price);
                        assert!(intent.take_profit_price > intent.entry_price);
                    }
                    Direction::Short => {
                        assert!(intent.stop_price > intent.entry_price);
                        assert!(intent.take_profit_price < intent.entry_price);
                    }
                }
            }
        }
    }

    #[test]
    fn test_zero_atr_is_invalid_distance() {
        let mut sizing = input(Direction::Long);
        sizing.atr = 0.0;

        let result = compute_order(&sizing, profile(2, 2), RISK_FRACTION);
        assert!(matches!(
            result,
            Err(TradeError::InvalidRiskDistance { distance, .. }) if distance == 0.0
        ));
    }

    #[test]
    fn test_offset_rounding_to_zero_is_invalid_distance() {
        // 0.004 * 1 rounds to 0.00 at two decimals
        let mut sizing = input(Direction::Short);
        sizing.atr = 0.004;
        sizing.sl_multiplier = 1.0;

        let result = compute_order(&sizing, profile(2, 2), RISK_FRACTION);
        assert!(matches!(result, Err(TradeError::InvalidRiskDistance { .. })));
    }

    #[test]
    fn test_nan_atr_is_invalid_distance() {
        let mut sizing = input(Direction::Long);
        sizing.atr = f64::NAN;

        assert!(compute_order(&sizing, profile(2, 2), RISK_FRACTION).is_err());
    }

    #[test]
    fn test_offsets_use_price_precision() {
        let mut sizing = input(Direction::Long);
        sizing.entry_price = 27_000.0;
        sizing.atr = 123.456;

        // BTC: one decimal for prices
        let intent = compute_order(&sizing, profile(1, 3), RISK_FRACTION).unwrap();
        // 123.456 * 4 = 493.824 -> 493.8, 123.456 * 7 = 864.192 -> 864.2
        assert_eq!(intent.stop_price, 26_506.2);
        assert_eq!(intent.take_profit_price, 27_864.2);
    }

    fn limits(balance: f64, max_leverage: u32) -> SizeLimits {
        SizeLimits {
            balance,
            max_leverage,
            notional_cap: f64::INFINITY,
            min_notional: 0.0,
        }
    }

    #[test]
    fn test_normalize_rounds_to_position_precision() {
        let mut sizing = input(Direction::Long);
        sizing.atr = 3.0; // distance 12 -> 83.333..
        let intent = compute_order(&sizing, profile(2, 3), RISK_FRACTION).unwrap();

        let normalized = normalize_size(intent, &limits(100_000.0, 20), profile(2, 3)).unwrap();
        assert_eq!(normalized.size, 83.333);

        let whole = compute_order(&sizing, profile(2, 0), RISK_FRACTION).unwrap();
        let normalized = normalize_size(whole, &limits(100_000.0, 20), profile(2, 0)).unwrap();
        assert_eq!(normalized.size, 83.0);
    }

    #[test]
    fn test_normalize_caps_notional_at_max_leverage() {
        // Raw size 125 at price 100 is 12500 notional; 1000 balance at 5x allows 5000
        let intent = compute_order(&input(Direction::Long), profile(2, 2), RISK_FRACTION).unwrap();

        let normalized = normalize_size(intent, &limits(1_000.0, 5), profile(2, 2)).unwrap();
        assert_eq!(normalized.size, 50.0);
        assert!(normalized.size * normalized.entry_price / 5.0 <= 1_000.0);
    }

    #[test]
    fn test_normalize_caps_notional_at_tier_limit() {
        // Balance and leverage would allow 2,000,000; the 20x tier stops at 5000
        let intent = compute_order(&input(Direction::Long), profile(2, 2), RISK_FRACTION).unwrap();
        let tier = SizeLimits {
            notional_cap: 5_000.0,
            ..limits(100_000.0, 20)
        };

        let normalized = normalize_size(intent, &tier, profile(2, 2)).unwrap();
        assert_eq!(normalized.size, 50.0);
        assert!(normalized.size * normalized.entry_price <= 5_000.0);
    }

    #[test]
    fn test_normalize_discards_size_rounded_over_cap() {
        // 9.8 balance at 1x allows 0.098 contracts at 100; 0.097 rounds up to 0.1
        let intent = PositionIntent {
            direction: Direction::Long,
            entry_price: 100.0,
            stop_price: 90.0,
            take_profit_price: 120.0,
            size: 0.097,
        };

        assert!(normalize_size(intent.clone(), &limits(9.8, 1), profile(2, 1)).is_none());
        // Same intent fits once the balance covers the rounded size
        assert_eq!(
            normalize_size(intent, &limits(10.0, 1), profile(2, 1)).map(|i| i.size),
            Some(0.1)
        );
    }

    #[test]
    fn test_normalize_enforces_min_notional() {
        // 30 * 1% / 8 = 0.0375 -> 0.04 contracts, 4 USDT notional
        let mut sizing = input(Direction::Long);
        sizing.balance = 30.0;
        let intent = compute_order(&sizing, profile(2, 2), RISK_FRACTION).unwrap();
        let exchange_minimum = SizeLimits {
            min_notional: 5.0,
            ..limits(30.0, 20)
        };

        assert!(normalize_size(intent.clone(), &exchange_minimum, profile(2, 2)).is_none());
        assert_eq!(
            normalize_size(intent, &limits(30.0, 20), profile(2, 2)).map(|i| i.size),
            Some(0.04)
        );
    }

    #[test]
    fn test_normalize_size_rounding_to_zero_is_no_trade() {
        let intent = PositionIntent {
            direction: Direction::Long,
            entry_price: 27_000.0,
            stop_price: 26_000.0,
            take_profit_price: 29_000.0,
            size: 0.0004,
        };

        assert!(normalize_size(intent, &limits(10.0, 125), profile(1, 3)).is_none());
    }

    #[test]
    fn test_normalize_rejects_empty_account() {
        let intent = compute_order(&input(Direction::Long), profile(2, 2), RISK_FRACTION).unwrap();

        assert!(normalize_size(intent.clone(), &limits(0.0, 20), profile(2, 2)).is_none());
        assert!(normalize_size(intent, &limits(1_000.0, 0), profile(2, 2)).is_none());
    }
}
