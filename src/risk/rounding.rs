use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::TradeError;
use crate::Result;

/// Exchange tick sizes are never finer than this
pub const MAX_PRECISION: u32 = 8;

/// Decimal places accepted by the exchange for one symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundingProfile {
    pub price_precision: u32,
    pub position_precision: u32,
}

impl Default for RoundingProfile {
    fn default() -> Self {
        Self {
            price_precision: 2,
            position_precision: 2,
        }
    }
}

/// Symbol -> rounding profile, with a fallback for unknown symbols
#[derive(Debug, Clone)]
pub struct RoundingTable {
    profiles: HashMap<String, RoundingProfile>,
    default: RoundingProfile,
}

impl RoundingTable {
    /// Built-in table for the USDT-M perpetuals the optimizer covers
    pub fn standard() -> Self {
        let entries: [(&str, u32, u32); 10] = [
            ("BTCUSDT", 1, 3),
            ("ETHUSDT", 2, 3),
            ("ADAUSDT", 4, 0),
            ("SANDUSDT", 4, 0),
            ("BNBUSDT", 2, 2),
            ("MATICUSDT", 4, 0),
            ("XRPUSDT", 4, 0),
            ("APEUSDT", 3, 0),
            ("LTCUSDT", 2, 3),
            ("LINKUSDT", 3, 2),
        ];

        let profiles = entries
            .iter()
            .map(|&(symbol, price_precision, position_precision)| {
                (
                    symbol.to_string(),
                    RoundingProfile {
                        price_precision,
                        position_precision,
                    },
                )
            })
            .collect();

        Self {
            profiles,
            default: RoundingProfile::default(),
        }
    }

    /// Add or replace entries; symbols are matched case-insensitively
    pub fn with_overrides(mut self, overrides: &HashMap<String, RoundingProfile>) -> Self {
        for (symbol, profile) in overrides {
            self.profiles.insert(symbol.to_uppercase(), *profile);
        }
        self
    }

    /// Reject profiles the exchange could never accept
    pub fn validate(&self) -> Result<()> {
        let all = self
            .profiles
            .iter()
            .map(|(symbol, profile)| (symbol.as_str(), profile))
            .chain(std::iter::once(("<default>", &self.default)));

        for (symbol, profile) in all {
            if profile.price_precision > MAX_PRECISION
                || profile.position_precision > MAX_PRECISION
            {
                return Err(TradeError::Config(format!(
                    "rounding profile for {} exceeds {} decimals: {:?}",
                    symbol, MAX_PRECISION, profile
                )));
            }
        }
        Ok(())
    }

    pub fn profile(&self, symbol: &str) -> RoundingProfile {
        self.profiles
            .get(&symbol.to_uppercase())
            .copied()
            .unwrap_or(self.default)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl Default for RoundingTable {
    fn default() -> Self {
        Self::standard()
    }
}

fn to_decimal(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_f64(value)
}

fn round_with(value: f64, dp: u32, strategy: RoundingStrategy) -> f64 {
    to_decimal(value)
        .and_then(|d| d.round_dp_with_strategy(dp, strategy).to_f64())
        .unwrap_or(value)
}

/// Round half away from zero to `dp` decimal places
pub fn round_dp(value: f64, dp: u32) -> f64 {
    round_with(value, dp, RoundingStrategy::MidpointAwayFromZero)
}

/// Truncate toward zero to `dp` decimal places
pub fn round_down_dp(value: f64, dp: u32) -> f64 {
    round_with(value, dp, RoundingStrategy::ToZero)
}

/// Render a price or quantity the way the exchange expects it in a request
pub fn format_decimal(value: f64, dp: u32) -> String {
    match to_decimal(value) {
        Some(d) => d
            .round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
            .normalize()
            .to_string(),
        None => value.to_string(),
    }
}
