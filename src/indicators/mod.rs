// Technical indicators module
// Series versions of EMA, SMMA, ATR, ADX and RSI aligned with their input

pub mod adx;
pub mod atr;
pub mod moving_average;
pub mod rsi;

pub use adx::adx_series;
pub use atr::{atr_series, true_range};
pub use moving_average::{ema_series, smma_series, wilder_series};
pub use rsi::rsi_series;
