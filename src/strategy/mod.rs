// Entry signal rules
pub mod signals;

pub use signals::{augment_klines, is_long_entry, is_short_entry, SignalConfig};
