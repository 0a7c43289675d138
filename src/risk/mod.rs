// Risk management module
pub mod rounding;
pub mod sizing;

pub use rounding::{format_decimal, round_dp, round_down_dp, RoundingProfile, RoundingTable};
pub use sizing::{compute_order, normalize_size, SizeLimits, SizingInput, RISK_FRACTION};
