// Per-symbol execution: candle feed, leverage, bracket orders and the loop itself
pub mod bracket;
pub mod leverage;
pub mod price_feed;
pub mod trader;

pub use bracket::{place_bracket, BracketLeg, BracketOutcome, BracketPlan, LegState};
pub use leverage::sync_leverage;
pub use price_feed::{CandleFeed, IndicatorFeed};
pub use trader::{ExecutionState, LoopPhase, StepOutcome, SymbolTrader};
