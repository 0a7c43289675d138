pub mod binance;
pub mod exchange;

pub use binance::BinanceFuturesClient;
pub use exchange::{FuturesExchange, LeverageTier, OrderAck, OrderKind, OrderRequest};
