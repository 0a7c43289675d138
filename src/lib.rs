// Core modules
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod risk;
pub mod strategy;
pub mod supervisor;

// Re-export commonly used types
pub use error::{ErrorKind, TradeError};
pub use models::*;
pub use supervisor::Supervisor;

// Error handling
pub type Result<T> = std::result::Result<T, TradeError>;
