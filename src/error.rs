use std::time::Duration;
use thiserror::Error;

/// How long a loop waits after a network-class failure before polling again
pub const NETWORK_BACKOFF: Duration = Duration::from_secs(60);

/// Every failure the engine can observe.
///
/// The split that matters is recoverable vs fatal: recoverable errors are
/// handled inside the owning symbol loop, fatal ones halt every loop.
#[derive(Debug, Error)]
pub enum TradeError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("exchange unavailable: {0}")]
    ExchangeUnavailable(String),

    #[error("invalid risk distance {distance} (entry {entry_price}, stop {stop_price})")]
    InvalidRiskDistance {
        entry_price: f64,
        stop_price: f64,
        distance: f64,
    },

    /// `cause` is the kind of the failure that interrupted placement
    #[error("bracket for {symbol} is missing legs: {missing} ({})", .cause.as_str())]
    PartialBracketFailure {
        symbol: String,
        missing: String,
        cause: ErrorKind,
    },

    #[error("exchange error {code}: {message}")]
    Exchange { code: i64, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("parameter store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("execution task failed: {0}")]
    Task(String),
}

/// Coarse classification used for logging and retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    RateLimited,
    ExchangeUnavailable,
    InvalidRiskDistance,
    PartialBracketFailure,
    Fatal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "NetworkError",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::ExchangeUnavailable => "ExchangeUnavailable",
            ErrorKind::InvalidRiskDistance => "InvalidRiskDistance",
            ErrorKind::PartialBracketFailure => "PartialBracketFailure",
            ErrorKind::Fatal => "Fatal",
        }
    }

    /// Transport-level failure where the request may simply be repeated later
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            ErrorKind::Network | ErrorKind::RateLimited | ErrorKind::ExchangeUnavailable
        )
    }
}

impl TradeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TradeError::Network(_) => ErrorKind::Network,
            TradeError::RateLimited(_) => ErrorKind::RateLimited,
            TradeError::ExchangeUnavailable(_) => ErrorKind::ExchangeUnavailable,
            TradeError::InvalidRiskDistance { .. } => ErrorKind::InvalidRiskDistance,
            TradeError::PartialBracketFailure { .. } => ErrorKind::PartialBracketFailure,
            TradeError::Exchange { .. }
            | TradeError::Parse(_)
            | TradeError::Store(_)
            | TradeError::Config(_)
            | TradeError::Task(_) => ErrorKind::Fatal,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind() != ErrorKind::Fatal
    }

    pub fn is_network(&self) -> bool {
        self.kind().is_network()
    }

    /// Delay before the owning loop's next iteration.
    ///
    /// A partial bracket is retried on the next tick unless the exchange
    /// refused the leg for transport reasons (rate limit, outage), in which
    /// case it waits like any other network error. Returns None for fatal
    /// errors.
    pub fn backoff(&self, poll_interval: Duration, network_backoff: Duration) -> Option<Duration> {
        if let TradeError::PartialBracketFailure { cause, .. } = self {
            if cause.is_network() {
                return Some(network_backoff);
            }
        }

        match self.kind() {
            ErrorKind::Network | ErrorKind::RateLimited | ErrorKind::ExchangeUnavailable => {
                Some(network_backoff)
            }
            ErrorKind::InvalidRiskDistance | ErrorKind::PartialBracketFailure => {
                Some(poll_interval)
            }
            ErrorKind::Fatal => None,
        }
    }
}

impl From<reqwest::Error> for TradeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            TradeError::Network(err.to_string())
        } else if err.is_decode() {
            TradeError::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            if status.as_u16() == 429 || status.as_u16() == 418 {
                TradeError::RateLimited(err.to_string())
            } else if status.is_server_error() {
                TradeError::ExchangeUnavailable(err.to_string())
            } else {
                TradeError::Exchange {
                    code: status.as_u16() as i64,
                    message: err.to_string(),
                }
            }
        } else {
            TradeError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for TradeError {
    fn from(err: serde_json::Error) -> Self {
        TradeError::Parse(err.to_string())
    }
}

impl From<sqlx::Error> for TradeError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                TradeError::Network(format!("database: {}", err))
            }
            other => TradeError::Store(other.to_string()),
        }
    }
}

impl From<config::ConfigError> for TradeError {
    fn from(err: config::ConfigError) -> Self {
        TradeError::Config(err.to_string())
    }
}
