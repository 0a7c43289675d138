use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::error::TradeError;
use crate::risk::{RoundingProfile, RoundingTable};
use crate::Result;

const MAINNET_REST_URL: &str = "https://fapi.binance.com";
const TESTNET_REST_URL: &str = "https://testnet.binancefuture.com";

/// Exchange connectivity settings
#[derive(Clone, Deserialize)]
pub struct ExchangeSettings {
    pub api_key: String,
    pub api_secret: String,
    pub testnet: bool,
    /// Overrides the mainnet/testnet default when set
    #[serde(default)]
    pub rest_url: Option<String>,
    /// Global request budget shared by every symbol loop
    pub rate_limit_per_minute: u32,
    pub recv_window_ms: u64,
    pub timeout_secs: u64,
}

impl ExchangeSettings {
    pub fn base_url(&self) -> &str {
        match &self.rest_url {
            Some(url) if !url.is_empty() => url.trim_end_matches('/'),
            _ if self.testnet => TESTNET_REST_URL,
            _ => MAINNET_REST_URL,
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

// Keeps credentials out of log lines
impl fmt::Debug for ExchangeSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let masked_key = if self.api_key.len() > 8 {
            format!(
                "{}...{}",
                &self.api_key[..4],
                &self.api_key[self.api_key.len() - 4..]
            )
        } else {
            "***REDACTED***".to_string()
        };

        f.debug_struct("ExchangeSettings")
            .field("api_key", &masked_key)
            .field("api_secret", &"***REDACTED***")
            .field("testnet", &self.testnet)
            .field("rest_url", &self.base_url())
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("recv_window_ms", &self.recv_window_ms)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Execution loop and supervisor tuning
#[derive(Debug, Clone, Deserialize)]
pub struct TradingSettings {
    pub candle_limit: usize,
    pub poll_interval_secs: u64,
    pub network_backoff_secs: u64,
    pub refresh_interval_secs: u64,
    pub risk_fraction: f64,
    /// Trailing take-profit callback, in percent
    pub callback_rate: f64,
    /// Margin asset whose free balance is risked
    pub quote_asset: String,
    /// Smallest entry notional the exchange accepts, in the quote asset
    pub min_notional: f64,
}

impl TradingSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn network_backoff(&self) -> Duration {
        Duration::from_secs(self.network_backoff_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl Default for TradingSettings {
    fn default() -> Self {
        Self {
            candle_limit: 500,
            poll_interval_secs: 1,
            network_backoff_secs: 60,
            refresh_interval_secs: 86_400,
            risk_fraction: crate::risk::RISK_FRACTION,
            callback_rate: 0.1,
            quote_asset: "USDT".to_string(),
            min_notional: 5.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub exchange: ExchangeSettings,
    pub database_url: String,
    pub trading: TradingSettings,
    /// Per-symbol precision overrides on top of the built-in table
    #[serde(default)]
    pub rounding: HashMap<String, RoundingProfile>,
    pub log_filter: String,
}

impl AppConfig {
    /// Load configuration: built-in defaults, then the optional config file,
    /// then `BRACKETBOT__SECTION__KEY` environment variables.
    ///
    /// `.env` is read first so `BINANCE_API_KEY`, `BINANCE_API_SECRET` and
    /// `DATABASE_URL` can seed the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok(); // ignore missing .env

        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("bracketbot").required(false),
        };

        let config = Self::defaults(
            std::env::var("BINANCE_API_KEY").unwrap_or_default(),
            std::env::var("BINANCE_API_SECRET").unwrap_or_default(),
            std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/bracketbot".to_string()),
        )?
        .add_source(file)
        .add_source(
            Environment::with_prefix("BRACKETBOT")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Defaults plus an inline TOML document, without touching the process environment
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config = Self::defaults(
            String::new(),
            String::new(),
            "postgres://localhost/bracketbot".to_string(),
        )?
        .add_source(File::from_str(contents, FileFormat::Toml))
        .build()?;

        Ok(config.try_deserialize()?)
    }

    fn defaults(
        api_key: String,
        api_secret: String,
        database_url: String,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        let trading = TradingSettings::default();

        Ok(Config::builder()
            .set_default("exchange.api_key", api_key)?
            .set_default("exchange.api_secret", api_secret)?
            .set_default("exchange.testnet", false)?
            .set_default("exchange.rate_limit_per_minute", 1200)?
            .set_default("exchange.recv_window_ms", 5000)?
            .set_default("exchange.timeout_secs", 10)?
            .set_default("database_url", database_url)?
            .set_default("trading.candle_limit", trading.candle_limit as u64)?
            .set_default("trading.poll_interval_secs", trading.poll_interval_secs)?
            .set_default("trading.network_backoff_secs", trading.network_backoff_secs)?
            .set_default("trading.refresh_interval_secs", trading.refresh_interval_secs)?
            .set_default("trading.risk_fraction", trading.risk_fraction)?
            .set_default("trading.callback_rate", trading.callback_rate)?
            .set_default("trading.quote_asset", trading.quote_asset)?
            .set_default("trading.min_notional", trading.min_notional)?
            .set_default("log_filter", "bracketbot=info")?)
    }

    /// Rounding table with configured overrides applied
    pub fn rounding_table(&self) -> RoundingTable {
        RoundingTable::standard().with_overrides(&self.rounding)
    }

    /// Sanity checks run once at startup
    pub fn validate(&self) -> Result<()> {
        let trading = &self.trading;

        if !(trading.risk_fraction > 0.0 && trading.risk_fraction < 1.0) {
            return Err(TradeError::Config(format!(
                "trading.risk_fraction must be in (0, 1), got {}",
                trading.risk_fraction
            )));
        }
        // Exchange-accepted trailing callback range
        if !(0.1..=5.0).contains(&trading.callback_rate) {
            return Err(TradeError::Config(format!(
                "trading.callback_rate must be within 0.1..=5.0 percent, got {}",
                trading.callback_rate
            )));
        }
        // Signals read the second-to-last candle and need a previous one for crossovers
        if trading.candle_limit < 3 {
            return Err(TradeError::Config(
                "trading.candle_limit must be at least 3".to_string(),
            ));
        }
        if trading.min_notional.is_nan() || trading.min_notional < 0.0 {
            return Err(TradeError::Config(format!(
                "trading.min_notional must be non-negative, got {}",
                trading.min_notional
            )));
        }
        if trading.poll_interval_secs == 0 || trading.refresh_interval_secs == 0 {
            return Err(TradeError::Config(
                "poll and refresh intervals must be non-zero".to_string(),
            ));
        }
        if self.exchange.rate_limit_per_minute == 0 {
            return Err(TradeError::Config(
                "exchange.rate_limit_per_minute must be non-zero".to_string(),
            ));
        }

        self.rounding_table().validate()
    }
}
