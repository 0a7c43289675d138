use anyhow::Context;
use bracketbot::api::{BinanceFuturesClient, FuturesExchange};
use bracketbot::config::AppConfig;
use bracketbot::db::{ParameterStore, PostgresParameterStore};
use bracketbot::execution::{CandleFeed, IndicatorFeed};
use bracketbot::strategy::SignalConfig;
use bracketbot::Supervisor;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "bracketbot", about = "Bracket-order execution engine for USDT-M futures")]
struct Cli {
    /// Config file (defaults to ./bracketbot.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Start the supervisor and trade (default)
    Run,
    /// Print the active trade-parameter table and exit
    Params,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    setup_logging(&config.log_filter);
    config.validate().context("invalid configuration")?;

    // Loops only await network calls and timers; one thread is enough
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;

    runtime.block_on(async move {
        match cli.command.unwrap_or(Command::Run) {
            Command::Run => run(config).await,
            Command::Params => print_parameters(&config).await,
        }
    })
}

fn setup_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!("🚀 bracketbot starting");
    tracing::debug!("Exchange settings: {:?}", config.exchange);

    if !config.exchange.has_credentials() {
        anyhow::bail!("exchange credentials missing: set BINANCE_API_KEY and BINANCE_API_SECRET");
    }

    let exchange: Arc<dyn FuturesExchange> = Arc::new(BinanceFuturesClient::new(&config.exchange)?);
    let feed: Arc<dyn CandleFeed> =
        Arc::new(IndicatorFeed::new(exchange.clone(), SignalConfig::default()));
    let store: Arc<dyn ParameterStore> = Arc::new(
        PostgresParameterStore::new(&config.database_url)
            .await
            .context("failed to connect to parameter store")?,
    );

    let rounding = config.rounding_table();
    tracing::info!("Rounding profiles for {} symbols", rounding.len());

    let supervisor = Supervisor::new(exchange, feed, store, rounding, config.trading.clone());

    tracing::info!("Press Ctrl+C to stop...");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("⚠️  Received Ctrl+C, shutting down...");
        }
        result = supervisor.run() => {
            result.context("trading halted")?;
        }
    }

    tracing::info!("👋 bracketbot stopped");
    Ok(())
}

async fn print_parameters(config: &AppConfig) -> anyhow::Result<()> {
    let store = PostgresParameterStore::new(&config.database_url)
        .await
        .context("failed to connect to parameter store")?;
    let parameters = store.active_parameters().await?;

    if parameters.is_empty() {
        println!("No active trade parameters (no trading today)");
        return Ok(());
    }

    let rounding = config.rounding_table();
    println!(
        "{:<12} {:<6} {:>6} {:>6} {:>10}",
        "SYMBOL", "TF", "TP", "SL", "PRECISION"
    );
    for p in &parameters {
        let profile = rounding.profile(&p.symbol);
        println!(
            "{:<12} {:<6} {:>6} {:>6} {:>10}",
            p.symbol,
            p.timeframe,
            p.tp_multiplier,
            p.sl_multiplier,
            format!("{}/{}", profile.price_precision, profile.position_precision)
        );
    }

    Ok(())
}
