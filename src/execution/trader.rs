use super::bracket::{place_bracket, BracketOutcome, BracketPlan};
use super::leverage::sync_leverage;
use super::price_feed::CandleFeed;
use crate::api::FuturesExchange;
use crate::config::TradingSettings;
use crate::models::{Candle, Direction, TradeParameter};
use crate::risk::{compute_order, normalize_size, RoundingProfile, SizeLimits, SizingInput};
use crate::Result;
use std::fmt;
use std::sync::Arc;

/// Where a symbol loop is in its entry cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Flat,
    Evaluating,
    Entering,
    Open,
}

impl fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopPhase::Flat => write!(f, "FLAT"),
            LoopPhase::Evaluating => write!(f, "EVALUATING"),
            LoopPhase::Entering => write!(f, "ENTERING"),
            LoopPhase::Open => write!(f, "OPEN"),
        }
    }
}

/// Per-symbol state, owned by exactly one loop
#[derive(Debug, Clone)]
pub struct ExecutionState {
    /// Leverage set by the last entry attempt
    pub leverage: Option<u32>,
    pub parameters: TradeParameter,
    pub phase: LoopPhase,
    /// Bracket whose entry may be live but whose protective legs are not all placed
    pub pending_bracket: Option<BracketPlan>,
}

impl ExecutionState {
    pub fn new(parameters: TradeParameter) -> Self {
        Self {
            leverage: None,
            parameters,
            phase: LoopPhase::Flat,
            pending_bracket: None,
        }
    }
}

/// Result of one loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Flat and the last closed candle carries no signal
    NoSignal,
    /// Contracts are held; nothing to do
    Holding,
    /// Exchange reports the position closed
    Closed,
    /// Signal discarded because the sized order is not tradable
    Skipped,
    /// Full bracket placed
    Entered,
    /// Missing protective legs of a pending bracket placed
    ProtectionRestored,
    /// Pending bracket dropped because no position exists
    BracketDropped,
}

/// Execution loop for one (symbol, timeframe) pair
pub struct SymbolTrader {
    exchange: Arc<dyn FuturesExchange>,
    feed: Arc<dyn CandleFeed>,
    profile: RoundingProfile,
    settings: TradingSettings,
    state: ExecutionState,
}

impl SymbolTrader {
    pub fn new(
        exchange: Arc<dyn FuturesExchange>,
        feed: Arc<dyn CandleFeed>,
        parameters: TradeParameter,
        profile: RoundingProfile,
        settings: TradingSettings,
    ) -> Self {
        Self {
            exchange,
            feed,
            profile,
            settings,
            state: ExecutionState::new(parameters),
        }
    }

    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    pub fn phase(&self) -> LoopPhase {
        self.state.phase
    }

    fn symbol(&self) -> &str {
        &self.state.parameters.symbol
    }

    /// Poll forever. Recoverable errors are logged and retried after their
    /// backoff; the first fatal error is returned.
    pub async fn run(mut self) -> Result<()> {
        let parameters = &self.state.parameters;
        tracing::info!(
            symbol = %parameters.symbol,
            timeframe = %parameters.timeframe,
            tp = parameters.tp_multiplier,
            sl = parameters.sl_multiplier,
            "🚀 Starting execution loop"
        );

        let poll_interval = self.settings.poll_interval();
        let network_backoff = self.settings.network_backoff();

        loop {
            let delay = match self.step().await {
                Ok(outcome) => {
                    tracing::trace!(symbol = %self.symbol(), phase = %self.state.phase, ?outcome, "Tick");
                    poll_interval
                }
                Err(e) => match e.backoff(poll_interval, network_backoff) {
                    Some(delay) => {
                        tracing::warn!(
                            symbol = %self.symbol(),
                            kind = e.kind().as_str(),
                            error = %e,
                            "Recoverable error, retrying in {}s",
                            delay.as_secs()
                        );
                        delay
                    }
                    None => {
                        tracing::error!(
                            symbol = %self.symbol(),
                            kind = e.kind().as_str(),
                            error = %e,
                            "❌ Fatal error, halting"
                        );
                        return Err(e);
                    }
                },
            };

            tokio::time::sleep(delay).await;
        }
    }

    /// One iteration of the state machine
    pub async fn step(&mut self) -> Result<StepOutcome> {
        // An unprotected position takes priority over everything else
        if self.state.pending_bracket.is_some() {
            return self.resume_bracket().await;
        }

        match self.state.phase {
            LoopPhase::Open => self.check_open_position().await,
            _ => self.evaluate().await,
        }
    }

    async fn check_open_position(&mut self) -> Result<StepOutcome> {
        let position = self.exchange.position(self.symbol()).await?;

        if position.is_flat() {
            tracing::info!(symbol = %self.symbol(), "✅ Position closed");
            self.state.phase = LoopPhase::Flat;
            return Ok(StepOutcome::Closed);
        }

        Ok(StepOutcome::Holding)
    }

    async fn evaluate(&mut self) -> Result<StepOutcome> {
        self.state.phase = LoopPhase::Flat;

        let parameters = &self.state.parameters;
        let candles = self
            .feed
            .fetch_candles(&parameters.symbol, &parameters.timeframe, self.settings.candle_limit)
            .await?;
        let position = self.exchange.position(self.symbol()).await?;

        if !position.is_flat() {
            tracing::info!(
                symbol = %self.symbol(),
                contracts = position.contracts(),
                "Position already open, not entering"
            );
            self.state.phase = LoopPhase::Open;
            return Ok(StepOutcome::Holding);
        }

        self.state.phase = LoopPhase::Evaluating;

        let Some((closed, forming)) = last_closed(&candles) else {
            self.state.phase = LoopPhase::Flat;
            return Ok(StepOutcome::NoSignal);
        };
        let Some(direction) = closed.signal() else {
            self.state.phase = LoopPhase::Flat;
            return Ok(StepOutcome::NoSignal);
        };

        tracing::info!(
            symbol = %self.symbol(),
            %direction,
            candle = %closed.timestamp,
            "📈 Entry signal"
        );

        self.state.phase = LoopPhase::Entering;
        let atr = closed.atr.unwrap_or(f64::NAN);
        let result = self.enter(direction, forming.open, atr).await;

        if result.is_err() && self.state.pending_bracket.is_none() {
            self.state.phase = LoopPhase::Flat;
        }
        result
    }

    /// Leverage sync, sizing, then bracket placement
    async fn enter(&mut self, direction: Direction, entry_price: f64, atr: f64) -> Result<StepOutcome> {
        let symbol = self.state.parameters.symbol.clone();

        let tier = sync_leverage(self.exchange.as_ref(), &symbol).await?;
        let leverage = tier.initial_leverage;
        self.state.leverage = Some(leverage);

        let balance = self.exchange.free_balance(&self.settings.quote_asset).await?;

        let input = SizingInput {
            entry_price,
            atr,
            balance,
            direction,
            tp_multiplier: self.state.parameters.tp_multiplier,
            sl_multiplier: self.state.parameters.sl_multiplier,
        };
        let intent = compute_order(&input, self.profile, self.settings.risk_fraction)?;

        let limits = SizeLimits {
            balance,
            max_leverage: leverage,
            notional_cap: tier.notional_cap,
            min_notional: self.settings.min_notional,
        };
        let Some(intent) = normalize_size(intent, &limits, self.profile) else {
            tracing::info!(
                symbol = %symbol,
                balance,
                leverage,
                notional_cap = tier.notional_cap,
                "Order size not tradable, skipping signal"
            );
            self.state.phase = LoopPhase::Flat;
            return Ok(StepOutcome::Skipped);
        };

        tracing::info!(
            symbol = %symbol,
            %direction,
            size = intent.size,
            entry = intent.entry_price,
            stop = intent.stop_price,
            take_profit = intent.take_profit_price,
            leverage,
            "Placing bracket"
        );

        let mut plan = BracketPlan::new(&symbol, &intent, self.settings.callback_rate);
        match place_bracket(self.exchange.as_ref(), &mut plan).await {
            Ok(BracketOutcome::Placed) => {
                self.state.phase = LoopPhase::Open;
                Ok(StepOutcome::Entered)
            }
            Ok(BracketOutcome::EntryAbsent) => {
                self.state.phase = LoopPhase::Flat;
                Ok(StepOutcome::Skipped)
            }
            Err(e) => {
                if plan.entry_may_exist() {
                    self.state.pending_bracket = Some(plan);
                }
                Err(e)
            }
        }
    }

    /// Finish a bracket whose entry may be live
    async fn resume_bracket(&mut self) -> Result<StepOutcome> {
        let position = self.exchange.position(self.symbol()).await?;

        if position.is_flat() {
            tracing::warn!(
                symbol = %self.symbol(),
                "No position behind pending bracket, dropping it"
            );
            self.state.pending_bracket = None;
            self.state.phase = LoopPhase::Flat;
            return Ok(StepOutcome::BracketDropped);
        }

        let Some(mut plan) = self.state.pending_bracket.take() else {
            return Ok(StepOutcome::Holding);
        };

        match place_bracket(self.exchange.as_ref(), &mut plan).await {
            Ok(BracketOutcome::Placed) => {
                tracing::info!(symbol = %self.symbol(), "🛡️ Bracket protection restored");
                self.state.phase = LoopPhase::Open;
                Ok(StepOutcome::ProtectionRestored)
            }
            Ok(BracketOutcome::EntryAbsent) => {
                self.state.phase = LoopPhase::Flat;
                Ok(StepOutcome::BracketDropped)
            }
            Err(e) => {
                self.state.pending_bracket = Some(plan);
                Err(e)
            }
        }
    }
}

/// Last fully closed candle and the forming one after it
fn last_closed(candles: &[Candle]) -> Option<(&Candle, &Candle)> {
    match candles {
        [.., closed, forming] => Some((closed, forming)),
        _ => None,
    }
}
