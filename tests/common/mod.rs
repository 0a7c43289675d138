#![allow(dead_code)]

use async_trait::async_trait;
use bracketbot::api::{FuturesExchange, LeverageTier, OrderAck, OrderRequest};
use bracketbot::config::TradingSettings;
use bracketbot::db::ParameterStore;
use bracketbot::execution::CandleFeed;
use bracketbot::models::{Candle, Direction, Kline, PositionSnapshot, TradeParameter};
use bracketbot::{Result, TradeError};
use chrono::{Duration, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::time::Instant;

/// Scripted response for one `place_order` call
pub enum OrderScript {
    Accept,
    /// Rejected before reaching the book
    Fail(TradeError),
    /// Accepted by the exchange but the response never arrived
    LostAck(TradeError),
}

#[derive(Default)]
pub struct ExchangeState {
    /// Signed position amount
    pub position: f64,
    pub balance: f64,
    pub tiers: Vec<LeverageTier>,
    pub klines: Vec<Kline>,
    pub leverage_set: Vec<(String, u32)>,
    /// Orders the exchange holds
    pub orders: Vec<OrderRequest>,
    pub order_attempts: usize,
    pub lookups: Vec<String>,
    pub order_script: VecDeque<OrderScript>,
    pub position_errors: VecDeque<TradeError>,
    /// Position queries for this symbol fail with an API rejection
    pub rejected_symbol: Option<String>,
    /// Market orders change the position immediately
    pub fill_market_orders: bool,
    pub calls: usize,
}

pub struct FakeExchange {
    pub state: Mutex<ExchangeState>,
}

impl FakeExchange {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ExchangeState {
                balance: 100_000.0,
                tiers: vec![
                    LeverageTier {
                        bracket: 1,
                        initial_leverage: 20,
                        notional_cap: 50_000.0,
                    },
                    LeverageTier {
                        bracket: 2,
                        initial_leverage: 10,
                        notional_cap: 250_000.0,
                    },
                ],
                fill_market_orders: true,
                ..Default::default()
            }),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut ExchangeState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn orders(&self) -> Vec<OrderRequest> {
        self.with(|s| s.orders.clone())
    }

    fn record(&self, state: &mut ExchangeState, order: &OrderRequest) -> OrderAck {
        state.orders.push(order.clone());
        if state.fill_market_orders && !order.reduce_only {
            let signed = match order.side {
                bracketbot::models::OrderSide::Buy => order.quantity,
                bracketbot::models::OrderSide::Sell => -order.quantity,
            };
            state.position += signed;
        }
        OrderAck {
            order_id: state.orders.len() as i64,
            client_order_id: order.client_order_id.clone(),
            status: "NEW".to_string(),
        }
    }
}

#[async_trait]
impl FuturesExchange for FakeExchange {
    async fn klines(&self, _symbol: &str, _timeframe: &str, limit: usize) -> Result<Vec<Kline>> {
        self.with(|s| {
            s.calls += 1;
            let skip = s.klines.len().saturating_sub(limit);
            Ok(s.klines[skip..].to_vec())
        })
    }

    async fn position(&self, symbol: &str) -> Result<PositionSnapshot> {
        self.with(|s| {
            s.calls += 1;
            if s.rejected_symbol.as_deref() == Some(symbol) {
                return Err(TradeError::Exchange {
                    code: -1121,
                    message: "Invalid symbol.".to_string(),
                });
            }
            if let Some(err) = s.position_errors.pop_front() {
                return Err(err);
            }
            Ok(PositionSnapshot {
                symbol: symbol.to_string(),
                amount: s.position,
            })
        })
    }

    async fn free_balance(&self, _asset: &str) -> Result<f64> {
        self.with(|s| {
            s.calls += 1;
            Ok(s.balance)
        })
    }

    async fn leverage_tiers(&self, _symbol: &str) -> Result<Vec<LeverageTier>> {
        self.with(|s| {
            s.calls += 1;
            Ok(s.tiers.clone())
        })
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        self.with(|s| {
            s.calls += 1;
            s.leverage_set.push((symbol.to_string(), leverage));
            Ok(())
        })
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        state.order_attempts += 1;

        match state.order_script.pop_front().unwrap_or(OrderScript::Accept) {
            OrderScript::Accept => Ok(self.record(&mut state, order)),
            OrderScript::Fail(err) => Err(err),
            OrderScript::LostAck(err) => {
                self.record(&mut state, order);
                Err(err)
            }
        }
    }

    async fn find_order(&self, _symbol: &str, client_order_id: &str) -> Result<Option<OrderAck>> {
        self.with(|s| {
            s.calls += 1;
            s.lookups.push(client_order_id.to_string());
            Ok(s
                .orders
                .iter()
                .position(|o| o.client_order_id == client_order_id)
                .map(|i| OrderAck {
                    order_id: i as i64 + 1,
                    client_order_id: client_order_id.to_string(),
                    status: "NEW".to_string(),
                }))
        })
    }
}

/// Feed returning scripted results, then `default` forever
pub struct FakeFeed {
    pub script: Mutex<VecDeque<Result<Vec<Candle>>>>,
    pub default: Vec<Candle>,
    pub calls: Mutex<Vec<(Instant, String)>>,
}

impl FakeFeed {
    pub fn new(default: Vec<Candle>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, result: Result<Vec<Candle>>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }
}

#[async_trait]
impl CandleFeed for FakeFeed {
    async fn fetch_candles(&self, symbol: &str, _timeframe: &str, _limit: usize) -> Result<Vec<Candle>> {
        self.calls
            .lock()
            .unwrap()
            .push((Instant::now(), symbol.to_string()));

        match self.script.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(self.default.clone()),
        }
    }
}

/// Store returning scripted results, then an empty table
pub struct FakeStore {
    pub script: Mutex<VecDeque<Result<Vec<TradeParameter>>>>,
    pub calls: Mutex<Vec<Instant>>,
}

impl FakeStore {
    pub fn new(script: Vec<Result<Vec<TradeParameter>>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ParameterStore for FakeStore {
    async fn active_parameters(&self) -> Result<Vec<TradeParameter>> {
        self.calls.lock().unwrap().push(Instant::now());
        self.script.lock().unwrap().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

pub fn parameter(symbol: &str, timeframe: &str) -> TradeParameter {
    TradeParameter {
        symbol: symbol.to_string(),
        timeframe: timeframe.to_string(),
        tp_multiplier: 7.0,
        sl_multiplier: 4.0,
    }
}

pub fn settings() -> TradingSettings {
    TradingSettings::default()
}

fn candle(i: i64, open: f64) -> Candle {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    Candle::from_kline(&Kline {
        open_time: start + Duration::minutes(15 * i),
        open,
        high: open + 1.0,
        low: open - 1.0,
        close: open + 0.5,
        volume: 10.0,
    })
}

/// Three candles; the last closed one signals `direction` with ATR `atr`,
/// the forming one opens at 100
pub fn signal_candles(direction: Direction, atr: f64) -> Vec<Candle> {
    let mut candles = vec![candle(0, 98.0), candle(1, 99.0), candle(2, 100.0)];
    candles[1].atr = Some(atr);
    match direction {
        Direction::Long => candles[1].long_signal = true,
        Direction::Short => candles[1].short_signal = true,
    }
    candles
}

/// The forming candle signals but the last closed one does not
pub fn forming_signal_only() -> Vec<Candle> {
    let mut candles = quiet_candles();
    candles[2].long_signal = true;
    candles[2].atr = Some(2.0);
    candles
}

pub fn quiet_candles() -> Vec<Candle> {
    let mut candles = vec![candle(0, 98.0), candle(1, 99.0), candle(2, 100.0)];
    for c in &mut candles {
        c.atr = Some(2.0);
    }
    candles
}

pub fn klines(count: usize) -> Vec<Kline> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..count)
        .map(|i| {
            let price = 100.0 + (i as f64 * 0.2).sin() * 3.0 + i as f64 * 0.02;
            Kline {
                open_time: start + Duration::minutes(15 * i as i64),
                open: price,
                high: price + 1.0,
                low: price - 1.0,
                close: price + 0.3,
                volume: 50.0,
            }
        })
        .collect()
}
