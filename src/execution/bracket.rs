use crate::api::{FuturesExchange, OrderKind, OrderRequest};
use crate::error::{ErrorKind, TradeError};
use crate::models::{Direction, PositionIntent};
use crate::Result;
use std::fmt;
use uuid::Uuid;

/// Exchange limit for client order ids
const MAX_CLIENT_ID_LEN: usize = 36;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BracketLeg {
    Entry,
    TakeProfit,
    StopLoss,
}

impl BracketLeg {
    /// Submission order
    pub const ALL: [BracketLeg; 3] = [BracketLeg::Entry, BracketLeg::TakeProfit, BracketLeg::StopLoss];

    fn code(&self) -> char {
        match self {
            BracketLeg::Entry => 'e',
            BracketLeg::TakeProfit => 't',
            BracketLeg::StopLoss => 's',
        }
    }
}

impl fmt::Display for BracketLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BracketLeg::Entry => write!(f, "entry"),
            BracketLeg::TakeProfit => write!(f, "take-profit"),
            BracketLeg::StopLoss => write!(f, "stop-loss"),
        }
    }
}

/// Submission state of one leg
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegState {
    /// Never sent
    Pending,
    /// Sent, but the request failed; the exchange may or may not have it
    Unconfirmed,
    Placed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BracketOutcome {
    /// All three legs are on the exchange
    Placed,
    /// An unconfirmed entry turned out never to have reached the exchange
    EntryAbsent,
}

#[derive(Debug, Clone, PartialEq)]
struct Leg {
    client_order_id: String,
    state: LegState,
}

/// Entry, trailing take-profit and protective stop for one signal.
///
/// Client order ids are fixed when the plan is created, so a retried leg
/// can be looked up before it is sent again.
#[derive(Debug, Clone, PartialEq)]
pub struct BracketPlan {
    pub symbol: String,
    pub direction: Direction,
    pub size: f64,
    pub entry_price: f64,
    pub stop_price: f64,
    pub take_profit_price: f64,
    /// Trailing callback in percent
    pub callback_rate: f64,
    legs: [Leg; 3],
}

impl BracketPlan {
    pub fn new(symbol: &str, intent: &PositionIntent, callback_rate: f64) -> Self {
        let token = Uuid::new_v4().simple().to_string();
        let leg = |kind: BracketLeg| Leg {
            client_order_id: client_order_id(kind, &token),
            state: LegState::Pending,
        };

        Self {
            symbol: symbol.to_string(),
            direction: intent.direction,
            size: intent.size,
            entry_price: intent.entry_price,
            stop_price: intent.stop_price,
            take_profit_price: intent.take_profit_price,
            callback_rate,
            legs: BracketLeg::ALL.map(leg),
        }
    }

    fn leg(&self, kind: BracketLeg) -> &Leg {
        &self.legs[kind as usize]
    }

    fn set_state(&mut self, kind: BracketLeg, state: LegState) {
        self.legs[kind as usize].state = state;
    }

    pub fn client_order_id(&self, kind: BracketLeg) -> &str {
        &self.leg(kind).client_order_id
    }

    pub fn state(&self, kind: BracketLeg) -> LegState {
        self.leg(kind).state
    }

    /// Legs not yet confirmed on the exchange
    pub fn missing_legs(&self) -> Vec<BracketLeg> {
        BracketLeg::ALL
            .into_iter()
            .filter(|kind| self.state(*kind) != LegState::Placed)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_legs().is_empty()
    }

    /// Whether the exchange may hold a position opened by this plan
    pub fn entry_may_exist(&self) -> bool {
        self.state(BracketLeg::Entry) != LegState::Pending
    }

    /// Order for one leg; every leg carries the same size
    pub fn order_request(&self, kind: BracketLeg) -> OrderRequest {
        let (side, order_kind, reduce_only) = match kind {
            BracketLeg::Entry => (self.direction.entry_side(), OrderKind::Market, false),
            BracketLeg::TakeProfit => (
                self.direction.exit_side(),
                OrderKind::TrailingStop {
                    activation_price: self.take_profit_price,
                    callback_rate: self.callback_rate,
                },
                true,
            ),
            BracketLeg::StopLoss => (
                self.direction.exit_side(),
                OrderKind::StopLimit {
                    stop_price: self.stop_price,
                    limit_price: self.stop_price,
                },
                true,
            ),
        };

        OrderRequest {
            symbol: self.symbol.clone(),
            side,
            kind: order_kind,
            quantity: self.size,
            reduce_only,
            client_order_id: self.client_order_id(kind).to_string(),
        }
    }

    fn partial_failure(&self, cause: ErrorKind) -> TradeError {
        TradeError::PartialBracketFailure {
            symbol: self.symbol.clone(),
            cause,
            missing: self
                .missing_legs()
                .iter()
                .map(|leg| leg.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

fn client_order_id(kind: BracketLeg, token: &str) -> String {
    let mut id = format!("bb{}-{}", kind.code(), token);
    id.truncate(MAX_CLIENT_ID_LEN);
    id
}

/// Place every leg of `plan` that is not yet on the exchange, in order.
///
/// Unconfirmed legs are looked up by client id first and only re-sent when
/// the exchange has no record of them. A failed entry returns its own error;
/// a failed protective leg returns `PartialBracketFailure` and leaves the
/// plan ready for another call.
pub async fn place_bracket(
    exchange: &dyn FuturesExchange,
    plan: &mut BracketPlan,
) -> Result<BracketOutcome> {
    for kind in BracketLeg::ALL {
        match plan.state(kind) {
            LegState::Placed => continue,
            LegState::Pending => {}
            LegState::Unconfirmed => {
                let existing = exchange
                    .find_order(&plan.symbol, plan.client_order_id(kind))
                    .await?;

                if let Some(ack) = existing {
                    tracing::info!(
                        symbol = %plan.symbol,
                        leg = %kind,
                        order_id = ack.order_id,
                        status = %ack.status,
                        "Leg already on exchange, not resending"
                    );
                    plan.set_state(kind, LegState::Placed);
                    continue;
                }

                if kind == BracketLeg::Entry {
                    tracing::warn!(symbol = %plan.symbol, "Entry never reached the exchange, dropping bracket");
                    return Ok(BracketOutcome::EntryAbsent);
                }
            }
        }

        let request = plan.order_request(kind);
        match exchange.place_order(&request).await {
            Ok(ack) => {
                tracing::info!(
                    symbol = %plan.symbol,
                    leg = %kind,
                    side = request.side.as_str(),
                    order_type = request.kind.as_str(),
                    quantity = request.quantity,
                    order_id = ack.order_id,
                    "📝 Order placed"
                );
                plan.set_state(kind, LegState::Placed);
            }
            Err(e) => {
                plan.set_state(kind, LegState::Unconfirmed);

                if kind == BracketLeg::Entry {
                    return Err(e);
                }

                tracing::error!(
                    symbol = %plan.symbol,
                    leg = %kind,
                    kind = e.kind().as_str(),
                    error = %e,
                    "⚠️ Protective order failed, position is not fully protected"
                );
                return Err(plan.partial_failure(e.kind()));
            }
        }
    }

    Ok(BracketOutcome::Placed)
}
