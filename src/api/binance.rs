use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use sha2::Sha256;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use super::exchange::{FuturesExchange, LeverageTier, OrderAck, OrderKind, OrderRequest};
use crate::config::ExchangeSettings;
use crate::error::TradeError;
use crate::models::{Kline, PositionSnapshot};
use crate::risk::format_decimal;
use crate::risk::rounding::MAX_PRECISION;
use crate::Result;

type HmacSha256 = Hmac<Sha256>;

// Type alias for the rate limiter to simplify signatures
type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// "Order does not exist"
const ORDER_NOT_FOUND: i64 = -2013;
/// "Too many requests"
const TOO_MANY_REQUESTS: i64 = -1003;
/// Transport-level codes where the request may simply be repeated later:
/// disconnected, backend timeout, timestamp outside recvWindow
const TRANSIENT_CODES: [i64; 3] = [-1001, -1007, -1021];

#[derive(Debug, Deserialize)]
struct BinanceError {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRisk {
    symbol: String,
    position_amt: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetBalance {
    asset: String,
    available_balance: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Bracket {
    bracket: u32,
    initial_leverage: u32,
    notional_cap: f64,
}

#[derive(Debug, Deserialize)]
struct SymbolBrackets {
    symbol: String,
    brackets: Vec<Bracket>,
}

// The endpoint answers with a list, or a bare object when a symbol is given
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BracketResponse {
    Many(Vec<SymbolBrackets>),
    One(SymbolBrackets),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: i64,
    client_order_id: String,
    status: String,
}

impl From<OrderResponse> for OrderAck {
    fn from(response: OrderResponse) -> Self {
        Self {
            order_id: response.order_id,
            client_order_id: response.client_order_id,
            status: response.status,
        }
    }
}

/// Signed REST client for Binance USDT-M futures
///
/// This struct is cloneable to allow sharing across async tasks.
/// All clones share the same rate limiter.
#[derive(Clone)]
pub struct BinanceFuturesClient {
    client: Client,
    api_key: String,
    api_secret: String,
    base_url: String,
    recv_window_ms: u64,
    rate_limiter: Arc<BinanceRateLimiter>,
}

impl BinanceFuturesClient {
    pub fn new(settings: &ExchangeSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| TradeError::Config(format!("failed to build HTTP client: {}", e)))?;

        let per_minute = NonZeroU32::new(settings.rate_limit_per_minute).ok_or_else(|| {
            TradeError::Config("exchange.rate_limit_per_minute must be non-zero".to_string())
        })?;
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)));

        tracing::info!(
            "Binance futures client at {} ({} req/min)",
            settings.base_url(),
            per_minute
        );

        Ok(Self {
            client,
            api_key: settings.api_key.clone(),
            api_secret: settings.api_secret.clone(),
            base_url: settings.base_url().to_string(),
            recv_window_ms: settings.recv_window_ms,
            rate_limiter,
        })
    }

    /// HMAC-SHA256 signature of a query string, hex encoded
    fn sign(&self, query: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| TradeError::Config(format!("invalid API secret: {}", e)))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn signed_query(&self, params: &[(&str, String)]) -> Result<String> {
        let mut query = encode_params(params);
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&format!(
            "recvWindow={}&timestamp={}",
            self.recv_window_ms,
            Utc::now().timestamp_millis()
        ));

        let signature = self.sign(&query)?;
        Ok(format!("{}&signature={}", query, signature))
    }

    /// Rate-limited request; non-2xx responses are classified into TradeError
    async fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        signed: bool,
    ) -> Result<String> {
        // Sign after the wait so the timestamp stays inside recvWindow
        self.rate_limiter.until_ready().await;

        let query = if signed {
            self.signed_query(params)?
        } else {
            encode_params(params)
        };

        let url = format!("{}{}", self.base_url, path);
        let mut request = if method == Method::GET {
            let url = if query.is_empty() {
                url
            } else {
                format!("{}?{}", url, query)
            };
            self.client.request(method, url)
        } else {
            self.client
                .request(method, url)
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(query)
        };

        if signed {
            request = request.header("X-MBX-APIKEY", &self.api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return Ok(body);
        }

        let err = classify_error(status, &body);
        tracing::debug!(path, %status, kind = err.kind().as_str(), "Binance request failed: {}", err);
        Err(err)
    }
}

fn encode_params(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&")
}

fn classify_error(status: StatusCode, body: &str) -> TradeError {
    let api_error: Option<BinanceError> = serde_json::from_str(body).ok();

    if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
        return TradeError::RateLimited(format!("HTTP {}: {}", status, body));
    }

    match api_error {
        Some(e) if e.code == TOO_MANY_REQUESTS => TradeError::RateLimited(e.msg),
        Some(e) if TRANSIENT_CODES.contains(&e.code) => {
            TradeError::Network(format!("{}: {}", e.code, e.msg))
        }
        _ if status.is_server_error() => {
            TradeError::ExchangeUnavailable(format!("HTTP {}: {}", status, body))
        }
        Some(e) => TradeError::Exchange {
            code: e.code,
            message: e.msg,
        },
        None => TradeError::Exchange {
            code: status.as_u16() as i64,
            message: body.to_string(),
        },
    }
}

fn number(value: &serde_json::Value) -> Result<f64> {
    match value {
        serde_json::Value::String(s) => s
            .parse::<f64>()
            .map_err(|e| TradeError::Parse(format!("bad number {:?}: {}", s, e))),
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| TradeError::Parse(format!("bad number {}", n))),
        other => Err(TradeError::Parse(format!("expected number, got {}", other))),
    }
}

fn parse_decimal_str(value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|e| TradeError::Parse(format!("bad number {:?}: {}", value, e)))
}

fn parse_kline(row: &[serde_json::Value]) -> Result<Kline> {
    if row.len() < 6 {
        return Err(TradeError::Parse(format!(
            "kline row has {} fields, expected at least 6",
            row.len()
        )));
    }

    let open_time_ms = row[0]
        .as_i64()
        .ok_or_else(|| TradeError::Parse(format!("bad kline open time {}", row[0])))?;
    let open_time = Utc
        .timestamp_millis_opt(open_time_ms)
        .single()
        .ok_or_else(|| TradeError::Parse(format!("kline open time out of range: {}", open_time_ms)))?;

    Ok(Kline {
        open_time,
        open: number(&row[1])?,
        high: number(&row[2])?,
        low: number(&row[3])?,
        close: number(&row[4])?,
        volume: number(&row[5])?,
    })
}

fn order_params(order: &OrderRequest) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("symbol", order.symbol.clone()),
        ("side", order.side.as_str().to_string()),
        ("type", order.kind.as_str().to_string()),
        ("quantity", format_decimal(order.quantity, MAX_PRECISION)),
        ("newClientOrderId", order.client_order_id.clone()),
    ];

    if order.reduce_only {
        params.push(("reduceOnly", "true".to_string()));
    }

    match &order.kind {
        OrderKind::Market => {}
        OrderKind::TrailingStop {
            activation_price,
            callback_rate,
        } => {
            params.push(("activationPrice", format_decimal(*activation_price, MAX_PRECISION)));
            params.push(("callbackRate", format_decimal(*callback_rate, 1)));
        }
        OrderKind::StopLimit {
            stop_price,
            limit_price,
        } => {
            params.push(("stopPrice", format_decimal(*stop_price, MAX_PRECISION)));
            params.push(("price", format_decimal(*limit_price, MAX_PRECISION)));
            params.push(("timeInForce", "GTC".to_string()));
        }
    }

    params
}

#[async_trait]
impl FuturesExchange for BinanceFuturesClient {
    async fn klines(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Kline>> {
        let params = [
            ("symbol", symbol.to_string()),
            ("interval", timeframe.to_string()),
            ("limit", limit.to_string()),
        ];
        let body = self
            .request(Method::GET, "/fapi/v1/klines", &params, false)
            .await?;

        let rows: Vec<Vec<serde_json::Value>> = serde_json::from_str(&body)?;
        let klines = rows
            .iter()
            .map(|row| parse_kline(row))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!("Fetched {} {} klines for {}", klines.len(), timeframe, symbol);

        Ok(klines)
    }

    async fn position(&self, symbol: &str) -> Result<PositionSnapshot> {
        let params = [("symbol", symbol.to_string())];
        let body = self
            .request(Method::GET, "/fapi/v2/positionRisk", &params, true)
            .await?;

        let rows: Vec<PositionRisk> = serde_json::from_str(&body)?;

        // One-way mode reports a single row; hedge mode reports one per side
        let mut amount = 0.0;
        for row in rows.iter().filter(|r| r.symbol == symbol) {
            amount += parse_decimal_str(&row.position_amt)?;
        }

        Ok(PositionSnapshot {
            symbol: symbol.to_string(),
            amount,
        })
    }

    async fn free_balance(&self, asset: &str) -> Result<f64> {
        let body = self
            .request(Method::GET, "/fapi/v2/balance", &[], true)
            .await?;

        let balances: Vec<AssetBalance> = serde_json::from_str(&body)?;
        match balances.iter().find(|b| b.asset == asset) {
            Some(balance) => parse_decimal_str(&balance.available_balance),
            None => Ok(0.0),
        }
    }

    async fn leverage_tiers(&self, symbol: &str) -> Result<Vec<LeverageTier>> {
        let params = [("symbol", symbol.to_string())];
        let body = self
            .request(Method::GET, "/fapi/v1/leverageBracket", &params, true)
            .await?;

        let response: BracketResponse = serde_json::from_str(&body)?;
        let entries = match response {
            BracketResponse::Many(entries) => entries,
            BracketResponse::One(entry) => vec![entry],
        };

        Ok(entries
            .into_iter()
            .filter(|entry| entry.symbol == symbol)
            .flat_map(|entry| entry.brackets)
            .map(|b| LeverageTier {
                bracket: b.bracket,
                initial_leverage: b.initial_leverage,
                notional_cap: b.notional_cap,
            })
            .collect())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        let params = [
            ("symbol", symbol.to_string()),
            ("leverage", leverage.to_string()),
        ];
        self.request(Method::POST, "/fapi/v1/leverage", &params, true)
            .await?;

        tracing::debug!("Set leverage {}x for {}", leverage, symbol);
        Ok(())
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck> {
        let params = order_params(order);
        let body = self
            .request(Method::POST, "/fapi/v1/order", &params, true)
            .await?;

        let response: OrderResponse = serde_json::from_str(&body)?;
        Ok(response.into())
    }

    async fn find_order(&self, symbol: &str, client_order_id: &str) -> Result<Option<OrderAck>> {
        let params = [
            ("symbol", symbol.to_string()),
            ("origClientOrderId", client_order_id.to_string()),
        ];

        match self
            .request(Method::GET, "/fapi/v1/order", &params, true)
            .await
        {
            Ok(body) => {
                let response: OrderResponse = serde_json::from_str(&body)?;
                Ok(Some(response.into()))
            }
            Err(TradeError::Exchange {
                code: ORDER_NOT_FOUND,
                ..
            }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
