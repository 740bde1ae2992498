//! live.rs: Live trading via Binance USDT-M Futures REST API
//!
//! Signed REST order submission for Binance Futures, testnet or mainnet.
//!
//! BINANCE FUTURES SIGNED REQUEST FLOW:
//!   1. Build query string with required params
//!   2. Append server-synced timestamp
//!   3. Sign query string with HMAC-SHA256 using API secret
//!   4. Send with X-MBX-APIKEY header
//!
//! ORDER TYPES USED:
//!   MARKET with `newOrderRespType=RESULT`, so the response already carries
//!   the final status and average fill price.  One-way position mode.
//!   Closes are reduce-only opposite-side MARKET orders.

use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{error, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::exchange::{AccountQuery, OrderGateway};
use crate::models::{AccountState, CloseResult, OrderResult, OrderType, Side};
use crate::time_sync::TimeSync;

type HmacSha256 = Hmac<Sha256>;

/// Default quantity step for USDT-M contracts such as BTCUSDT (0.001).
pub const DEFAULT_QUANTITY_DECIMALS: usize = 3;

// ── Response types ────────────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id:     i64,
    pub symbol:       String,
    pub status:       String,
    #[serde(rename = "type")]
    pub order_type:   String,
    pub side:         String,
    pub orig_qty:     String,
    pub executed_qty: String,
    pub avg_price:    String,
}

impl OrderResponse {
    pub fn avg_price(&self) -> f64 {
        self.avg_price.parse().unwrap_or(0.0)
    }

    pub fn executed_qty(&self) -> f64 {
        self.executed_qty.parse().unwrap_or(0.0)
    }

    /// Something executed, whatever the final status.  A MARKET order can
    /// end `EXPIRED` or `PARTIALLY_FILLED` with a non-zero executed quantity,
    /// and that quantity is a real exchange position.
    pub fn is_filled(&self) -> bool {
        self.executed_qty() > 0.0 && self.avg_price() > 0.0
    }

    /// The whole requested quantity executed.
    pub fn is_complete(&self) -> bool {
        let orig: f64 = self.orig_qty.parse().unwrap_or(0.0);
        self.is_filled() && self.executed_qty() >= orig - 1e-12
    }
}

#[derive(Deserialize, Debug)]
pub struct BinanceError {
    pub code: i64,
    pub msg:  String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PositionRisk {
    pub symbol:       String,
    pub position_amt: String,
    pub mark_price:   String,
}

impl PositionRisk {
    pub fn amount(&self) -> f64 {
        self.position_amt.parse().unwrap_or(0.0)
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AssetBalance {
    pub asset:             String,
    pub balance:           String,
    pub available_balance: String,
}

// ── Live Order Client ─────────────────────────────────────────────────────

/// Which error a non-200 reply maps to.
#[derive(Clone, Copy)]
enum Endpoint {
    Order,
    Account,
}

pub struct LiveOrderClient {
    client:       Client,
    api_key:      String,
    api_secret:   String,
    base_url:     String,
    symbol:       String,
    leverage:     u32,
    qty_decimals: usize,
    settle_asset: String,
    time_sync:    TimeSync,
}

impl LiveOrderClient {
    pub fn new(
        api_key:    &str,
        api_secret: &str,
        base_url:   &str,
        symbol:     &str,
        leverage:   u32,
    ) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            api_key:      api_key.to_owned(),
            api_secret:   api_secret.to_owned(),
            base_url:     base_url.trim_end_matches('/').to_owned(),
            symbol:       symbol.to_owned(),
            leverage,
            qty_decimals: DEFAULT_QUANTITY_DECIMALS,
            settle_asset: "USDT".into(),
            time_sync:    TimeSync::new(),
        })
    }

    /// Quantity step as decimal places, from the symbol's LOT_SIZE filter.
    pub fn with_quantity_decimals(mut self, decimals: usize) -> Self {
        self.qty_decimals = decimals;
        self
    }

    /// Sign a query string with HMAC-SHA256.
    fn sign(&self, query: &str) -> EngineResult<String> {
        sign_query(&self.api_secret, query)
    }

    /// Sync time with Binance server.
    pub async fn sync_time(&mut self) -> EngineResult<()> {
        self.time_sync.sync(&self.client, &self.base_url).await
    }

    async fn signed_request(
        &self,
        method:   Method,
        path:     &str,
        params:   &str,
        endpoint: Endpoint,
    ) -> EngineResult<String> {
        let ts = self.time_sync.timestamp_ms();
        let query = if params.is_empty() {
            format!("timestamp={ts}")
        } else {
            format!("{params}&timestamp={ts}")
        };
        let signature = self.sign(&query)?;
        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);

        let resp = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if status != StatusCode::OK {
            let detail = match serde_json::from_str::<BinanceError>(&body) {
                Ok(e) => format!("Binance API error {}: {}", e.code, e.msg),
                Err(_) => format!("HTTP {}: {}", status, body.chars().take(200).collect::<String>()),
            };
            error!(path, %status, "{detail}");
            return Err(match endpoint {
                Endpoint::Order => EngineError::OrderRejected(detail),
                Endpoint::Account => EngineError::Exchange(detail),
            });
        }
        Ok(body)
    }

    /// Place a MARKET order on Binance Futures.
    ///
    /// # Arguments
    /// * `side`        - "BUY" or "SELL"
    /// * `quantity`    - base asset quantity (e.g. 0.001 BTC)
    /// * `reduce_only` - true for closing orders
    pub async fn market_order(&self, side: &str, quantity: f64, reduce_only: bool) -> EngineResult<OrderResponse> {
        let Some(qty_str) = format_quantity(quantity, self.qty_decimals) else {
            return Err(EngineError::OrderRejected(format!(
                "quantity {quantity} rounds to zero at {} decimals",
                self.qty_decimals
            )));
        };

        let mut params = format!(
            "symbol={}&side={}&type=MARKET&quantity={}&newOrderRespType=RESULT",
            self.symbol, side, qty_str
        );
        if reduce_only {
            params.push_str("&reduceOnly=true");
        }

        info!("Placing {} {} {} @ MARKET", side, qty_str, self.symbol);
        let body = self.signed_request(Method::POST, "/fapi/v1/order", &params, Endpoint::Order).await?;
        let order: OrderResponse = serde_json::from_str(&body)?;

        info!(
            "Order {}: id={} {} {} qty={}/{} avgPx={}",
            order.status, order.order_id, order.side, order.symbol,
            order.executed_qty, order.orig_qty, order.avg_price
        );
        Ok(order)
    }

    /// Set leverage for the symbol (required before first trade).
    pub async fn set_leverage(&self) -> EngineResult<()> {
        let params = format!("symbol={}&leverage={}", self.symbol, self.leverage);
        self.signed_request(Method::POST, "/fapi/v1/leverage", &params, Endpoint::Account).await?;
        info!("Set leverage {}x for {}", self.leverage, self.symbol);
        Ok(())
    }

    /// Current position rows for the symbol.
    pub async fn get_position(&self) -> EngineResult<Vec<PositionRisk>> {
        let params = format!("symbol={}", self.symbol);
        let body = self
            .signed_request(Method::GET, "/fapi/v2/positionRisk", &params, Endpoint::Account)
            .await?;
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn get_balances(&self) -> EngineResult<Vec<AssetBalance>> {
        let body = self
            .signed_request(Method::GET, "/fapi/v2/balance", "", Endpoint::Account)
            .await?;
        Ok(serde_json::from_str(&body)?)
    }
}

impl OrderGateway for LiveOrderClient {
    async fn open_position(&self, side: Side, quantity: f64, order_type: OrderType) -> EngineResult<OrderResult> {
        match order_type {
            OrderType::Market => {
                let order = self.market_order(side.entry_order_side(), quantity, false).await?;
                if order.is_filled() && !order.is_complete() {
                    warn!(
                        status = %order.status,
                        executed = %order.executed_qty,
                        requested = %order.orig_qty,
                        "entry partially executed; tracking the executed quantity"
                    );
                }
                Ok(OrderResult {
                    filled:     order.is_filled(),
                    fill_price: order.avg_price(),
                    quantity:   order.executed_qty(),
                })
            }
        }
    }

    /// Close via an opposite reduce-only MARKET order sized from positionRisk.
    async fn close_position(&self) -> EngineResult<CloseResult> {
        let positions = self.get_position().await?;
        let Some(pos) = positions.iter().find(|p| p.symbol == self.symbol && p.amount().abs() > 1e-9) else {
            let mark = positions.first().and_then(|p| p.mark_price.parse().ok()).unwrap_or(0.0);
            warn!(symbol = %self.symbol, "no open exchange position; treating as already closed");
            return Ok(CloseResult { closed: true, close_price: mark });
        };

        let amt = pos.amount();
        let side = if amt > 0.0 { "SELL" } else { "BUY" };
        let order = self.market_order(side, amt.abs(), true).await?;
        // A partial close leaves a remainder on the exchange; the next exit
        // check sizes the retry from positionRisk again.
        Ok(CloseResult { closed: order.is_complete(), close_price: order.avg_price() })
    }
}

impl AccountQuery for LiveOrderClient {
    async fn get_balance(&self) -> EngineResult<AccountState> {
        let balances = self.get_balances().await?;
        let entry = balances
            .iter()
            .find(|b| b.asset == self.settle_asset)
            .ok_or_else(|| EngineError::Exchange(format!("no {} balance returned", self.settle_asset)))?;
        let balance = entry
            .available_balance
            .parse()
            .map_err(|e| EngineError::Exchange(format!("bad availableBalance {:?}: {e}", entry.available_balance)))?;
        Ok(AccountState { balance, leverage: self.leverage })
    }
}

/// Round to the exchange step; `None` when nothing would be left to send.
pub fn format_quantity(quantity: f64, decimals: usize) -> Option<String> {
    let text = format!("{:.*}", decimals, quantity);
    (text.parse::<f64>().unwrap_or(0.0) > 0.0).then_some(text)
}

pub fn sign_query(secret: &str, query: &str) -> EngineResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| EngineError::Config(format!("HMAC key error: {e}")))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_matches_binance_docs_example() {
        // Example from the Binance API signed-endpoint documentation.
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            sign_query(secret, query).unwrap(),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn parses_order_response() {
        let body = r#"{"orderId":42,"symbol":"BTCUSDT","status":"FILLED","type":"MARKET",
            "side":"BUY","origQty":"0.500","executedQty":"0.500","avgPrice":"60010.10"}"#;
        let order: OrderResponse = serde_json::from_str(body).unwrap();
        assert!(order.is_filled());
        assert_eq!(order.avg_price(), 60_010.10);
    }

    #[test]
    fn unfilled_order_is_not_confirmed() {
        let body = r#"{"orderId":43,"symbol":"BTCUSDT","status":"EXPIRED","type":"MARKET",
            "side":"SELL","origQty":"0.500","executedQty":"0","avgPrice":"0.00"}"#;
        let order: OrderResponse = serde_json::from_str(body).unwrap();
        assert!(!order.is_filled());
        assert!(!order.is_complete());
    }

    #[test]
    fn expired_order_with_execution_counts_as_filled() {
        let body = r#"{"orderId":44,"symbol":"BTCUSDT","status":"EXPIRED","type":"MARKET",
            "side":"BUY","origQty":"0.500","executedQty":"0.300","avgPrice":"60000.0"}"#;
        let order: OrderResponse = serde_json::from_str(body).unwrap();
        assert!(order.is_filled());
        assert!(!order.is_complete());
        assert_eq!(order.executed_qty(), 0.3);
        assert_eq!(order.avg_price(), 60_000.0);
    }

    #[test]
    fn quantity_rounds_to_step() {
        assert_eq!(format_quantity(0.5004, 3).as_deref(), Some("0.500"));
        assert_eq!(format_quantity(159.1511, 0).as_deref(), Some("159"));
        assert_eq!(format_quantity(0.0004, 3), None);
        assert_eq!(format_quantity(0.0004, 4).as_deref(), Some("0.0004"));
    }

    #[test]
    fn parses_position_and_balance_rows() {
        let pos: Vec<PositionRisk> = serde_json::from_str(
            r#"[{"symbol":"BTCUSDT","positionAmt":"-0.500","markPrice":"59000.0","entryPrice":"60000"}]"#,
        )
        .unwrap();
        assert_eq!(pos[0].amount(), -0.5);

        let bal: Vec<AssetBalance> = serde_json::from_str(
            r#"[{"asset":"USDT","balance":"1000.5","availableBalance":"900.25","crossWalletBalance":"1000.5"}]"#,
        )
        .unwrap();
        assert_eq!(bal[0].available_balance, "900.25");
    }
}
