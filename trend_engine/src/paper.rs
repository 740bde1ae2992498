//! paper.rs: Simulated order gateway and account for paper trading
//!
//! Market data stays real; fills happen at the latest candle close.
//! Realised P&L = (exit − entry) × quantity × side sign, credited on close.
//! Every fill is appended to a CSV order log when one is configured.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::exchange::{AccountQuery, MarketDataSource, OrderGateway};
use crate::models::{AccountState, CloseResult, OrderResult, OrderType, Side};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaperPosition {
    pub side:        Side,
    pub quantity:    f64,
    pub entry_price: f64,
}

#[derive(Debug)]
struct PaperState {
    balance:      f64,
    position:     Option<PaperPosition>,
    realized_pnl: f64,
}

/// One row of the simulation order log.
#[derive(Debug, Serialize)]
struct OrderLogRow<'a> {
    timestamp:      String,
    order_id:       String,
    symbol:         &'a str,
    side:           &'a str,
    quantity:       f64,
    price:          f64,
    order_type:     &'a str,
    trade_type:     &'a str,
    entry_price:    f64,
    exit_price:     Option<f64>,
    realized_pnl:   Option<f64>,
    balance_before: f64,
    balance_after:  f64,
    leverage:       u32,
}

pub struct PaperExchange<M> {
    market:    M,
    symbol:    String,
    interval:  String,
    leverage:  u32,
    state:     Mutex<PaperState>,
    order_log: Option<Mutex<csv::Writer<File>>>,
    log_path:  Option<PathBuf>,
}

impl<M: MarketDataSource> PaperExchange<M> {
    pub fn new(market: M, symbol: &str, interval: &str, initial_balance: f64, leverage: u32) -> Self {
        Self {
            market,
            symbol:    symbol.to_owned(),
            interval:  interval.to_owned(),
            leverage,
            state:     Mutex::new(PaperState { balance: initial_balance, position: None, realized_pnl: 0.0 }),
            order_log: None,
            log_path:  None,
        }
    }

    /// Log fills to `<dir>/simulation_orders_<YYYYmmdd_HHMMSS>.csv`.
    pub fn with_order_log(mut self, dir: &Path) -> EngineResult<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|e| EngineError::Config(format!("cannot create {}: {e}", dir.display())))?;
        let path = dir.join(format!("simulation_orders_{}.csv", Utc::now().format("%Y%m%d_%H%M%S")));
        let writer = csv::Writer::from_path(&path)
            .map_err(|e| EngineError::Config(format!("cannot open {}: {e}", path.display())))?;
        info!(path = %path.display(), "simulation order log initialised");
        self.order_log = Some(Mutex::new(writer));
        self.log_path = Some(path);
        Ok(self)
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    pub fn position(&self) -> Option<PaperPosition> {
        self.lock().position
    }

    pub fn realized_pnl(&self) -> f64 {
        self.lock().realized_pnl
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PaperState> {
        // A poisoned lock only means a panic elsewhere; the numbers are still usable.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    async fn market_price(&self) -> EngineResult<f64> {
        let candles = self.market.get_recent_candles(&self.symbol, &self.interval, 1).await?;
        candles
            .last()
            .map(|c| c.close)
            .ok_or_else(|| EngineError::Exchange(format!("no price available for {}", self.symbol)))
    }

    fn record(&self, row: OrderLogRow<'_>) {
        let Some(log) = &self.order_log else {
            return;
        };
        let mut writer = log.lock().unwrap_or_else(|p| p.into_inner());
        if let Err(e) = writer.serialize(&row).and_then(|_| writer.flush().map_err(csv::Error::from)) {
            warn!("failed to write simulation order log: {e}");
        }
    }
}

impl<M: MarketDataSource> OrderGateway for PaperExchange<M> {
    async fn open_position(&self, side: Side, quantity: f64, order_type: OrderType) -> EngineResult<OrderResult> {
        if !(quantity > 0.0) {
            return Err(EngineError::OrderRejected(format!("invalid quantity {quantity}")));
        }
        let price = self.market_price().await?;

        let balance = {
            let mut state = self.lock();
            if state.position.is_some() {
                return Err(EngineError::OrderRejected("paper position already open".into()));
            }
            state.position = Some(PaperPosition { side, quantity, entry_price: price });
            state.balance
        };

        info!("[SIM] {} {:.6} {} @ {:.2}", side.entry_order_side(), quantity, self.symbol, price);
        self.record(OrderLogRow {
            timestamp:      Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            order_id:       format!("sim_{}", Uuid::new_v4()),
            symbol:         &self.symbol,
            side:           side.entry_order_side(),
            quantity,
            price,
            order_type:     order_type.as_str(),
            trade_type:     "open",
            entry_price:    price,
            exit_price:     None,
            realized_pnl:   None,
            balance_before: balance,
            balance_after:  balance,
            leverage:       self.leverage,
        });
        Ok(OrderResult { filled: true, fill_price: price, quantity })
    }

    async fn close_position(&self) -> EngineResult<CloseResult> {
        let price = self.market_price().await?;

        let (pos, pnl, before, after) = {
            let mut state = self.lock();
            let Some(pos) = state.position.take() else {
                return Err(EngineError::OrderRejected("no paper position to close".into()));
            };
            let pnl = (price - pos.entry_price) * pos.quantity * pos.side.sign();
            let before = state.balance;
            state.balance += pnl;
            state.realized_pnl += pnl;
            (pos, pnl, before, state.balance)
        };

        info!("[SIM] Position closed. P&L: ${:.2}, New Balance: ${:.2}", pnl, after);
        self.record(OrderLogRow {
            timestamp:      Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            order_id:       format!("sim_{}", Uuid::new_v4()),
            symbol:         &self.symbol,
            side:           pos.side.opposite().entry_order_side(),
            quantity:       pos.quantity,
            price,
            order_type:     OrderType::Market.as_str(),
            trade_type:     "close",
            entry_price:    pos.entry_price,
            exit_price:     Some(price),
            realized_pnl:   Some(pnl),
            balance_before: before,
            balance_after:  after,
            leverage:       self.leverage,
        });
        Ok(CloseResult { closed: true, close_price: price })
    }
}

impl<M: MarketDataSource> AccountQuery for PaperExchange<M> {
    async fn get_balance(&self) -> EngineResult<AccountState> {
        Ok(AccountState { balance: self.lock().balance, leverage: self.leverage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Candle;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Price feed whose last close can be moved between calls.
    struct StubFeed {
        price_bits: AtomicU64,
    }

    impl StubFeed {
        fn new(price: f64) -> Self {
            Self { price_bits: AtomicU64::new(price.to_bits()) }
        }

        fn set(&self, price: f64) {
            self.price_bits.store(price.to_bits(), Ordering::SeqCst);
        }
    }

    impl MarketDataSource for StubFeed {
        async fn get_recent_candles(&self, _: &str, _: &str, _: usize) -> EngineResult<Vec<Candle>> {
            let p = f64::from_bits(self.price_bits.load(Ordering::SeqCst));
            Ok(vec![Candle { open_time: 1, open: p, high: p, low: p, close: p, volume: 1.0 }])
        }
    }

    #[tokio::test]
    async fn long_round_trip_credits_pnl() {
        let feed = std::sync::Arc::new(StubFeed::new(60_000.0));
        let paper = PaperExchange::new(feed.clone(), "BTCUSDT", "1h", 10_000.0, 3);

        let fill = paper.open_position(Side::Long, 0.5, OrderType::Market).await.unwrap();
        assert!(fill.filled);
        assert_eq!(fill.fill_price, 60_000.0);
        assert_eq!(fill.quantity, 0.5);

        feed.set(60_300.0);
        let close = paper.close_position().await.unwrap();
        assert!(close.closed);
        assert_eq!(close.close_price, 60_300.0);

        let acct = paper.get_balance().await.unwrap();
        assert!((acct.balance - 10_150.0).abs() < 1e-9);
        assert_eq!(acct.leverage, 3);
        assert!(paper.position().is_none());
    }

    #[tokio::test]
    async fn short_loss_debits_balance() {
        let feed = std::sync::Arc::new(StubFeed::new(100.0));
        let paper = PaperExchange::new(feed.clone(), "BTCUSDT", "1h", 1_000.0, 5);
        paper.open_position(Side::Short, 2.0, OrderType::Market).await.unwrap();
        feed.set(110.0);
        paper.close_position().await.unwrap();
        assert!((paper.realized_pnl() + 20.0).abs() < 1e-9);
        assert!((paper.get_balance().await.unwrap().balance - 980.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn rejects_double_open_and_empty_close() {
        let paper = PaperExchange::new(StubFeed::new(100.0), "BTCUSDT", "1h", 1_000.0, 1);
        assert!(matches!(paper.close_position().await, Err(EngineError::OrderRejected(_))));
        paper.open_position(Side::Long, 1.0, OrderType::Market).await.unwrap();
        assert!(matches!(
            paper.open_position(Side::Long, 1.0, OrderType::Market).await,
            Err(EngineError::OrderRejected(_))
        ));
    }

    #[tokio::test]
    async fn fills_are_written_to_csv_log() {
        let dir = tempfile::tempdir().unwrap();
        let paper = PaperExchange::new(StubFeed::new(100.0), "BTCUSDT", "1h", 1_000.0, 3)
            .with_order_log(dir.path())
            .unwrap();
        paper.open_position(Side::Long, 1.0, OrderType::Market).await.unwrap();
        paper.close_position().await.unwrap();

        let text = std::fs::read_to_string(paper.log_path().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3, "{text}");
        assert!(lines[0].starts_with("timestamp,order_id,symbol,side"));
        assert!(lines[1].contains(",open,"));
        assert!(lines[2].contains(",close,"));
    }
}
