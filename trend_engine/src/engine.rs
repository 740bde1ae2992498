//! engine.rs: Cycle-driven trader
//!
//! One cycle:
//!   fetch candles → indicators → signal → exit check (OPEN)
//!   → refresh balance → entry check (FLAT) → status log
//!
//! Exits are always evaluated before entries, and a cycle that closed a
//! position never opens a new one.  The balance is only needed for sizing,
//! so an account outage cannot hold back a protective exit.  Position and
//! balance change only on a confirmed fill or close.
//!
//! Shutdown interrupts the read-only calls (candles, balance).  Order
//! submissions always run to their confirmed or failed outcome.

use std::future::Future;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::error::{EngineError, EngineResult};
use crate::exchange::{AccountQuery, MarketDataSource, OrderGateway};
use crate::indicators::IndicatorEngine;
use crate::lifecycle::PositionLifecycle;
use crate::metrics::SessionStats;
use crate::models::{AccountState, ExitReason, OrderType, Side, Signal};
use crate::risk::{RiskMetrics, RiskSizer};
use crate::scheduler::Scheduler;
use crate::strategy::SignalDetector;

/// Everything the trader mutates, threaded through each cycle.
#[derive(Debug, Clone)]
pub struct TradingState {
    pub lifecycle: PositionLifecycle,
    pub account:   AccountState,
    pub stats:     SessionStats,
}

impl TradingState {
    pub fn new(account: AccountState) -> Self {
        Self {
            lifecycle: PositionLifecycle::new(),
            stats:     SessionStats::new(account.balance),
            account,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    EntrySubmitted(Side),
    Opened { side: Side, entry_price: f64 },
    EntryRejected,
    Closing(ExitReason),
    Closed { reason: ExitReason, pnl: f64 },
    CloseFailed,
}

/// What one cycle saw and did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub signal:      Signal,
    pub price:       Option<f64>,
    pub transitions: Vec<Transition>,
    /// The error that skipped an entry or ended the cycle early.
    pub error:       Option<EngineError>,
    /// Lifecycle state name after the cycle.
    pub state:       &'static str,
    /// Shutdown arrived before any order was sent; the cycle was abandoned.
    pub cancelled:   bool,
}

pub struct Trader<M, O, A> {
    market:       M,
    orders:       O,
    account:      A,
    symbol:       String,
    interval:     String,
    candle_limit: usize,
    indicators:   IndicatorEngine,
    detector:     SignalDetector,
    sizer:        RiskSizer,
    state:        TradingState,
    shutdown:     CancellationToken,
}

impl<M, O, A> Trader<M, O, A>
where
    M: MarketDataSource,
    O: OrderGateway,
    A: AccountQuery,
{
    pub fn new(cfg: &AppConfig, market: M, orders: O, account: A) -> Self {
        let initial = AccountState { balance: cfg.initial_balance, leverage: cfg.leverage };
        Self {
            market,
            orders,
            account,
            symbol:       cfg.symbol.clone(),
            interval:     cfg.kline_interval.clone(),
            candle_limit: cfg.candle_limit,
            indicators:   IndicatorEngine::new(cfg.indicator_params()),
            detector:     SignalDetector::new(cfg.volume_multiplier),
            sizer:        RiskSizer::new(cfg.risk_params()),
            state:        TradingState::new(initial),
            shutdown:     CancellationToken::new(),
        }
    }

    /// Abandon in-flight market-data and balance requests once `token` is
    /// cancelled.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Start from an injected state instead of FLAT.
    pub fn with_state(mut self, state: TradingState) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> &TradingState {
        &self.state
    }

    pub fn into_state(self) -> TradingState {
        self.state
    }

    /// Run the first cycle immediately, then one per scheduler tick.
    /// Returns the number of cycles run.
    pub async fn run<S: Scheduler>(&mut self, scheduler: &mut S) -> u64 {
        info!(symbol = %self.symbol, interval = %self.interval, "trader loop started");
        let mut cycles = 0u64;
        loop {
            self.run_cycle().await;
            cycles += 1;
            if !scheduler.wait_next().await {
                break;
            }
        }
        info!(cycles, "trader loop stopped");
        cycles
    }

    /// One full cycle.  Never fails: errors are logged and recorded in the
    /// report, and the lifecycle is left in a stable state.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        if let Err(e) = self.step(&mut report).await {
            if e.is_cycle_local() {
                warn!(event = "error", kind = e.kind(), "cycle skipped: {e}");
            } else {
                error!(event = "error", kind = e.kind(), "cycle aborted: {e}");
            }
            report.error = Some(e);
        }
        report.state = self.state.lifecycle.state().name();
        report
    }

    async fn step(&mut self, report: &mut CycleReport) -> EngineResult<()> {
        // ── Market data and indicators ───────────────────────────────────
        let fetch = self.market.get_recent_candles(&self.symbol, &self.interval, self.candle_limit);
        let Some(candles) = until_shutdown(&self.shutdown, fetch).await else {
            info!("shutdown requested during market data fetch; cycle abandoned");
            report.cancelled = true;
            return Ok(());
        };
        let candles = candles?;
        let window = self.indicators.latest(&candles)?;
        let (Some((previous, current)), Some(last)) = (window.pair(), candles.last()) else {
            return Err(EngineError::InsufficientData {
                have: candles.len(),
                need: self.indicators.params().required_candles(),
            });
        };
        let price = last.close;
        report.price = Some(price);

        let signal = self.detector.detect(previous, current, last.volume);
        report.signal = signal;
        if !signal.is_none() {
            info!(
                event = "signal_detected",
                signal = ?signal,
                price,
                ema_fast = current.ema_fast,
                ema_slow = current.ema_slow,
                macd_hist = current.macd_hist,
                volume = last.volume,
                volume_sma = current.volume_sma,
                "signal detected"
            );
        }

        // ── Exits first ──────────────────────────────────────────────────
        if let Some(reason) = self.state.lifecycle.evaluate_exit(price, signal) {
            self.close(reason, price, report).await?;
            self.log_status(price, signal);
            return Ok(());
        }

        // ── Account ──────────────────────────────────────────────────────
        let Some(account) = until_shutdown(&self.shutdown, self.account.get_balance()).await else {
            info!("shutdown requested during balance refresh; entry skipped");
            report.cancelled = true;
            return Ok(());
        };
        let account = account?;
        self.state.account = account;
        if self.state.stats.n_trades == 0 && self.state.lifecycle.is_flat() {
            // Equity baseline is the balance seen before the first trade.
            self.state.stats = SessionStats::new(account.balance);
        }

        // ── Entry ────────────────────────────────────────────────────────
        let balance = self.state.account.balance;
        let sizer = &self.sizer;
        match self.state.lifecycle.consider_entry(signal, |side| sizer.size(balance, price, side)) {
            Ok(Some(plan)) => {
                report.transitions.push(Transition::EntrySubmitted(plan.side));
                info!(
                    event = "entry_submitted",
                    side = plan.side.as_str(),
                    quantity = plan.quantity,
                    price = plan.entry_price_hint,
                    take_profit = plan.take_profit_price,
                    hard_stop = plan.hard_stop_price,
                    margin = plan.required_margin,
                    "submitting entry"
                );
                self.open(plan.side, plan.quantity, report).await?;
            }
            Ok(None) => {}
            Err(e) if e.is_cycle_local() => {
                info!(event = "entry_skipped", reason = e.kind(), signal = ?signal, "{e}");
                report.error = Some(e);
            }
            Err(e) => return Err(e),
        }

        self.log_status(price, signal);
        Ok(())
    }

    async fn open(&mut self, side: Side, quantity: f64, report: &mut CycleReport) -> EngineResult<()> {
        match self.orders.open_position(side, quantity, OrderType::Market).await {
            Ok(fill) if fill.filled && fill.fill_price > 0.0 && fill.quantity > 0.0 => {
                if (fill.quantity - quantity).abs() > 1e-9 {
                    warn!(requested = quantity, executed = fill.quantity, "executed quantity differs from plan");
                }
                let position = self.state.lifecycle.confirm_fill(fill.fill_price, fill.quantity, Utc::now())?;
                report.transitions.push(Transition::Opened { side, entry_price: position.entry_price });
                info!(
                    event = "position_opened",
                    side = side.as_str(),
                    entry_price = position.entry_price,
                    quantity = position.quantity,
                    take_profit = position.take_profit_price,
                    hard_stop = position.hard_stop_price,
                    "position opened"
                );
                Ok(())
            }
            Ok(_) => {
                self.state.lifecycle.reject_entry()?;
                report.transitions.push(Transition::EntryRejected);
                warn!(side = side.as_str(), "entry not filled; back to FLAT");
                Ok(())
            }
            Err(e) => {
                self.state.lifecycle.reject_entry()?;
                report.transitions.push(Transition::EntryRejected);
                Err(e)
            }
        }
    }

    async fn close(&mut self, reason: ExitReason, price: f64, report: &mut CycleReport) -> EngineResult<()> {
        let position = self.state.lifecycle.begin_close(reason)?;
        report.transitions.push(Transition::Closing(reason));
        info!(
            reason = reason.as_str(),
            side = position.side.as_str(),
            price,
            "closing position"
        );

        match self.orders.close_position().await {
            Ok(close) if close.closed => {
                // Some venues report no price when the position was already gone.
                let exit_price = if close.close_price > 0.0 { close.close_price } else { price };
                let trade = self.state.lifecycle.confirm_close(exit_price, Utc::now())?;
                self.state.stats.record(&trade);
                report.transitions.push(Transition::Closed { reason, pnl: trade.realized_pnl });
                info!(
                    event = "position_closed",
                    reason = reason.as_str(),
                    side = trade.side.as_str(),
                    entry_price = trade.entry_price,
                    exit_price = trade.exit_price,
                    pnl = trade.realized_pnl,
                    session_pnl = self.state.stats.cumulative_pnl,
                    trades = self.state.stats.n_trades,
                    win_rate = self.state.stats.win_rate(),
                    "position closed"
                );
                Ok(())
            }
            Ok(_) => {
                self.state.lifecycle.close_failed()?;
                report.transitions.push(Transition::CloseFailed);
                warn!(reason = reason.as_str(), "close not confirmed; position remains OPEN");
                Ok(())
            }
            Err(e) => {
                self.state.lifecycle.close_failed()?;
                report.transitions.push(Transition::CloseFailed);
                Err(e)
            }
        }
    }

    fn log_status(&self, price: f64, signal: Signal) {
        let state = self.state.lifecycle.state().name();
        match self.state.lifecycle.position() {
            Some(position) => {
                let m = RiskMetrics::for_position(position, price, self.state.account.leverage);
                info!(
                    state,
                    side = position.side.as_str(),
                    price,
                    unrealized_pnl = m.unrealized_pnl,
                    pnl_pct = m.pnl_pct,
                    to_take_profit = m.distance_to_tp,
                    to_hard_stop = m.distance_to_sl,
                    balance = self.state.account.balance,
                    "status"
                );
            }
            None => {
                info!(state, price, signal = ?signal, balance = self.state.account.balance, "status");
            }
        }
        debug!(session_pnl = self.state.stats.cumulative_pnl, trades = self.state.stats.n_trades);
    }
}

/// `None` when shutdown wins.  Only for calls that change nothing on the
/// exchange.
async fn until_shutdown<T, F>(shutdown: &CancellationToken, call: F) -> Option<T>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => None,
        out = call => Some(out),
    }
}
