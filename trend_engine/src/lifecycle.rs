//! lifecycle.rs: Single-position state machine
//!
//! ```text
//!     FLAT ──entry──▶ PENDING_ENTRY ──fill──▶ OPEN ──exit──▶ CLOSING ──close──▶ FLAT
//!                          │                    ▲                │
//!                          └──reject──▶ FLAT    └──close failed──┘
//! ```
//!
//! Exit priority each evaluation, first match wins:
//!   1. hard stop   2. take profit   3. reverse signal
//!
//! Entries are considered only while FLAT; in every other state a signal is a
//! no-op and the sizer is never called.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{EngineError, EngineResult};
use crate::models::{ClosedTrade, ExitReason, Position, RiskPlan, Side, Signal};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub enum LifecycleState {
    #[default]
    Flat,
    PendingEntry { plan: RiskPlan },
    Open { position: Position },
    Closing { position: Position, reason: ExitReason },
}

impl LifecycleState {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleState::Flat => "FLAT",
            LifecycleState::PendingEntry { .. } => "PENDING_ENTRY",
            LifecycleState::Open { .. } => "OPEN",
            LifecycleState::Closing { .. } => "CLOSING",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PositionLifecycle {
    state: LifecycleState,
}

impl PositionLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an injected state (recovery, tests).
    pub fn with_state(state: LifecycleState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    pub fn is_flat(&self) -> bool {
        matches!(self.state, LifecycleState::Flat)
    }

    /// The position while OPEN or CLOSING.
    pub fn position(&self) -> Option<&Position> {
        match &self.state {
            LifecycleState::Open { position } | LifecycleState::Closing { position, .. } => Some(position),
            _ => None,
        }
    }

    /// FLAT + non-NONE signal → size → PENDING_ENTRY.
    ///
    /// Returns `Ok(None)` without calling `size` when not FLAT or when the
    /// signal is NONE.  A sizing error leaves the state FLAT.
    pub fn consider_entry<F>(&mut self, signal: Signal, size: F) -> EngineResult<Option<RiskPlan>>
    where
        F: FnOnce(Side) -> EngineResult<RiskPlan>,
    {
        let Some(side) = signal.side() else {
            return Ok(None);
        };
        if !self.is_flat() {
            return Ok(None);
        }
        let plan = size(side)?;
        self.state = LifecycleState::PendingEntry { plan };
        Ok(Some(plan))
    }

    /// PENDING_ENTRY → OPEN on a confirmed fill.
    ///
    /// The position holds the executed quantity, not the planned one.
    /// Take-profit and hard-stop keep the plan's price distances, measured
    /// from the actual fill price.
    pub fn confirm_fill(
        &mut self,
        fill_price:      f64,
        filled_quantity: f64,
        opened_at:       DateTime<Utc>,
    ) -> EngineResult<Position> {
        let LifecycleState::PendingEntry { plan } = self.state else {
            return Err(self.invalid("confirm_fill"));
        };
        if !(filled_quantity > 0.0) {
            return Err(EngineError::InvalidSizing(format!("filled quantity {filled_quantity}")));
        }
        let offset = fill_price - plan.entry_price_hint;
        let position = Position {
            side:              plan.side,
            entry_price:       fill_price,
            quantity:          filled_quantity,
            take_profit_price: plan.take_profit_price + offset,
            hard_stop_price:   plan.hard_stop_price + offset,
            opened_at,
        };
        self.state = LifecycleState::Open { position: position.clone() };
        Ok(position)
    }

    /// PENDING_ENTRY → FLAT on rejection or timeout.  The plan is dropped.
    pub fn reject_entry(&mut self) -> EngineResult<RiskPlan> {
        let LifecycleState::PendingEntry { plan } = self.state else {
            return Err(self.invalid("reject_entry"));
        };
        self.state = LifecycleState::Flat;
        Ok(plan)
    }

    /// Pure exit check for an OPEN position.  `None` in any other state.
    pub fn evaluate_exit(&self, price: f64, signal: Signal) -> Option<ExitReason> {
        match &self.state {
            LifecycleState::Open { position } => exit_reason(position, price, signal),
            _ => None,
        }
    }

    /// OPEN → CLOSING, recording the reason.
    pub fn begin_close(&mut self, reason: ExitReason) -> EngineResult<Position> {
        let LifecycleState::Open { position } = &self.state else {
            return Err(self.invalid("begin_close"));
        };
        let position = position.clone();
        self.state = LifecycleState::Closing { position: position.clone(), reason };
        Ok(position)
    }

    /// CLOSING → FLAT on a confirmed close.  The position is discarded.
    pub fn confirm_close(&mut self, close_price: f64, closed_at: DateTime<Utc>) -> EngineResult<ClosedTrade> {
        let LifecycleState::Closing { position, reason } = &self.state else {
            return Err(self.invalid("confirm_close"));
        };
        let trade = ClosedTrade {
            side:         position.side,
            entry_price:  position.entry_price,
            exit_price:   close_price,
            quantity:     position.quantity,
            realized_pnl: position.unrealized_pnl(close_price),
            reason:       *reason,
            opened_at:    position.opened_at,
            closed_at,
        };
        self.state = LifecycleState::Flat;
        Ok(trade)
    }

    /// CLOSING → OPEN when the close was not confirmed.
    pub fn close_failed(&mut self) -> EngineResult<Position> {
        let LifecycleState::Closing { position, .. } = &self.state else {
            return Err(self.invalid("close_failed"));
        };
        let position = position.clone();
        self.state = LifecycleState::Open { position: position.clone() };
        Ok(position)
    }

    fn invalid(&self, event: &'static str) -> EngineError {
        EngineError::InvalidTransition { state: self.state.name(), event }
    }
}

/// Hard stop first, then take profit, then a reverse signal.
///
/// Touching a level counts: a price exactly at `hard_stop_price` or
/// `take_profit_price` triggers that exit.
pub fn exit_reason(position: &Position, price: f64, signal: Signal) -> Option<ExitReason> {
    let sign = position.side.sign();
    if (price - position.hard_stop_price) * sign <= 0.0 {
        return Some(ExitReason::HardStop);
    }
    if (price - position.take_profit_price) * sign >= 0.0 {
        return Some(ExitReason::TakeProfit);
    }
    if signal.side() == Some(position.side.opposite()) {
        return Some(ExitReason::ReverseSignal);
    }
    None
}
