//! risk.rs: Profit-target position sizing
//!
//! Unrealised P&L = price move × quantity, independent of leverage.  So to
//! earn `profit_target_usd` on an assumed move of `assumed_move_pct`:
//!
//! ```text
//!     quantity        = profit_target_usd / (price · assumed_move_pct)
//!     required_margin = quantity · price / leverage
//!     take_profit     = price ± profit_target_usd / quantity
//!     hard_stop       = price ∓ hard_stop_usd / quantity
//! ```
//!
//! A plan whose margin exceeds the balance is refused, never shrunk: a smaller
//! position would miss the target.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::models::{Position, RiskPlan, Side};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskParams {
    pub leverage:          u32,
    pub profit_target_usd: f64,
    /// Emergency loss threshold; expected to be ≫ `profit_target_usd`.
    pub hard_stop_usd:     f64,
    pub assumed_move_pct:  f64,
}

#[derive(Debug, Clone)]
pub struct RiskSizer {
    params: RiskParams,
}

impl RiskSizer {
    pub fn new(params: RiskParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &RiskParams {
        &self.params
    }

    pub fn size(&self, balance: f64, price: f64, side: Side) -> EngineResult<RiskPlan> {
        let p = &self.params;
        size_position(
            balance,
            price,
            p.leverage,
            p.profit_target_usd,
            p.hard_stop_usd,
            p.assumed_move_pct,
            side,
        )
    }
}

pub fn size_position(
    balance:           f64,
    price:             f64,
    leverage:          u32,
    profit_target_usd: f64,
    hard_stop_usd:     f64,
    assumed_move_pct:  f64,
    side:              Side,
) -> EngineResult<RiskPlan> {
    if !(price.is_finite() && price > 0.0) {
        return Err(EngineError::InvalidSizing(format!("price must be positive, got {price}")));
    }
    if leverage == 0 {
        return Err(EngineError::InvalidSizing("leverage must be at least 1".into()));
    }
    if !(assumed_move_pct > 0.0) {
        return Err(EngineError::InvalidSizing(format!(
            "assumed_move_pct must be positive, got {assumed_move_pct}"
        )));
    }

    let quantity = profit_target_usd / (price * assumed_move_pct);
    if !(quantity.is_finite() && quantity > 0.0) {
        return Err(EngineError::InvalidSizing(format!("computed quantity {quantity} is not positive")));
    }

    let required_margin = quantity * price / leverage as f64;
    if required_margin > balance {
        return Err(EngineError::InsufficientBalance { required: required_margin, available: balance });
    }

    let sign = side.sign();
    let take_profit_price = price + sign * profit_target_usd / quantity;
    let hard_stop_price   = price - sign * hard_stop_usd / quantity;

    debug!(
        side = side.as_str(),
        quantity,
        required_margin,
        take_profit_price,
        hard_stop_price,
        "sized position"
    );

    Ok(RiskPlan {
        side,
        quantity,
        entry_price_hint: price,
        take_profit_price,
        hard_stop_price,
        required_margin,
    })
}

/// Monitoring view of an open position at the current price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskMetrics {
    pub current_price:   f64,
    pub unrealized_pnl:  f64,
    /// P&L as a percentage of the margin posted.
    pub pnl_pct:         f64,
    pub distance_to_tp:  f64,
    pub distance_to_sl:  f64,
}

impl RiskMetrics {
    pub fn for_position(position: &Position, price: f64, leverage: u32) -> Self {
        let unrealized_pnl = position.unrealized_pnl(price);
        let margin = position.notional() / leverage.max(1) as f64;
        let pnl_pct = if margin > 0.0 { unrealized_pnl / margin * 100.0 } else { 0.0 };
        Self {
            current_price: price,
            unrealized_pnl,
            pnl_pct,
            distance_to_tp: (price - position.take_profit_price).abs(),
            distance_to_sl: (price - position.hard_stop_price).abs(),
        }
    }
}
