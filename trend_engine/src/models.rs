use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV bar.  `open_time` is Unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open:      f64,
    pub high:      f64,
    pub low:       f64,
    pub close:     f64,
    pub volume:    f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, −1 for short.  Multiplies a price move into P&L direction.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// Binance order side that opens this position.
    pub fn entry_order_side(self) -> &'static str {
        match self {
            Side::Long => "BUY",
            Side::Short => "SELL",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Long => "LONG",
            Side::Short => "SHORT",
        }
    }
}

/// Output of the signal detector.  `None` is the no-action default.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Long,
    Short,
    #[default]
    None,
}

impl Signal {
    pub fn side(self) -> Option<Side> {
        match self {
            Signal::Long => Some(Side::Long),
            Signal::Short => Some(Side::Short),
            Signal::None => None,
        }
    }

    pub fn is_none(self) -> bool {
        self == Signal::None
    }
}

/// Sizing result for one candidate entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskPlan {
    pub side:              Side,
    pub quantity:          f64,
    pub entry_price_hint:  f64,
    pub take_profit_price: f64,
    pub hard_stop_price:   f64,
    pub required_margin:   f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub side:              Side,
    pub entry_price:       f64,
    pub quantity:          f64,
    pub take_profit_price: f64,
    pub hard_stop_price:   f64,
    pub opened_at:         DateTime<Utc>,
}

impl Position {
    /// Unrealised P&L at `price`.  Leverage does not scale per-unit P&L.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.quantity * self.side.sign()
    }

    pub fn notional(&self) -> f64 {
        self.entry_price * self.quantity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AccountState {
    pub balance:  f64,
    pub leverage: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    HardStop,
    TakeProfit,
    ReverseSignal,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::HardStop => "hard_stop",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::ReverseSignal => "reverse_signal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Market,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
        }
    }
}

/// Outcome of an entry order.  `filled == false` means nothing executed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderResult {
    pub filled:     bool,
    pub fill_price: f64,
    /// Quantity actually executed; may differ from the requested size.
    pub quantity:   f64,
}

/// Outcome of a close order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloseResult {
    pub closed:      bool,
    pub close_price: f64,
}

/// A position after its close was confirmed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedTrade {
    pub side:         Side,
    pub entry_price:  f64,
    pub exit_price:   f64,
    pub quantity:     f64,
    pub realized_pnl: f64,
    pub reason:       ExitReason,
    pub opened_at:    DateTime<Utc>,
    pub closed_at:    DateTime<Utc>,
}
