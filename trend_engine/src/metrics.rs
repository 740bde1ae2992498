/// metrics.rs: Session statistics over closed trades
///
/// ─────────────────────────────────────────────────────────────────────────
/// DEFINITIONS
/// ─────────────────────────────────────────────────────────────────────────
///
/// WIN RATE
///   P_win = count(realised_pnl > 0) / N_trades
///
/// REALISED EQUITY CURVE
///   E_0 = starting balance
///   E_i = E_{i-1} + pnl_i          (one point per closed trade)
///
/// MAXIMUM DRAWDOWN
///   Running peak: peak_t = max_{s ≤ t}(E_s)
///   Drawdown at t: DD_t = (E_t − peak_t) / peak_t
///   MaxDD = min_{t}(DD_t)   (most negative)
/// ─────────────────────────────────────────────────────────────────────────

use crate::models::ClosedTrade;

#[derive(Debug, Clone)]
pub struct SessionStats {
    pub n_trades:       usize,
    pub wins:           usize,
    pub cumulative_pnl: f64,
    pub best_trade:     f64,
    pub worst_trade:    f64,
    starting_balance:   f64,
    equity_curve:       Vec<f64>,
}

impl SessionStats {
    pub fn new(starting_balance: f64) -> Self {
        Self {
            n_trades:       0,
            wins:           0,
            cumulative_pnl: 0.0,
            best_trade:     0.0,
            worst_trade:    0.0,
            starting_balance,
            equity_curve:   vec![starting_balance],
        }
    }

    pub fn record(&mut self, trade: &ClosedTrade) {
        let pnl = trade.realized_pnl;
        if self.n_trades == 0 {
            self.best_trade = pnl;
            self.worst_trade = pnl;
        } else {
            self.best_trade = self.best_trade.max(pnl);
            self.worst_trade = self.worst_trade.min(pnl);
        }
        self.n_trades += 1;
        if pnl > 0.0 {
            self.wins += 1;
        }
        self.cumulative_pnl += pnl;
        self.equity_curve.push(self.starting_balance + self.cumulative_pnl);
    }

    pub fn win_rate(&self) -> f64 {
        if self.n_trades == 0 {
            return 0.0;
        }
        self.wins as f64 / self.n_trades as f64
    }

    pub fn equity(&self) -> f64 {
        self.starting_balance + self.cumulative_pnl
    }

    /// Fraction, ≤ 0.
    pub fn max_drawdown(&self) -> f64 {
        max_drawdown(&self.equity_curve)
    }

    pub fn equity_curve(&self) -> &[f64] {
        &self.equity_curve
    }
}

impl std::fmt::Display for SessionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "════════════════════════════════════════════")?;
        writeln!(f, "  TREND ENGINE: SESSION REPORT")?;
        writeln!(f, "════════════════════════════════════════════")?;
        writeln!(f, "  Trades         : {}", self.n_trades)?;
        writeln!(f, "  Wins           : {}", self.wins)?;
        writeln!(f, "  Win Rate       : {:.2}%", self.win_rate() * 100.0)?;
        writeln!(f, "  Realised P&L   : ${:.2}", self.cumulative_pnl)?;
        writeln!(f, "  Best Trade     : ${:.2}", self.best_trade)?;
        writeln!(f, "  Worst Trade    : ${:.2}", self.worst_trade)?;
        writeln!(f, "  Max Drawdown   : {:.2}%", self.max_drawdown() * 100.0)?;
        writeln!(f, "  Start Equity   : ${:.2}", self.starting_balance)?;
        writeln!(f, "  End Equity     : ${:.2}", self.equity())?;
        writeln!(f, "════════════════════════════════════════════")
    }
}

/// Maximum drawdown from an equity curve.
/// Returns a negative value (e.g. −0.15 = −15% drawdown).
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let Some(&first) = equity_curve.first() else {
        return 0.0;
    };
    let mut peak = first;
    let mut max_dd = 0.0f64;

    for &e in equity_curve {
        if e > peak {
            peak = e;
        }
        if peak <= 0.0 {
            continue;
        }
        let dd = (e - peak) / peak;
        if dd < max_dd {
            max_dd = dd;
        }
    }
    max_dd
}
