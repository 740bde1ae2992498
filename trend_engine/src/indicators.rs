//! indicators.rs: EMA / MACD / volume-SMA engine
//!
//! ─────────────────────────────────────────────────────────────────────────
//! MATHEMATICAL SPECIFICATION
//! ─────────────────────────────────────────────────────────────────────────
//!
//! EMA(period), seeded with a simple average:
//!
//! ```text
//!     EMA_{p-1} = (1/p) · Σ_{i=0}^{p-1} close_i
//!     EMA_t     = close_t · k + EMA_{t-1} · (1 − k),   k = 2 / (p + 1)
//! ```
//!
//! MACD:
//!     line_t   = EMA_fast(close)_t − EMA_slow(close)_t
//!     signal_t = EMA_signal(line)_t        (same seeding over the line series)
//!     hist_t   = line_t − signal_t
//!
//! Volume SMA(w):
//!     vsma_t = (1/w) · Σ_{i=t-w+1}^{t} volume_i
//!
//! A snapshot exists for bar t only when every series above is defined at t.
//! ─────────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::models::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorParams {
    pub ema_fast:      usize,
    pub ema_slow:      usize,
    pub macd_fast:     usize,
    pub macd_slow:     usize,
    pub macd_signal:   usize,
    pub volume_window: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            ema_fast:      12,
            ema_slow:      26,
            macd_fast:     12,
            macd_slow:     26,
            macd_signal:   9,
            volume_window: 20,
        }
    }
}

impl IndicatorParams {
    /// Minimum number of candles `compute` accepts.
    ///
    /// `max(ema_slow, macd_slow + macd_signal, volume_window) + 1`; the fast
    /// periods are included so unvalidated params can never index out of range.
    pub fn required_candles(&self) -> usize {
        self.ema_fast
            .max(self.ema_slow)
            .max(self.macd_fast)
            .max(self.macd_slow + self.macd_signal)
            .max(self.volume_window)
            + 1
    }

    pub fn validate(&self) -> EngineResult<()> {
        let periods = [
            ("ema_fast", self.ema_fast),
            ("ema_slow", self.ema_slow),
            ("macd_fast", self.macd_fast),
            ("macd_slow", self.macd_slow),
            ("macd_signal", self.macd_signal),
            ("volume_window", self.volume_window),
        ];
        if let Some((name, _)) = periods.iter().find(|(_, p)| *p == 0) {
            return Err(EngineError::Config(format!("{name} must be at least 1")));
        }
        if self.ema_fast >= self.ema_slow {
            return Err(EngineError::Config(format!(
                "ema_fast ({}) must be shorter than ema_slow ({})",
                self.ema_fast, self.ema_slow
            )));
        }
        if self.macd_fast >= self.macd_slow {
            return Err(EngineError::Config(format!(
                "macd_fast ({}) must be shorter than macd_slow ({})",
                self.macd_fast, self.macd_slow
            )));
        }
        Ok(())
    }
}

/// Indicator values for one bar.  Never mutated after creation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub open_time:   i64,
    pub ema_fast:    f64,
    pub ema_slow:    f64,
    pub macd_line:   f64,
    pub macd_signal: f64,
    pub macd_hist:   f64,
    pub volume_sma:  f64,
}

impl IndicatorSnapshot {
    /// `ema_fast − ema_slow`; its sign change is the crossover.
    pub fn ema_spread(&self) -> f64 {
        self.ema_fast - self.ema_slow
    }
}

/// Previous and current snapshot: everything the detector depends on.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SnapshotWindow {
    previous: Option<IndicatorSnapshot>,
    current:  Option<IndicatorSnapshot>,
}

impl SnapshotWindow {
    pub fn push(&mut self, snapshot: IndicatorSnapshot) {
        self.previous = self.current.replace(snapshot);
    }

    pub fn current(&self) -> Option<&IndicatorSnapshot> {
        self.current.as_ref()
    }

    /// `(previous, current)` once two snapshots have been pushed.
    pub fn pair(&self) -> Option<(&IndicatorSnapshot, &IndicatorSnapshot)> {
        Some((self.previous.as_ref()?, self.current.as_ref()?))
    }
}

#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    params: IndicatorParams,
}

impl IndicatorEngine {
    pub fn new(params: IndicatorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &IndicatorParams {
        &self.params
    }

    /// Index into `candles` of the first returned snapshot.
    pub fn first_index(&self) -> usize {
        let p = &self.params;
        let line_start = p.macd_fast.max(p.macd_slow) - 1;
        (p.ema_fast - 1)
            .max(p.ema_slow - 1)
            .max(line_start + p.macd_signal - 1)
            .max(p.volume_window - 1)
    }

    /// Snapshots for `candles[first_index()..]`, one per candle.
    ///
    /// Fails with `InsufficientData` below `required_candles()`; nothing is
    /// computed in that case.
    pub fn compute(&self, candles: &[Candle]) -> EngineResult<Vec<IndicatorSnapshot>> {
        let p = &self.params;
        p.validate()?;
        let need = p.required_candles();
        if candles.len() < need {
            return Err(EngineError::InsufficientData { have: candles.len(), need });
        }

        let closes:  Vec<f64> = candles.iter().map(|c| c.close).collect();
        let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();

        let ema_fast = ema(&closes, p.ema_fast);
        let ema_slow = ema(&closes, p.ema_slow);
        let vol_sma  = sma(&volumes, p.volume_window);

        // MACD line is defined from the later of its two EMA starts.
        let mf = ema(&closes, p.macd_fast);
        let ms = ema(&closes, p.macd_slow);
        let line_start = p.macd_fast.max(p.macd_slow) - 1;
        let macd_line: Vec<f64> = (line_start..closes.len())
            .map(|i| mf[i + 1 - p.macd_fast] - ms[i + 1 - p.macd_slow])
            .collect();
        let macd_signal = ema(&macd_line, p.macd_signal);

        let first = self.first_index();
        let snapshots = (first..candles.len())
            .map(|i| {
                let line   = macd_line[i - line_start];
                let signal = macd_signal[i - line_start + 1 - p.macd_signal];
                IndicatorSnapshot {
                    open_time:   candles[i].open_time,
                    ema_fast:    ema_fast[i + 1 - p.ema_fast],
                    ema_slow:    ema_slow[i + 1 - p.ema_slow],
                    macd_line:   line,
                    macd_signal: signal,
                    macd_hist:   line - signal,
                    volume_sma:  vol_sma[i + 1 - p.volume_window],
                }
            })
            .collect();
        Ok(snapshots)
    }

    /// Last two snapshots only.
    pub fn latest(&self, candles: &[Candle]) -> EngineResult<SnapshotWindow> {
        let snapshots = self.compute(candles)?;
        let mut window = SnapshotWindow::default();
        for s in snapshots.iter().skip(snapshots.len().saturating_sub(2)) {
            window.push(*s);
        }
        Ok(window)
    }
}

/// EMA seeded with the SMA of the first `period` values.
///
/// `out[j]` is the EMA at `values[j + period - 1]`.  Empty when
/// `values.len() < period`.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    let k = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;

    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(seed);
    let mut prev = seed;
    for &x in &values[period..] {
        prev = x * k + prev * (1.0 - k);
        out.push(prev);
    }
    out
}

/// Simple moving average; `out[j]` covers `values[j..j + window]`.
pub fn sma(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || values.len() < window {
        return Vec::new();
    }
    values
        .windows(window)
        .map(|w| w.iter().sum::<f64>() / window as f64)
        .collect()
}
