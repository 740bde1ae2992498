//! strategy.rs: EMA crossover confirmed by MACD momentum and volume
//!
//! Three conditions, each necessary:
//!   1. Crossover   sign(ema_fast − ema_slow) flips between previous and current
//!   2. Momentum    hist > 0, hist rising, line > signal   (mirrored for bearish)
//!   3. Volume      current volume > multiplier × volume SMA
//!
//! LONG  = bullish cross ∧ bullish momentum ∧ volume
//! SHORT = bearish cross ∧ bearish momentum ∧ volume

use serde::Serialize;
use tracing::warn;

use crate::indicators::IndicatorSnapshot;
use crate::models::Signal;

pub const DEFAULT_VOLUME_MULTIPLIER: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Crossover {
    Bullish,
    Bearish,
    None,
}

/// Per-condition breakdown of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignalCheck {
    pub crossover:         Crossover,
    pub bullish_momentum:  bool,
    pub bearish_momentum:  bool,
    pub volume_confirmed:  bool,
    pub signal:            Signal,
}

#[derive(Debug, Clone)]
pub struct SignalDetector {
    volume_multiplier: f64,
}

impl Default for SignalDetector {
    fn default() -> Self {
        Self::new(DEFAULT_VOLUME_MULTIPLIER)
    }
}

impl SignalDetector {
    pub fn new(volume_multiplier: f64) -> Self {
        Self { volume_multiplier }
    }

    pub fn detect(
        &self,
        previous:       &IndicatorSnapshot,
        current:        &IndicatorSnapshot,
        current_volume: f64,
    ) -> Signal {
        self.evaluate(previous, current, current_volume).signal
    }

    /// Same as `detect` but keeps each condition for diagnostics.
    pub fn evaluate(
        &self,
        previous:       &IndicatorSnapshot,
        current:        &IndicatorSnapshot,
        current_volume: f64,
    ) -> SignalCheck {
        let crossover = crossover(previous, current);
        let bullish_momentum = bullish_momentum(previous, current);
        let bearish_momentum = bearish_momentum(previous, current);
        let volume_confirmed = current_volume > self.volume_multiplier * current.volume_sma;

        let long  = crossover == Crossover::Bullish && bullish_momentum && volume_confirmed;
        let short = crossover == Crossover::Bearish && bearish_momentum && volume_confirmed;

        let signal = resolve(long, short, current.open_time);
        SignalCheck {
            crossover,
            bullish_momentum,
            bearish_momentum,
            volume_confirmed,
            signal,
        }
    }
}

/// Both directions at once cannot happen; if it does, take no side.
fn resolve(long: bool, short: bool, open_time: i64) -> Signal {
    match (long, short) {
        (true, true) => {
            warn!(
                event = "consistency_violation",
                open_time,
                "LONG and SHORT both confirmed on the same bar; treating as NONE"
            );
            Signal::None
        }
        (true, false) => Signal::Long,
        (false, true) => Signal::Short,
        (false, false) => Signal::None,
    }
}

/// Strict sign flip of `ema_fast − ema_slow`.  A zero spread on either bar is no cross.
pub fn crossover(previous: &IndicatorSnapshot, current: &IndicatorSnapshot) -> Crossover {
    let before = previous.ema_spread();
    let after  = current.ema_spread();
    if before < 0.0 && after > 0.0 {
        Crossover::Bullish
    } else if before > 0.0 && after < 0.0 {
        Crossover::Bearish
    } else {
        Crossover::None
    }
}

fn bullish_momentum(previous: &IndicatorSnapshot, current: &IndicatorSnapshot) -> bool {
    current.macd_hist > 0.0
        && current.macd_hist > previous.macd_hist
        && current.macd_line > current.macd_signal
}

fn bearish_momentum(previous: &IndicatorSnapshot, current: &IndicatorSnapshot) -> bool {
    current.macd_hist < 0.0
        && current.macd_hist < previous.macd_hist
        && current.macd_line < current.macd_signal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{IndicatorEngine, IndicatorParams};
    use crate::models::Candle;

    fn snap(ema_fast: f64, ema_slow: f64, line: f64, signal: f64) -> IndicatorSnapshot {
        IndicatorSnapshot {
            open_time:   0,
            ema_fast,
            ema_slow,
            macd_line:   line,
            macd_signal: signal,
            macd_hist:   line - signal,
            volume_sma:  100.0,
        }
    }

    fn bullish_pair() -> (IndicatorSnapshot, IndicatorSnapshot) {
        (snap(99.0, 100.0, 0.5, 0.4), snap(101.0, 100.0, 1.0, 0.6))
    }

    fn bearish_pair() -> (IndicatorSnapshot, IndicatorSnapshot) {
        (snap(101.0, 100.0, -0.5, -0.4), snap(99.0, 100.0, -1.0, -0.6))
    }

    #[test]
    fn long_when_all_three_hold() {
        let (prev, cur) = bullish_pair();
        assert_eq!(SignalDetector::default().detect(&prev, &cur, 121.0), Signal::Long);
    }

    #[test]
    fn short_when_all_three_hold() {
        let (prev, cur) = bearish_pair();
        assert_eq!(SignalDetector::default().detect(&prev, &cur, 121.0), Signal::Short);
    }

    #[test]
    fn removing_crossover_gives_none() {
        let (_, cur) = bullish_pair();
        let prev = snap(100.5, 100.0, 0.5, 0.4); // already above
        assert_eq!(SignalDetector::default().detect(&prev, &cur, 121.0), Signal::None);
    }

    #[test]
    fn removing_momentum_gives_none() {
        let (prev, _) = bullish_pair();
        // hist positive but falling relative to previous
        let cur = snap(101.0, 100.0, 0.45, 0.4);
        assert!(cur.macd_hist < prev.macd_hist);
        assert_eq!(SignalDetector::default().detect(&prev, &cur, 121.0), Signal::None);

        // line below signal
        let cur = snap(101.0, 100.0, -0.2, -0.1);
        assert_eq!(SignalDetector::default().detect(&prev, &cur, 121.0), Signal::None);
    }

    #[test]
    fn removing_volume_gives_none() {
        let (prev, cur) = bullish_pair();
        let detector = SignalDetector::default();
        // exactly 1.2 × SMA is not above it
        assert_eq!(detector.detect(&prev, &cur, 120.0), Signal::None);
        assert_eq!(detector.detect(&prev, &cur, 90.0), Signal::None);
    }

    #[test]
    fn zero_spread_is_not_a_cross() {
        let (_, cur) = bullish_pair();
        let prev = snap(100.0, 100.0, 0.5, 0.4);
        assert_eq!(crossover(&prev, &cur), Crossover::None);
        let (prev, _) = bullish_pair();
        let flat = snap(100.0, 100.0, 1.0, 0.6);
        assert_eq!(crossover(&prev, &flat), Crossover::None);
    }

    #[test]
    fn evaluate_reports_each_condition() {
        let (prev, cur) = bullish_pair();
        let check = SignalDetector::default().evaluate(&prev, &cur, 50.0);
        assert_eq!(check.crossover, Crossover::Bullish);
        assert!(check.bullish_momentum);
        assert!(!check.bearish_momentum);
        assert!(!check.volume_confirmed);
        assert_eq!(check.signal, Signal::None);
    }

    #[test]
    fn conflicting_directions_resolve_to_none() {
        assert_eq!(resolve(true, true, 0), Signal::None);
        assert_eq!(resolve(true, false, 0), Signal::Long);
        assert_eq!(resolve(false, true, 0), Signal::Short);
    }

    #[test]
    fn custom_multiplier_is_respected() {
        let (prev, cur) = bullish_pair();
        let detector = SignalDetector::new(2.0);
        assert_eq!(detector.detect(&prev, &cur, 150.0), Signal::None);
        assert_eq!(detector.detect(&prev, &cur, 201.0), Signal::Long);
    }

    /// Downtrend followed by a sharp rally; volume spikes on the crossover bar.
    fn v_reversal(spike: bool) -> (Vec<Candle>, usize) {
        let mut closes = Vec::new();
        for i in 0..60 {
            closes.push(200.0 - i as f64 * 0.5);
        }
        let bottom = *closes.last().unwrap();
        for i in 1..=30 {
            closes.push(bottom + i as f64 * 3.0);
        }
        let mut candles: Vec<Candle> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle {
                open_time: i as i64 * 60_000,
                open: c, high: c, low: c, close: c,
                volume: 100.0,
            })
            .collect();

        let engine = IndicatorEngine::new(IndicatorParams::default());
        let snaps = engine.compute(&candles).unwrap();
        let first = engine.first_index();
        let k = (1..snaps.len())
            .find(|&j| crossover(&snaps[j - 1], &snaps[j]) == Crossover::Bullish)
            .expect("series crosses up")
            + first;
        if spike {
            candles[k].volume = 1_000.0;
        }
        (candles, k)
    }

    #[test]
    fn synthetic_reversal_fires_long_on_cross_bar() {
        let (candles, k) = v_reversal(true);
        let engine = IndicatorEngine::new(IndicatorParams::default());
        let window = engine.latest(&candles[..=k]).unwrap();
        let (prev, cur) = window.pair().unwrap();
        let check = SignalDetector::default().evaluate(prev, cur, candles[k].volume);
        assert_eq!(check.crossover, Crossover::Bullish);
        assert!(check.bullish_momentum, "{check:?}");
        assert!(check.volume_confirmed);
        assert_eq!(check.signal, Signal::Long);
    }

    #[test]
    fn synthetic_reversal_without_volume_is_none() {
        let (candles, k) = v_reversal(false);
        let engine = IndicatorEngine::new(IndicatorParams::default());
        let window = engine.latest(&candles[..=k]).unwrap();
        let (prev, cur) = window.pair().unwrap();
        assert_eq!(SignalDetector::default().detect(prev, cur, candles[k].volume), Signal::None);
    }
}
