/// config.rs: Centralised configuration loaded from .env
///
/// Every parameter the trader consumes is defined here.  Loading and
/// validation happen once at startup; components receive the projected
/// parameter structs and never read the environment themselves.
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::error::{EngineError, EngineResult};
use crate::indicators::IndicatorParams;
use crate::risk::RiskParams;
use crate::strategy::DEFAULT_VOLUME_MULTIPLIER;

pub const TESTNET_REST_URL: &str = "https://testnet.binancefuture.com";
pub const MAINNET_REST_URL: &str = "https://fapi.binance.com";

/// Binance futures leverage bounds.
pub const MAX_LEVERAGE: u32 = 125;

#[derive(Debug, Clone)]
pub struct AppConfig {
    // ── Binance credentials ───────────────────────────────────────────
    pub api_key:     String,
    pub api_secret:  String,
    pub use_testnet: bool,
    pub rest_url:    String,

    // ── Market ───────────────────────────────────────────────────────
    pub symbol:             String,
    pub kline_interval:     String,
    /// Order quantity step as decimal places (LOT_SIZE)
    pub quantity_decimals:  usize,
    /// Candles fetched per cycle
    pub candle_limit:       usize,
    pub poll_interval_secs: u64,

    // ── Mode ─────────────────────────────────────────────────────────
    /// Paper-trade against live market data
    pub enable_simulation: bool,
    /// Starting balance for simulation mode, USDT
    pub initial_balance:   f64,
    /// Directory for the simulation order log
    pub sim_order_log:     PathBuf,

    // ── Sizing ───────────────────────────────────────────────────────
    pub leverage:           u32,
    pub profit_target_usd:  f64,
    /// Emergency stop, expected to be an order of magnitude above the target
    pub hard_stop_loss_usd: f64,
    pub assumed_move_pct:   f64,

    // ── Indicators ───────────────────────────────────────────────────
    pub ema_fast:          usize,
    pub ema_slow:          usize,
    pub macd_fast:         usize,
    pub macd_slow:         usize,
    pub macd_signal:       usize,
    pub volume_window:     usize,
    pub volume_multiplier: f64,
}

impl AppConfig {
    /// Load configuration from environment variables (after dotenv).
    pub fn from_env() -> EngineResult<Self> {
        dotenv::dotenv().ok(); // ignore missing .env
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key → value source.  Missing keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> EngineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());

        let use_testnet = parse_bool(&lookup, "BINANCE_USE_TESTNET", true)?;
        let rest_url = lookup("BINANCE_FUTURES_REST_URL").unwrap_or_else(|| {
            if use_testnet { TESTNET_REST_URL.into() } else { MAINNET_REST_URL.into() }
        });

        Ok(Self {
            api_key:    text("BINANCE_API_KEY", ""),
            api_secret: text("BINANCE_API_SECRET", ""),
            use_testnet,
            rest_url,

            symbol:             text("SYMBOL", "BTCUSDT").to_uppercase(),
            kline_interval:     text("KLINE_INTERVAL", "1h"),
            quantity_decimals:  parse_env(&lookup, "QUANTITY_DECIMALS", 3usize)?,
            candle_limit:       parse_env(&lookup, "CANDLE_LIMIT", 200usize)?,
            poll_interval_secs: parse_env(&lookup, "POLL_INTERVAL_SECS", 300u64)?,

            enable_simulation: parse_bool(&lookup, "ENABLE_SIMULATION", true)?,
            initial_balance:   parse_env(&lookup, "INITIAL_BALANCE", 10_000.0)?,
            sim_order_log:     PathBuf::from(text("SIM_ORDER_LOG", "data")),

            leverage:           parse_env(&lookup, "LEVERAGE", 3u32)?,
            profit_target_usd:  parse_env(&lookup, "PROFIT_TARGET_USD", 150.0)?,
            hard_stop_loss_usd: parse_env(&lookup, "HARD_STOP_LOSS_USD", 10_000.0)?,
            assumed_move_pct:   parse_env(&lookup, "ASSUMED_MOVE_PCT", 0.005)?,

            ema_fast:          parse_env(&lookup, "EMA_FAST", 12usize)?,
            ema_slow:          parse_env(&lookup, "EMA_SLOW", 26usize)?,
            macd_fast:         parse_env(&lookup, "MACD_FAST", 12usize)?,
            macd_slow:         parse_env(&lookup, "MACD_SLOW", 26usize)?,
            macd_signal:       parse_env(&lookup, "MACD_SIGNAL", 9usize)?,
            volume_window:     parse_env(&lookup, "VOLUME_WINDOW", 20usize)?,
            volume_multiplier: parse_env(&lookup, "VOLUME_MULTIPLIER", DEFAULT_VOLUME_MULTIPLIER)?,
        })
    }

    /// Reject combinations the trader cannot run with.  Called once, before
    /// the first cycle.
    pub fn validate(&self) -> EngineResult<()> {
        let indicators = self.indicator_params();
        indicators.validate()?;

        if !(1..=MAX_LEVERAGE).contains(&self.leverage) {
            return Err(EngineError::Config(format!(
                "LEVERAGE must be within 1..={MAX_LEVERAGE}, got {}",
                self.leverage
            )));
        }
        for (key, value) in [
            ("INITIAL_BALANCE", self.initial_balance),
            ("PROFIT_TARGET_USD", self.profit_target_usd),
            ("VOLUME_MULTIPLIER", self.volume_multiplier),
        ] {
            if !(value > 0.0) || !value.is_finite() {
                return Err(EngineError::Config(format!("{key} must be positive, got {value}")));
            }
        }
        if !(self.hard_stop_loss_usd > self.profit_target_usd) {
            return Err(EngineError::Config(format!(
                "HARD_STOP_LOSS_USD ({}) must exceed PROFIT_TARGET_USD ({})",
                self.hard_stop_loss_usd, self.profit_target_usd
            )));
        }
        if !(self.assumed_move_pct > 0.0 && self.assumed_move_pct < 1.0) {
            return Err(EngineError::Config(format!(
                "ASSUMED_MOVE_PCT must be within (0, 1), got {}",
                self.assumed_move_pct
            )));
        }
        let need = indicators.required_candles();
        if self.candle_limit < need {
            return Err(EngineError::Config(format!(
                "CANDLE_LIMIT ({}) is below the indicator warm-up of {need} candles",
                self.candle_limit
            )));
        }
        if self.poll_interval_secs == 0 {
            return Err(EngineError::Config("POLL_INTERVAL_SECS must be at least 1".into()));
        }
        if !self.enable_simulation && (self.api_key.is_empty() || self.api_secret.is_empty()) {
            return Err(EngineError::Config(
                "BINANCE_API_KEY and BINANCE_API_SECRET are required when ENABLE_SIMULATION=false".into(),
            ));
        }

        if self.hard_stop_loss_usd < 10.0 * self.profit_target_usd {
            warn!(
                hard_stop = self.hard_stop_loss_usd,
                profit_target = self.profit_target_usd,
                "hard stop is less than 10x the profit target; it may trigger on normal noise"
            );
        }
        Ok(())
    }

    pub fn indicator_params(&self) -> IndicatorParams {
        IndicatorParams {
            ema_fast:      self.ema_fast,
            ema_slow:      self.ema_slow,
            macd_fast:     self.macd_fast,
            macd_slow:     self.macd_slow,
            macd_signal:   self.macd_signal,
            volume_window: self.volume_window,
        }
    }

    pub fn risk_params(&self) -> RiskParams {
        RiskParams {
            leverage:          self.leverage,
            profit_target_usd: self.profit_target_usd,
            hard_stop_usd:     self.hard_stop_loss_usd,
            assumed_move_pct:  self.assumed_move_pct,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

fn parse_env<T, F>(lookup: &F, key: &str, default: T) -> EngineResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(v) => v
            .trim()
            .parse::<T>()
            .map_err(|e| EngineError::Config(format!("Config key {key}: {e}"))),
        None => Ok(default),
    }
}

fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> EngineResult<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(EngineError::Config(format!("Config key {key}: expected true/false, got {v:?}"))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> EngineResult<AppConfig> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.symbol, "BTCUSDT");
        assert_eq!(cfg.kline_interval, "1h");
        assert_eq!(cfg.quantity_decimals, 3);
        assert_eq!(cfg.rest_url, TESTNET_REST_URL);
        assert!(cfg.enable_simulation);
        assert_eq!(cfg.leverage, 3);
        assert_eq!(cfg.indicator_params(), IndicatorParams::default());
        assert_eq!(cfg.risk_params().hard_stop_usd, 10_000.0);
        assert_eq!(cfg.poll_interval(), Duration::from_secs(300));
        cfg.validate().unwrap();
    }

    #[test]
    fn mainnet_url_follows_testnet_flag() {
        let cfg = load(&[("BINANCE_USE_TESTNET", "false")]).unwrap();
        assert_eq!(cfg.rest_url, MAINNET_REST_URL);
        let cfg = load(&[("BINANCE_USE_TESTNET", "false"), ("BINANCE_FUTURES_REST_URL", "http://x")]).unwrap();
        assert_eq!(cfg.rest_url, "http://x");
    }

    #[test]
    fn malformed_value_names_key() {
        let err = load(&[("LEVERAGE", "ten")]).unwrap_err();
        assert!(matches!(&err, EngineError::Config(m) if m.contains("LEVERAGE")), "{err}");
        let err = load(&[("ENABLE_SIMULATION", "maybe")]).unwrap_err();
        assert!(matches!(&err, EngineError::Config(m) if m.contains("ENABLE_SIMULATION")));
    }

    #[test]
    fn rejects_inverted_periods() {
        let cfg = load(&[("EMA_FAST", "26"), ("EMA_SLOW", "12")]).unwrap();
        assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));
        let cfg = load(&[("MACD_FAST", "30")]).unwrap();
        assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));
        let cfg = load(&[("VOLUME_WINDOW", "0")]).unwrap();
        assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn rejects_out_of_range_sizing() {
        for pairs in [
            &[("LEVERAGE", "0")],
            &[("LEVERAGE", "126")],
            &[("INITIAL_BALANCE", "0")],
            &[("PROFIT_TARGET_USD", "-1")],
            &[("VOLUME_MULTIPLIER", "0")],
            &[("HARD_STOP_LOSS_USD", "150")],
            &[("ASSUMED_MOVE_PCT", "0")],
            &[("ASSUMED_MOVE_PCT", "1")],
            &[("POLL_INTERVAL_SECS", "0")],
        ] {
            let cfg = load(pairs).unwrap();
            assert!(matches!(cfg.validate(), Err(EngineError::Config(_))), "{pairs:?}");
        }
    }

    #[test]
    fn candle_limit_must_cover_warm_up() {
        let cfg = load(&[("CANDLE_LIMIT", "35")]).unwrap();
        assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));
        let cfg = load(&[("CANDLE_LIMIT", "36")]).unwrap();
        cfg.validate().unwrap();
    }

    #[test]
    fn live_mode_requires_credentials() {
        let cfg = load(&[("ENABLE_SIMULATION", "false")]).unwrap();
        assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));
        let cfg = load(&[
            ("ENABLE_SIMULATION", "false"),
            ("BINANCE_API_KEY", "k"),
            ("BINANCE_API_SECRET", "s"),
        ])
        .unwrap();
        cfg.validate().unwrap();
    }

    #[test]
    fn tight_hard_stop_is_only_a_warning() {
        let cfg = load(&[("HARD_STOP_LOSS_USD", "300")]).unwrap();
        cfg.validate().unwrap();
    }
}
