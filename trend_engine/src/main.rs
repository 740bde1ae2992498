/// main.rs: Signal Scan Entry Point
///
/// One-shot look at the market through the strategy, no orders placed:
///   1. Load config from .env
///   2. Fetch recent klines from Binance Futures
///   3. Compute indicators for the last two bars
///   4. Print each confirmation condition, the signal, and a sizing preview
use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trend_engine::config::AppConfig;
use trend_engine::data::BinanceDataClient;
use trend_engine::indicators::{IndicatorEngine, IndicatorSnapshot};
use trend_engine::risk::RiskSizer;
use trend_engine::strategy::SignalDetector;

#[derive(Parser, Debug)]
#[command(name = "scan", about = "Print the current EMA/MACD/volume signal without trading")]
struct Cli {
    /// Override SYMBOL
    #[arg(long)]
    symbol: Option<String>,

    /// Override KLINE_INTERVAL
    #[arg(long)]
    interval: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ───────────────────────────────────────────────────────────
    let cli = Cli::parse();
    let mut cfg = AppConfig::from_env()?;
    if let Some(symbol) = cli.symbol {
        cfg.symbol = symbol.to_uppercase();
    }
    if let Some(interval) = cli.interval {
        cfg.kline_interval = interval;
    }
    // Scanning never trades, so credentials are not required.
    cfg.enable_simulation = true;
    cfg.validate()?;

    // ── Fetch Data ───────────────────────────────────────────────────────
    let data_client = BinanceDataClient::new(&cfg.rest_url)?;
    info!("Fetching {} {} {} klines from {}...", cfg.candle_limit, cfg.symbol, cfg.kline_interval, cfg.rest_url);
    let candles = data_client
        .fetch_klines(&cfg.symbol, &cfg.kline_interval, cfg.candle_limit)
        .await?;
    let Some(last) = candles.last().copied() else {
        anyhow::bail!("No kline data received.  Check symbol, interval, and connectivity.");
    };

    // ── Indicators & Signal ──────────────────────────────────────────────
    let engine = IndicatorEngine::new(cfg.indicator_params());
    let window = engine.latest(&candles)?;
    let Some((prev, cur)) = window.pair() else {
        anyhow::bail!("Need at least two indicator bars; got {} candles", candles.len());
    };
    let check = SignalDetector::new(cfg.volume_multiplier).evaluate(prev, cur, last.volume);

    println!();
    println!("  {} {}  last close {:.2}  volume {:.3}", cfg.symbol, cfg.kline_interval, last.close, last.volume);
    print_snapshot("previous", prev);
    print_snapshot("current ", cur);
    println!("  Crossover        : {:?}", check.crossover);
    println!("  Bullish momentum : {}", check.bullish_momentum);
    println!("  Bearish momentum : {}", check.bearish_momentum);
    println!(
        "  Volume confirmed : {}  ({:.3} vs {:.1} × {:.3})",
        check.volume_confirmed, last.volume, cfg.volume_multiplier, cur.volume_sma
    );
    println!("  SIGNAL           : {:?}", check.signal);

    // ── Sizing preview ───────────────────────────────────────────────────
    if let Some(side) = check.signal.side() {
        match RiskSizer::new(cfg.risk_params()).size(cfg.initial_balance, last.close, side) {
            Ok(plan) => println!(
                "  Plan             : {} qty={:.4} margin=${:.2} tp={:.2} stop={:.2}",
                side.as_str(), plan.quantity, plan.required_margin, plan.take_profit_price, plan.hard_stop_price
            ),
            Err(e) => println!("  Plan             : skipped ({e})"),
        }
    }
    println!();

    Ok(())
}

fn print_snapshot(label: &str, s: &IndicatorSnapshot) {
    println!(
        "  [{label}] t={} ema_fast={:.2} ema_slow={:.2} macd={:.4} signal={:.4} hist={:.4} vol_sma={:.3}",
        s.open_time, s.ema_fast, s.ema_slow, s.macd_line, s.macd_signal, s.macd_hist, s.volume_sma
    );
}
