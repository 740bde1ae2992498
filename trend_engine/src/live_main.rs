/// live_main.rs: Trading Entry Point
///
/// Runs the trend strategy against Binance Futures, live or paper.
///
/// FLOW:
///   1. Load and validate config from .env
///   2. Live: sync server time, set leverage.  Paper: open the CSV order log
///   3. Run one cycle immediately, then one per POLL_INTERVAL_SECS
///   4. Ctrl-C (or --cycles N) stops the loop; Ctrl-C also abandons a pending
///      market-data or balance fetch, never an order in flight
///   5. Print the session report
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use trend_engine::config::AppConfig;
use trend_engine::data::BinanceDataClient;
use trend_engine::engine::{Trader, TradingState};
use trend_engine::live::LiveOrderClient;
use trend_engine::paper::PaperExchange;
use trend_engine::scheduler::IntervalScheduler;

#[derive(Parser, Debug)]
#[command(name = "trader", about = "EMA/MACD/volume trend trader for Binance USDT-M futures")]
struct Cli {
    /// Stop after this many cycles (default: run until Ctrl-C)
    #[arg(long)]
    cycles: Option<u64>,

    /// Paper trade regardless of ENABLE_SIMULATION
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut cfg = AppConfig::from_env()?;
    if cli.simulate {
        cfg.enable_simulation = true;
    }
    cfg.validate()?;

    info!("╔══════════════════════════════════════════════╗");
    info!("║       TREND ENGINE  ·  EMA / MACD / VOLUME   ║");
    info!("╚══════════════════════════════════════════════╝");
    info!(
        "Config: symbol={} interval={} poll={}s leverage={}x target=${} hard_stop=${} move={:.3}%",
        cfg.symbol, cfg.kline_interval, cfg.poll_interval_secs, cfg.leverage,
        cfg.profit_target_usd, cfg.hard_stop_loss_usd, cfg.assumed_move_pct * 100.0
    );
    if cfg.enable_simulation {
        info!("SIMULATION MODE: orders are filled locally at the latest close");
    } else if !cfg.use_testnet {
        warn!("LIVE MODE on mainnet: real funds at risk");
    }

    // ── Shutdown ─────────────────────────────────────────────────────────
    let shutdown = CancellationToken::new();
    {
        let token = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received; stopping after any order in flight");
                token.cancel();
            }
        });
    }
    let mut scheduler = IntervalScheduler::new(cfg.poll_interval(), shutdown.clone());
    if let Some(n) = cli.cycles {
        scheduler = scheduler.with_max_cycles(n);
    }

    let market = BinanceDataClient::new(&cfg.rest_url)?;

    let state = if cfg.enable_simulation {
        let paper = PaperExchange::new(
            market.clone(),
            &cfg.symbol,
            &cfg.kline_interval,
            cfg.initial_balance,
            cfg.leverage,
        )
        .with_order_log(&cfg.sim_order_log)?;
        let paper = Arc::new(paper);

        let mut trader = Trader::new(&cfg, market, paper.clone(), paper.clone())
            .with_shutdown(shutdown.clone());
        trader.run(&mut scheduler).await;
        info!("Simulated realised P&L: ${:.2}", paper.realized_pnl());
        trader.into_state()
    } else {
        let mut client = LiveOrderClient::new(
            &cfg.api_key,
            &cfg.api_secret,
            &cfg.rest_url,
            &cfg.symbol,
            cfg.leverage,
        )?
        .with_quantity_decimals(cfg.quantity_decimals);
        client.sync_time().await?;
        info!("Setting leverage {}x on {}...", cfg.leverage, cfg.symbol);
        client.set_leverage().await?;
        let client = Arc::new(client);

        let mut trader = Trader::new(&cfg, market, client.clone(), client.clone())
            .with_shutdown(shutdown.clone());
        trader.run(&mut scheduler).await;
        trader.into_state()
    };

    report(&state);
    Ok(())
}

fn report(state: &TradingState) {
    if let Some(pos) = state.lifecycle.position() {
        warn!(
            "Stopped with an open {} position: qty={:.4} entry={:.2} tp={:.2} stop={:.2}",
            pos.side.as_str(), pos.quantity, pos.entry_price, pos.take_profit_price, pos.hard_stop_price
        );
    }
    println!("\n{}", state.stats);
}
