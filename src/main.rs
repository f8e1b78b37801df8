//! Alpaca strategy-trading bot.
//!
//! Streams live trade ticks for a fixed set of symbols, evaluates per-symbol
//! EMA/ADX and Bollinger Band strategies, gates every signal through VaR and
//! position-size risk checks, and reconciles order fills into a position
//! ledger. Historical fetch and backtesting run as batch subcommands against
//! a local sqlite bar store.

mod api;
mod backtest;
mod db;
mod engine;
mod history;
mod indicators;
mod models;
mod trading;

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::api::{AlpacaBroker, MarketDataClient, MarketStream};
use crate::backtest::{BacktestConfig, BacktestReport, Backtester};
use crate::db::Database;
use crate::engine::Engine;
use crate::trading::TradingConfig;

/// Strategy-trading bot CLI.
#[derive(Parser)]
#[command(name = "stratbot")]
#[command(about = "Trade EMA/ADX and Bollinger Band signals on Alpaca", long_about = None)]
struct Cli {
    /// Bar store path (used by fetch and backtest)
    #[arg(short, long, default_value = "sqlite:./stratbot.db?mode=rwc")]
    database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the live trading pipeline
    Run {
        /// Shares per order
        #[arg(short, long, default_value = "1")]
        qty: u32,

        /// Bounded tick queue depth between the stream and the engine
        #[arg(long, default_value = "1024")]
        queue_depth: usize,
    },

    /// Fetch historical minute bars into the local store
    Fetch {
        /// Days of history to retrieve
        #[arg(short = 'n', long, default_value = "100")]
        days: i64,

        /// How many days back the range ends (free data plans lag the present)
        #[arg(long, default_value = "365")]
        end_days_ago: i64,
    },

    /// Backtest and optimize both strategies over stored bars
    Backtest {
        /// Initial capital for the simulation
        #[arg(short, long, default_value = "10000")]
        capital: f64,

        /// Commission per trade as a fraction
        #[arg(long, default_value = "0.002")]
        commission: f64,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,
    },

    /// Print the active strategy and risk configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run { qty, queue_depth } => run_live(qty, queue_depth).await,
        Commands::Fetch { days, end_days_ago } => {
            fetch_bars(&cli.database, days, end_days_ago).await
        }
        Commands::Backtest {
            capital,
            commission,
            start,
            end,
        } => run_backtests(&cli.database, capital, commission, start, end).await,
        Commands::Config => {
            show_config();
            Ok(())
        }
    }
}

async fn run_live(qty: u32, queue_depth: usize) -> Result<()> {
    let mut config = TradingConfig::default();
    config.order_qty = Decimal::from(qty);
    config.tick_queue_depth = queue_depth;

    let symbols = config.symbols();
    let broker = Arc::new(AlpacaBroker::from_env()?);
    let stream = MarketStream::from_env()?;

    let (tick_tx, tick_rx) = tokio::sync::mpsc::channel(config.tick_queue_depth);
    let mut engine = Engine::new(config, broker);

    let stream_task = tokio::spawn(stream.run(symbols, tick_tx));

    tokio::select! {
        _ = engine.run(tick_rx) => {}
        result = stream_task => {
            match result {
                Ok(Ok(())) => warn!("Market data stream ended"),
                Ok(Err(e)) => error!(error = %e, "Market data stream failed"),
                Err(e) => error!(error = %e, "Stream task panicked"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    Ok(())
}

async fn fetch_bars(database_url: &str, days: i64, end_days_ago: i64) -> Result<()> {
    let config = TradingConfig::default();
    let symbols = config.symbols();

    let end = Utc::now() - Duration::days(end_days_ago);
    let start = end - Duration::days(days);
    info!(
        start = %start.date_naive(),
        end = %end.date_naive(),
        symbols = ?symbols,
        "Fetching minute bars"
    );

    let client = MarketDataClient::from_env()?;
    let db = Database::new(database_url).await?;

    let fetched = client.fetch_minute_bars(&symbols, start, end).await?;
    for (symbol, bars) in &fetched {
        let inserted = db.insert_bars(symbol, bars).await?;
        let total = db.bar_count(symbol).await?;
        info!(symbol = %symbol, fetched = bars.len(), inserted, total, "Stored bars");
    }

    Ok(())
}

async fn run_backtests(
    database_url: &str,
    capital: f64,
    commission: f64,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<()> {
    let db = Database::new(database_url).await?;
    let backtester = Backtester::new(BacktestConfig {
        initial_cash: capital,
        commission,
    });

    let start = start.map(|d| Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN)));
    let end = end.map(|d| Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN)));

    let config = TradingConfig::default();
    for symbol in config.symbols() {
        let rows = db.get_bars(&symbol, start, end).await?;
        if rows.is_empty() {
            warn!(symbol = %symbol, "No stored bars, run fetch first");
            continue;
        }

        let bars = Backtester::resample_15min(&rows);
        info!(
            symbol = %symbol,
            minute_rows = rows.len(),
            bars = bars.len(),
            "Backtesting"
        );

        println!("\nResults for {symbol}:");
        if let Some(report) = backtester.optimize_trend(&symbol, &bars) {
            print_report("Optimized trend-following strategy", &report);
        }
        if let Some(report) = backtester.optimize_mean_reversion(&symbol, &bars) {
            print_report("Optimized mean-reversion strategy", &report);
        }
    }

    Ok(())
}

fn print_report(label: &str, report: &BacktestReport) {
    println!("{label}:");
    println!("  Parameters:   {:?}", report.params);
    println!("  Trades:       {}", report.trades);
    println!("  Final equity: ${:.2}", report.final_equity);
    println!("  Return:       {:.2}%", report.return_pct);
}

fn show_config() {
    let config = TradingConfig::default();

    println!("=== Strategies ===");
    for symbol in config.symbols() {
        if let Some(params) = config.strategies.get(&symbol) {
            println!("{symbol}: {params:?}");
        }
    }

    println!("\n=== Risk Limits ===");
    println!("Max position size: ${}", config.risk.max_position_size);
    println!("Stop loss:         {}%", config.risk.stop_loss_pct * dec!(100));
    println!("Take profit:       {}%", config.risk.take_profit_pct * dec!(100));
    println!("VaR confidence:    {}", config.risk.var_confidence_level);

    println!("\n=== Pipeline ===");
    println!("Order quantity:       {}", config.order_qty);
    println!("Reconcile interval:   {}s", config.reconcile_interval_secs);
    println!("Max poll attempts:    {}", config.max_poll_attempts);
    println!("Tick queue depth:     {}", config.tick_queue_depth);
}
