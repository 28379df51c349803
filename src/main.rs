//! Swing-trading bot
//!
//! Scans for fractal swing retracements, grades setups into risk tiers,
//! and manages multi-tier exits with account-level loss caps and an
//! economic-event blackout filter.

mod bot;
mod db;
mod events;
mod feed;
mod models;
mod signals;
mod trading;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::bot::{Bot, BotConfig};
use crate::db::Database;
use crate::events::{CalendarConfig, EventCalendar};
use crate::feed::{MarketData, SimVenue};
use crate::models::{AssetClass, NewsEvent, OhlcvSeries, Timeframe};
use crate::signals::indicators::compute_features;
use crate::signals::{IndicatorConfig, LevelCache, LevelConfig, ScoreConfig, SignalScorer};
use crate::trading::{ExecutionConfig, RiskConfig};

/// Swing retracement trading bot CLI.
#[derive(Parser)]
#[command(name = "swingtrader")]
#[command(about = "Trade swing retracements with tiered risk management", long_about = None)]
struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "sqlite:./swingtrader.db?mode=rwc")]
    database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the trading bot
    Run {
        /// Account equity
        #[arg(short, long, default_value = "10000")]
        equity: f64,

        /// Polling interval in seconds
        #[arg(short, long, default_value = "30")]
        interval: u64,

        /// Scan timeframe (15m, 1h, 4h, 1d)
        #[arg(short, long, default_value = "1h")]
        timeframe: Timeframe,

        /// Watchlist as SYMBOL:CLASS pairs, comma separated
        /// (e.g. BTCUSDT:crypto,EURUSD:forex)
        #[arg(short, long)]
        symbols: String,

        /// Candle data file to replay (JSON map of symbol to series)
        #[arg(long)]
        data: Option<String>,

        /// Dry run (log intents, never submit orders)
        #[arg(long)]
        dry_run: bool,

        /// Calendar events file (JSON array)
        #[arg(long)]
        events: Option<String>,
    },

    /// Run one scan pass over a candle data file and print graded signals
    Scan {
        /// Scan timeframe (15m, 1h, 4h, 1d)
        #[arg(short, long, default_value = "1h")]
        timeframe: Timeframe,

        /// Watchlist as SYMBOL:CLASS pairs, comma separated
        #[arg(short, long)]
        symbols: String,

        /// Candle data file (JSON map of symbol to series)
        #[arg(long)]
        data: String,
    },

    /// Check blackout windows for a calendar events file
    Events {
        /// Calendar events file (JSON array)
        #[arg(long)]
        file: Option<String>,

        /// Symbol to check clearance for
        #[arg(short, long, default_value = "BTCUSDT")]
        symbol: String,

        /// Asset class of the symbol (crypto, forex, stocks)
        #[arg(short, long, default_value = "crypto")]
        class: String,
    },

    /// Show current configuration
    Config,

    /// Show journaled trades and the equity curve
    Status,
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
        Commands::Run {
            equity,
            interval,
            timeframe,
            symbols,
            data,
            dry_run,
            events,
        } => {
            let watchlist = parse_watchlist(&symbols)?;

            let venue = Arc::new(SimVenue::default());
            if let Some(path) = data {
                load_candles(&venue, timeframe, &path).await?;
            }

            let config = BotConfig {
                equity: Decimal::try_from(equity)?,
                poll_interval_secs: interval,
                dry_run,
                timeframe,
                symbols: watchlist.clone(),
                database_url: cli.database.clone(),
                ..BotConfig::default()
            };

            let mut bot = Bot::new(config, venue.clone(), venue.clone()).await?;

            if let Some(path) = events {
                for event in load_events(&path)? {
                    bot.add_event(event);
                }
            }

            println!("\n=== Swing Retracement Bot ===");
            println!("Equity: ${}", equity);
            println!("Timeframe: {}", timeframe);
            println!("Polling interval: {}s", interval);
            println!(
                "Mode: {}",
                if dry_run { "DRY RUN (no orders)" } else { "SIMULATED EXECUTION" }
            );
            println!("Watchlist: {} symbols", watchlist.len());
            println!("\nPress Ctrl+C to stop.\n");

            if let Err(e) = bot.run().await {
                tracing::error!(error = %e, "Bot error");
            }
        }

        Commands::Scan {
            timeframe,
            symbols,
            data,
        } => {
            let watchlist = parse_watchlist(&symbols)?;
            let venue = Arc::new(SimVenue::default());
            load_candles(&venue, timeframe, &data).await?;

            let indicators = IndicatorConfig::default();
            let mut cache = LevelCache::new(LevelConfig::default());
            let scorer = SignalScorer::new(ScoreConfig::default());
            let now = chrono::Utc::now();

            println!(
                "\n{:<12} {:<8} {:<6} {:>10} {:>10} {:>8} REASONS",
                "SYMBOL", "TIER", "SIDE", "PRICE", "ENTRY", "RSI"
            );
            println!("{}", "-".repeat(80));

            for (symbol, _class) in &watchlist {
                let series = match venue.get_ohlcv(symbol, timeframe, 250).await {
                    Ok(s) => s,
                    Err(e) => {
                        println!("{:<12} no data ({})", symbol, e);
                        continue;
                    }
                };

                let features = compute_features(&series, &indicators);
                let Some(levels) =
                    cache.get_or_compute(symbol, timeframe, &series, features.price, features.atr, now)
                else {
                    println!("{:<12} no valid swing", symbol);
                    continue;
                };

                let touching = cache.touches_primary(&levels, features.price);
                let signal = scorer.score(&features, &levels, touching);

                println!(
                    "{:<12} {:<8} {:<6} {:>10} {:>10} {:>8.1} {}",
                    symbol,
                    signal.tier.as_str(),
                    signal.side.as_str(),
                    features.price,
                    levels.primary_entry(),
                    features.rsi,
                    signal.reasons.join(",")
                );
            }
        }

        Commands::Events { file, symbol, class } => {
            let class = parse_class(&class)?;
            let mut calendar = EventCalendar::new(CalendarConfig::default());

            if let Some(path) = &file {
                let events = load_events(path)?;
                println!("Loaded {} events from {}", events.len(), path);
                for event in events {
                    println!(
                        "  {} {:<16} {:<8} {}",
                        event.time,
                        event.kind.as_str(),
                        event.asset_class,
                        event.description
                    );
                    calendar.add_event(event);
                }
            }

            let now = chrono::Utc::now();
            let clearance = calendar.check(&symbol, class, now);
            println!("\nClearance for {} ({}) at {}:", symbol, class, now);
            println!(
                "  {}: {}",
                if clearance.can_trade { "ALLOWED" } else { "BLOCKED" },
                clearance.reason
            );
        }

        Commands::Config => {
            let risk = RiskConfig::default();
            let execution = ExecutionConfig::default();
            let levels = LevelConfig::default();
            let score = ScoreConfig::default();
            let calendar = CalendarConfig::default();

            println!("\n=== Risk Configuration ===\n");
            println!("Per-Tier Risk / Reward:");
            println!("  Tier 1:  {}% risk, {}R", risk.tier1_risk * Decimal::ONE_HUNDRED, risk.tier1_rr);
            println!("  Tier 2:  {}% risk, {}R", risk.tier2_risk * Decimal::ONE_HUNDRED, risk.tier2_rr);
            println!("  Tier 3:  {}% risk, {}R", risk.tier3_risk * Decimal::ONE_HUNDRED, risk.tier3_rr);

            println!("\nLoss Caps:");
            println!("  Daily:   {}%", risk.daily_loss_cap * Decimal::ONE_HUNDRED);
            println!("  Weekly:  {}%", risk.weekly_loss_cap * Decimal::ONE_HUNDRED);

            println!("\nExposure Caps:");
            println!("  Aggregate:  {}%", risk.max_total_exposure * Decimal::ONE_HUNDRED);
            println!("  Per Class:  {}%", risk.max_class_exposure * Decimal::ONE_HUNDRED);

            println!("\nStop Placement (min% / max% / ATR mult):");
            for class in AssetClass::all() {
                let p = risk.stop_params(class);
                println!(
                    "  {:<8} {}% / {}% / {}x",
                    class.as_str(),
                    p.min_pct * Decimal::ONE_HUNDRED,
                    p.max_pct * Decimal::ONE_HUNDRED,
                    p.atr_multiple
                );
            }

            println!("\n=== Execution ===\n");
            println!("  Max Spread:        {}%", execution.max_spread_pct * Decimal::ONE_HUNDRED);
            println!("  Slippage Tol:      {} x ATR", execution.slippage_atr_multiple);
            println!("  Max Fill Latency:  {}ms", execution.max_latency_ms);
            println!("  Trailing Distance: {} x ATR", execution.trailing_atr_multiple);

            println!("\n=== Levels & Scoring ===\n");
            println!("  Fractal Depth:        {}", levels.depth);
            println!("  Level Cache TTL:      {}s", levels.cache_ttl_secs);
            println!("  Invalidation:         {} x ATR past swing", levels.invalidation_threshold);
            println!("  Touch Tolerance:      {} x ATR", levels.touch_tolerance);
            println!("  RSI Long Max:         {}", score.rsi_long_max);
            println!("  RSI Short Min:        {}", score.rsi_short_min);
            println!("  Volume Expansion:     {}x", score.volume_expansion);

            println!("\n=== Event Blackouts ===\n");
            println!("  Forex Macro:        ±{} min", calendar.forex_buffer_mins);
            println!("  Equity Earnings:    ±{} h", calendar.equity_buffer_hours);
            println!("  Crypto Funding:     ±{} min", calendar.funding_buffer_mins);
            println!("  Dominance Shock:    ±{} min", calendar.shock_buffer_mins);
        }

        Commands::Status => {
            let db = Database::new(&cli.database).await?;

            let trades = db.get_trades(20).await?;
            if trades.is_empty() {
                println!("No trades journaled yet. Run 'swingtrader run' to start the bot.");
                return Ok(());
            }

            println!(
                "\n{:<12} {:<6} {:<6} {:<16} {:>10} {:>10} {:>12}",
                "SYMBOL", "TIER", "SIDE", "STATUS", "ENTRY", "QTY", "PNL"
            );
            println!("{}", "-".repeat(80));
            for trade in &trades {
                println!(
                    "{:<12} {:<6} {:<6} {:<16} {:>10} {:>10} {:>12}",
                    trade.symbol,
                    trade.tier,
                    trade.side,
                    trade.status,
                    trade.entry_price,
                    trade.quantity,
                    trade.realized_pnl
                );
            }

            let curve = db.get_equity_curve(5).await?;
            if !curve.is_empty() {
                println!("\n=== Recent Equity ===");
                for point in &curve {
                    println!(
                        "  {}  equity {}  daily {}  weekly {}  exposure {}",
                        point.timestamp,
                        point.equity,
                        point.daily_pnl,
                        point.weekly_pnl,
                        point.open_exposure
                    );
                }
            }
        }
    }

    info!("Done");
    Ok(())
}

/// Parse `SYMBOL:CLASS` pairs from a comma-separated list.
fn parse_watchlist(input: &str) -> Result<Vec<(String, AssetClass)>> {
    input
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|pair| {
            let (symbol, class) = pair
                .trim()
                .split_once(':')
                .with_context(|| format!("expected SYMBOL:CLASS, got '{pair}'"))?;
            Ok((symbol.to_string(), parse_class(class)?))
        })
        .collect()
}

fn parse_class(input: &str) -> Result<AssetClass> {
    match input.to_lowercase().as_str() {
        "crypto" => Ok(AssetClass::Crypto),
        "forex" => Ok(AssetClass::Forex),
        "stocks" | "equities" => Ok(AssetClass::Stocks),
        other => anyhow::bail!("unknown asset class: {other}"),
    }
}

/// Load a JSON map of symbol to candle series into the simulated feed.
async fn load_candles(venue: &SimVenue, timeframe: Timeframe, path: &str) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read candle file {path}"))?;
    let candles: HashMap<String, OhlcvSeries> =
        serde_json::from_str(&raw).context("Failed to parse candle file")?;

    for (symbol, series) in candles {
        info!(symbol = %symbol, candles = series.len(), "Loaded candle series");
        venue.load_series(&symbol, timeframe, series).await;
    }
    Ok(())
}

/// Load a JSON array of calendar events.
fn load_events(path: &str) -> Result<Vec<NewsEvent>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read events file {path}"))?;
    serde_json::from_str(&raw).context("Failed to parse events file")
}
