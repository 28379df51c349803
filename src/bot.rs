//! Bot runner: the scan-and-manage orchestration loop.
//!
//! Each tick rolls the daily/weekly risk clocks, prunes the event
//! calendar, drives exits on open positions, scans the watchlist for new
//! retracement setups, and journals an equity point. All account state is
//! mutated here and nowhere else.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::db::Database;
use crate::events::{CalendarConfig, EventCalendar};
use crate::feed::{MarketData, OrderVenue};
use crate::models::{AssetClass, NewsEvent, RiskMetrics, Timeframe, TradeStatus};
use crate::signals::indicators::compute_features;
use crate::signals::{IndicatorConfig, LevelCache, LevelConfig, ScoreConfig, SignalScorer};
use crate::trading::{ExecutionConfig, ExecutionEngine, RiskConfig, RiskManager};

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Starting account equity.
    pub equity: Decimal,

    /// Polling interval in seconds.
    pub poll_interval_secs: u64,

    /// Log intents instead of submitting real orders.
    pub dry_run: bool,

    /// Timeframe scanned for setups.
    pub timeframe: Timeframe,

    /// Candles fetched per scan.
    pub candle_limit: usize,

    /// Watchlist of symbols and their asset classes.
    pub symbols: Vec<(String, AssetClass)>,

    pub database_url: String,

    pub indicators: IndicatorConfig,
    pub levels: LevelConfig,
    pub score: ScoreConfig,
    pub calendar: CalendarConfig,
    pub risk: RiskConfig,
    pub execution: ExecutionConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            equity: dec!(10000),
            poll_interval_secs: 30,
            dry_run: true,
            timeframe: Timeframe::H1,
            candle_limit: 250,
            symbols: Vec::new(),
            database_url: "sqlite:swingtrader.db?mode=rwc".to_string(),
            indicators: IndicatorConfig::default(),
            levels: LevelConfig::default(),
            score: ScoreConfig::default(),
            calendar: CalendarConfig::default(),
            risk: RiskConfig::default(),
            execution: ExecutionConfig::default(),
        }
    }
}

/// Main bot runner.
pub struct Bot {
    config: BotConfig,
    db: Database,
    market: Arc<dyn MarketData>,
    venue: Arc<dyn OrderVenue>,

    level_cache: LevelCache,
    scorer: SignalScorer,
    calendar: EventCalendar,
    risk: RiskManager,
    execution: ExecutionEngine,
    metrics: RiskMetrics,

    /// Capital-at-risk reserved per open trade id, released at close.
    reserved: HashMap<String, (AssetClass, Decimal)>,

    current_day: NaiveDate,
    current_week: (i32, u32),

    shutdown: Arc<AtomicBool>,
}

impl Bot {
    pub async fn new(
        config: BotConfig,
        market: Arc<dyn MarketData>,
        venue: Arc<dyn OrderVenue>,
    ) -> Result<Self> {
        let db = Database::new(&config.database_url).await?;
        let now = Utc::now();
        let week = now.iso_week();

        Ok(Self {
            level_cache: LevelCache::new(config.levels.clone()),
            scorer: SignalScorer::new(config.score.clone()),
            calendar: EventCalendar::new(config.calendar.clone()),
            risk: RiskManager::new(config.risk.clone()),
            execution: ExecutionEngine::new(config.execution.clone()),
            metrics: RiskMetrics::new(config.equity),
            reserved: HashMap::new(),
            current_day: now.date_naive(),
            current_week: (week.year(), week.week()),
            shutdown: Arc::new(AtomicBool::new(false)),
            config,
            db,
            market,
            venue,
        })
    }

    /// Shutdown flag for external control.
    pub fn shutdown_signal(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Register a calendar event from the external feed.
    pub fn add_event(&mut self, event: NewsEvent) {
        self.calendar.add_event(event);
    }

    /// Main run loop.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            dry_run = self.config.dry_run,
            poll_interval = self.config.poll_interval_secs,
            symbols = self.config.symbols.len(),
            "Starting bot run loop"
        );

        let mut poll_interval = interval(Duration::from_secs(self.config.poll_interval_secs));

        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
            shutdown.store(true, Ordering::SeqCst);
        });

        while !self.shutdown.load(Ordering::SeqCst) {
            poll_interval.tick().await;

            if let Err(e) = self.tick().await {
                error!(error = %e, "Error in bot tick");
            }
        }

        let report = self.execution.report();
        info!(
            open = report.open_positions,
            closed = report.closed_trades,
            gross_profit = %report.gross_profit,
            gross_loss = %report.gross_loss,
            win_rate = %self.metrics.win_rate(),
            "Bot stopped"
        );

        Ok(())
    }

    /// Single iteration of the main loop.
    async fn tick(&mut self) -> Result<()> {
        let now = Utc::now();
        debug!("Bot tick");

        self.roll_clocks(now);
        self.calendar.prune_stale(now);

        self.manage_exits(now).await?;
        self.scan_entries(now).await?;
        self.record_equity().await?;

        Ok(())
    }

    /// Reset daily/weekly risk counters at UTC boundaries.
    fn roll_clocks(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today != self.current_day {
            self.metrics.reset_daily();
            self.current_day = today;
            info!("Daily risk counters reset");
        }

        let week = now.iso_week();
        let key = (week.year(), week.week());
        if key != self.current_week {
            self.metrics.reset_weekly();
            self.current_week = key;
            info!("Weekly risk counters reset");
        }
    }

    /// Drive exits on every active position from the latest prices.
    async fn manage_exits(&mut self, now: DateTime<Utc>) -> Result<()> {
        let symbols: Vec<String> = self
            .execution
            .open_positions()
            .filter(|t| t.status.is_active())
            .map(|t| t.symbol.clone())
            .collect();

        for symbol in symbols {
            let price = match self.market.get_current_price(&symbol).await {
                Ok(p) => p,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Price fetch failed, skipping exits");
                    continue;
                }
            };

            let events = self.execution.on_price_tick(&symbol, price, now);
            for event in &events {
                self.db.record_fill(event).await?;

                if event.status == TradeStatus::Closed {
                    self.settle_closed(&event.trade_id).await?;
                }
            }

            // Persist stop moves and partial realizations on the live row.
            if let Some(trade) = self.execution.position(&symbol) {
                self.db.save_trade(trade).await?;
            }
        }

        Ok(())
    }

    /// Fold a fully closed trade back into the account state.
    async fn settle_closed(&mut self, trade_id: &str) -> Result<()> {
        let trade = self
            .execution
            .closed_trades()
            .iter()
            .rev()
            .find(|t| t.id == trade_id)
            .cloned();

        if let Some(trade) = trade {
            self.risk.on_trade_closed(&mut self.metrics, trade.realized_pnl);
            self.db.save_trade(&trade).await?;
        }

        if let Some((class, amount)) = self.reserved.remove(trade_id) {
            self.metrics.release_exposure(class, amount);
        }

        Ok(())
    }

    /// Scan the watchlist for new retracement setups and open the ones
    /// that clear every gate.
    async fn scan_entries(&mut self, now: DateTime<Utc>) -> Result<()> {
        for (symbol, class) in self.config.symbols.clone() {
            // One position per symbol, pending included.
            if self.execution.position(&symbol).is_some() {
                continue;
            }

            let series = match self
                .market
                .get_ohlcv(&symbol, self.config.timeframe, self.config.candle_limit)
                .await
            {
                Ok(s) => s,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Candle fetch failed, skipping scan");
                    continue;
                }
            };
            if series.is_empty() {
                continue;
            }
            if !series.is_aligned() {
                warn!(symbol = %symbol, "Misaligned candle data from feed, skipping scan");
                continue;
            }

            let features = compute_features(&series, &self.config.indicators);

            let Some(levels) = self.level_cache.get_or_compute(
                &symbol,
                self.config.timeframe,
                &series,
                features.price,
                features.atr,
                now,
            ) else {
                debug!(symbol = %symbol, "No valid swing, skipping");
                continue;
            };

            let touching = self.level_cache.touches_primary(&levels, features.price);
            let signal = self.scorer.score(&features, &levels, touching);
            if !signal.tier.is_tradeable() {
                continue;
            }

            // The calendar veto is absolute regardless of tier.
            let clearance = self.calendar.check(&symbol, class, now);
            if !clearance.can_trade {
                info!(symbol = %symbol, reason = %clearance.reason, "Signal vetoed by event calendar");
                continue;
            }

            let Some(plan) = self.risk.build_plan(
                &symbol,
                class,
                signal.tier,
                signal.side,
                features.price,
                features.atr,
                &self.metrics,
            ) else {
                continue;
            };

            if self.config.dry_run {
                info!(
                    symbol = %symbol,
                    tier = plan.tier.as_str(),
                    side = plan.side.as_str(),
                    entry = %plan.entry,
                    stop = %plan.stop_loss,
                    size = %plan.position_size,
                    "[DRY RUN] Would open position"
                );
            }

            let trade_id = self.execution.submit(&plan, now)?;

            let ack = match self.venue.submit_order(&plan).await {
                Ok(ack) => ack,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Order submission failed");
                    self.execution.cancel(&symbol)?;
                    if let Err(e) = self.venue.cancel_order(&symbol).await {
                        warn!(symbol = %symbol, error = %e, "Venue cancel failed");
                    }
                    continue;
                }
            };

            let status =
                self.execution
                    .confirm_fill(&symbol, ack.fill_price, ack.spread_pct, ack.latency_ms)?;

            if status == TradeStatus::Open {
                self.metrics.reserve_exposure(class, plan.risk_amount);
                self.reserved.insert(trade_id, (class, plan.risk_amount));
                if let Some(trade) = self.execution.position(&symbol) {
                    self.db.save_trade(trade).await?;
                }
            } else if let Some(trade) = self
                .execution
                .closed_trades()
                .iter()
                .rev()
                .find(|t| t.id == trade_id)
            {
                self.db.save_trade(trade).await?;
            }
        }

        Ok(())
    }

    /// Journal one equity curve point.
    async fn record_equity(&self) -> Result<()> {
        self.db
            .record_equity_point(
                &self.metrics.equity.to_string(),
                &self.metrics.daily_pnl.to_string(),
                &self.metrics.weekly_pnl.to_string(),
                &self.metrics.total_exposure().to_string(),
            )
            .await
    }
}
