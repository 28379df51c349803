//! Sqlite persistence: append-only trade journal and equity curve.
//!
//! Prices and quantities are stored as decimal strings so no precision is
//! lost on the round trip; the database is a journal, not a source of live
//! state.

use anyhow::{Context, Result};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::models::ExecutedTrade;
use crate::trading::CloseEvent;

pub struct Database {
    pool: SqlitePool,
}

/// Journaled trade row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredTrade {
    pub id: String,
    pub symbol: String,
    pub asset_class: String,
    pub tier: String,
    pub side: String,
    pub status: String,
    pub entry_price: String,
    pub quantity: String,
    pub stop_loss: String,
    pub take_profit_1: String,
    pub take_profit_2: String,
    pub realized_pnl: String,
    pub close_reason: Option<String>,
    pub opened_at: String,
    pub closed_at: Option<String>,
}

/// One realized fill (partial or final) for a trade.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredFill {
    pub id: i64,
    pub trade_id: String,
    pub reason: String,
    pub quantity: String,
    pub fill_price: String,
    pub pnl: String,
    pub filled_at: String,
}

/// Equity curve point.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EquityPoint {
    pub id: i64,
    pub timestamp: String,
    pub equity: String,
    pub daily_pnl: String,
    pub weekly_pnl: String,
    pub open_exposure: String,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                asset_class TEXT NOT NULL,
                tier TEXT NOT NULL,
                side TEXT NOT NULL,
                status TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                quantity TEXT NOT NULL,
                stop_loss TEXT NOT NULL,
                take_profit_1 TEXT NOT NULL,
                take_profit_2 TEXT NOT NULL,
                realized_pnl TEXT NOT NULL DEFAULT '0',
                close_reason TEXT,
                opened_at TEXT NOT NULL,
                closed_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fills (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                trade_id TEXT NOT NULL,
                reason TEXT NOT NULL,
                quantity TEXT NOT NULL,
                fill_price TEXT NOT NULL,
                pnl TEXT NOT NULL,
                filled_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (trade_id) REFERENCES trades(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS equity_curve (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                equity TEXT NOT NULL,
                daily_pnl TEXT NOT NULL DEFAULT '0',
                weekly_pnl TEXT NOT NULL DEFAULT '0',
                open_exposure TEXT NOT NULL DEFAULT '0'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_symbol ON trades(symbol)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_fills_trade ON fills(trade_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_equity_curve_time ON equity_curve(timestamp)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Insert or refresh a trade row from the live record.
    pub async fn save_trade(&self, trade: &ExecutedTrade) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trades (
                id, symbol, asset_class, tier, side, status,
                entry_price, quantity, stop_loss, take_profit_1, take_profit_2,
                realized_pnl, close_reason, opened_at, closed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                entry_price = excluded.entry_price,
                stop_loss = excluded.stop_loss,
                realized_pnl = excluded.realized_pnl,
                close_reason = excluded.close_reason,
                closed_at = excluded.closed_at
            "#,
        )
        .bind(&trade.id)
        .bind(&trade.symbol)
        .bind(trade.asset_class.as_str())
        .bind(trade.tier.as_str())
        .bind(trade.side.as_str())
        .bind(trade.status.as_str())
        .bind(trade.entry_price.to_string())
        .bind(trade.quantity.to_string())
        .bind(trade.stop_loss.to_string())
        .bind(trade.take_profit_1.to_string())
        .bind(trade.take_profit_2.to_string())
        .bind(trade.realized_pnl.to_string())
        .bind(trade.close_reason.map(|r| r.as_str()))
        .bind(trade.opened_at.to_rfc3339())
        .bind(trade.closed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Append a realized fill to the journal.
    pub async fn record_fill(&self, event: &CloseEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fills (trade_id, reason, quantity, fill_price, pnl)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.trade_id)
        .bind(event.reason.as_str())
        .bind(event.quantity.to_string())
        .bind(event.fill_price.to_string())
        .bind(event.pnl.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Most recent trades, newest first.
    pub async fn get_trades(&self, limit: i64) -> Result<Vec<StoredTrade>> {
        sqlx::query_as::<_, StoredTrade>(
            "SELECT * FROM trades ORDER BY opened_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch trades")
    }

    /// Fills for one trade, oldest first.
    pub async fn get_fills(&self, trade_id: &str) -> Result<Vec<StoredFill>> {
        sqlx::query_as::<_, StoredFill>(
            "SELECT * FROM fills WHERE trade_id = ? ORDER BY id",
        )
        .bind(trade_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch fills")
    }

    /// Record one equity curve point.
    pub async fn record_equity_point(
        &self,
        equity: &str,
        daily_pnl: &str,
        weekly_pnl: &str,
        open_exposure: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO equity_curve (equity, daily_pnl, weekly_pnl, open_exposure)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(equity)
        .bind(daily_pnl)
        .bind(weekly_pnl)
        .bind(open_exposure)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Recent equity curve points, newest first.
    pub async fn get_equity_curve(&self, limit: i64) -> Result<Vec<EquityPoint>> {
        sqlx::query_as::<_, EquityPoint>(
            "SELECT * FROM equity_curve ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch equity curve")
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssetClass, CloseReason, SignalTier, TradeRisk, TradeSide};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn sample_trade() -> ExecutedTrade {
        let plan = TradeRisk {
            symbol: "BTCUSDT".to_string(),
            asset_class: AssetClass::Crypto,
            tier: SignalTier::Tier1,
            side: TradeSide::Long,
            entry: dec!(100),
            stop_loss: dec!(98),
            take_profit_1: dec!(104),
            take_profit_2: dec!(108),
            risk_amount: dec!(200),
            position_size: dec!(100),
            reward_amount: dec!(800),
            rr_ratio: dec!(4),
            breakeven_price: dec!(100),
            trailing_stop: dec!(98),
            atr: dec!(1.5),
        };
        ExecutedTrade::from_plan(&plan, Utc::now())
    }

    #[tokio::test]
    async fn test_trade_journal_round_trip() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let trade = sample_trade();
        db.save_trade(&trade).await.unwrap();

        let rows = db.get_trades(10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].symbol, "BTCUSDT");
        assert_eq!(rows[0].entry_price, "100");
        assert_eq!(rows[0].status, "pending");

        // Saving again updates in place.
        db.save_trade(&trade).await.unwrap();
        assert_eq!(db.get_trades(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fill_journal() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let trade = sample_trade();
        db.save_trade(&trade).await.unwrap();

        db.record_fill(&CloseEvent {
            trade_id: trade.id.clone(),
            symbol: trade.symbol.clone(),
            reason: CloseReason::TakeProfit1,
            quantity: dec!(50),
            fill_price: dec!(104),
            pnl: dec!(200),
            status: crate::models::TradeStatus::PartiallyFilled,
        })
        .await
        .unwrap();

        let fills = db.get_fills(&trade.id).await.unwrap();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].reason, "take_profit_1");
        assert_eq!(fills[0].pnl, "200");
    }

    #[tokio::test]
    async fn test_equity_curve() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        db.record_equity_point("10000", "0", "0", "0").await.unwrap();
        db.record_equity_point("10150", "150", "150", "200").await.unwrap();

        let points = db.get_equity_curve(10).await.unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].equity, "10150");
    }
}
