//! Market-data and order-venue seams.
//!
//! The scheduler talks to the outside world only through these traits, so
//! live connectors and the deterministic simulator are interchangeable.

pub mod sim;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{OhlcvSeries, Timeframe, TradeRisk};

pub use sim::SimVenue;

/// Top-of-book snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Quote {
    pub bid: Decimal,
    pub ask: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    /// Spread as a fraction of mid. Zero for a degenerate quote.
    pub fn spread_pct(&self) -> Decimal {
        let mid = self.mid();
        if mid.is_zero() {
            return Decimal::ZERO;
        }
        (self.ask - self.bid) / mid
    }
}

/// Venue acknowledgement of an entry order, fed to the execution engine's
/// fill-quality checks.
#[derive(Debug, Clone, Copy)]
pub struct OrderAck {
    pub fill_price: Decimal,
    pub spread_pct: Decimal,
    pub latency_ms: i64,
}

/// Read-only market data.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Most recent `limit` candles for a symbol, oldest first.
    async fn get_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<OhlcvSeries>;

    async fn get_current_price(&self, symbol: &str) -> Result<Decimal>;

    async fn get_quote(&self, symbol: &str) -> Result<Quote>;
}

/// Order entry and cancellation at the venue.
#[async_trait]
pub trait OrderVenue: Send + Sync {
    async fn submit_order(&self, plan: &TradeRisk) -> Result<OrderAck>;

    async fn cancel_order(&self, symbol: &str) -> Result<()>;
}
