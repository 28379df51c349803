//! OHLCV candle series, index-aligned across all five arrays.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A block of candles as parallel arrays, aligned by index.
///
/// This is the shape the market-data collaborator hands back; everything in
/// the signal pipeline reads from it and nothing mutates it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OhlcvSeries {
    pub open: Vec<Decimal>,
    pub high: Vec<Decimal>,
    pub low: Vec<Decimal>,
    pub close: Vec<Decimal>,
    pub volume: Vec<Decimal>,

    /// Candle open times, UTC.
    pub timestamps: Vec<DateTime<Utc>>,
}

impl OhlcvSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of candles.
    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    /// All five arrays plus timestamps share the same length.
    pub fn is_aligned(&self) -> bool {
        let n = self.close.len();
        self.open.len() == n
            && self.high.len() == n
            && self.low.len() == n
            && self.volume.len() == n
            && self.timestamps.len() == n
    }

    /// Append one candle.
    pub fn push(
        &mut self,
        timestamp: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) {
        self.timestamps.push(timestamp);
        self.open.push(open);
        self.high.push(high);
        self.low.push(low);
        self.close.push(close);
        self.volume.push(volume);
    }

    /// Latest close, if any candles exist.
    pub fn last_close(&self) -> Option<Decimal> {
        self.close.last().copied()
    }

    /// Timestamp of the candle at `index`.
    pub fn timestamp_at(&self, index: usize) -> Option<DateTime<Utc>> {
        self.timestamps.get(index).copied()
    }
}
