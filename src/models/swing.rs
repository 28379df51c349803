//! Structural swings and the retracement levels derived from them.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Timeframe;

/// Pivot direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwingKind {
    High,
    Low,
}

/// A confirmed fractal pivot. Immutable once created; invalidated (never
/// deleted) when price travels past it by more than a configured ATR multiple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Swing {
    pub kind: SwingKind,

    /// Extreme price at the pivot candle (high for a swing high, low for a
    /// swing low).
    pub price: Decimal,

    /// Candle index within the series the pivot was detected on.
    pub index: usize,

    /// Open time of the pivot candle.
    pub timestamp: DateTime<Utc>,

    /// ATR at detection time; invalidation distance is measured in this.
    pub atr: Decimal,

    /// Pivot prominence relative to ATR, clamped to [0, 1].
    pub confidence: Decimal,
}

impl Swing {
    /// Whether `price` has travelled past the swing by more than
    /// `threshold * atr`. Directional: only a break above a swing high or
    /// below a swing low counts.
    pub fn is_invalidated_by(&self, price: Decimal, threshold: Decimal) -> bool {
        if self.atr <= Decimal::ZERO {
            return false;
        }
        let allowed = threshold * self.atr;
        match self.kind {
            SwingKind::High => price - self.price > allowed,
            SwingKind::Low => self.price - price > allowed,
        }
    }
}

/// Which way the retracement is measured from the swing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetraceDirection {
    /// Price sits below a swing high; levels step down from the high.
    Downward,
    /// Price sits above a swing low; levels step up from the low.
    Upward,
}

/// The five canonical retracement levels for one (symbol, timeframe) key.
///
/// One live entry per key; superseded when expired or when the source swing
/// is invalidated, recomputed lazily on the next request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetracementLevels {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub swing: Swing,
    pub direction: RetraceDirection,
    pub computed_at: DateTime<Utc>,

    /// Seconds this entry may be served from cache.
    pub ttl_secs: i64,

    pub r236: Decimal,
    pub r382: Decimal,
    pub r500: Decimal,
    pub r618: Decimal,
    pub r786: Decimal,
}

impl RetracementLevels {
    /// The designated primary entry reference (0.618).
    pub fn primary_entry(&self) -> Decimal {
        self.r618
    }

    /// All five levels, shallowest fraction first.
    pub fn levels(&self) -> [Decimal; 5] {
        [self.r236, self.r382, self.r500, self.r618, self.r786]
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.computed_at > Duration::seconds(self.ttl_secs)
    }

    /// Level-touch predicate: |price - level| <= tolerance * ATR.
    pub fn touches(&self, price: Decimal, level: Decimal, tolerance: Decimal) -> bool {
        if self.swing.atr <= Decimal::ZERO {
            return price == level;
        }
        (price - level).abs() <= tolerance * self.swing.atr
    }
}
