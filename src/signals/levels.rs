//! Fractal swing detection and retracement levels.
//!
//! A candle is a pivot high when its high exceeds every high in the `depth`
//! candles on both sides (symmetric window); pivot lows mirror on lows. The
//! most recently indexed pivot is the active swing, and the five canonical
//! fractions measured between it and the current price become the reaction
//! levels, cached per (symbol, timeframe) until they expire or the swing is
//! invalidated.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{
    OhlcvSeries, RetraceDirection, RetracementLevels, Swing, SwingKind, Timeframe,
};

/// The canonical retracement fractions, shallowest first.
pub const FRACTIONS: [Decimal; 5] = [
    dec!(0.236),
    dec!(0.382),
    dec!(0.5),
    dec!(0.618),
    dec!(0.786),
];

/// Swing-detection and cache parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelConfig {
    /// Symmetric fractal window size.
    pub depth: usize,

    /// Seconds a cached level set may be served.
    pub cache_ttl_secs: i64,

    /// ATR multiple past the swing that invalidates it.
    pub invalidation_threshold: Decimal,

    /// ATR multiple for the level-touch predicate.
    pub touch_tolerance: Decimal,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            depth: 2,
            cache_ttl_secs: 3600,
            invalidation_threshold: dec!(0.5),
            touch_tolerance: dec!(0.25),
        }
    }
}

/// Detect all fractal pivots in the series.
///
/// `atr` is the ATR at detection time; it is stamped onto each swing and
/// sizes the confidence estimate (prominence over the window relative to
/// ATR, clamped to [0, 1]).
pub fn find_swings(series: &OhlcvSeries, depth: usize, atr: Decimal) -> Vec<Swing> {
    let n = series.len();
    if depth == 0 || n < 2 * depth + 1 {
        return Vec::new();
    }

    let mut swings = Vec::new();
    for i in depth..n - depth {
        let window = (i - depth..i).chain(i + 1..=i + depth);

        let mut neighbor_high = Decimal::MIN;
        let mut neighbor_low = Decimal::MAX;
        for j in window {
            neighbor_high = neighbor_high.max(series.high[j]);
            neighbor_low = neighbor_low.min(series.low[j]);
        }

        if series.high[i] > neighbor_high {
            swings.push(Swing {
                kind: SwingKind::High,
                price: series.high[i],
                index: i,
                timestamp: series.timestamp_at(i).unwrap_or_else(Utc::now),
                atr,
                confidence: confidence(series.high[i] - neighbor_high, atr),
            });
        } else if series.low[i] < neighbor_low {
            swings.push(Swing {
                kind: SwingKind::Low,
                price: series.low[i],
                index: i,
                timestamp: series.timestamp_at(i).unwrap_or_else(Utc::now),
                atr,
                confidence: confidence(neighbor_low - series.low[i], atr),
            });
        }
    }
    swings
}

fn confidence(prominence: Decimal, atr: Decimal) -> Decimal {
    if atr <= Decimal::ZERO {
        return Decimal::ONE;
    }
    (prominence / atr).clamp(Decimal::ZERO, Decimal::ONE)
}

/// The active swing: highest candle index, skipping swings the current
/// price has already invalidated.
pub fn active_swing(
    swings: &[Swing],
    price: Decimal,
    invalidation_threshold: Decimal,
) -> Option<&Swing> {
    swings
        .iter()
        .filter(|s| !s.is_invalidated_by(price, invalidation_threshold))
        .max_by_key(|s| s.index)
}

/// Compute the five levels between a swing and the current price.
///
/// Price below a swing high retraces downward from the high; price above a
/// swing low retraces upward from the low. Returns `None` when the price
/// sits on the wrong side of the swing (no retracement geometry).
pub fn compute_levels(
    symbol: &str,
    timeframe: Timeframe,
    swing: &Swing,
    price: Decimal,
    ttl_secs: i64,
    now: DateTime<Utc>,
) -> Option<RetracementLevels> {
    let (direction, distance) = match swing.kind {
        SwingKind::High if price < swing.price => {
            (RetraceDirection::Downward, swing.price - price)
        }
        SwingKind::Low if price > swing.price => {
            (RetraceDirection::Upward, price - swing.price)
        }
        _ => return None,
    };

    let level = |fraction: Decimal| match direction {
        RetraceDirection::Downward => swing.price - distance * fraction,
        RetraceDirection::Upward => swing.price + distance * fraction,
    };

    Some(RetracementLevels {
        symbol: symbol.to_string(),
        timeframe,
        swing: swing.clone(),
        direction,
        computed_at: now,
        ttl_secs,
        r236: level(FRACTIONS[0]),
        r382: level(FRACTIONS[1]),
        r500: level(FRACTIONS[2]),
        r618: level(FRACTIONS[3]),
        r786: level(FRACTIONS[4]),
    })
}

/// Per-(symbol, timeframe) level cache with lazy recomputation.
///
/// One live entry per key; a hit is honored only while the entry is inside
/// its TTL and its source swing has not been invalidated by the current
/// price. Anything else triggers a recompute from the supplied series.
#[derive(Debug, Default)]
pub struct LevelCache {
    entries: HashMap<(String, Timeframe), RetracementLevels>,
    config: LevelConfig,
}

impl LevelCache {
    pub fn new(config: LevelConfig) -> Self {
        Self {
            entries: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &LevelConfig {
        &self.config
    }

    /// Current levels for the key, recomputing when the cached entry is
    /// missing, expired, or sourced from an invalidated swing. Returns
    /// `None` when no usable fractal exists in the window; the caller must
    /// skip the symbol this cycle.
    pub fn get_or_compute(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
        series: &OhlcvSeries,
        price: Decimal,
        atr: Decimal,
        now: DateTime<Utc>,
    ) -> Option<RetracementLevels> {
        let key = (symbol.to_string(), timeframe);

        if let Some(entry) = self.entries.get(&key) {
            let swing_valid =
                !entry.swing.is_invalidated_by(price, self.config.invalidation_threshold);
            if !entry.is_expired(now) && swing_valid {
                return Some(entry.clone());
            }
            debug!(
                symbol,
                timeframe = %timeframe,
                expired = entry.is_expired(now),
                swing_valid,
                "cached levels superseded, recomputing"
            );
        }

        let swings = find_swings(series, self.config.depth, atr);
        let swing = active_swing(&swings, price, self.config.invalidation_threshold)?;
        let levels = compute_levels(
            symbol,
            timeframe,
            swing,
            price,
            self.config.cache_ttl_secs,
            now,
        )?;

        self.entries.insert(key, levels.clone());
        Some(levels)
    }

    /// Whether the price is touching the primary (0.618) entry level.
    pub fn touches_primary(&self, levels: &RetracementLevels, price: Decimal) -> bool {
        levels.touches(price, levels.primary_entry(), self.config.touch_tolerance)
    }

    /// Number of live cache entries (valid or not; validity is checked on
    /// read).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
