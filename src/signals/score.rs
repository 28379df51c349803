//! Tier classification of a retracement setup.
//!
//! Two hard gates (trend alignment and a touch of the primary 0.618 level)
//! decide whether a setup exists at all; the remaining confluence factors
//! (RSI zone, volume expansion, swing confidence) grade it into a tier.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{RetraceDirection, RetracementLevels, SignalTier, TradeSide};

use super::indicators::{FeatureSet, Trend};

/// Confluence thresholds for grading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreConfig {
    /// RSI must be at or below this for a long pullback entry.
    pub rsi_long_max: Decimal,

    /// RSI must be at or above this for a short rally entry.
    pub rsi_short_min: Decimal,

    /// Volume ratio counting as expansion.
    pub volume_expansion: Decimal,

    /// Minimum swing confidence counting toward confluence.
    pub min_swing_confidence: Decimal,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            rsi_long_max: dec!(45),
            rsi_short_min: dec!(55),
            volume_expansion: dec!(1.2),
            min_swing_confidence: dec!(0.5),
        }
    }
}

/// A graded opportunity.
#[derive(Debug, Clone)]
pub struct ScoredSignal {
    pub tier: SignalTier,
    pub side: TradeSide,

    /// Confluence factors that fired, for logging.
    pub reasons: Vec<&'static str>,
}

/// Stateless scorer over features and levels.
#[derive(Debug, Clone, Default)]
pub struct SignalScorer {
    config: ScoreConfig,
}

impl SignalScorer {
    pub fn new(config: ScoreConfig) -> Self {
        Self { config }
    }

    /// Grade one setup. `touching_primary` is the cache's level-touch
    /// verdict for the 0.618 entry reference.
    pub fn score(
        &self,
        features: &FeatureSet,
        levels: &RetracementLevels,
        touching_primary: bool,
    ) -> ScoredSignal {
        // Gate 1: the retracement direction must agree with the trend.
        // A pullback from a swing high is bought only in an uptrend; a
        // rally off a swing low is sold only in a downtrend.
        let side = match (levels.direction, features.trend) {
            (RetraceDirection::Downward, Trend::Up) => TradeSide::Long,
            (RetraceDirection::Upward, Trend::Down) => TradeSide::Short,
            _ => {
                return ScoredSignal {
                    tier: SignalTier::Skip,
                    side: TradeSide::Long,
                    reasons: vec!["trend_mismatch"],
                }
            }
        };

        // Gate 2: price must be at the primary entry reference.
        if !touching_primary {
            return ScoredSignal {
                tier: SignalTier::Skip,
                side,
                reasons: vec!["no_level_touch"],
            };
        }

        let mut reasons = vec!["trend_aligned", "primary_level_touch"];
        let mut confluence = 0u8;

        let rsi_ok = match side {
            TradeSide::Long => features.rsi <= self.config.rsi_long_max,
            TradeSide::Short => features.rsi >= self.config.rsi_short_min,
        };
        if rsi_ok {
            confluence += 1;
            reasons.push("rsi_zone");
        }

        if features.volume_ratio >= self.config.volume_expansion {
            confluence += 1;
            reasons.push("volume_expansion");
        }

        if levels.swing.confidence >= self.config.min_swing_confidence {
            confluence += 1;
            reasons.push("swing_confidence");
        }

        let tier = match confluence {
            3 => SignalTier::Tier1,
            2 => SignalTier::Tier2,
            _ => SignalTier::Tier3,
        };

        debug!(
            symbol = %levels.symbol,
            tier = tier.as_str(),
            side = side.as_str(),
            ?reasons,
            "signal scored"
        );

        ScoredSignal { tier, side, reasons }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Swing, SwingKind, Timeframe};
    use chrono::Utc;

    fn features(trend: Trend, rsi: Decimal, volume_ratio: Decimal) -> FeatureSet {
        FeatureSet {
            price: dec!(103.8),
            rsi,
            ema_fast: dec!(0),
            ema_slow: dec!(0),
            ema_trend: dec!(0),
            atr: dec!(2),
            volume_ratio,
            volume_average: dec!(1000),
            trend,
        }
    }

    fn levels(confidence: Decimal) -> RetracementLevels {
        RetracementLevels {
            symbol: "BTCUSDT".to_string(),
            timeframe: Timeframe::H1,
            swing: Swing {
                kind: SwingKind::High,
                price: dec!(110),
                index: 5,
                timestamp: Utc::now(),
                atr: dec!(2),
                confidence,
            },
            direction: RetraceDirection::Downward,
            computed_at: Utc::now(),
            ttl_secs: 3600,
            r236: dec!(107.64),
            r382: dec!(106.18),
            r500: dec!(105),
            r618: dec!(103.82),
            r786: dec!(102.14),
        }
    }

    #[test]
    fn test_full_confluence_is_tier1() {
        let scorer = SignalScorer::default();
        let signal = scorer.score(&features(Trend::Up, dec!(40), dec!(1.5)), &levels(dec!(0.9)), true);

        assert_eq!(signal.tier, SignalTier::Tier1);
        assert_eq!(signal.side, TradeSide::Long);
        assert!(signal.reasons.contains(&"rsi_zone"));
    }

    #[test]
    fn test_two_factors_is_tier2() {
        let scorer = SignalScorer::default();
        // Weak volume, everything else fires.
        let signal = scorer.score(&features(Trend::Up, dec!(40), dec!(0.8)), &levels(dec!(0.9)), true);
        assert_eq!(signal.tier, SignalTier::Tier2);
    }

    #[test]
    fn test_gated_setup_is_at_least_tier3() {
        let scorer = SignalScorer::default();
        // Both gates pass but no extra confluence.
        let signal = scorer.score(&features(Trend::Up, dec!(60), dec!(0.8)), &levels(dec!(0.2)), true);
        assert_eq!(signal.tier, SignalTier::Tier3);
    }

    #[test]
    fn test_trend_mismatch_skips() {
        let scorer = SignalScorer::default();
        let signal = scorer.score(&features(Trend::Down, dec!(40), dec!(1.5)), &levels(dec!(0.9)), true);
        assert_eq!(signal.tier, SignalTier::Skip);
    }

    #[test]
    fn test_no_touch_skips() {
        let scorer = SignalScorer::default();
        let signal = scorer.score(&features(Trend::Up, dec!(40), dec!(1.5)), &levels(dec!(0.9)), false);
        assert_eq!(signal.tier, SignalTier::Skip);
    }
}
