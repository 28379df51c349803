//! Signal pipeline: indicator computation, swing/retracement levels, and
//! tier scoring.

pub mod indicators;
pub mod levels;
pub mod score;

pub use indicators::{FeatureSet, IndicatorConfig, Trend};
pub use levels::{LevelCache, LevelConfig};
pub use score::{ScoreConfig, SignalScorer};
