//! Data models for candles, swings, trades, events, and account risk state.

mod candle;
mod market;
mod metrics;
mod news;
mod swing;
mod trade;

pub use candle::OhlcvSeries;
pub use market::{AssetClass, Timeframe};
pub use metrics::RiskMetrics;
pub use news::{EventImpact, EventKind, NewsEvent};
pub use swing::{RetraceDirection, RetracementLevels, Swing, SwingKind};
pub use trade::{
    CloseReason, ExecutedTrade, SignalTier, TradeRisk, TradeSide, TradeStatus,
};
