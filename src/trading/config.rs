//! Risk and execution parameters.
//!
//! Defaults encode the account policy; every field can be overridden from
//! the environment-driven app config before the engines are built.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::models::{AssetClass, SignalTier};

/// Per-class stop placement parameters. The stop distance is
/// `clamp(atr * atr_multiple, entry * min_pct, entry * max_pct)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StopParams {
    /// Floor on stop distance as a fraction of entry price.
    pub min_pct: Decimal,

    /// Ceiling on stop distance as a fraction of entry price.
    pub max_pct: Decimal,

    pub atr_multiple: Decimal,
}

/// Account risk policy: per-tier risk and reward, loss caps, exposure caps,
/// and per-class stop placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Fraction of equity risked per trade, by tier.
    pub tier1_risk: Decimal,
    pub tier2_risk: Decimal,
    pub tier3_risk: Decimal,

    /// Reward-to-risk ratio targeted at TP2, by tier.
    pub tier1_rr: Decimal,
    pub tier2_rr: Decimal,
    pub tier3_rr: Decimal,

    /// Daily realized-loss cap as a fraction of equity. Breach zeroes the
    /// risk factor until the daily reset.
    pub daily_loss_cap: Decimal,

    /// Weekly realized-loss cap. Breach halves the risk factor until the
    /// weekly reset.
    pub weekly_loss_cap: Decimal,

    /// Cap on aggregate open capital-at-risk as a fraction of equity.
    pub max_total_exposure: Decimal,

    /// Capital-at-risk cap per asset class.
    pub max_class_exposure: Decimal,

    pub crypto_stop: StopParams,
    pub forex_stop: StopParams,
    pub stocks_stop: StopParams,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            tier1_risk: dec!(0.02),
            tier2_risk: dec!(0.015),
            tier3_risk: dec!(0.01),
            tier1_rr: dec!(4),
            tier2_rr: dec!(3),
            tier3_rr: dec!(2),
            daily_loss_cap: dec!(0.05),
            weekly_loss_cap: dec!(0.12),
            max_total_exposure: dec!(0.10),
            max_class_exposure: dec!(0.06),
            crypto_stop: StopParams {
                min_pct: dec!(0.015),
                max_pct: dec!(0.05),
                atr_multiple: dec!(2.0),
            },
            forex_stop: StopParams {
                min_pct: dec!(0.003),
                max_pct: dec!(0.01),
                atr_multiple: dec!(1.5),
            },
            stocks_stop: StopParams {
                min_pct: dec!(0.01),
                max_pct: dec!(0.03),
                atr_multiple: dec!(2.0),
            },
        }
    }
}

impl RiskConfig {
    /// Base risk fraction for a tier. `Skip` carries zero risk.
    pub fn tier_risk(&self, tier: SignalTier) -> Decimal {
        match tier {
            SignalTier::Tier1 => self.tier1_risk,
            SignalTier::Tier2 => self.tier2_risk,
            SignalTier::Tier3 => self.tier3_risk,
            SignalTier::Skip => Decimal::ZERO,
        }
    }

    /// Reward-to-risk ratio for a tier.
    pub fn tier_rr(&self, tier: SignalTier) -> Decimal {
        match tier {
            SignalTier::Tier1 => self.tier1_rr,
            SignalTier::Tier2 => self.tier2_rr,
            SignalTier::Tier3 => self.tier3_rr,
            SignalTier::Skip => Decimal::ZERO,
        }
    }

    pub fn stop_params(&self, class: AssetClass) -> StopParams {
        match class {
            AssetClass::Crypto => self.crypto_stop,
            AssetClass::Forex => self.forex_stop,
            AssetClass::Stocks => self.stocks_stop,
        }
    }
}

/// Fill-quality and order-lifetime parameters for the execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Maximum acceptable bid/ask spread as a fraction of mid price.
    pub max_spread_pct: Decimal,

    /// Maximum acceptable slippage between planned entry and fill, as a
    /// multiple of ATR at signal time.
    pub slippage_atr_multiple: Decimal,

    /// Fill confirmations older than this expire the pending order.
    pub max_latency_ms: i64,

    /// Distance of the trailing stop from price, as a multiple of ATR at
    /// entry.
    pub trailing_atr_multiple: Decimal,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_spread_pct: dec!(0.002),
            slippage_atr_multiple: dec!(0.5),
            max_latency_ms: 2_000,
            trailing_atr_multiple: dec!(1.0),
        }
    }
}
