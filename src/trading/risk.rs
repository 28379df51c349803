//! Position sizing and account-level risk gates.
//!
//! The risk manager is the only component that turns a scored signal into
//! a sized [`TradeRisk`] plan. It owns no state of its own; account state
//! lives in [`RiskMetrics`], which the scheduler passes in by reference so
//! that a single writer mutates it.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info, warn};

use crate::models::{AssetClass, RiskMetrics, SignalTier, TradeRisk, TradeSide};

use super::config::RiskConfig;

/// Outcome of the pre-trade risk gates.
#[derive(Debug, Clone)]
pub struct EntryValidation {
    pub allowed: bool,
    pub reason: String,
}

impl EntryValidation {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: "All risk gates passed".to_string(),
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

pub struct RiskManager {
    config: RiskConfig,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Scaling applied to every position size based on loss-cap state.
    /// A daily breach dominates: trading is fully suspended until the
    /// daily reset even if only the weekly cap would halve the size.
    pub fn risk_factor(&self, metrics: &RiskMetrics) -> Decimal {
        if metrics.daily_loss_breached {
            return Decimal::ZERO;
        }
        if metrics.weekly_loss_breached {
            return dec!(0.5);
        }
        Decimal::ONE
    }

    /// Stop distance for an entry: ATR-scaled, clamped to the class's
    /// percentage band around the entry price.
    pub fn stop_distance(&self, class: AssetClass, entry: Decimal, atr: Decimal) -> Decimal {
        let params = self.config.stop_params(class);
        let raw = atr * params.atr_multiple;
        raw.clamp(entry * params.min_pct, entry * params.max_pct)
    }

    /// Quantity such that a stop-out loses exactly the tier's risk budget
    /// (scaled by the current risk factor). Zero when the stop is at or on
    /// the wrong side of the entry.
    pub fn calculate_position_size(
        &self,
        tier: SignalTier,
        entry: Decimal,
        stop: Decimal,
        metrics: &RiskMetrics,
    ) -> Decimal {
        let distance = (entry - stop).abs();
        if distance <= Decimal::ZERO {
            warn!(%entry, %stop, "degenerate stop distance, sizing to zero");
            return Decimal::ZERO;
        }

        let risk_amount = metrics.equity * self.config.tier_risk(tier) * self.risk_factor(metrics);
        risk_amount / distance
    }

    /// TP1 at half the tier's reward distance, TP2 at the full distance.
    pub fn calculate_take_profits(
        &self,
        tier: SignalTier,
        side: TradeSide,
        entry: Decimal,
        stop: Decimal,
    ) -> (Decimal, Decimal) {
        let reward = (entry - stop).abs() * self.config.tier_rr(tier);
        let tp1 = entry + side.sign() * reward / dec!(2);
        let tp2 = entry + side.sign() * reward;
        (tp1, tp2)
    }

    /// Account-level gates checked before any order is submitted. The
    /// `risk_amount` is the would-be position's capital at risk, which is
    /// what the exposure counters track.
    pub fn can_open_trade(
        &self,
        metrics: &RiskMetrics,
        class: AssetClass,
        risk_amount: Decimal,
    ) -> EntryValidation {
        if metrics.daily_loss_breached {
            return EntryValidation::deny("Daily max loss cap breached");
        }

        if metrics.weekly_loss_breached {
            return EntryValidation::deny("Weekly max loss cap breached");
        }

        let total_cap = metrics.equity * self.config.max_total_exposure;
        if metrics.total_exposure() + risk_amount > total_cap {
            return EntryValidation::deny(format!(
                "Aggregate exposure cap exceeded ({} + {} > {})",
                metrics.total_exposure(),
                risk_amount,
                total_cap
            ));
        }

        let class_cap = metrics.equity * self.config.max_class_exposure;
        if metrics.class_exposure(class) + risk_amount > class_cap {
            return EntryValidation::deny(format!(
                "Asset-class exposure cap exceeded for {} ({} + {} > {})",
                class,
                metrics.class_exposure(class),
                risk_amount,
                class_cap
            ));
        }

        EntryValidation::allow()
    }

    /// Size a scored signal into a full trade plan, or `None` when the
    /// gates deny it or the size collapses to zero.
    pub fn build_plan(
        &self,
        symbol: &str,
        class: AssetClass,
        tier: SignalTier,
        side: TradeSide,
        entry: Decimal,
        atr: Decimal,
        metrics: &RiskMetrics,
    ) -> Option<TradeRisk> {
        if !tier.is_tradeable() {
            return None;
        }

        let distance = self.stop_distance(class, entry, atr);
        let stop_loss = entry - side.sign() * distance;

        let position_size = self.calculate_position_size(tier, entry, stop_loss, metrics);
        if position_size <= Decimal::ZERO {
            debug!(symbol, "position size collapsed to zero, skipping");
            return None;
        }

        let risk_amount = distance * position_size;
        let validation = self.can_open_trade(metrics, class, risk_amount);
        if !validation.allowed {
            info!(symbol, reason = %validation.reason, "entry denied by risk gates");
            return None;
        }

        let (take_profit_1, take_profit_2) = self.calculate_take_profits(tier, side, entry, stop_loss);
        let rr_ratio = self.config.tier_rr(tier);

        Some(TradeRisk {
            symbol: symbol.to_string(),
            asset_class: class,
            tier,
            side,
            entry,
            stop_loss,
            take_profit_1,
            take_profit_2,
            risk_amount,
            position_size,
            reward_amount: risk_amount * rr_ratio,
            rr_ratio,
            breakeven_price: entry,
            trailing_stop: stop_loss,
            atr,
        })
    }

    /// Fold a realized close back into the account state and refresh the
    /// breach flags.
    pub fn on_trade_closed(&self, metrics: &mut RiskMetrics, pnl: Decimal) {
        metrics.record_close(pnl);
        metrics.update_breach_flags(self.config.daily_loss_cap, self.config.weekly_loss_cap);

        if metrics.daily_loss_breached {
            warn!(daily_loss = %metrics.daily_loss, "daily loss cap breached, trading suspended");
        } else if metrics.weekly_loss_breached {
            warn!(weekly_loss = %metrics.weekly_loss, "weekly loss cap breached, risk halved");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> RiskManager {
        RiskManager::new(RiskConfig::default())
    }

    #[test]
    fn test_tier1_sizing_example() {
        // 2% of 10_000 equity risked over a 2-point stop: 100 units.
        let metrics = RiskMetrics::new(dec!(10000));
        let size = manager().calculate_position_size(SignalTier::Tier1, dec!(100), dec!(98), &metrics);
        assert_eq!(size, dec!(100));
    }

    #[test]
    fn test_degenerate_stop_sizes_to_zero() {
        let metrics = RiskMetrics::new(dec!(10000));
        let size = manager().calculate_position_size(SignalTier::Tier1, dec!(100), dec!(100), &metrics);
        assert_eq!(size, dec!(0));
    }

    #[test]
    fn test_take_profit_ladder_long() {
        // Tier1 RR 4 over a 2-point stop: reward 8, TP1 +4, TP2 +8.
        let (tp1, tp2) =
            manager().calculate_take_profits(SignalTier::Tier1, TradeSide::Long, dec!(100), dec!(98));
        assert_eq!(tp1, dec!(104));
        assert_eq!(tp2, dec!(108));
    }

    #[test]
    fn test_take_profit_ladder_short() {
        let (tp1, tp2) =
            manager().calculate_take_profits(SignalTier::Tier2, TradeSide::Short, dec!(100), dec!(102));
        assert_eq!(tp1, dec!(97));
        assert_eq!(tp2, dec!(94));
    }

    #[test]
    fn test_risk_factor_daily_dominates_weekly() {
        let mut metrics = RiskMetrics::new(dec!(10000));
        assert_eq!(manager().risk_factor(&metrics), dec!(1));

        metrics.weekly_loss_breached = true;
        assert_eq!(manager().risk_factor(&metrics), dec!(0.5));

        metrics.daily_loss_breached = true;
        assert_eq!(manager().risk_factor(&metrics), dec!(0));
    }

    #[test]
    fn test_weekly_breach_halves_size() {
        let mut metrics = RiskMetrics::new(dec!(10000));
        metrics.weekly_loss_breached = true;
        let size = manager().calculate_position_size(SignalTier::Tier1, dec!(100), dec!(98), &metrics);
        assert_eq!(size, dec!(50));
    }

    #[test]
    fn test_daily_breach_denies_entry() {
        let mut metrics = RiskMetrics::new(dec!(10000));
        metrics.daily_loss_breached = true;

        let validation = manager().can_open_trade(&metrics, AssetClass::Crypto, dec!(100));
        assert!(!validation.allowed);
        assert_eq!(validation.reason, "Daily max loss cap breached");
    }

    #[test]
    fn test_weekly_breach_denies_entry() {
        let mut metrics = RiskMetrics::new(dec!(10000));
        metrics.weekly_loss = dec!(1300);
        metrics.weekly_loss_breached = true;

        let validation = manager().can_open_trade(&metrics, AssetClass::Forex, dec!(100));
        assert!(!validation.allowed);
        assert_eq!(validation.reason, "Weekly max loss cap breached");
    }

    #[test]
    fn test_exposure_caps() {
        let m = manager();
        let mut metrics = RiskMetrics::new(dec!(10000));

        // Class cap is 6% = 600.
        metrics.reserve_exposure(AssetClass::Crypto, dec!(500));
        let validation = m.can_open_trade(&metrics, AssetClass::Crypto, dec!(200));
        assert!(!validation.allowed);
        assert!(validation.reason.contains("Asset-class"));

        // Same notional fits in another class.
        assert!(m.can_open_trade(&metrics, AssetClass::Forex, dec!(200)).allowed);

        // Aggregate cap is 10% = 1000.
        metrics.reserve_exposure(AssetClass::Forex, dec!(450));
        let validation = m.can_open_trade(&metrics, AssetClass::Stocks, dec!(100));
        assert!(!validation.allowed);
        assert!(validation.reason.contains("Aggregate"));
    }

    #[test]
    fn test_stop_distance_clamped() {
        let m = manager();
        // Crypto: 2*ATR clamped to [1.5%, 5%] of entry.
        assert_eq!(m.stop_distance(AssetClass::Crypto, dec!(100), dec!(1.2)), dec!(2.4));
        // Tiny ATR hits the floor.
        assert_eq!(m.stop_distance(AssetClass::Crypto, dec!(100), dec!(0.2)), dec!(1.5));
        // Huge ATR hits the ceiling.
        assert_eq!(m.stop_distance(AssetClass::Crypto, dec!(100), dec!(10)), dec!(5.0));
    }

    #[test]
    fn test_build_plan_round_trip() {
        let m = manager();
        let metrics = RiskMetrics::new(dec!(10000));

        let plan = m
            .build_plan(
                "BTCUSDT",
                AssetClass::Crypto,
                SignalTier::Tier1,
                TradeSide::Long,
                dec!(100),
                dec!(1),
                &metrics,
            )
            .unwrap();

        // ATR 1 * 2.0 = 2-point stop.
        assert_eq!(plan.stop_loss, dec!(98));
        assert_eq!(plan.position_size, dec!(100));
        assert_eq!(plan.risk_amount, dec!(200));
        assert_eq!(plan.take_profit_1, dec!(104));
        assert_eq!(plan.take_profit_2, dec!(108));
        assert_eq!(plan.breakeven_price, dec!(100));
        assert_eq!(plan.reward_amount, dec!(800));
    }

    #[test]
    fn test_build_plan_skip_tier_is_none() {
        let metrics = RiskMetrics::new(dec!(10000));
        let plan = manager().build_plan(
            "BTCUSDT",
            AssetClass::Crypto,
            SignalTier::Skip,
            TradeSide::Long,
            dec!(100),
            dec!(1),
            &metrics,
        );
        assert!(plan.is_none());
    }
}
