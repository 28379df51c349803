//! Process-wide account risk state.
//!
//! One instance per account, owned by the scheduler and mutated only by
//! position-open reservations and trade-close events (single-writer
//! discipline). Daily/weekly resets are invoked by the scheduler at UTC
//! boundaries.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::AssetClass;

/// Account-level exposure, loss, and counter bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskMetrics {
    /// Account equity the caps are computed against.
    pub equity: Decimal,

    /// Realized PnL accumulated since the last daily/weekly reset.
    pub daily_pnl: Decimal,
    pub weekly_pnl: Decimal,

    /// Realized losses (absolute value) since the last reset; compared
    /// against the loss caps.
    pub daily_loss: Decimal,
    pub weekly_loss: Decimal,

    /// Open exposure reserved per asset class.
    pub exposure: HashMap<AssetClass, Decimal>,

    pub total_trades: u32,
    pub wins: u32,
    pub losses: u32,

    /// Breach flags recomputed after every close.
    pub daily_loss_breached: bool,
    pub weekly_loss_breached: bool,
}

impl RiskMetrics {
    pub fn new(equity: Decimal) -> Self {
        Self {
            equity,
            daily_pnl: Decimal::ZERO,
            weekly_pnl: Decimal::ZERO,
            daily_loss: Decimal::ZERO,
            weekly_loss: Decimal::ZERO,
            exposure: HashMap::new(),
            total_trades: 0,
            wins: 0,
            losses: 0,
            daily_loss_breached: false,
            weekly_loss_breached: false,
        }
    }

    /// Exposure currently reserved for one class.
    pub fn class_exposure(&self, class: AssetClass) -> Decimal {
        self.exposure.get(&class).copied().unwrap_or(Decimal::ZERO)
    }

    /// Aggregate open exposure across all classes.
    pub fn total_exposure(&self) -> Decimal {
        self.exposure.values().copied().sum()
    }

    /// Reserve exposure when a position opens.
    pub fn reserve_exposure(&mut self, class: AssetClass, amount: Decimal) {
        *self.exposure.entry(class).or_insert(Decimal::ZERO) += amount;
    }

    /// Release exposure when a position (or part of it) closes. Clamps at
    /// zero so double releases cannot drive the counter negative.
    pub fn release_exposure(&mut self, class: AssetClass, amount: Decimal) {
        let entry = self.exposure.entry(class).or_insert(Decimal::ZERO);
        *entry = (*entry - amount).max(Decimal::ZERO);
    }

    /// Fold a realized close into the daily/weekly totals and counters.
    pub fn record_close(&mut self, pnl: Decimal) {
        self.daily_pnl += pnl;
        self.weekly_pnl += pnl;
        self.total_trades += 1;

        if pnl > Decimal::ZERO {
            self.wins += 1;
        } else if pnl < Decimal::ZERO {
            self.losses += 1;
            self.daily_loss += pnl.abs();
            self.weekly_loss += pnl.abs();
        }
    }

    /// Recompute breach flags against the given cap fractions.
    pub fn update_breach_flags(&mut self, daily_cap: Decimal, weekly_cap: Decimal) {
        self.daily_loss_breached = self.daily_loss >= self.equity * daily_cap;
        self.weekly_loss_breached = self.weekly_loss >= self.equity * weekly_cap;
    }

    /// Daily reset, called by the scheduler at the UTC day boundary.
    pub fn reset_daily(&mut self) {
        self.daily_pnl = Decimal::ZERO;
        self.daily_loss = Decimal::ZERO;
        self.daily_loss_breached = false;
    }

    /// Weekly reset, called by the scheduler at the UTC week boundary.
    pub fn reset_weekly(&mut self) {
        self.weekly_pnl = Decimal::ZERO;
        self.weekly_loss = Decimal::ZERO;
        self.weekly_loss_breached = false;
    }

    /// Win rate over closed trades, 0..=1.
    pub fn win_rate(&self) -> Decimal {
        if self.total_trades == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.wins) / Decimal::from(self.total_trades)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_record_close_accumulates_losses_separately() {
        let mut metrics = RiskMetrics::new(dec!(10000));

        metrics.record_close(dec!(150));
        metrics.record_close(dec!(-100));
        metrics.record_close(dec!(-50));

        assert_eq!(metrics.daily_pnl, dec!(0));
        assert_eq!(metrics.daily_loss, dec!(150));
        assert_eq!(metrics.wins, 1);
        assert_eq!(metrics.losses, 2);
        assert_eq!(metrics.total_trades, 3);
    }

    #[test]
    fn test_breach_flags() {
        let mut metrics = RiskMetrics::new(dec!(10000));
        metrics.record_close(dec!(-500));
        metrics.update_breach_flags(dec!(0.05), dec!(0.12));

        assert!(metrics.daily_loss_breached);
        assert!(!metrics.weekly_loss_breached);

        metrics.reset_daily();
        assert!(!metrics.daily_loss_breached);
        assert_eq!(metrics.daily_loss, dec!(0));
        // Weekly accumulation survives the daily reset.
        assert_eq!(metrics.weekly_loss, dec!(500));
    }

    #[test]
    fn test_win_rate() {
        let mut metrics = RiskMetrics::new(dec!(10000));
        assert_eq!(metrics.win_rate(), dec!(0));

        metrics.record_close(dec!(100));
        metrics.record_close(dec!(-50));
        assert_eq!(metrics.win_rate(), dec!(0.5));
    }

    #[test]
    fn test_exposure_reserve_release() {
        let mut metrics = RiskMetrics::new(dec!(10000));

        metrics.reserve_exposure(AssetClass::Crypto, dec!(400));
        metrics.reserve_exposure(AssetClass::Forex, dec!(200));
        assert_eq!(metrics.total_exposure(), dec!(600));

        metrics.release_exposure(AssetClass::Crypto, dec!(400));
        metrics.release_exposure(AssetClass::Crypto, dec!(100)); // double release
        assert_eq!(metrics.class_exposure(AssetClass::Crypto), dec!(0));
        assert_eq!(metrics.total_exposure(), dec!(200));
    }
}
