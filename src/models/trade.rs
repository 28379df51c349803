//! Trade-side records: sized signals, live positions, and their lifecycle.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AssetClass;

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Long,
    Short,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Long => "long",
            TradeSide::Short => "short",
        }
    }

    /// +1 for long, -1 for short; used for direction-aware price math.
    pub fn sign(&self) -> Decimal {
        match self {
            TradeSide::Long => Decimal::ONE,
            TradeSide::Short => -Decimal::ONE,
        }
    }
}

/// Ordinal signal classification. Risk percentage and reward ratio both
/// strictly decrease Tier1 > Tier2 > Tier3; Skip never trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalTier {
    Tier1,
    Tier2,
    Tier3,
    Skip,
}

impl SignalTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalTier::Tier1 => "tier1",
            SignalTier::Tier2 => "tier2",
            SignalTier::Tier3 => "tier3",
            SignalTier::Skip => "skip",
        }
    }

    pub fn is_tradeable(&self) -> bool {
        !matches!(self, SignalTier::Skip)
    }
}

/// Position lifecycle.
///
/// `Pending -> Open -> (PartiallyFilled) -> Closed`, with side-exits to
/// `Cancelled`/`Rejected`/`Expired` before `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Pending,
    Open,
    PartiallyFilled,
    Closed,
    Cancelled,
    Rejected,
    Expired,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Pending => "pending",
            TradeStatus::Open => "open",
            TradeStatus::PartiallyFilled => "partially_filled",
            TradeStatus::Closed => "closed",
            TradeStatus::Cancelled => "cancelled",
            TradeStatus::Rejected => "rejected",
            TradeStatus::Expired => "expired",
        }
    }

    /// Whether the position still holds quantity in the market.
    pub fn is_active(&self) -> bool {
        matches!(self, TradeStatus::Open | TradeStatus::PartiallyFilled)
    }

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TradeStatus::Closed
                | TradeStatus::Cancelled
                | TradeStatus::Rejected
                | TradeStatus::Expired
        )
    }
}

/// Why a position (or part of it) was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    TakeProfit1,
    TakeProfit2,
    StopLoss,
    Manual,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::TakeProfit1 => "take_profit_1",
            CloseReason::TakeProfit2 => "take_profit_2",
            CloseReason::StopLoss => "stop_loss",
            CloseReason::Manual => "manual",
        }
    }
}

/// A fully sized trade plan produced by the risk manager at signal
/// acceptance. The execution engine turns it into an [`ExecutedTrade`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRisk {
    pub symbol: String,
    pub asset_class: AssetClass,
    pub tier: SignalTier,
    pub side: TradeSide,

    pub entry: Decimal,
    pub stop_loss: Decimal,
    pub take_profit_1: Decimal,
    pub take_profit_2: Decimal,

    /// Capital at risk if the stop is hit.
    pub risk_amount: Decimal,

    /// Quantity such that stop-out loses exactly `risk_amount`.
    pub position_size: Decimal,

    /// Capital gained if TP2 is hit with the full size.
    pub reward_amount: Decimal,

    pub rr_ratio: Decimal,

    /// Where the stop moves after the TP1 partial.
    pub breakeven_price: Decimal,

    /// Initial trailing-stop price (equal to the stop until armed).
    pub trailing_stop: Decimal,

    /// ATR at signal time; drives trailing distance.
    pub atr: Decimal,
}

/// The live (or closed) position record owned by the execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutedTrade {
    pub id: String,
    pub symbol: String,
    pub asset_class: AssetClass,
    pub tier: SignalTier,
    pub side: TradeSide,
    pub status: TradeStatus,

    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub remaining_quantity: Decimal,

    pub stop_loss: Decimal,
    pub take_profit_1: Decimal,
    pub take_profit_2: Decimal,
    pub breakeven_price: Decimal,

    /// Ratcheting stop; only moves in the trade's favor once armed.
    pub trailing_stop: Decimal,
    pub trailing_armed: bool,

    pub partial_1_taken: bool,

    pub atr_at_entry: Decimal,

    pub unrealized_pnl: Decimal,
    pub unrealized_pnl_pct: Decimal,
    pub realized_pnl: Decimal,

    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub close_reason: Option<CloseReason>,
}

impl ExecutedTrade {
    /// Build a pending trade from a sized plan.
    pub fn from_plan(plan: &TradeRisk, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            symbol: plan.symbol.clone(),
            asset_class: plan.asset_class,
            tier: plan.tier,
            side: plan.side,
            status: TradeStatus::Pending,
            entry_price: plan.entry,
            quantity: plan.position_size,
            remaining_quantity: plan.position_size,
            stop_loss: plan.stop_loss,
            take_profit_1: plan.take_profit_1,
            take_profit_2: plan.take_profit_2,
            breakeven_price: plan.breakeven_price,
            trailing_stop: plan.trailing_stop,
            trailing_armed: false,
            partial_1_taken: false,
            atr_at_entry: plan.atr,
            unrealized_pnl: Decimal::ZERO,
            unrealized_pnl_pct: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            opened_at: now,
            closed_at: None,
            close_reason: None,
        }
    }

    /// PnL for closing `quantity` at `price`.
    pub fn pnl_at(&self, price: Decimal, quantity: Decimal) -> Decimal {
        (price - self.entry_price) * quantity * self.side.sign()
    }

    /// Recompute unrealized PnL and PnL% for the remaining quantity.
    pub fn update_unrealized(&mut self, price: Decimal) {
        self.unrealized_pnl = self.pnl_at(price, self.remaining_quantity);
        let basis = self.entry_price * self.remaining_quantity;
        self.unrealized_pnl_pct = if basis.is_zero() {
            Decimal::ZERO
        } else {
            self.unrealized_pnl / basis * dec!(100)
        };
    }

    /// The stop that currently governs exits: the tighter of the hard stop
    /// and the trailing stop once the latter is armed.
    pub fn effective_stop(&self) -> Decimal {
        if !self.trailing_armed {
            return self.stop_loss;
        }
        match self.side {
            TradeSide::Long => self.stop_loss.max(self.trailing_stop),
            TradeSide::Short => self.stop_loss.min(self.trailing_stop),
        }
    }

    /// Direction-aware "price reached target" check.
    pub fn target_hit(&self, price: Decimal, target: Decimal) -> bool {
        match self.side {
            TradeSide::Long => price >= target,
            TradeSide::Short => price <= target,
        }
    }

    /// Direction-aware "price reached stop" check.
    pub fn stop_hit(&self, price: Decimal) -> bool {
        match self.side {
            TradeSide::Long => price <= self.effective_stop(),
            TradeSide::Short => price >= self.effective_stop(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> TradeRisk {
        TradeRisk {
            symbol: "BTCUSDT".to_string(),
            asset_class: AssetClass::Crypto,
            tier: SignalTier::Tier1,
            side: TradeSide::Long,
            entry: dec!(100),
            stop_loss: dec!(98),
            take_profit_1: dec!(104),
            take_profit_2: dec!(108),
            risk_amount: dec!(200),
            position_size: dec!(100),
            reward_amount: dec!(800),
            rr_ratio: dec!(4),
            breakeven_price: dec!(100),
            trailing_stop: dec!(98),
            atr: dec!(1.5),
        }
    }

    #[test]
    fn test_pnl_direction() {
        let mut trade = ExecutedTrade::from_plan(&plan(), Utc::now());
        trade.status = TradeStatus::Open;

        trade.update_unrealized(dec!(102));
        assert_eq!(trade.unrealized_pnl, dec!(200));
        assert_eq!(trade.unrealized_pnl_pct, dec!(2));

        trade.side = TradeSide::Short;
        trade.update_unrealized(dec!(102));
        assert_eq!(trade.unrealized_pnl, dec!(-200));
    }

    #[test]
    fn test_effective_stop_uses_trailing_once_armed() {
        let mut trade = ExecutedTrade::from_plan(&plan(), Utc::now());
        assert_eq!(trade.effective_stop(), dec!(98));

        trade.trailing_armed = true;
        trade.trailing_stop = dec!(101);
        assert_eq!(trade.effective_stop(), dec!(101));
        assert!(trade.stop_hit(dec!(100.5)));
    }

    #[test]
    fn test_target_hit_mirrored_for_short() {
        let mut trade = ExecutedTrade::from_plan(&plan(), Utc::now());
        assert!(trade.target_hit(dec!(104), dec!(104)));
        assert!(!trade.target_hit(dec!(103.9), dec!(104)));

        trade.side = TradeSide::Short;
        assert!(trade.target_hit(dec!(96), dec!(96)));
        assert!(!trade.target_hit(dec!(96.1), dec!(96)));
    }

    #[test]
    fn test_status_predicates() {
        assert!(TradeStatus::Open.is_active());
        assert!(TradeStatus::PartiallyFilled.is_active());
        assert!(!TradeStatus::Pending.is_active());
        assert!(TradeStatus::Rejected.is_terminal());
        assert!(!TradeStatus::Open.is_terminal());
    }
}
