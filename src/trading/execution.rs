//! Order lifecycle and multi-tier exit management.
//!
//! The engine owns at most one position per symbol. Orders enter as
//! `Pending`, are confirmed or rejected against fill-quality checks, and
//! live positions are driven by price ticks through a fixed guard order:
//! TP1 first (partial close, stop to breakeven, trailing armed), then TP2,
//! then the stop. A close after the TP1 partial still reports `stop_loss`
//! when the stop fires.

use std::collections::HashMap;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, warn};

use crate::models::{CloseReason, ExecutedTrade, TradeRisk, TradeSide, TradeStatus};

use super::config::ExecutionConfig;

/// A realized close, full or partial, emitted from a price tick or a
/// manual close. The scheduler journals these and folds the PnL into the
/// account state.
#[derive(Debug, Clone)]
pub struct CloseEvent {
    pub trade_id: String,
    pub symbol: String,
    pub reason: CloseReason,
    pub quantity: Decimal,
    pub fill_price: Decimal,
    pub pnl: Decimal,

    /// Position status after this close.
    pub status: TradeStatus,
}

/// Aggregate view over open and closed positions.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub open_positions: usize,
    pub closed_trades: usize,
    pub open_unrealized_pnl: Decimal,
    pub avg_open_pnl_pct: Decimal,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    pub avg_realized_pnl_pct: Decimal,
}

pub struct ExecutionEngine {
    config: ExecutionConfig,

    /// Live and pending positions, one per symbol.
    active: HashMap<String, ExecutedTrade>,

    /// Terminal positions retained for reporting.
    closed: Vec<ExecutedTrade>,
}

impl ExecutionEngine {
    pub fn new(config: ExecutionConfig) -> Self {
        Self {
            config,
            active: HashMap::new(),
            closed: Vec::new(),
        }
    }

    pub fn position(&self, symbol: &str) -> Option<&ExecutedTrade> {
        self.active.get(symbol)
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &ExecutedTrade> {
        self.active.values()
    }

    pub fn closed_trades(&self) -> &[ExecutedTrade] {
        &self.closed
    }

    /// Accept a sized plan as a pending order. One position per symbol;
    /// a second submission for the same symbol is an error.
    pub fn submit(&mut self, plan: &TradeRisk, now: DateTime<Utc>) -> Result<String> {
        if self.active.contains_key(&plan.symbol) {
            bail!("position already open for {}", plan.symbol);
        }

        let trade = ExecutedTrade::from_plan(plan, now);
        let id = trade.id.clone();
        info!(
            symbol = %plan.symbol,
            side = plan.side.as_str(),
            tier = plan.tier.as_str(),
            entry = %plan.entry,
            size = %plan.position_size,
            "order submitted"
        );
        self.active.insert(plan.symbol.clone(), trade);
        Ok(id)
    }

    /// Confirm (or reject) a pending order against the venue's fill.
    ///
    /// Latency past the cap expires the order; an excessive spread or a
    /// fill too far from the planned entry rejects it. On acceptance the
    /// entry price becomes the actual fill; the stop and targets keep
    /// their planned levels.
    pub fn confirm_fill(
        &mut self,
        symbol: &str,
        fill_price: Decimal,
        spread_pct: Decimal,
        latency_ms: i64,
    ) -> Result<TradeStatus> {
        let trade = match self.active.get_mut(symbol) {
            Some(t) if t.status == TradeStatus::Pending => t,
            Some(t) => bail!("cannot confirm {} in status {}", symbol, t.status.as_str()),
            None => bail!("no pending order for {}", symbol),
        };

        if latency_ms > self.config.max_latency_ms {
            warn!(symbol, latency_ms, "fill confirmation too late, expiring order");
            trade.status = TradeStatus::Expired;
        } else if spread_pct > self.config.max_spread_pct {
            warn!(symbol, %spread_pct, "spread too wide, rejecting order");
            trade.status = TradeStatus::Rejected;
        } else if (fill_price - trade.entry_price).abs()
            > trade.atr_at_entry * self.config.slippage_atr_multiple
        {
            warn!(symbol, %fill_price, planned = %trade.entry_price, "slippage beyond tolerance, rejecting order");
            trade.status = TradeStatus::Rejected;
        } else {
            trade.entry_price = fill_price;
            trade.status = TradeStatus::Open;
            info!(symbol, %fill_price, "position opened");
        }

        let status = trade.status;
        if status.is_terminal() {
            self.retire(symbol);
        }
        Ok(status)
    }

    /// Cancel a pending order that never filled.
    pub fn cancel(&mut self, symbol: &str) -> Result<()> {
        let trade = match self.active.get_mut(symbol) {
            Some(t) if t.status == TradeStatus::Pending => t,
            Some(t) => bail!("cannot cancel {} in status {}", symbol, t.status.as_str()),
            None => bail!("no pending order for {}", symbol),
        };
        trade.status = TradeStatus::Cancelled;
        self.retire(symbol);
        info!(symbol, "pending order cancelled");
        Ok(())
    }

    /// Drive one symbol's exits from a price tick.
    ///
    /// Guard order is fixed: TP1, then TP2, then the stop, so a tick that
    /// gaps through several levels realizes them in that order. After the
    /// exits, the trailing stop ratchets and never retreats.
    pub fn on_price_tick(
        &mut self,
        symbol: &str,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Vec<CloseEvent> {
        let Some(trade) = self.active.get_mut(symbol) else {
            return Vec::new();
        };
        if !trade.status.is_active() {
            return Vec::new();
        }

        let mut events = Vec::new();

        // TP1: close half, move the stop to breakeven, arm the trail.
        if !trade.partial_1_taken && trade.target_hit(price, trade.take_profit_1) {
            let quantity = trade.remaining_quantity / dec!(2);
            let fill_price = trade.take_profit_1;
            let pnl = trade.pnl_at(fill_price, quantity);

            trade.remaining_quantity -= quantity;
            trade.realized_pnl += pnl;
            trade.partial_1_taken = true;
            trade.status = TradeStatus::PartiallyFilled;
            trade.stop_loss = trade.breakeven_price;
            trade.trailing_stop = trade.breakeven_price;
            trade.trailing_armed = true;

            info!(symbol, %fill_price, %pnl, "TP1 partial taken, stop at breakeven");
            events.push(CloseEvent {
                trade_id: trade.id.clone(),
                symbol: symbol.to_string(),
                reason: CloseReason::TakeProfit1,
                quantity,
                fill_price,
                pnl,
                status: trade.status,
            });
        }

        // TP2: close the remainder at the target.
        if trade.status.is_active() && trade.target_hit(price, trade.take_profit_2) {
            let fill_price = trade.take_profit_2;
            events.push(close_remainder(trade, fill_price, CloseReason::TakeProfit2, now));
        }

        // Stop: a stop-market fill at the tick price, so gaps through the
        // stop realize the gapped price rather than the stop level.
        if trade.status.is_active() && trade.stop_hit(price) {
            events.push(close_remainder(trade, price, CloseReason::StopLoss, now));
        }

        if trade.status.is_active() {
            if trade.trailing_armed {
                let distance = trade.atr_at_entry * self.config.trailing_atr_multiple;
                let candidate = price - trade.side.sign() * distance;
                trade.trailing_stop = match trade.side {
                    TradeSide::Long => trade.trailing_stop.max(candidate),
                    TradeSide::Short => trade.trailing_stop.min(candidate),
                };
            }
            trade.update_unrealized(price);
        } else if trade.status.is_terminal() {
            self.retire(symbol);
        }

        events
    }

    /// Close whatever remains of a position at the given price.
    pub fn close_manual(
        &mut self,
        symbol: &str,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<CloseEvent> {
        let trade = match self.active.get_mut(symbol) {
            Some(t) if t.status.is_active() => t,
            Some(t) => bail!("cannot close {} in status {}", symbol, t.status.as_str()),
            None => bail!("no position for {}", symbol),
        };

        let event = close_remainder(trade, price, CloseReason::Manual, now);
        self.retire(symbol);
        Ok(event)
    }

    /// Aggregate open/closed statistics.
    pub fn report(&self) -> ExecutionReport {
        let open: Vec<_> = self
            .active
            .values()
            .filter(|t| t.status.is_active())
            .collect();

        let mut gross_profit = Decimal::ZERO;
        let mut gross_loss = Decimal::ZERO;
        let mut pnl_pct_sum = Decimal::ZERO;
        for trade in &self.closed {
            if trade.realized_pnl > Decimal::ZERO {
                gross_profit += trade.realized_pnl;
            } else {
                gross_loss += trade.realized_pnl.abs();
            }
            let basis = trade.entry_price * trade.quantity;
            if !basis.is_zero() {
                pnl_pct_sum += trade.realized_pnl / basis * dec!(100);
            }
        }

        let closed_trades = self.closed.len();
        ExecutionReport {
            open_positions: open.len(),
            closed_trades,
            open_unrealized_pnl: open.iter().map(|t| t.unrealized_pnl).sum(),
            avg_open_pnl_pct: if open.is_empty() {
                Decimal::ZERO
            } else {
                open.iter().map(|t| t.unrealized_pnl_pct).sum::<Decimal>()
                    / Decimal::from(open.len() as u64)
            },
            gross_profit,
            gross_loss,
            avg_realized_pnl_pct: if closed_trades == 0 {
                Decimal::ZERO
            } else {
                pnl_pct_sum / Decimal::from(closed_trades as u64)
            },
        }
    }

    /// Move a terminal position out of the active map.
    fn retire(&mut self, symbol: &str) {
        if let Some(trade) = self.active.remove(symbol) {
            self.closed.push(trade);
        }
    }
}

/// Realize the remaining quantity at `fill_price` and mark the position
/// closed.
fn close_remainder(
    trade: &mut ExecutedTrade,
    fill_price: Decimal,
    reason: CloseReason,
    now: DateTime<Utc>,
) -> CloseEvent {
    let quantity = trade.remaining_quantity;
    let pnl = trade.pnl_at(fill_price, quantity);

    trade.remaining_quantity = Decimal::ZERO;
    trade.realized_pnl += pnl;
    trade.unrealized_pnl = Decimal::ZERO;
    trade.unrealized_pnl_pct = Decimal::ZERO;
    trade.status = TradeStatus::Closed;
    trade.closed_at = Some(now);
    trade.close_reason = Some(reason);

    info!(
        symbol = %trade.symbol,
        reason = reason.as_str(),
        %fill_price,
        %pnl,
        total = %trade.realized_pnl,
        "position closed"
    );

    CloseEvent {
        trade_id: trade.id.clone(),
        symbol: trade.symbol.clone(),
        reason,
        quantity,
        fill_price,
        pnl,
        status: trade.status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssetClass, SignalTier};
    use rust_decimal_macros::dec;

    fn plan() -> TradeRisk {
        TradeRisk {
            symbol: "BTCUSDT".to_string(),
            asset_class: AssetClass::Crypto,
            tier: SignalTier::Tier1,
            side: TradeSide::Long,
            entry: dec!(100),
            stop_loss: dec!(90),
            take_profit_1: dec!(110),
            take_profit_2: dec!(120),
            risk_amount: dec!(200),
            position_size: dec!(20),
            reward_amount: dec!(800),
            rr_ratio: dec!(4),
            breakeven_price: dec!(100),
            trailing_stop: dec!(90),
            atr: dec!(2),
        }
    }

    fn open_engine() -> ExecutionEngine {
        let mut engine = ExecutionEngine::new(ExecutionConfig::default());
        engine.submit(&plan(), Utc::now()).unwrap();
        engine
            .confirm_fill("BTCUSDT", dec!(100), dec!(0.001), 100)
            .unwrap();
        engine
    }

    #[test]
    fn test_one_position_per_symbol() {
        let mut engine = ExecutionEngine::new(ExecutionConfig::default());
        engine.submit(&plan(), Utc::now()).unwrap();
        assert!(engine.submit(&plan(), Utc::now()).is_err());
    }

    #[test]
    fn test_confirm_rejects_wide_spread() {
        let mut engine = ExecutionEngine::new(ExecutionConfig::default());
        engine.submit(&plan(), Utc::now()).unwrap();
        let status = engine
            .confirm_fill("BTCUSDT", dec!(100), dec!(0.01), 100)
            .unwrap();
        assert_eq!(status, TradeStatus::Rejected);
        assert!(engine.position("BTCUSDT").is_none());
    }

    #[test]
    fn test_confirm_rejects_slippage() {
        let mut engine = ExecutionEngine::new(ExecutionConfig::default());
        engine.submit(&plan(), Utc::now()).unwrap();
        // Tolerance is 0.5 * ATR(2) = 1 point.
        let status = engine
            .confirm_fill("BTCUSDT", dec!(101.5), dec!(0.001), 100)
            .unwrap();
        assert_eq!(status, TradeStatus::Rejected);
    }

    #[test]
    fn test_confirm_expires_on_latency() {
        let mut engine = ExecutionEngine::new(ExecutionConfig::default());
        engine.submit(&plan(), Utc::now()).unwrap();
        let status = engine
            .confirm_fill("BTCUSDT", dec!(100), dec!(0.001), 5_000)
            .unwrap();
        assert_eq!(status, TradeStatus::Expired);
    }

    #[test]
    fn test_tp1_partial_then_stop_loss() {
        let mut engine = open_engine();

        // Tick at TP1: half closes, stop moves to breakeven, trail arms.
        let events = engine.on_price_tick("BTCUSDT", dec!(110), Utc::now());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, CloseReason::TakeProfit1);
        assert_eq!(events[0].quantity, dec!(10));
        assert_eq!(events[0].pnl, dec!(100));

        let trade = engine.position("BTCUSDT").unwrap();
        assert_eq!(trade.status, TradeStatus::PartiallyFilled);
        assert_eq!(trade.remaining_quantity, dec!(10));
        assert_eq!(trade.stop_loss, dec!(100));
        assert!(trade.trailing_armed);

        // Crash through the stop: remainder closes as a stop-loss.
        let events = engine.on_price_tick("BTCUSDT", dec!(85), Utc::now());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, CloseReason::StopLoss);
        assert_eq!(events[0].status, TradeStatus::Closed);
        // Gapped fill at the tick price, not the stop level.
        assert_eq!(events[0].fill_price, dec!(85));

        assert!(engine.position("BTCUSDT").is_none());
        assert_eq!(engine.closed_trades().len(), 1);
        assert_eq!(
            engine.closed_trades()[0].close_reason,
            Some(CloseReason::StopLoss)
        );
    }

    #[test]
    fn test_gap_through_both_targets() {
        let mut engine = open_engine();

        let events = engine.on_price_tick("BTCUSDT", dec!(125), Utc::now());
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].reason, CloseReason::TakeProfit1);
        assert_eq!(events[1].reason, CloseReason::TakeProfit2);
        // TP fills at the target levels: 10 * 10 and 10 * 20.
        assert_eq!(events[0].pnl, dec!(100));
        assert_eq!(events[1].pnl, dec!(200));
        assert!(engine.position("BTCUSDT").is_none());
    }

    #[test]
    fn test_trailing_ratchets_and_never_retreats() {
        let mut engine = open_engine();
        engine.on_price_tick("BTCUSDT", dec!(110), Utc::now());

        // Trail distance is ATR(2) * 1.0; price 114 puts the trail at 112.
        engine.on_price_tick("BTCUSDT", dec!(114), Utc::now());
        assert_eq!(engine.position("BTCUSDT").unwrap().trailing_stop, dec!(112));

        // A pullback above the trail does not loosen it.
        engine.on_price_tick("BTCUSDT", dec!(113), Utc::now());
        assert_eq!(engine.position("BTCUSDT").unwrap().trailing_stop, dec!(112));

        // Falling through the trail closes the remainder as a stop.
        let events = engine.on_price_tick("BTCUSDT", dec!(111.9), Utc::now());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, CloseReason::StopLoss);
        assert!(events[0].pnl > Decimal::ZERO);
    }

    #[test]
    fn test_manual_close() {
        let mut engine = open_engine();
        let event = engine.close_manual("BTCUSDT", dec!(105), Utc::now()).unwrap();
        assert_eq!(event.reason, CloseReason::Manual);
        assert_eq!(event.pnl, dec!(100));
        assert!(engine.position("BTCUSDT").is_none());
    }

    #[test]
    fn test_report_aggregates() {
        let mut engine = open_engine();

        // Tick below TP1: position stays open, unrealized 5% on basis.
        engine.on_price_tick("BTCUSDT", dec!(105), Utc::now());
        let report = engine.report();
        assert_eq!(report.open_positions, 1);
        assert_eq!(report.open_unrealized_pnl, dec!(100));
        assert_eq!(report.avg_open_pnl_pct, dec!(5));

        engine.on_price_tick("BTCUSDT", dec!(125), Utc::now());

        let report = engine.report();
        assert_eq!(report.open_positions, 0);
        assert_eq!(report.closed_trades, 1);
        assert_eq!(report.gross_profit, dec!(300));
        assert_eq!(report.gross_loss, dec!(0));
        // 300 profit on a 2000 basis.
        assert_eq!(report.avg_realized_pnl_pct, dec!(15));
    }
}
