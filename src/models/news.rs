//! Scheduled and ad-hoc market events consumed by the blackout filter.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::AssetClass;

/// Event category; each maps to a class-specific blackout rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Scheduled macro release (NFP, CPI, rate decision).
    Macro,
    Earnings,
    Dividend,
    /// Ad-hoc crypto dominance shock.
    DominanceShock,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Macro => "macro",
            EventKind::Earnings => "earnings",
            EventKind::Dividend => "dividend",
            EventKind::DominanceShock => "dominance_shock",
        }
    }
}

/// How market-moving the event is expected to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventImpact {
    Low,
    Medium,
    High,
}

/// One calendar entry. Entered by the external calendar feed, read-only to
/// the core, pruned once sufficiently stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsEvent {
    pub kind: EventKind,

    /// Scheduled (or observed) event time, UTC.
    pub time: DateTime<Utc>,

    pub asset_class: AssetClass,

    /// Set for symbol-scoped events (earnings, dividends); `None` for
    /// class-wide events.
    pub symbol: Option<String>,

    pub impact: EventImpact,

    /// Magnitude for ad-hoc shocks, 0..=1. Zero for scheduled events.
    pub severity: Decimal,

    pub description: String,
}

impl NewsEvent {
    /// Signed minutes from `now` to the event; negative once it has passed.
    pub fn minutes_to(&self, now: DateTime<Utc>) -> i64 {
        (self.time - now).num_minutes()
    }

    /// Stale once more than `max_age` past the event time.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.time > max_age
    }

    /// Whether this event applies to the given symbol. Class-wide events
    /// apply to every symbol in the class.
    pub fn applies_to(&self, symbol: &str) -> bool {
        match &self.symbol {
            Some(s) => s == symbol,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn nfp(time: DateTime<Utc>) -> NewsEvent {
        NewsEvent {
            kind: EventKind::Macro,
            time,
            asset_class: AssetClass::Forex,
            symbol: None,
            impact: EventImpact::High,
            severity: dec!(0),
            description: "Non-farm payrolls".to_string(),
        }
    }

    #[test]
    fn test_minutes_to_signed() {
        let now = Utc::now();
        let event = nfp(now + Duration::minutes(10));
        assert_eq!(event.minutes_to(now), 10);

        let past = nfp(now - Duration::minutes(30));
        assert!(past.minutes_to(now) < 0);
    }

    #[test]
    fn test_staleness() {
        let now = Utc::now();
        let event = nfp(now - Duration::minutes(90));
        assert!(event.is_stale(now, Duration::hours(1)));
        assert!(!event.is_stale(now, Duration::hours(2)));
    }

    #[test]
    fn test_symbol_scoping() {
        let now = Utc::now();
        let mut event = nfp(now);
        assert!(event.applies_to("EURUSD"));

        event.symbol = Some("AAPL".to_string());
        assert!(event.applies_to("AAPL"));
        assert!(!event.applies_to("MSFT"));
    }
}
