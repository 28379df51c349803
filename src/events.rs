//! Economic-event blackout filter.
//!
//! Append-only calendar of [`NewsEvent`] entries per asset class. Every
//! trade-eligibility check returns a verdict plus a human-readable reason;
//! a "cannot trade" verdict is an absolute veto regardless of signal
//! quality.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{AssetClass, EventImpact, EventKind, NewsEvent};

/// Blackout window widths per asset class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Symmetric buffer around forex red-flag macro releases, minutes.
    pub forex_buffer_mins: i64,

    /// Symmetric buffer around equity earnings/dividend events, hours.
    pub equity_buffer_hours: i64,

    /// Symmetric buffer around crypto funding timestamps, minutes.
    pub funding_buffer_mins: i64,

    /// Symmetric buffer around dominance-shock events, minutes.
    pub shock_buffer_mins: i64,

    /// Events older than this are pruned, minutes.
    pub stale_after_mins: i64,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            forex_buffer_mins: 30,
            equity_buffer_hours: 48,
            funding_buffer_mins: 15,
            shock_buffer_mins: 15,
            stale_after_mins: 60,
        }
    }
}

/// Verdict of an eligibility check.
#[derive(Debug, Clone)]
pub struct TradeClearance {
    pub can_trade: bool,
    pub reason: String,
}

impl TradeClearance {
    fn allow() -> Self {
        Self {
            can_trade: true,
            reason: "No blackout window active".to_string(),
        }
    }

    fn block(reason: impl Into<String>) -> Self {
        Self {
            can_trade: false,
            reason: reason.into(),
        }
    }
}

/// The calendar itself. Events arrive from the external feed; this core
/// only reads them.
#[derive(Debug, Default)]
pub struct EventCalendar {
    events: HashMap<AssetClass, Vec<NewsEvent>>,
    config: CalendarConfig,
}

impl EventCalendar {
    pub fn new(config: CalendarConfig) -> Self {
        Self {
            events: HashMap::new(),
            config,
        }
    }

    /// Register an event from the calendar feed.
    pub fn add_event(&mut self, event: NewsEvent) {
        debug!(
            kind = event.kind.as_str(),
            class = %event.asset_class,
            time = %event.time,
            "calendar event registered"
        );
        self.events.entry(event.asset_class).or_default().push(event);
    }

    /// All registered events for one class.
    pub fn events_for(&self, class: AssetClass) -> &[NewsEvent] {
        self.events.get(&class).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total registered events across classes.
    pub fn len(&self) -> usize {
        self.events.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop events more than `stale_after_mins` past.
    pub fn prune_stale(&mut self, now: DateTime<Utc>) {
        let max_age = Duration::minutes(self.config.stale_after_mins);
        for events in self.events.values_mut() {
            events.retain(|e| !e.is_stale(now, max_age));
        }
    }

    /// Trade-eligibility check for one symbol at `now`.
    pub fn check(&self, symbol: &str, class: AssetClass, now: DateTime<Utc>) -> TradeClearance {
        match class {
            AssetClass::Forex => self.check_forex(now),
            AssetClass::Stocks => self.check_stocks(symbol, now),
            AssetClass::Crypto => self.check_crypto(now),
        }
    }

    /// Forex: symmetric minute buffer around high-impact macro releases.
    fn check_forex(&self, now: DateTime<Utc>) -> TradeClearance {
        for event in self.events_for(AssetClass::Forex) {
            if event.kind != EventKind::Macro || event.impact < EventImpact::High {
                continue;
            }
            let mins = event.minutes_to(now);
            if mins.abs() <= self.config.forex_buffer_mins {
                return TradeClearance::block(format!(
                    "High-impact event '{}' within ±{} min ({} min away)",
                    event.description, self.config.forex_buffer_mins, mins
                ));
            }
        }
        TradeClearance::allow()
    }

    /// Equities: hour buffer around earnings/dividends for the specific
    /// symbol.
    fn check_stocks(&self, symbol: &str, now: DateTime<Utc>) -> TradeClearance {
        let buffer_mins = self.config.equity_buffer_hours * 60;
        for event in self.events_for(AssetClass::Stocks) {
            if !matches!(event.kind, EventKind::Earnings | EventKind::Dividend) {
                continue;
            }
            if !event.applies_to(symbol) {
                continue;
            }
            let mins = event.minutes_to(now);
            if mins.abs() <= buffer_mins {
                return TradeClearance::block(format!(
                    "{} for {} within ±{} h",
                    event.kind.as_str(),
                    symbol,
                    self.config.equity_buffer_hours
                ));
            }
        }
        TradeClearance::allow()
    }

    /// Crypto: narrow window around the periodic 00:00/08:00/16:00 UTC
    /// funding timestamps plus any registered dominance-shock events.
    fn check_crypto(&self, now: DateTime<Utc>) -> TradeClearance {
        let to_funding = minutes_to_nearest_funding(now);
        if to_funding.abs() <= self.config.funding_buffer_mins {
            return TradeClearance::block(format!(
                "Funding window ({} min from funding timestamp)",
                to_funding
            ));
        }

        for event in self.events_for(AssetClass::Crypto) {
            if event.kind != EventKind::DominanceShock {
                continue;
            }
            let mins = event.minutes_to(now);
            if mins.abs() <= self.config.shock_buffer_mins {
                return TradeClearance::block(format!(
                    "Dominance shock '{}' within ±{} min",
                    event.description, self.config.shock_buffer_mins
                ));
            }
        }
        TradeClearance::allow()
    }
}

/// Signed minutes from `now` to the nearest of the 00:00/08:00/16:00 UTC
/// funding timestamps. Negative when the nearest timestamp has passed.
fn minutes_to_nearest_funding(now: DateTime<Utc>) -> i64 {
    let minute_of_day = (now.hour() * 60 + now.minute()) as i64;

    // 24:00 covers proximity to the next day's 00:00 slot.
    [0i64, 480, 960, 1440]
        .iter()
        .map(|slot| slot - minute_of_day)
        .min_by_key(|delta| delta.abs())
        .unwrap_or(0)
}
