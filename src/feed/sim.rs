//! Deterministic in-memory venue for dry runs and tests.

use std::collections::HashMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::RwLock;

use crate::models::{OhlcvSeries, Timeframe, TradeRisk};

use super::{MarketData, OrderAck, OrderVenue, Quote};

#[derive(Default)]
struct SimState {
    series: HashMap<(String, Timeframe), OhlcvSeries>,
    prices: HashMap<String, Decimal>,
}

/// Simulated data source and venue. Candles and prices are loaded by the
/// caller; orders always fill at the current price with a fixed spread and
/// latency.
pub struct SimVenue {
    state: RwLock<SimState>,
    spread_pct: Decimal,
    latency_ms: i64,
}

impl Default for SimVenue {
    fn default() -> Self {
        Self {
            state: RwLock::new(SimState::default()),
            spread_pct: dec!(0.001),
            latency_ms: 50,
        }
    }
}

impl SimVenue {
    pub fn new(spread_pct: Decimal, latency_ms: i64) -> Self {
        Self {
            state: RwLock::new(SimState::default()),
            spread_pct,
            latency_ms,
        }
    }

    pub async fn load_series(&self, symbol: &str, timeframe: Timeframe, series: OhlcvSeries) {
        let mut state = self.state.write().await;
        if let Some(close) = series.last_close() {
            state.prices.insert(symbol.to_string(), close);
        }
        state.series.insert((symbol.to_string(), timeframe), series);
    }

    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        self.state.write().await.prices.insert(symbol.to_string(), price);
    }
}

#[async_trait]
impl MarketData for SimVenue {
    async fn get_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<OhlcvSeries> {
        let state = self.state.read().await;
        let series = match state.series.get(&(symbol.to_string(), timeframe)) {
            Some(s) => s,
            None => bail!("no candle data loaded for {} {}", symbol, timeframe),
        };

        if series.len() <= limit {
            return Ok(series.clone());
        }
        let skip = series.len() - limit;
        Ok(OhlcvSeries {
            open: series.open[skip..].to_vec(),
            high: series.high[skip..].to_vec(),
            low: series.low[skip..].to_vec(),
            close: series.close[skip..].to_vec(),
            volume: series.volume[skip..].to_vec(),
            timestamps: series.timestamps[skip..].to_vec(),
        })
    }

    async fn get_current_price(&self, symbol: &str) -> Result<Decimal> {
        match self.state.read().await.prices.get(symbol) {
            Some(price) => Ok(*price),
            None => bail!("no price loaded for {}", symbol),
        }
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote> {
        let mid = self.get_current_price(symbol).await?;
        let half_spread = mid * self.spread_pct / Decimal::TWO;
        Ok(Quote {
            bid: mid - half_spread,
            ask: mid + half_spread,
            timestamp: Utc::now(),
        })
    }
}

#[async_trait]
impl OrderVenue for SimVenue {
    async fn submit_order(&self, plan: &TradeRisk) -> Result<OrderAck> {
        let price = self.get_current_price(&plan.symbol).await?;
        Ok(OrderAck {
            fill_price: price,
            spread_pct: self.spread_pct,
            latency_ms: self.latency_ms,
        })
    }

    async fn cancel_order(&self, _symbol: &str) -> Result<()> {
        Ok(())
    }
}
