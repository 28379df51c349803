//! Pure numeric transforms over OHLCV windows.
//!
//! No I/O, no side effects. Insufficient data never fails: every function
//! degrades to a neutral default (RSI 50, ATR = mean high-low range, EMA =
//! plain mean) so upstream scoring always receives a value.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::models::OhlcvSeries;

/// Lookback parameters for the composite feature pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorConfig {
    pub rsi_period: usize,
    pub atr_period: usize,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub ema_trend: usize,
    pub volume_window: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            atr_period: 14,
            ema_fast: 20,
            ema_slow: 50,
            ema_trend: 200,
            volume_window: 20,
        }
    }
}

// ---------------------------------------------------------------------------
// RSI
// ---------------------------------------------------------------------------

/// Simple windowed RSI: average gain / average loss over the most recent
/// `period` price changes. Returns neutral 50 with fewer than `period + 1`
/// samples; always in [0, 100].
pub fn rsi_simple(closes: &[Decimal], period: usize) -> Decimal {
    if period == 0 || closes.len() < period + 1 {
        return dec!(50);
    }

    let window = &closes[closes.len() - period - 1..];
    let mut gains = Decimal::ZERO;
    let mut losses = Decimal::ZERO;
    for w in window.windows(2) {
        let change = w[1] - w[0];
        if change > Decimal::ZERO {
            gains += change;
        } else {
            losses += change.abs();
        }
    }

    if losses.is_zero() {
        return dec!(100);
    }

    let rs = gains / losses;
    dec!(100) - dec!(100) / (Decimal::ONE + rs)
}

/// Wilder-smoothed RSI: exponential weighting with smoothing factor
/// `1/period`, seeded by the simple average of the first `period` changes.
pub fn rsi_wilder(closes: &[Decimal], period: usize) -> Decimal {
    if period == 0 || closes.len() < period + 1 {
        return dec!(50);
    }

    let period_d = Decimal::from(period as u64);
    let period_m1 = Decimal::from(period as u64 - 1);

    let changes: Vec<Decimal> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    let mut avg_gain = changes[..period]
        .iter()
        .map(|&c| if c > Decimal::ZERO { c } else { Decimal::ZERO })
        .sum::<Decimal>()
        / period_d;
    let mut avg_loss = changes[..period]
        .iter()
        .map(|&c| if c < Decimal::ZERO { -c } else { Decimal::ZERO })
        .sum::<Decimal>()
        / period_d;

    for &c in &changes[period..] {
        if c > Decimal::ZERO {
            avg_gain = (avg_gain * period_m1 + c) / period_d;
            avg_loss = (avg_loss * period_m1) / period_d;
        } else {
            avg_gain = (avg_gain * period_m1) / period_d;
            avg_loss = (avg_loss * period_m1 + c.abs()) / period_d;
        }
    }

    if avg_loss.is_zero() {
        return dec!(100);
    }

    let rs = avg_gain / avg_loss;
    dec!(100) - dec!(100) / (Decimal::ONE + rs)
}

// ---------------------------------------------------------------------------
// EMA
// ---------------------------------------------------------------------------

/// Latest EMA value. Multiplier `2/(period+1)`, recurrence seeded with the
/// first close. Degrades to the plain mean when the series is shorter than
/// the period.
pub fn ema_latest(closes: &[Decimal], period: usize) -> Decimal {
    match closes {
        [] => Decimal::ZERO,
        _ if period == 0 => closes[closes.len() - 1],
        _ if closes.len() < period => mean(closes),
        _ => {
            let k = dec!(2) / Decimal::from(period as u64 + 1);
            let one_minus_k = Decimal::ONE - k;
            let mut ema = closes[0];
            for &close in &closes[1..] {
                ema = close * k + ema * one_minus_k;
            }
            ema
        }
    }
}

/// Latest EMA for several periods in a single pass over the closes.
///
/// Periods longer than the series fall back to the plain mean, matching
/// [`ema_latest`].
pub fn ema_multi(closes: &[Decimal], periods: &[usize]) -> Vec<Decimal> {
    if closes.is_empty() {
        return vec![Decimal::ZERO; periods.len()];
    }

    // (multiplier, running state) per requested period; None marks a
    // mean-fallback slot resolved after the pass.
    let mut states: Vec<Option<(Decimal, Decimal)>> = periods
        .iter()
        .map(|&p| {
            if p == 0 || closes.len() < p {
                None
            } else {
                Some((dec!(2) / Decimal::from(p as u64 + 1), closes[0]))
            }
        })
        .collect();

    for &close in &closes[1..] {
        for state in states.iter_mut().flatten() {
            let (k, ema) = *state;
            *state = (k, close * k + ema * (Decimal::ONE - k));
        }
    }

    let fallback = mean(closes);
    states
        .into_iter()
        .map(|s| match s {
            Some((_, ema)) => ema,
            None => fallback,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// ATR
// ---------------------------------------------------------------------------

/// True range series: `max(H-L, |H-prevC|, |L-prevC|)` from the second
/// candle onward.
fn true_ranges(highs: &[Decimal], lows: &[Decimal], closes: &[Decimal]) -> Vec<Decimal> {
    (1..highs.len())
        .map(|i| {
            let hl = highs[i] - lows[i];
            let hc = (highs[i] - closes[i - 1]).abs();
            let lc = (lows[i] - closes[i - 1]).abs();
            hl.max(hc).max(lc)
        })
        .collect()
}

/// Mean high-low range; the degraded ATR when too few candles exist.
fn mean_range(highs: &[Decimal], lows: &[Decimal]) -> Decimal {
    if highs.is_empty() || highs.len() != lows.len() {
        return Decimal::ZERO;
    }
    let spread: Decimal = highs.iter().zip(lows).map(|(h, l)| *h - *l).sum();
    spread / Decimal::from(highs.len() as u64)
}

/// Plain ATR: trailing mean of the last `period` true ranges. Always >= 0.
pub fn atr_simple(
    highs: &[Decimal],
    lows: &[Decimal],
    closes: &[Decimal],
    period: usize,
) -> Decimal {
    let n = highs.len();
    if period == 0 || n != lows.len() || n != closes.len() {
        return Decimal::ZERO;
    }
    if n < period + 1 {
        return mean_range(highs, lows);
    }

    let trs = true_ranges(highs, lows, closes);
    let window = &trs[trs.len() - period..];
    window.iter().copied().sum::<Decimal>() / Decimal::from(period as u64)
}

/// Wilder-smoothed ATR: same recurrence as [`rsi_wilder`], seeded with the
/// simple average of the first `period` true ranges. Always >= 0.
pub fn atr_wilder(
    highs: &[Decimal],
    lows: &[Decimal],
    closes: &[Decimal],
    period: usize,
) -> Decimal {
    let n = highs.len();
    if period == 0 || n != lows.len() || n != closes.len() {
        return Decimal::ZERO;
    }
    if n < period + 1 {
        return mean_range(highs, lows);
    }

    let trs = true_ranges(highs, lows, closes);
    let period_d = Decimal::from(period as u64);
    let period_m1 = Decimal::from(period as u64 - 1);

    let mut atr = trs[..period].iter().copied().sum::<Decimal>() / period_d;
    for &tr in &trs[period..] {
        atr = (atr * period_m1 + tr) / period_d;
    }
    atr
}

// ---------------------------------------------------------------------------
// Volume
// ---------------------------------------------------------------------------

/// Current volume divided by the mean volume of the preceding `window`
/// candles. Returns 1.0 when there is no prior data.
pub fn volume_ratio(volumes: &[Decimal], window: usize) -> Decimal {
    let Some((&current, prior)) = volumes.split_last() else {
        return Decimal::ONE;
    };
    if prior.is_empty() || window == 0 {
        return Decimal::ONE;
    }

    let lookback = &prior[prior.len().saturating_sub(window)..];
    let avg = mean(lookback);
    if avg.is_zero() {
        return Decimal::ONE;
    }
    current / avg
}

/// Trailing mean volume over `window` candles including the current one.
pub fn volume_average(volumes: &[Decimal], window: usize) -> Decimal {
    if volumes.is_empty() || window == 0 {
        return Decimal::ZERO;
    }
    let lookback = &volumes[volumes.len().saturating_sub(window)..];
    mean(lookback)
}

// ---------------------------------------------------------------------------
// Composite
// ---------------------------------------------------------------------------

/// Trend context from EMA stacking. A gating predicate, not a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Mixed,
}

/// EMA20 > EMA50 > EMA200 confirms an uptrend context; the reverse
/// inequality a downtrend.
pub fn trend_alignment(ema_fast: Decimal, ema_slow: Decimal, ema_trend: Decimal) -> Trend {
    if ema_fast > ema_slow && ema_slow > ema_trend {
        Trend::Up
    } else if ema_fast < ema_slow && ema_slow < ema_trend {
        Trend::Down
    } else {
        Trend::Mixed
    }
}

/// All features for one (symbol, timeframe) scan, computed in one pass over
/// a single OHLCV block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSet {
    pub price: Decimal,
    pub rsi: Decimal,
    pub ema_fast: Decimal,
    pub ema_slow: Decimal,
    pub ema_trend: Decimal,
    pub atr: Decimal,
    pub volume_ratio: Decimal,
    pub volume_average: Decimal,
    pub trend: Trend,
}

/// Composite call: RSI (Wilder), EMA 20/50/200 (batched), ATR (Wilder),
/// and volume stats over one candle block.
pub fn compute_features(series: &OhlcvSeries, config: &IndicatorConfig) -> FeatureSet {
    let price = series.last_close().unwrap_or(Decimal::ZERO);

    let emas = ema_multi(
        &series.close,
        &[config.ema_fast, config.ema_slow, config.ema_trend],
    );

    let rsi = rsi_wilder(&series.close, config.rsi_period);
    let atr = atr_wilder(&series.high, &series.low, &series.close, config.atr_period);

    FeatureSet {
        price,
        rsi,
        ema_fast: emas[0],
        ema_slow: emas[1],
        ema_trend: emas[2],
        atr,
        volume_ratio: volume_ratio(&series.volume, config.volume_window),
        volume_average: volume_average(&series.volume, config.volume_window),
        trend: trend_alignment(emas[0], emas[1], emas[2]),
    }
}

fn mean(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    values.iter().copied().sum::<Decimal>() / Decimal::from(values.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn rising(n: usize) -> Vec<Decimal> {
        (1..=n).map(|i| Decimal::from(i as u64)).collect()
    }

    fn falling(n: usize) -> Vec<Decimal> {
        (1..=n).rev().map(|i| Decimal::from(i as u64)).collect()
    }

    // -- RSI ---------------------------------------------------------------

    #[test]
    fn test_rsi_monotone_rising_is_100() {
        assert_eq!(rsi_simple(&rising(20), 14), dec!(100));
        assert_eq!(rsi_wilder(&rising(20), 14), dec!(100));
    }

    #[test]
    fn test_rsi_monotone_falling_near_zero() {
        assert_eq!(rsi_simple(&falling(20), 14), dec!(0));
        assert!(rsi_wilder(&falling(20), 14) < dec!(1));
    }

    #[test]
    fn test_rsi_insufficient_data_neutral() {
        let closes = vec![dec!(10), dec!(11), dec!(12)];
        assert_eq!(rsi_simple(&closes, 14), dec!(50));
        assert_eq!(rsi_wilder(&closes, 14), dec!(50));
    }

    #[test]
    fn test_rsi_bounded() {
        let closes: Vec<Decimal> = (0..40)
            .map(|i| dec!(100) + Decimal::from(i % 7) - Decimal::from(i % 3))
            .collect();
        for period in [5, 14] {
            let v = rsi_wilder(&closes, period);
            assert!(v >= dec!(0) && v <= dec!(100), "rsi out of range: {v}");
        }
    }

    // -- EMA ---------------------------------------------------------------

    #[test]
    fn test_ema_constant_series_is_constant() {
        let closes = vec![dec!(42); 30];
        assert_eq!(ema_latest(&closes, 20), dec!(42));
        assert_eq!(ema_multi(&closes, &[5, 20]), vec![dec!(42), dec!(42)]);
    }

    #[test]
    fn test_ema_short_series_falls_back_to_mean() {
        let closes = vec![dec!(10), dec!(20)];
        assert_eq!(ema_latest(&closes, 50), dec!(15));
    }

    #[test]
    fn test_ema_multi_matches_single() {
        let closes = rising(60);
        let batch = ema_multi(&closes, &[20, 50, 200]);
        assert_eq!(batch[0], ema_latest(&closes, 20));
        assert_eq!(batch[1], ema_latest(&closes, 50));
        assert_eq!(batch[2], ema_latest(&closes, 200));
    }

    // -- ATR ---------------------------------------------------------------

    #[test]
    fn test_atr_zero_volatility_is_zero() {
        let flat = vec![dec!(100); 20];
        assert_eq!(atr_simple(&flat, &flat, &flat, 14), dec!(0));
        assert_eq!(atr_wilder(&flat, &flat, &flat, 14), dec!(0));
    }

    #[test]
    fn test_atr_positive_and_gap_aware() {
        // Gap up: TR must use |H - prevC|, not just H - L.
        let highs = vec![dec!(101), dec!(110)];
        let lows = vec![dec!(99), dec!(108)];
        let closes = vec![dec!(100), dec!(109)];
        let atr = atr_simple(&highs, &lows, &closes, 1);
        assert_eq!(atr, dec!(10)); // 110 - 100
    }

    #[test]
    fn test_atr_insufficient_data_degrades_to_mean_range() {
        let highs = vec![dec!(102), dec!(104)];
        let lows = vec![dec!(98), dec!(100)];
        let closes = vec![dec!(100), dec!(102)];
        assert_eq!(atr_wilder(&highs, &lows, &closes, 14), dec!(4));
    }

    // -- Volume ------------------------------------------------------------

    #[test]
    fn test_volume_ratio_no_history_is_one() {
        assert_eq!(volume_ratio(&[], 20), dec!(1));
        assert_eq!(volume_ratio(&[dec!(500)], 20), dec!(1));
    }

    #[test]
    fn test_volume_ratio_expansion() {
        let volumes = vec![dec!(100), dec!(100), dec!(100), dec!(300)];
        assert_eq!(volume_ratio(&volumes, 20), dec!(3));
    }

    // -- Trend & composite -------------------------------------------------

    #[test]
    fn test_trend_alignment() {
        assert_eq!(trend_alignment(dec!(3), dec!(2), dec!(1)), Trend::Up);
        assert_eq!(trend_alignment(dec!(1), dec!(2), dec!(3)), Trend::Down);
        assert_eq!(trend_alignment(dec!(2), dec!(3), dec!(1)), Trend::Mixed);
    }

    #[test]
    fn test_compute_features_uptrend_series() {
        let mut series = OhlcvSeries::new();
        for i in 0..250u64 {
            let base = dec!(100) + Decimal::from(i);
            series.push(
                Utc::now(),
                base,
                base + dec!(1),
                base - dec!(1),
                base + dec!(0.5),
                dec!(1000),
            );
        }

        let features = compute_features(&series, &IndicatorConfig::default());
        assert_eq!(features.trend, Trend::Up);
        assert!(features.rsi > dec!(90));
        assert!(features.atr > dec!(0));
        assert_eq!(features.volume_ratio, dec!(1));
    }
}
