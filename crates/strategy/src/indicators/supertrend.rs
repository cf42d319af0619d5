//! Supertrend: a two-state trend machine over ATR bands.
//!
//! Bar 0 starts in an uptrend. On each later bar the trend flips up when the
//! close breaks the previous upper band and down when it breaks the previous
//! lower band; otherwise it persists and the active band may only tighten
//! (lower band never falls in an uptrend, upper band never rises in a
//! downtrend). The inactive band of each bar is NaN.

use common::{CandleSeries, Result};

use super::atr::true_range;
use super::{ewm_adjusted, require_len};

/// Per-bar output of the trend machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendState {
    pub uptrend: bool,
    /// Resistance band; NaN while in an uptrend.
    pub upperband: f64,
    /// Support band; NaN while in a downtrend.
    pub lowerband: f64,
}

/// Runs the trend machine over the whole series. ATR here is the true range
/// under an adjusted exponential mean with `alpha = 1 / atr_period`.
pub fn supertrend(
    candles: &CandleSeries,
    atr_period: usize,
    multiplier: f64,
) -> Result<Vec<TrendState>> {
    assert!(atr_period >= 1, "Supertrend period must be >= 1");
    require_len(candles.len(), atr_period, "Supertrend")?;

    let bars = candles.candles();
    let atr = ewm_adjusted(&true_range(candles), 1.0 / atr_period as f64, atr_period);

    let mut upper: Vec<f64> = bars
        .iter()
        .zip(&atr)
        .map(|(b, a)| (b.high + b.low) / 2.0 + multiplier * a)
        .collect();
    let mut lower: Vec<f64> = bars
        .iter()
        .zip(&atr)
        .map(|(b, a)| (b.high + b.low) / 2.0 - multiplier * a)
        .collect();
    let mut trend = vec![true; bars.len()];

    // Seed state: uptrend, so bar 0 reports no resistance.
    upper[0] = f64::NAN;

    for curr in 1..bars.len() {
        let prev = curr - 1;
        let close = bars[curr].close;

        // NaN bands compare false, so a masked band can never trigger a flip.
        if close > upper[prev] {
            trend[curr] = true;
        } else if close < lower[prev] {
            trend[curr] = false;
        } else {
            trend[curr] = trend[prev];
            if trend[curr] && lower[curr] < lower[prev] {
                lower[curr] = lower[prev];
            }
            if !trend[curr] && upper[curr] > upper[prev] {
                upper[curr] = upper[prev];
            }
        }

        if trend[curr] {
            upper[curr] = f64::NAN;
        } else {
            lower[curr] = f64::NAN;
        }
    }

    Ok(trend
        .into_iter()
        .zip(upper.into_iter().zip(lower))
        .map(|(uptrend, (upperband, lowerband))| TrendState {
            uptrend,
            upperband,
            lowerband,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use common::Candle;

    fn make_bars(data: &[(f64, f64, f64, f64)]) -> CandleSeries {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        CandleSeries::new(
            data.iter()
                .enumerate()
                .map(|(i, &(open, high, low, close))| Candle {
                    open_time: t0 + Duration::days(i as i64),
                    open,
                    high,
                    low,
                    close,
                    volume: 1000.0,
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn uptrend_support_stays_below_price() {
        let data: Vec<_> = (0..15)
            .map(|i| {
                let base = 100.0 + i as f64 * 2.0;
                (base - 1.0, base + 3.0, base - 3.0, base + 1.0)
            })
            .collect();
        let bars = make_bars(&data);
        let states = supertrend(&bars, 3, 2.0).unwrap();

        for (state, bar) in states.iter().zip(bars.candles()).skip(3) {
            assert!(state.uptrend);
            assert!(state.upperband.is_nan());
            assert!(state.lowerband < bar.close);
        }
    }

    #[test]
    fn sharp_drop_flips_to_downtrend() {
        let mut data: Vec<_> = (0..10)
            .map(|i| {
                let base = 100.0 + i as f64;
                (base, base + 1.0, base - 1.0, base + 0.5)
            })
            .collect();
        data.extend((0..5).map(|i| {
            let base = 80.0 - i as f64 * 5.0;
            (base + 2.0, base + 3.0, base - 3.0, base)
        }));
        let states = supertrend(&make_bars(&data), 3, 2.0).unwrap();

        let last = states.last().unwrap();
        assert!(!last.uptrend);
        assert!(last.lowerband.is_nan());
        assert!(!last.upperband.is_nan());
    }

    #[test]
    fn warm_up_bands_are_undefined() {
        let data: Vec<_> = (0..5).map(|i| (10.0, 11.0, 9.0, 10.0 + i as f64 * 0.1)).collect();
        let states = supertrend(&make_bars(&data), 3, 2.0).unwrap();
        assert!(states[0].uptrend);
        assert!(states[0].lowerband.is_nan() && states[0].upperband.is_nan());
        assert!(!states[2].lowerband.is_nan());
    }

    #[test]
    fn too_few_bars_is_insufficient() {
        let bars = make_bars(&[(100.0, 105.0, 95.0, 102.0)]);
        assert!(supertrend(&bars, 3, 2.0).is_err());
    }
}
