use common::{CandleSeries, Result};

use super::stats::{rolling_max, rolling_mean, rolling_min};
use super::{require_len, rsi};

/// Stochastic oscillator: %K and its SMA %D.
#[derive(Debug, Clone, PartialEq)]
pub struct Stochastic {
    pub k: Vec<f64>,
    pub d: Vec<f64>,
}

/// `%K = 100 * (close - lowest low) / (highest high - lowest low)` over
/// `window` bars; `%D` is its `smooth`-bar SMA. A flat window gives NaN.
/// The `ta` defaults are `window = 14`, `smooth = 3`.
pub fn stochastic(candles: &CandleSeries, window: usize, smooth: usize) -> Result<Stochastic> {
    require_len(candles.len(), window.max(1), "Stochastic")?;
    let lowest = rolling_min(&candles.lows(), window);
    let highest = rolling_max(&candles.highs(), window);
    let k: Vec<f64> = candles
        .closes()
        .iter()
        .zip(lowest.iter().zip(&highest))
        .map(|(c, (lo, hi))| {
            let range = hi - lo;
            if range == 0.0 {
                f64::NAN
            } else {
                100.0 * (c - lo) / range
            }
        })
        .collect();
    let d = rolling_mean(&k, smooth);
    Ok(Stochastic { k, d })
}

/// Stochastic RSI, its K smoothing and D signal.
#[derive(Debug, Clone, PartialEq)]
pub struct StochasticRsi {
    /// Raw position of RSI inside its window, 0..=1.
    pub stoch: Vec<f64>,
    pub k: Vec<f64>,
    pub d: Vec<f64>,
}

/// Stochastic RSI over `window` bars of RSI(`window`); K and D are SMAs of
/// `smooth_k` and `smooth_d` bars. The `ta` defaults are 14, 3, 3.
pub fn stochastic_rsi(
    closes: &[f64],
    window: usize,
    smooth_k: usize,
    smooth_d: usize,
) -> Result<StochasticRsi> {
    let rsi = rsi(closes, window)?;
    let lowest = rolling_min(&rsi, window);
    let highest = rolling_max(&rsi, window);
    let stoch: Vec<f64> = rsi
        .iter()
        .zip(lowest.iter().zip(&highest))
        .map(|(r, (lo, hi))| {
            let range = hi - lo;
            if range == 0.0 {
                f64::NAN
            } else {
                (r - lo) / range
            }
        })
        .collect();
    let k = rolling_mean(&stoch, smooth_k);
    let d = rolling_mean(&k, smooth_d);
    Ok(StochasticRsi { stoch, k, d })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use common::Candle;

    fn series(closes: &[f64]) -> CandleSeries {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        CandleSeries::new(
            closes
                .iter()
                .enumerate()
                .map(|(i, &c)| Candle {
                    open_time: t0 + Duration::hours(i as i64),
                    open: c,
                    high: c + 1.0,
                    low: c - 1.0,
                    close: c,
                    volume: 1.0,
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn stochastic_is_high_at_top_of_range() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let st = stochastic(&series(&closes), 14, 3).unwrap();
        // close 119, lowest low 105, highest high 120
        assert!((st.k[19] - 100.0 * 14.0 / 15.0).abs() < 1e-9);
        assert!(st.k[12].is_nan());
        assert!(!st.d[19].is_nan());
    }

    #[test]
    fn stochastic_rsi_is_bounded() {
        let closes: Vec<f64> = (0..80)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0)
            .collect();
        let st = stochastic_rsi(&closes, 14, 3, 3).unwrap();
        let defined: Vec<f64> = st.stoch.iter().copied().filter(|v| !v.is_nan()).collect();
        assert!(!defined.is_empty());
        assert!(defined.iter().all(|v| (0.0..=1.0).contains(v)));
    }
}
