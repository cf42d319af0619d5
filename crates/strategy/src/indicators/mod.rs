//! Stateless indicator functions over candle data.
//!
//! Every function takes its inputs by reference and returns freshly allocated
//! output. Undefined positions (warm-up bars, inactive bands) are `f64::NAN`.
//! Conventions follow the defaults of the `ta` technical-analysis library so
//! values line up bar-for-bar with charts built on it.

pub mod atr;
pub mod bollinger;
pub mod divergence;
pub mod ema;
pub mod extrema;
pub mod patterns;
pub mod rsi;
pub mod stats;
pub mod stochastic;
pub mod supertrend;
pub mod support_resistance;

pub use atr::{atr, atr_stop_bands, true_range, AtrBands};
pub use bollinger::{bollinger_bands, BollingerBands};
pub use divergence::{bullish_divergence, DivergenceKind};
pub use ema::ema;
pub use extrema::{local_maxima, local_minima};
pub use patterns::{bullish_engulfing, ema_cloud, inventory_retracement, EmaCloud, Retracement};
pub use rsi::rsi;
pub use stats::percentile;
pub use stochastic::{stochastic, stochastic_rsi, Stochastic, StochasticRsi};
pub use supertrend::{supertrend, TrendState};
pub use support_resistance::{support_and_resistance, SupportResistance};

use common::{Error, Result};

/// Fail with `InsufficientData` when fewer than `needed` values are present.
pub(crate) fn require_len(len: usize, needed: usize, what: &str) -> Result<()> {
    if len < needed {
        return Err(Error::InsufficientData(format!(
            "{what} needs {needed} values, got {len}"
        )));
    }
    Ok(())
}

/// Exponentially weighted mean with `adjust=false`: `y0 = x0`,
/// `y[t] = (1 - alpha) * y[t-1] + alpha * x[t]`. Positions before
/// `min_periods - 1` are NaN.
pub(crate) fn ewm(values: &[f64], alpha: f64, min_periods: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut prev = f64::NAN;
    for (i, &x) in values.iter().enumerate() {
        prev = if i == 0 { x } else { (1.0 - alpha) * prev + alpha * x };
        out.push(if i + 1 < min_periods { f64::NAN } else { prev });
    }
    out
}

/// Exponentially weighted mean with `adjust=true`: every past value keeps
/// weight `(1 - alpha)^age` and the sum is normalised by the total weight.
pub(crate) fn ewm_adjusted(values: &[f64], alpha: f64, min_periods: usize) -> Vec<f64> {
    let decay = 1.0 - alpha;
    let mut num = 0.0;
    let mut den = 0.0;
    values
        .iter()
        .enumerate()
        .map(|(i, &x)| {
            num = x + decay * num;
            den = 1.0 + decay * den;
            if i + 1 < min_periods {
                f64::NAN
            } else {
                num / den
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ewm_seeds_with_first_value() {
        let out = ewm(&[2.0, 4.0, 4.0], 0.5, 1);
        assert_eq!(out, vec![2.0, 3.0, 3.5]);
    }

    #[test]
    fn ewm_adjusted_weights_history() {
        let out = ewm_adjusted(&[2.0, 4.0], 0.5, 2);
        assert!(out[0].is_nan());
        // (4 + 0.5 * 2) / (1 + 0.5)
        assert!((out[1] - 10.0 / 3.0).abs() < 1e-12);
    }
}
