use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use common::Error;

use super::extrema::local_minima;

/// Which bullish divergence to look for.
///
/// * `Regular`: price prints a lower low while the oscillator prints a higher
///   low (reversal).
/// * `Hidden`: price prints a higher low while the oscillator prints a lower
///   low (continuation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivergenceKind {
    Regular,
    Hidden,
}

impl FromStr for DivergenceKind {
    type Err = Error;

    /// Accepts `r`/`regular` and `h`/`hidden`. Anything else is a programming
    /// error in the caller's configuration.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" | "regular" => Ok(DivergenceKind::Regular),
            "h" | "hidden" => Ok(DivergenceKind::Hidden),
            other => Err(Error::InvalidArgument(format!(
                "expected 'r' or 'h' for divergence type, got '{other}'"
            ))),
        }
    }
}

/// A price low matched with the lowest nearby oscillator low.
#[derive(Debug, Clone, Copy)]
struct LowPair {
    index: usize,
    price: f64,
    oscillator: f64,
}

/// Indices where a bullish divergence of `kind` completes.
///
/// A price low needs a local minimum of order `order` in both the body-low
/// and body-high series at the same index. It pairs with the lowest
/// oscillator minimum at the same bar or one bar either side. Each pair is
/// then compared against every older pair.
///
/// Indices come back newest first; callers filtering by recency must not
/// assume ascending order.
pub fn bullish_divergence(
    kind: DivergenceKind,
    body_lows: &[f64],
    body_highs: &[f64],
    oscillator: &[f64],
    order: usize,
) -> Vec<usize> {
    assert_eq!(body_lows.len(), body_highs.len(), "body series lengths differ");
    assert_eq!(body_lows.len(), oscillator.len(), "oscillator length differs from price");

    let high_lows: HashSet<usize> = local_minima(body_highs, order)
        .into_iter()
        .map(|(i, _)| i)
        .collect();
    let oscillator_lows: HashMap<usize, f64> = local_minima(oscillator, order).into_iter().collect();

    let pairs: Vec<LowPair> = local_minima(body_lows, order)
        .into_iter()
        .filter(|(i, _)| high_lows.contains(i))
        .filter_map(|(index, price)| {
            [index.checked_sub(1), Some(index), Some(index + 1)]
                .into_iter()
                .flatten()
                .filter_map(|j| oscillator_lows.get(&j).copied())
                .reduce(f64::min)
                .map(|oscillator| LowPair { index, price, oscillator })
        })
        .collect();

    pairs
        .iter()
        .rev()
        .filter(|current| {
            pairs
                .iter()
                .rev()
                .filter(|older| older.index < current.index)
                .any(|older| match kind {
                    DivergenceKind::Regular => {
                        older.price > current.price && older.oscillator < current.oscillator
                    }
                    DivergenceKind::Hidden => {
                        older.price < current.price && older.oscillator > current.oscillator
                    }
                })
        })
        .map(|p| p.index)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flat series at `base` with V-shaped dips: each entry is
    /// (index, bottom value, shoulder value).
    fn with_dips(len: usize, base: f64, dips: &[(usize, f64, f64)]) -> Vec<f64> {
        let mut v = vec![base; len];
        for &(i, bottom, shoulder) in dips {
            v[i - 1] = shoulder;
            v[i] = bottom;
            v[i + 1] = shoulder;
        }
        v
    }

    fn body(lows: &[f64]) -> (Vec<f64>, Vec<f64>) {
        (lows.to_vec(), lows.iter().map(|v| v + 1.0).collect())
    }

    #[test]
    fn regular_divergence_flags_lower_price_low() {
        let price = with_dips(21, 20.0, &[(5, 10.0, 15.0), (15, 8.0, 14.0)]);
        let osc = with_dips(21, 50.0, &[(5, 20.0, 40.0), (15, 30.0, 40.0)]);
        let (lows, highs) = body(&price);

        assert_eq!(bullish_divergence(DivergenceKind::Regular, &lows, &highs, &osc, 2), vec![15]);
        assert!(bullish_divergence(DivergenceKind::Hidden, &lows, &highs, &osc, 2).is_empty());
    }

    #[test]
    fn hidden_divergence_flags_higher_price_low() {
        let price = with_dips(21, 20.0, &[(5, 8.0, 14.0), (15, 10.0, 15.0)]);
        let osc = with_dips(21, 50.0, &[(5, 30.0, 40.0), (15, 20.0, 40.0)]);
        let (lows, highs) = body(&price);

        assert_eq!(bullish_divergence(DivergenceKind::Hidden, &lows, &highs, &osc, 2), vec![15]);
        assert!(bullish_divergence(DivergenceKind::Regular, &lows, &highs, &osc, 2).is_empty());
    }

    #[test]
    fn oscillator_low_one_bar_late_still_matches() {
        let price = with_dips(21, 20.0, &[(5, 10.0, 15.0), (15, 8.0, 14.0)]);
        let osc = with_dips(21, 50.0, &[(5, 20.0, 40.0), (16, 30.0, 40.0)]);
        let (lows, highs) = body(&price);

        assert_eq!(bullish_divergence(DivergenceKind::Regular, &lows, &highs, &osc, 2), vec![15]);
    }

    #[test]
    fn wick_only_low_is_ignored() {
        // Body-high has no minimum at 15, so that bar is not a price low.
        let price = with_dips(21, 20.0, &[(5, 10.0, 15.0), (15, 8.0, 14.0)]);
        let osc = with_dips(21, 50.0, &[(5, 20.0, 40.0), (15, 30.0, 40.0)]);
        let highs = with_dips(21, 21.0, &[(5, 11.0, 16.0)]);

        assert!(bullish_divergence(DivergenceKind::Regular, &price, &highs, &osc, 2).is_empty());
    }

    #[test]
    fn newest_divergence_comes_first() {
        let price = with_dips(
            31,
            20.0,
            &[(5, 12.0, 15.0), (15, 10.0, 14.0), (25, 8.0, 14.0)],
        );
        let osc = with_dips(
            31,
            50.0,
            &[(5, 20.0, 40.0), (15, 25.0, 40.0), (25, 30.0, 40.0)],
        );
        let (lows, highs) = body(&price);

        assert_eq!(
            bullish_divergence(DivergenceKind::Regular, &lows, &highs, &osc, 2),
            vec![25, 15]
        );
    }

    #[test]
    fn unknown_type_code_is_rejected() {
        assert_eq!("r".parse::<DivergenceKind>().unwrap(), DivergenceKind::Regular);
        assert_eq!("hidden".parse::<DivergenceKind>().unwrap(), DivergenceKind::Hidden);
        assert!(matches!("x".parse::<DivergenceKind>(), Err(Error::InvalidArgument(_))));
    }
}
