use common::{Error, Result};

use super::extrema::local_minima;

/// Horizontal price levels with a tolerance band around each.
///
/// `base[i]` are histogram bin edges over the local minima of the low
/// series, ascending. `upper`/`lower` are the same levels widened by the
/// margin fraction.
#[derive(Debug, Clone, PartialEq)]
pub struct SupportResistance {
    pub base: Vec<f64>,
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
}

pub const DEFAULT_BINS: usize = 10;
pub const DEFAULT_MARGIN: f64 = 0.002;

/// Builds levels from the order-2 local minima of `lows`.
///
/// Edges are spaced evenly from the lowest to the highest minimum; when all
/// minima share one value the range is widened by 0.5 on each side. The more
/// history supplied, the steadier the edges.
pub fn support_and_resistance(lows: &[f64], margin: f64, bins: usize) -> Result<SupportResistance> {
    if bins == 0 {
        return Err(Error::InvalidArgument("support/resistance needs at least one bin".into()));
    }
    let minima: Vec<f64> = local_minima(lows, 2).into_iter().map(|(_, v)| v).collect();
    if minima.is_empty() {
        return Err(Error::InsufficientData(
            "no local minima to build support/resistance levels".into(),
        ));
    }

    let mut first = minima.iter().copied().fold(f64::INFINITY, f64::min);
    let mut last = minima.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if first == last {
        first -= 0.5;
        last += 0.5;
    }

    let step = (last - first) / bins as f64;
    let mut base: Vec<f64> = (0..=bins).map(|i| first + step * i as f64).collect();
    base[bins] = last;

    let upper = base.iter().map(|b| b * (1.0 + margin)).collect();
    let lower = base.iter().map(|b| b * (1.0 - margin)).collect();
    Ok(SupportResistance { base, upper, lower })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn saw(lows_at: &[f64]) -> Vec<f64> {
        // Each value becomes an isolated order-2 minimum separated by peaks.
        let mut v = vec![1000.0, 1000.0];
        for &low in lows_at {
            v.extend([low, 1000.0, 1000.0]);
        }
        v
    }

    #[test]
    fn edges_span_minima() {
        let sr = support_and_resistance(&saw(&[10.0, 20.0, 15.0]), DEFAULT_MARGIN, 10).unwrap();
        assert_eq!(sr.base.len(), 11);
        assert_eq!(sr.base[0], 10.0);
        assert_eq!(sr.base[10], 20.0);
        assert!((sr.base[5] - 15.0).abs() < 1e-12);
        assert!((sr.upper[0] - 10.02).abs() < 1e-12);
        assert!((sr.lower[10] - 19.96).abs() < 1e-12);
    }

    #[test]
    fn single_level_is_widened() {
        let sr = support_and_resistance(&saw(&[10.0, 10.0]), 0.0, 2).unwrap();
        assert_eq!(sr.base, vec![9.5, 10.0, 10.5]);
    }

    #[test]
    fn monotonic_lows_are_insufficient() {
        let lows: Vec<f64> = (0..50).map(|i| i as f64).collect();
        assert!(matches!(
            support_and_resistance(&lows, DEFAULT_MARGIN, 10),
            Err(Error::InsufficientData(_))
        ));
    }
}
