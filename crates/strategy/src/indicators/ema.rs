use common::{Error, Result};

use super::{ewm, require_len};

/// Exponential moving average with span `period` (alpha = 2 / (period + 1)),
/// seeded with the first value. Values before index `period - 1` are NaN.
pub fn ema(values: &[f64], period: usize) -> Result<Vec<f64>> {
    if period == 0 {
        return Err(Error::InvalidArgument("EMA period must be >= 1".into()));
    }
    require_len(values.len(), period, "EMA")?;
    Ok(ewm(values, 2.0 / (period as f64 + 1.0), period))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_matches_hand_computation() {
        let out = ema(&[1.0, 2.0, 3.0], 2).unwrap();
        assert!(out[0].is_nan());
        let k = 2.0 / 3.0;
        let e1 = 1.0 + k * (2.0 - 1.0);
        let e2 = e1 + k * (3.0 - e1);
        assert!((out[1] - e1).abs() < 1e-12);
        assert!((out[2] - e2).abs() < 1e-12);
    }

    #[test]
    fn ema_of_constant_is_constant() {
        let out = ema(&[7.0; 60], 50).unwrap();
        assert!((out[59] - 7.0).abs() < 1e-12);
    }

    #[test]
    fn ema_lags_a_rising_series() {
        let prices: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let out = ema(&prices, 20).unwrap();
        assert!(out[59] < prices[59]);
    }

    #[test]
    fn ema_short_input_is_insufficient() {
        assert!(matches!(ema(&[1.0; 10], 50), Err(Error::InsufficientData(_))));
    }
}
