use common::Result;

use super::require_len;
use super::stats::{rolling_mean, rolling_std};

/// Bollinger Bands: rolling SMA ± `deviations` population standard deviations.
#[derive(Debug, Clone, PartialEq)]
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Values before index `window - 1` are NaN. The `ta` defaults are
/// `window = 20`, `deviations = 2.0`.
pub fn bollinger_bands(closes: &[f64], window: usize, deviations: f64) -> Result<BollingerBands> {
    require_len(closes.len(), window.max(1), "Bollinger Bands")?;
    let middle = rolling_mean(closes, window);
    let std = rolling_std(closes, window);
    let upper = middle.iter().zip(&std).map(|(m, s)| m + deviations * s).collect();
    let lower = middle.iter().zip(&std).map(|(m, s)| m - deviations * s).collect();
    Ok(BollingerBands { upper, middle, lower })
}
