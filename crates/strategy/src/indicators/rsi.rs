use common::{Error, Result};

use super::{ewm, require_len};

/// RSI (Relative Strength Index) series.
///
/// Gains and losses are smoothed with Wilder's factor `1/period` seeded at
/// zero on the first bar, which is how the `ta` library does it. Values
/// before index `period - 1` are NaN; a window without losses reads 100.
pub fn rsi(closes: &[f64], period: usize) -> Result<Vec<f64>> {
    if period < 2 {
        return Err(Error::InvalidArgument(format!("RSI period must be >= 2, got {period}")));
    }
    require_len(closes.len(), period, "RSI")?;

    let (gains, losses): (Vec<f64>, Vec<f64>) = std::iter::once((0.0, 0.0))
        .chain(closes.windows(2).map(|w| {
            let change = w[1] - w[0];
            (change.max(0.0), (-change).max(0.0))
        }))
        .unzip();

    let alpha = 1.0 / period as f64;
    let avg_gain = ewm(&gains, alpha, period);
    let avg_loss = ewm(&losses, alpha, period);

    Ok(avg_gain
        .iter()
        .zip(&avg_loss)
        .map(|(&gain, &loss)| {
            if loss.is_nan() || gain.is_nan() {
                f64::NAN
            } else if loss == 0.0 {
                100.0
            } else {
                100.0 - 100.0 / (1.0 + gain / loss)
            }
        })
        .collect())
}
