//! Average True Range and the ATR stop band.

use common::{CandleSeries, Error, Result};

use super::require_len;

/// True range per bar: `max(high - low, |high - prev_close|, |low - prev_close|)`.
/// The first bar has no previous close and uses `high - low`.
pub fn true_range(candles: &CandleSeries) -> Vec<f64> {
    let c = candles.candles();
    (0..c.len())
        .map(|i| {
            let range = c[i].high - c[i].low;
            match i.checked_sub(1) {
                None => range,
                Some(prev) => {
                    let pc = c[prev].close;
                    range.max((c[i].high - pc).abs()).max((c[i].low - pc).abs())
                }
            }
        })
        .collect()
}

/// Average True Range with Wilder smoothing.
///
/// `atr[period - 1]` is the plain mean of the first `period` true ranges and
/// every later value is `(prev * (period - 1) + tr) / period`. Earlier
/// positions are 0, as in the `ta` library.
pub fn atr(candles: &CandleSeries, period: usize) -> Result<Vec<f64>> {
    if period == 0 {
        return Err(Error::InvalidArgument("ATR period must be >= 1".into()));
    }
    require_len(candles.len(), period, "ATR")?;

    let tr = true_range(candles);
    let mut out = vec![0.0; tr.len()];
    out[period - 1] = tr[..period].iter().sum::<f64>() / period as f64;
    for i in period..tr.len() {
        out[i] = (out[i - 1] * (period - 1) as f64 + tr[i]) / period as f64;
    }
    Ok(out)
}

/// Stop-loss candidates one ATR multiple beyond each bar's extremes.
#[derive(Debug, Clone, PartialEq)]
pub struct AtrBands {
    /// `high + atr * factor`
    pub upper: Vec<f64>,
    /// `low - atr * factor`
    pub lower: Vec<f64>,
}

pub fn atr_stop_bands(candles: &CandleSeries, period: usize, factor: f64) -> Result<AtrBands> {
    let atr = atr(candles, period)?;
    let (upper, lower) = candles
        .candles()
        .iter()
        .zip(&atr)
        .map(|(c, a)| (c.high + a * factor, c.low - a * factor))
        .unzip();
    Ok(AtrBands { upper, lower })
}
