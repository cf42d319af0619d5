//! Candle-shape helpers built from body and wick extents.

use common::{CandleSeries, Result};

use super::ema;

/// Bullish engulfing: a green candle whose body swallows the previous red
/// candle's body (`close > prev.open` and `open <= prev.close`).
pub fn bullish_engulfing(candles: &CandleSeries) -> Vec<bool> {
    let c = candles.candles();
    (0..c.len())
        .map(|i| {
            i > 0
                && c[i].is_bullish_body()
                && c[i - 1].is_bearish_body()
                && c[i].close > c[i - 1].open
                && c[i].open <= c[i - 1].close
        })
        .collect()
}

/// Inventory retracement: a wick longer than `factor` of the candle's range.
#[derive(Debug, Clone, PartialEq)]
pub struct Retracement {
    /// Lower wick share above the factor.
    pub bullish: Vec<bool>,
    /// Upper wick share above the factor.
    pub bearish: Vec<bool>,
}

pub const DEFAULT_RETRACEMENT: f64 = 0.45;

pub fn inventory_retracement(candles: &CandleSeries, factor: f64) -> Retracement {
    let (bullish, bearish) = candles
        .candles()
        .iter()
        .map(|c| {
            let range = c.high - c.low;
            // 0 / 0 is NaN and compares false: a doji with no range has no wick.
            let lower_wick = (c.body_low() - c.low) / range;
            let upper_wick = (c.high - c.body_high()) / range;
            (lower_wick > factor, upper_wick > factor)
        })
        .unzip();
    Retracement { bullish, bearish }
}

/// Fast/slow EMA cloud used as a rejection zone.
#[derive(Debug, Clone, PartialEq)]
pub struct EmaCloud {
    pub ema_short: Vec<f64>,
    pub ema_long: Vec<f64>,
    /// Fast EMA above slow EMA on the last bar.
    pub cloud_is_green: bool,
}

/// 20/50 EMA cloud over closes.
pub fn ema_cloud(candles: &CandleSeries) -> Result<EmaCloud> {
    let closes = candles.closes();
    let ema_short = ema(&closes, 20)?;
    let ema_long = ema(&closes, 50)?;
    let cloud_is_green = match (ema_short.last(), ema_long.last()) {
        (Some(s), Some(l)) => s > l,
        _ => false,
    };
    Ok(EmaCloud {
        ema_short,
        ema_long,
        cloud_is_green,
    })
}
