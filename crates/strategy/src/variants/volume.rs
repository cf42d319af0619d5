use common::{Candle, CandleSeries, Error, Result, StrategyOutput};

use crate::config::StrategyConfig;
use crate::indicators::{atr_stop_bands, ema, percentile};
use crate::variants::ensure;
use crate::{settle, MarketView, Strategy};

/// Enter on the live candle when the last closed candle traded unusually
/// high volume.
///
/// Stop-loss is the ATR lower band of that closed candle; the live candle's
/// low must still be above it. Take-profit sits at a fixed reward:risk
/// multiple from the entry.
#[derive(Debug, Clone)]
pub struct VolumeBreakoutStrategy {
    pub atr_period: usize,
    pub atr_factor: f64,
    /// Closed-candle volume must be strictly above this percentile.
    pub volume_percentile: f64,
    /// Number of closed candles the percentile is taken over.
    pub volume_lookback: usize,
    pub reward_risk: f64,
}

impl Default for VolumeBreakoutStrategy {
    fn default() -> Self {
        Self {
            atr_period: 12,
            atr_factor: 1.5,
            volume_percentile: 75.0,
            volume_lookback: 100,
            reward_risk: 1.5,
        }
    }
}

impl VolumeBreakoutStrategy {
    pub const NAME: &'static str = "volume_trading_strategy";

    pub fn from_config(cfg: &StrategyConfig) -> Result<Self> {
        let d = Self::default();
        let strategy = Self {
            atr_period: cfg.param_usize("atr_period", d.atr_period),
            atr_factor: cfg.param_f64("atr_factor", d.atr_factor),
            volume_percentile: cfg.param_f64("volume_percentile", d.volume_percentile),
            volume_lookback: cfg.param_usize("volume_lookback", d.volume_lookback),
            reward_risk: cfg.param_f64("reward_risk", d.reward_risk),
        };
        strategy.validate()?;
        Ok(strategy)
    }

    pub fn validate(&self) -> Result<()> {
        validate_breakout(self.atr_period, self.volume_percentile, self.volume_lookback)
    }

    fn compute(&self, current_price: f64, market: &MarketView<'_>) -> Result<StrategyOutput> {
        let (closed, live) = split_live(market.entry)?;
        let volumes = closed.volumes();
        let prior_volume = volumes[volumes.len() - 1];

        let window = &volumes[volumes.len().saturating_sub(self.volume_lookback)..];
        let threshold = percentile(window, self.volume_percentile)?;
        if prior_volume <= threshold {
            return Ok(StrategyOutput::no_entry(current_price));
        }

        atr_stop_entry(
            &closed,
            &live,
            current_price,
            self.atr_period,
            self.atr_factor,
            self.reward_risk,
        )
    }
}

impl Strategy for VolumeBreakoutStrategy {
    fn strategy_name(&self) -> &'static str {
        Self::NAME
    }

    fn evaluate(&self, current_price: f64, market: &MarketView<'_>) -> Result<StrategyOutput> {
        settle(Self::NAME, current_price, self.compute(current_price, market))
    }
}

/// Tighter volume breakout: the last closed candle must close above the
/// close before it, carry volume at or above the given percentile of such
/// green-volume candles, and close above the EMA.
#[derive(Debug, Clone)]
pub struct VolumeEmaStrategy {
    pub atr_period: usize,
    pub atr_factor: f64,
    pub volume_percentile: f64,
    pub volume_lookback: usize,
    pub ema_period: usize,
    pub reward_risk: f64,
}

impl Default for VolumeEmaStrategy {
    fn default() -> Self {
        Self {
            atr_period: 12,
            atr_factor: 1.5,
            volume_percentile: 80.0,
            volume_lookback: 100,
            ema_period: 50,
            reward_risk: 1.5,
        }
    }
}

impl VolumeEmaStrategy {
    pub const NAME: &'static str = "volume_ema_trading_strategy";

    pub fn from_config(cfg: &StrategyConfig) -> Result<Self> {
        let d = Self::default();
        let strategy = Self {
            atr_period: cfg.param_usize("atr_period", d.atr_period),
            atr_factor: cfg.param_f64("atr_factor", d.atr_factor),
            volume_percentile: cfg.param_f64("volume_percentile", d.volume_percentile),
            volume_lookback: cfg.param_usize("volume_lookback", d.volume_lookback),
            ema_period: cfg.param_usize("ema_period", d.ema_period),
            reward_risk: cfg.param_f64("reward_risk", d.reward_risk),
        };
        strategy.validate()?;
        Ok(strategy)
    }

    pub fn validate(&self) -> Result<()> {
        validate_breakout(self.atr_period, self.volume_percentile, self.volume_lookback)?;
        ensure(self.ema_period >= 1, "ema_period must be >= 1")
    }

    fn compute(&self, current_price: f64, market: &MarketView<'_>) -> Result<StrategyOutput> {
        let (closed, live) = split_live(market.entry)?;
        let closes = closed.closes();
        let volumes = closed.volumes();
        let n = closes.len();
        if n < 2 {
            return Err(Error::InsufficientData(
                "need two closed candles for green volume".into(),
            ));
        }

        let prior_close = closes[n - 1];
        let prior_volume = volumes[n - 1];
        if prior_close <= closes[n - 2] {
            return Ok(StrategyOutput::no_entry(current_price));
        }

        let start = n.saturating_sub(self.volume_lookback).max(1);
        let green_volumes: Vec<f64> = (start..n)
            .filter(|&i| closes[i] > closes[i - 1])
            .map(|i| volumes[i])
            .collect();
        let threshold = percentile(&green_volumes, self.volume_percentile)?;
        if prior_volume < threshold {
            return Ok(StrategyOutput::no_entry(current_price));
        }

        let trend = ema(&closes, self.ema_period)?;
        // NaN during warm-up compares false and blocks entry.
        if !(prior_close > trend[n - 1]) {
            return Ok(StrategyOutput::no_entry(current_price));
        }

        atr_stop_entry(
            &closed,
            &live,
            current_price,
            self.atr_period,
            self.atr_factor,
            self.reward_risk,
        )
    }
}

impl Strategy for VolumeEmaStrategy {
    fn strategy_name(&self) -> &'static str {
        Self::NAME
    }

    fn evaluate(&self, current_price: f64, market: &MarketView<'_>) -> Result<StrategyOutput> {
        settle(Self::NAME, current_price, self.compute(current_price, market))
    }
}

fn validate_breakout(
    atr_period: usize,
    volume_percentile: f64,
    volume_lookback: usize,
) -> Result<()> {
    ensure(atr_period >= 1, "atr_period must be >= 1")?;
    ensure(
        (0.0..=100.0).contains(&volume_percentile),
        "volume_percentile must be within 0..=100",
    )?;
    ensure(volume_lookback >= 1, "volume_lookback must be >= 1")
}

/// Closed candles and the forming one.
fn split_live(series: &CandleSeries) -> Result<(CandleSeries, Candle)> {
    match series.last() {
        Some(live) if series.len() >= 2 => Ok((series.closed(), *live)),
        _ => Err(Error::InsufficientData(
            "need a closed candle and a live candle".into(),
        )),
    }
}

/// Long entry with the stop at the ATR lower band of the last closed candle,
/// rejected if the live candle already traded through it.
fn atr_stop_entry(
    closed: &CandleSeries,
    live: &Candle,
    current_price: f64,
    atr_period: usize,
    atr_factor: f64,
    reward_risk: f64,
) -> Result<StrategyOutput> {
    let bands = atr_stop_bands(closed, atr_period, atr_factor)?;
    let stop_loss = bands.lower[bands.lower.len() - 1];

    if live.low <= stop_loss || current_price <= stop_loss {
        return Ok(StrategyOutput::no_entry(current_price));
    }

    let take_profit = current_price + reward_risk * (current_price - stop_loss);
    Ok(StrategyOutput::enter_long(current_price, stop_loss, take_profit))
}
