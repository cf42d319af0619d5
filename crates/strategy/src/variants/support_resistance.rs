use common::{CandleSeries, Error, Result, StrategyOutput};

use crate::config::StrategyConfig;
use crate::indicators::support_resistance::{DEFAULT_BINS, DEFAULT_MARGIN};
use crate::indicators::{bullish_divergence, ema, rsi, support_and_resistance, DivergenceKind};
use crate::variants::ensure;
use crate::{settle, MarketView, Strategy};

/// Buy at a support level on the higher timeframe, targeting the next
/// resistance level up.
///
/// The bracket is the pair of adjacent levels that contains the mean of the
/// last `mean_closes` closed higher-timeframe closes. The current price has
/// to sit inside the support band of that bracket.
#[derive(Debug, Clone)]
pub struct SupportResistanceStrategy {
    pub mean_closes: usize,
    pub margin: f64,
    pub bins: usize,
}

impl Default for SupportResistanceStrategy {
    fn default() -> Self {
        Self {
            mean_closes: 3,
            margin: DEFAULT_MARGIN,
            bins: DEFAULT_BINS,
        }
    }
}

impl SupportResistanceStrategy {
    pub const NAME: &'static str = "support_resistance";

    pub fn from_config(cfg: &StrategyConfig) -> Result<Self> {
        let d = Self::default();
        let strategy = Self {
            mean_closes: cfg.param_usize("mean_closes", d.mean_closes),
            margin: cfg.param_f64("margin", d.margin),
            bins: cfg.param_usize("bins", d.bins),
        };
        strategy.validate()?;
        Ok(strategy)
    }

    pub fn validate(&self) -> Result<()> {
        ensure(self.mean_closes >= 1, "mean_closes must be >= 1")?;
        ensure(self.bins >= 1, "bins must be >= 1")?;
        ensure(self.margin >= 0.0, "margin must be >= 0")
    }

    /// Bracket decision over already-closed candles.
    fn decide(&self, current_price: f64, closed: &CandleSeries) -> Result<StrategyOutput> {
        let closes = closed.closes();
        if closes.len() < self.mean_closes {
            return Err(Error::InsufficientData(format!(
                "support/resistance needs {} closed candles, got {}",
                self.mean_closes,
                closes.len()
            )));
        }
        let recent = &closes[closes.len() - self.mean_closes..];
        let reference = recent.iter().sum::<f64>() / recent.len() as f64;

        let levels = support_and_resistance(&closed.lows(), self.margin, self.bins)?;
        let base = &levels.base;

        // Highest level at or below the reference close.
        let Some(i) = base.iter().rposition(|&level| level <= reference) else {
            return Ok(StrategyOutput::no_entry(current_price));
        };

        if current_price < levels.lower[i] || current_price > levels.upper[i] {
            return Ok(StrategyOutput::no_entry(current_price));
        }

        let support = base[i];
        let resistance = match base.get(i + 1) {
            Some(&next) => next,
            // Above the top level: extend by the width of the bracket below.
            None => support + (support - base[i - 1]),
        };
        let stop_loss = support - (resistance - support) / 2.0;

        Ok(StrategyOutput::enter_long(current_price, stop_loss, resistance))
    }

    fn compute(&self, current_price: f64, market: &MarketView<'_>) -> Result<StrategyOutput> {
        self.decide(current_price, &market.higher.closed())
    }
}

impl Strategy for SupportResistanceStrategy {
    fn strategy_name(&self) -> &'static str {
        Self::NAME
    }

    fn evaluate(&self, current_price: f64, market: &MarketView<'_>) -> Result<StrategyOutput> {
        settle(Self::NAME, current_price, self.compute(current_price, market))
    }
}

/// [`SupportResistanceStrategy`] gated on a recent bullish RSI divergence on
/// the higher timeframe and on the last few closes holding above a trend EMA.
#[derive(Debug, Clone)]
pub struct SupportResistanceDivergenceStrategy {
    pub levels: SupportResistanceStrategy,
    pub divergence: DivergenceKind,
    pub divergence_order: usize,
    /// A flagged divergence must be among this many most recent closed bars.
    pub divergence_lookback: usize,
    pub rsi_period: usize,
    pub trend_ema_period: usize,
    /// 0 disables the EMA gate.
    pub closes_above_ema: usize,
}

impl Default for SupportResistanceDivergenceStrategy {
    fn default() -> Self {
        Self {
            levels: SupportResistanceStrategy::default(),
            divergence: DivergenceKind::Hidden,
            divergence_order: 2,
            divergence_lookback: 7,
            rsi_period: 14,
            trend_ema_period: 200,
            closes_above_ema: 3,
        }
    }
}

impl SupportResistanceDivergenceStrategy {
    pub const NAME: &'static str = "support_resistance_higher_timeframe_bullish_divergence";

    /// Fails on an unknown `divergence` code or an unusable period; those
    /// are configuration mistakes, not market conditions.
    pub fn from_config(cfg: &StrategyConfig) -> Result<Self> {
        let d = Self::default();
        let strategy = Self {
            levels: SupportResistanceStrategy::from_config(cfg)?,
            divergence: cfg.param_str("divergence", "h").parse::<DivergenceKind>()?,
            divergence_order: cfg.param_usize("divergence_order", d.divergence_order),
            divergence_lookback: cfg.param_usize("divergence_lookback", d.divergence_lookback),
            rsi_period: cfg.param_usize("rsi_period", d.rsi_period),
            trend_ema_period: cfg.param_usize("trend_ema_period", d.trend_ema_period),
            closes_above_ema: cfg.param_usize("closes_above_ema", d.closes_above_ema),
        };
        strategy.validate()?;
        Ok(strategy)
    }

    pub fn validate(&self) -> Result<()> {
        self.levels.validate()?;
        ensure(self.divergence_order >= 1, "divergence_order must be >= 1")?;
        ensure(self.rsi_period >= 2, "rsi_period must be >= 2")?;
        ensure(self.trend_ema_period >= 1, "trend_ema_period must be >= 1")
    }

    fn recent_divergence(&self, closed: &CandleSeries) -> Result<bool> {
        let closes = closed.closes();
        let oscillator = rsi(&closes, self.rsi_period)?;
        let flagged = bullish_divergence(
            self.divergence,
            &closed.body_lows(),
            &closed.body_highs(),
            &oscillator,
            self.divergence_order,
        );
        let recent_from = closes.len().saturating_sub(self.divergence_lookback);
        Ok(flagged.iter().any(|&i| i >= recent_from))
    }

    fn holding_above_trend(&self, closed: &CandleSeries) -> Result<bool> {
        if self.closes_above_ema == 0 {
            return Ok(true);
        }
        let closes = closed.closes();
        let trend = ema(&closes, self.trend_ema_period)?;
        if closes.len() < self.closes_above_ema {
            return Err(Error::InsufficientData("not enough closes for the EMA gate".into()));
        }
        let from = closes.len() - self.closes_above_ema;
        Ok((from..closes.len()).all(|i| closes[i] > trend[i]))
    }

    fn compute(&self, current_price: f64, market: &MarketView<'_>) -> Result<StrategyOutput> {
        let closed = market.higher.closed();
        if !self.recent_divergence(&closed)? || !self.holding_above_trend(&closed)? {
            return Ok(StrategyOutput::no_entry(current_price));
        }
        self.levels.decide(current_price, &closed)
    }
}

impl Strategy for SupportResistanceDivergenceStrategy {
    fn strategy_name(&self) -> &'static str {
        Self::NAME
    }

    fn evaluate(&self, current_price: f64, market: &MarketView<'_>) -> Result<StrategyOutput> {
        settle(Self::NAME, current_price, self.compute(current_price, market))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variants::test_support::series;

    /// Lows dip to 10 (bar 2) and 20 (bar 5), giving levels 10, 11, ..., 20.
    /// Closed closes from bar 8 on sit at `recent_close`; bar 11 is live.
    fn bracketed(recent_close: f64) -> CandleSeries {
        let mut bars: Vec<_> = [30.0, 30.0, 10.0, 30.0, 30.0, 20.0, 30.0, 30.0]
            .iter()
            .map(|&low| (low + 0.5, low + 1.0, low, low + 0.5, 1.0))
            .collect();
        for _ in 0..4 {
            bars.push((recent_close, recent_close + 0.1, 14.9, recent_close, 1.0));
        }
        series(&bars)
    }

    fn view(higher: &CandleSeries) -> MarketView<'_> {
        MarketView { entry: higher, higher }
    }

    #[test]
    fn price_on_support_targets_next_level() {
        let s = bracketed(15.0);
        let out = SupportResistanceStrategy::default().evaluate(15.01, &view(&s)).unwrap();

        assert!(out.can_enter);
        assert_eq!(out.entry_price, 15.01);
        assert!((out.take_profit - 16.0).abs() < 1e-9);
        assert!((out.stop_loss - 14.5).abs() < 1e-9);
    }

    #[test]
    fn price_outside_support_band_is_no_entry() {
        let s = bracketed(15.0);
        let out = SupportResistanceStrategy::default().evaluate(15.5, &view(&s)).unwrap();
        assert_eq!(out, StrategyOutput::no_entry(15.5));
    }

    #[test]
    fn reference_below_lowest_level_is_no_entry() {
        let s = bracketed(9.0);
        let out = SupportResistanceStrategy::default().evaluate(9.0, &view(&s)).unwrap();
        assert_eq!(out, StrategyOutput::no_entry(9.0));
    }

    #[test]
    fn top_level_extrapolates_resistance() {
        let s = bracketed(20.0);
        let out = SupportResistanceStrategy::default().evaluate(20.0, &view(&s)).unwrap();

        assert!(out.can_enter);
        assert!((out.take_profit - 21.0).abs() < 1e-9);
        assert!((out.stop_loss - 19.5).abs() < 1e-9);
    }

    #[test]
    fn no_history_is_no_entry() {
        let s = series(&[(1.0, 1.1, 0.9, 1.0, 1.0)]);
        let out = SupportResistanceStrategy::default().evaluate(1.0, &view(&s)).unwrap();
        assert_eq!(out, StrategyOutput::no_entry(1.0));
    }

    /// Rise, choppy fall to a low at bar 29, rally, sharp drop to a higher
    /// low at bar 41 with a lower RSI (hidden divergence), recovery. Bar 46
    /// is live.
    fn hidden_divergence_series() -> CandleSeries {
        let mut steps = vec![1.0; 20];
        steps.extend([-2.0, 1.0, -2.0, 1.0, -2.0, 1.0, -2.0, 1.0, -2.0]);
        steps.extend([3.0; 8]);
        steps.extend([-4.0; 4]);
        steps.extend([2.0; 5]);

        let mut closes: Vec<f64> = vec![100.0];
        for step in steps {
            closes.push(closes[closes.len() - 1] + step);
        }
        let bars: Vec<_> = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let rising = i > 0 && close > closes[i - 1];
                let open = if rising { close - 0.5 } else { close + 0.5 };
                (open, open.max(close) + 0.1, open.min(close) - 0.1, close, 1.0)
            })
            .collect();
        series(&bars)
    }

    fn divergence_strategy() -> SupportResistanceDivergenceStrategy {
        SupportResistanceDivergenceStrategy {
            trend_ema_period: 10,
            closes_above_ema: 2,
            ..Default::default()
        }
    }

    #[test]
    fn hidden_divergence_near_support_enters() {
        let s = hidden_divergence_series();
        // Lows bottom at 113.9 and 121.9; the recent closes sit above the top
        // level, so the bracket is extrapolated upwards by 0.8.
        let out = divergence_strategy().evaluate(122.0, &view(&s)).unwrap();

        assert!(out.can_enter);
        assert!((out.take_profit - 122.7).abs() < 1e-9);
        assert!((out.stop_loss - 121.5).abs() < 1e-9);
    }

    #[test]
    fn regular_divergence_does_not_fire_on_hidden_setup() {
        let s = hidden_divergence_series();
        let strategy = SupportResistanceDivergenceStrategy {
            divergence: DivergenceKind::Regular,
            ..divergence_strategy()
        };
        assert_eq!(
            strategy.evaluate(122.0, &view(&s)).unwrap(),
            StrategyOutput::no_entry(122.0)
        );
    }

    #[test]
    fn stale_divergence_is_ignored() {
        let s = hidden_divergence_series();
        let strategy = SupportResistanceDivergenceStrategy {
            divergence_lookback: 3,
            ..divergence_strategy()
        };
        assert!(!strategy.evaluate(122.0, &view(&s)).unwrap().can_enter);
    }

    #[test]
    fn ema_gate_blocks_when_closes_lag_trend() {
        let s = hidden_divergence_series();
        let strategy = SupportResistanceDivergenceStrategy {
            closes_above_ema: 3,
            ..divergence_strategy()
        };
        assert!(!strategy.evaluate(122.0, &view(&s)).unwrap().can_enter);
    }

    #[test]
    fn default_ema_period_without_history_is_no_entry() {
        let s = hidden_divergence_series();
        let out = SupportResistanceDivergenceStrategy::default()
            .evaluate(122.0, &view(&s))
            .unwrap();
        assert_eq!(out, StrategyOutput::no_entry(122.0));
    }

    #[test]
    fn unknown_divergence_code_is_rejected() {
        let cfg: StrategyConfig = toml::from_str(
            r#"
            type = "sr_divergence"
            [params]
            divergence = "x"
            "#,
        )
        .unwrap();
        assert!(matches!(
            SupportResistanceDivergenceStrategy::from_config(&cfg),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn unusable_periods_are_rejected_at_build_time() {
        for params in ["rsi_period = 1", "trend_ema_period = 0", "divergence_order = 0", "bins = 0"] {
            let cfg: StrategyConfig =
                toml::from_str(&format!("type = \"sr_divergence\"\n[params]\n{params}\n"))
                    .unwrap();
            assert!(
                matches!(
                    SupportResistanceDivergenceStrategy::from_config(&cfg),
                    Err(Error::InvalidArgument(_))
                ),
                "{params}"
            );
        }
    }
}
