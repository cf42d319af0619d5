use tracing::info;

use common::{Error, Result};

use crate::config::StrategyConfig;
use crate::variants::{
    SupportResistanceDivergenceStrategy, SupportResistanceStrategy, VolumeBreakoutStrategy,
    VolumeEmaStrategy,
};
use crate::Strategy;

/// Build the configured strategy.
///
/// Unknown `type` values are a configuration error; parameters no market
/// data could satisfy (a bad divergence code, a zero period, a percentile
/// outside 0..=100) are reported as invalid arguments.
pub fn build_strategy(cfg: &StrategyConfig) -> Result<Box<dyn Strategy>> {
    let strategy: Box<dyn Strategy> = match cfg.strategy_type.as_str() {
        "support_resistance" => Box::new(SupportResistanceStrategy::from_config(cfg)?),
        "sr_divergence" => Box::new(SupportResistanceDivergenceStrategy::from_config(cfg)?),
        "volume" => Box::new(VolumeBreakoutStrategy::from_config(cfg)?),
        "volume_ema" => Box::new(VolumeEmaStrategy::from_config(cfg)?),
        other => {
            return Err(Error::Config(format!("unknown strategy type '{other}'")));
        }
    };
    info!(strategy = strategy.strategy_name(), "Strategy built");
    Ok(strategy)
}
