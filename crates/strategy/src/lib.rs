pub mod config;
pub mod indicators;
pub mod registry;
pub mod variants;

pub use config::StrategyConfig;
pub use registry::build_strategy;
pub use variants::{
    SupportResistanceDivergenceStrategy, SupportResistanceStrategy, VolumeBreakoutStrategy,
    VolumeEmaStrategy,
};

use common::{CandleSeries, Error, Result, StrategyOutput};
use tracing::debug;

/// Candle series a strategy may read. In both series the last candle is the
/// one still forming.
#[derive(Debug, Clone, Copy)]
pub struct MarketView<'a> {
    /// Series on the entry timeframe (e.g. 5m).
    pub entry: &'a CandleSeries,
    /// Series on the higher timeframe (e.g. 1h).
    pub higher: &'a CandleSeries,
}

/// All strategy implementations must satisfy this trait.
///
/// Evaluation is stateless: the same price and candles always give the same
/// output. Missing history degrades to [`StrategyOutput::no_entry`]; any other
/// error is returned to the caller.
pub trait Strategy: Send + Sync {
    /// Stable identifier stored with every trade; unique per variant.
    fn strategy_name(&self) -> &'static str;

    fn evaluate(&self, current_price: f64, market: &MarketView<'_>) -> Result<StrategyOutput>;
}

/// Turn a lack of history into a no-entry decision; pass other errors on.
pub(crate) fn settle(
    strategy: &'static str,
    current_price: f64,
    outcome: Result<StrategyOutput>,
) -> Result<StrategyOutput> {
    match outcome {
        Err(Error::InsufficientData(reason)) => {
            debug!(strategy, reason, "Not enough history, no entry");
            Ok(StrategyOutput::no_entry(current_price))
        }
        other => other,
    }
}
