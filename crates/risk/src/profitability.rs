use tracing::debug;

use common::{Error, PositionType, Result, StrategyOutput};

/// What to do with the strategy's take-profit before judging a trade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TakeProfitPolicy {
    /// Judge the target as given: accept when the fee-adjusted win beats the
    /// fee-adjusted loss.
    Keep,
    /// Move the target so the fee-adjusted ratio matches the fee-free one,
    /// then accept only if that ratio lies strictly inside the band.
    Widen { accept_min: f64, accept_max: f64 },
}

/// Outcome of [`assess`].
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub accepted: bool,
    /// The strategy output, with the take-profit rewritten under
    /// [`TakeProfitPolicy::Widen`].
    pub output: StrategyOutput,
    /// Fee-adjusted win margin over fee-adjusted loss margin.
    pub ratio: f64,
}

/// Margins of a long trade after the entry fee (paid in the bought asset)
/// and the exit fee (paid in the counter currency).
struct LongMargins {
    capital: f64,
    /// Counter-currency value per unit of exit price, net of both fees.
    net_per_price: f64,
}

impl LongMargins {
    fn new(fee: f64, entry_price: f64, quantity: f64) -> Self {
        let held = quantity * (1.0 - fee);
        Self {
            capital: quantity * entry_price,
            net_per_price: held * (1.0 - fee),
        }
    }

    fn margin_at(&self, exit_price: f64) -> f64 {
        (self.net_per_price * exit_price - self.capital).abs()
    }

    fn ratio(&self, take_profit: f64, stop_loss: f64) -> f64 {
        self.margin_at(take_profit) / self.margin_at(stop_loss)
    }
}

fn require_long(output: &StrategyOutput) -> Result<()> {
    match output.position_type {
        PositionType::Long => Ok(()),
        PositionType::Short => Err(Error::InvalidArgument(
            "short positions are not supported by the profitability gate".into(),
        )),
    }
}

/// Whether the fee-adjusted win at take-profit is strictly larger than the
/// fee-adjusted loss at stop-loss, for `quantity` units bought at the entry.
///
/// Outputs that cannot enter are never profitable. Short outputs are an
/// error.
pub fn is_profitable(fee: f64, output: &StrategyOutput, quantity: f64) -> Result<bool> {
    require_long(output)?;
    if !output.can_enter {
        return Ok(false);
    }
    let ratio =
        LongMargins::new(fee, output.entry_price, quantity).ratio(output.take_profit, output.stop_loss);
    Ok(ratio > 1.0)
}

/// Judge an entry under `policy`, possibly rewriting its take-profit.
///
/// Under [`TakeProfitPolicy::Widen`], with `R` the fee-free ratio
/// `(tp - entry) / (entry - sl)` and `L` the fee-adjusted loss margin, the
/// new target is `(capital + R * L) / net_per_price`, so the fee-adjusted
/// win margin equals `R * L`.
pub fn assess(
    fee: f64,
    output: &StrategyOutput,
    quantity: f64,
    policy: TakeProfitPolicy,
) -> Result<Assessment> {
    require_long(output)?;
    if !output.can_enter {
        return Ok(Assessment {
            accepted: false,
            output: *output,
            ratio: 0.0,
        });
    }

    let margins = LongMargins::new(fee, output.entry_price, quantity);

    let assessment = match policy {
        TakeProfitPolicy::Keep => {
            let ratio = margins.ratio(output.take_profit, output.stop_loss);
            Assessment {
                accepted: ratio > 1.0,
                output: *output,
                ratio,
            }
        }
        TakeProfitPolicy::Widen {
            accept_min,
            accept_max,
        } => {
            let target = (output.take_profit - output.entry_price)
                / (output.entry_price - output.stop_loss);
            let loss = margins.margin_at(output.stop_loss);
            let take_profit = (margins.capital + target * loss) / margins.net_per_price;

            let widened = StrategyOutput {
                take_profit,
                ..*output
            };
            let ratio = margins.ratio(take_profit, output.stop_loss);
            Assessment {
                accepted: ratio > accept_min && ratio < accept_max,
                output: widened,
                ratio,
            }
        }
    };

    debug!(
        fee,
        quantity,
        take_profit = assessment.output.take_profit,
        ratio = assessment.ratio,
        accepted = assessment.accepted,
        "Profitability assessed"
    );
    Ok(assessment)
}
