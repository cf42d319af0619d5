use tracing::debug;

use common::StrategyOutput;

/// Stop distance as a percentage of the entry price.
pub fn risk_pct(output: &StrategyOutput) -> f64 {
    100.0 * (output.entry_price - output.stop_loss).abs() / output.entry_price
}

/// Counter-currency amount to commit to a trade.
///
/// Up to `max_risk_pct` the full `available` amount is used (inclusive);
/// beyond it the amount shrinks by `max_risk_pct / risk_pct`. The result
/// never exceeds `max_cap`.
pub fn size_position(
    available: f64,
    output: &StrategyOutput,
    max_cap: f64,
    max_risk_pct: f64,
) -> f64 {
    let risk = risk_pct(output);
    let sized = if risk <= max_risk_pct {
        available
    } else {
        available * max_risk_pct / risk
    };
    let capital = if sized <= max_cap { sized } else { max_cap };
    debug!(available, risk_pct = risk, max_cap, capital, "Position sized");
    capital
}

/// Per-trade ceiling: an equal share of total holdings, never below the
/// exchange minimum order value.
pub fn capital_cap(total_holdings: f64, cap_divisor: f64, min_order_value: f64) -> f64 {
    (total_holdings / cap_divisor).max(min_order_value)
}
