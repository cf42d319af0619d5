use serde::{Deserialize, Serialize};

use crate::profitability::TakeProfitPolicy;

/// The `[risk]` table of the bot config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Stop distance, as a percentage of entry, above which capital is
    /// scaled down linearly (e.g. 1.0 = 1%).
    pub max_risk_pct: f64,
    /// Total holdings are divided by this to get the per-trade ceiling.
    pub cap_divisor: f64,
    /// Floor for the per-trade ceiling; matches the exchange minimum order.
    pub min_order_value: f64,
    /// Fraction of the take-profit distance kept when a trade falls halfway
    /// to its stop (0.1 keeps 10%).
    pub take_profit_reduction: f64,
    /// Rewrite take-profits to the fee-free reward:risk ratio.
    pub widen_take_profit: bool,
    pub accept_ratio_min: f64,
    pub accept_ratio_max: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_risk_pct: 1.0,
            cap_divisor: 7.2,
            min_order_value: 13.0,
            take_profit_reduction: 0.1,
            widen_take_profit: false,
            accept_ratio_min: 1.0,
            accept_ratio_max: 2.5,
        }
    }
}

impl RiskConfig {
    pub fn take_profit_policy(&self) -> TakeProfitPolicy {
        if self.widen_take_profit {
            TakeProfitPolicy::Widen {
                accept_min: self.accept_ratio_min,
                accept_max: self.accept_ratio_max,
            }
        } else {
            TakeProfitPolicy::Keep
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_table_keeps_defaults() {
        let cfg: RiskConfig = toml::from_str("max_risk_pct = 2.5\nwiden_take_profit = true").unwrap();
        assert_eq!(cfg.max_risk_pct, 2.5);
        assert_eq!(cfg.cap_divisor, 7.2);
        assert_eq!(
            cfg.take_profit_policy(),
            TakeProfitPolicy::Widen { accept_min: 1.0, accept_max: 2.5 }
        );
    }
}
