use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The `[strategy]` table of the bot config file.
///
/// ```toml
/// [strategy]
/// type = "volume_ema"
///
/// [strategy.params]
/// atr_period = 12
/// atr_factor = 1.5
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyConfig {
    /// Strategy type: `support_resistance`, `sr_divergence`, `volume` or
    /// `volume_ema`.
    #[serde(rename = "type")]
    pub strategy_type: String,
    /// Variant-specific parameters; missing keys take the variant default.
    #[serde(default)]
    pub params: HashMap<String, toml::Value>,
}

impl StrategyConfig {
    pub fn param_f64(&self, key: &str, default: f64) -> f64 {
        self.params
            .get(key)
            .and_then(|v| v.as_float().or_else(|| v.as_integer().map(|i| i as f64)))
            .unwrap_or(default)
    }

    pub fn param_usize(&self, key: &str, default: usize) -> usize {
        self.params
            .get(key)
            .and_then(|v| v.as_integer())
            .and_then(|v| usize::try_from(v).ok())
            .unwrap_or(default)
    }

    pub fn param_str<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_fall_back_to_defaults() {
        let cfg: StrategyConfig = toml::from_str(
            r#"
            type = "volume"
            [params]
            atr_period = 10
            volume_percentile = 70
            divergence = "r"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.strategy_type, "volume");
        assert_eq!(cfg.param_usize("atr_period", 12), 10);
        assert_eq!(cfg.param_f64("volume_percentile", 75.0), 70.0);
        assert_eq!(cfg.param_f64("atr_factor", 1.5), 1.5);
        assert_eq!(cfg.param_str("divergence", "h"), "r");
    }
}
