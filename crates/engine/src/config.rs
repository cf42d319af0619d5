use serde::{Deserialize, Serialize};

use common::{Error, Pair, Result};
use risk::RiskConfig;
use strategy::StrategyConfig;

/// The bot config file (TOML).
///
/// Example `config/bot.toml`:
/// ```toml
/// counter_currency = "EUR"
/// entry_timeframe = "5m"
/// higher_timeframe = "1h"
/// markets = ["BTC/EUR", "ETH/EUR"]
///
/// [strategy]
/// type = "sr_divergence"
///
/// [strategy.params]
/// divergence_lookback = 7
///
/// [risk]
/// max_risk_pct = 1.0
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BotFileConfig {
    #[serde(default = "default_counter_currency")]
    pub counter_currency: String,
    /// Exchange identifier passed to the market directory.
    #[serde(default = "default_exchange_id")]
    pub exchange_id: String,
    #[serde(default = "default_entry_timeframe")]
    pub entry_timeframe: String,
    #[serde(default = "default_higher_timeframe")]
    pub higher_timeframe: String,
    /// Candles requested per timeframe for each evaluation.
    #[serde(default = "default_candles")]
    pub candles: usize,
    /// Explicit `BASE/COUNTER` markets. Empty means ask the market directory.
    #[serde(default)]
    pub markets: Vec<String>,
    #[serde(default = "default_scan_pause_secs")]
    pub scan_pause_secs: u64,
    #[serde(default = "default_market_refresh_hours")]
    pub market_refresh_hours: u64,
    /// UTC hours at which the current-day summary is sent.
    #[serde(default = "default_report_hours")]
    pub report_hours: Vec<u32>,
    /// The bot exits cleanly once this path exists.
    #[serde(default)]
    pub stop_file: Option<String>,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub risk: RiskConfig,
}

fn default_counter_currency() -> String {
    "EUR".into()
}

fn default_exchange_id() -> String {
    "binance".into()
}

fn default_entry_timeframe() -> String {
    "5m".into()
}

fn default_higher_timeframe() -> String {
    "1h".into()
}

fn default_candles() -> usize {
    1000
}

fn default_scan_pause_secs() -> u64 {
    2
}

fn default_market_refresh_hours() -> u64 {
    168
}

fn default_report_hours() -> Vec<u32> {
    vec![12, 16, 20]
}

impl BotFileConfig {
    /// Load from a TOML file. Exits process on error.
    pub fn load(path: &str) -> Self {
        let content = std::fs::read_to_string(path)
            .unwrap_or_else(|e| panic!("Failed to read bot config at '{path}': {e}"));
        Self::parse(&content).unwrap_or_else(|e| panic!("Failed to parse bot config at '{path}': {e}"))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        if let Some(hour) = cfg.report_hours.iter().find(|h| **h > 23) {
            return Err(Error::Config(format!("report hour {hour} is not a valid UTC hour")));
        }
        // Surface malformed markets at start-up rather than mid-scan.
        cfg.explicit_markets()?;
        Ok(cfg)
    }

    /// The configured markets, deduplicated in first-seen order.
    pub fn explicit_markets(&self) -> Result<Vec<Pair>> {
        let mut pairs: Vec<Pair> = Vec::new();
        for raw in &self.markets {
            let pair: Pair = raw.parse()?;
            if !pairs.contains(&pair) {
                pairs.push(pair);
            }
        }
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_file_takes_defaults() {
        let cfg = BotFileConfig::parse("[strategy]\ntype = \"volume\"\n").unwrap();
        assert_eq!(cfg.counter_currency, "EUR");
        assert_eq!(cfg.entry_timeframe, "5m");
        assert_eq!(cfg.higher_timeframe, "1h");
        assert_eq!(cfg.candles, 1000);
        assert_eq!(cfg.report_hours, vec![12, 16, 20]);
        assert_eq!(cfg.risk.cap_divisor, 7.2);
        assert!(cfg.explicit_markets().unwrap().is_empty());
        assert!(cfg.stop_file.is_none());
    }

    #[test]
    fn markets_are_parsed_and_deduplicated() {
        let cfg = BotFileConfig::parse(
            r#"
            markets = ["btc/eur", "ETH/EUR", "BTC/EUR"]
            [strategy]
            type = "support_resistance"
            [risk]
            max_risk_pct = 2.0
            "#,
        )
        .unwrap();
        assert_eq!(
            cfg.explicit_markets().unwrap(),
            vec![Pair::new("BTC", "EUR"), Pair::new("ETH", "EUR")]
        );
        assert_eq!(cfg.risk.max_risk_pct, 2.0);
        assert_eq!(cfg.risk.min_order_value, 13.0);
    }

    #[test]
    fn bad_market_is_config_error() {
        let err = BotFileConfig::parse("markets = [\"BTCEUR\"]\n[strategy]\ntype = \"volume\"\n")
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_strategy_table_is_rejected() {
        assert!(BotFileConfig::parse("counter_currency = \"USDT\"\n").is_err());
    }

    #[test]
    fn out_of_range_report_hour_is_rejected() {
        let src = "report_hours = [8, 24]\n[strategy]\ntype = \"volume\"\n";
        assert!(matches!(BotFileConfig::parse(src), Err(Error::Config(_))));
    }

    #[test]
    fn shipped_sample_config_parses() {
        let cfg = BotFileConfig::parse(include_str!("../../../config/bot.toml")).unwrap();
        assert_eq!(cfg.strategy.strategy_type, "sr_divergence");
        assert!(cfg.markets.is_empty());
        assert_eq!(cfg.risk.accept_ratio_max, 2.5);
    }
}
