use crate::TradingMode;

/// Process configuration loaded from environment variables at startup.
/// Missing required variables cause an immediate panic with a clear message.
#[derive(Debug, Clone)]
pub struct Config {
    // Exchange credentials
    pub binance_api_key: String,
    pub binance_secret: String,

    // Telegram; notifications only go to the log when unset
    pub telegram_token: Option<String>,
    pub telegram_chat_ids: Vec<i64>,

    // Trading
    pub trading_mode: TradingMode,
    pub paper_slippage_bps: f64,
    pub paper_balance: f64,

    // Database
    pub database_url: String,

    // Bot config file path
    pub bot_config_path: String,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present. Panics on any missing required variable.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let trading_mode = match required_env("TRADING_MODE").to_lowercase().as_str() {
            "paper" => TradingMode::Paper,
            "live" => TradingMode::Live,
            other => panic!("ERROR: TRADING_MODE must be 'paper' or 'live', got: '{other}'"),
        };

        let telegram_chat_ids = optional_env("TELEGRAM_CHAT_IDS")
            .map(|raw| parse_chat_ids(&raw))
            .unwrap_or_default();

        Config {
            binance_api_key: required_env("BINANCE_API_KEY"),
            binance_secret: required_env("BINANCE_SECRET"),
            telegram_token: optional_env("TELEGRAM_TOKEN").filter(|t| !t.trim().is_empty()),
            telegram_chat_ids,
            trading_mode,
            paper_slippage_bps: optional_env("PAPER_SLIPPAGE_BPS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10.0),
            paper_balance: optional_env("PAPER_BALANCE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000.0),
            database_url: required_env("DATABASE_URL"),
            bot_config_path: optional_env("STRATEGY_CONFIG_PATH")
                .unwrap_or_else(|| "config/bot.toml".to_string()),
        }
    }
}

fn parse_chat_ids(raw: &str) -> Vec<i64> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .unwrap_or_else(|_| panic!("TELEGRAM_CHAT_IDS contains non-numeric ID: '{s}'"))
        })
        .collect()
}

fn required_env(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| {
        panic!("Required environment variable '{key}' is not set. Check your .env file.")
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
