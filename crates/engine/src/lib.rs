pub mod binance;
pub mod coingecko;
pub mod config;
pub mod lifecycle;
pub mod report;
pub mod scanner;
pub mod store;

pub use binance::BinanceClient;
pub use coingecko::CoinGeckoDirectory;
pub use config::BotFileConfig;
pub use lifecycle::{EntryRequest, PositionController};
pub use scanner::{resolve_markets, CycleEnd, ScanOutcome, ScanSettings, Scanner};
pub use store::SqliteTradeStore;
