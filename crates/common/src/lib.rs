pub mod config;
pub mod error;
pub mod exchange;
pub mod market;
pub mod notify;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use exchange::ExchangeGateway;
pub use market::MarketDirectory;
pub use notify::{LogNotifier, Notifier};
pub use store::TradeStore;
pub use types::*;
