//! Position sizing and the fee-aware profitability gate.
//!
//! Everything here is pure arithmetic over a [`common::StrategyOutput`];
//! callers fetch balances and fees from the exchange and pass them in.

mod config;
mod profitability;
mod sizing;

pub use config::RiskConfig;
pub use profitability::{assess, is_profitable, Assessment, TakeProfitPolicy};
pub use sizing::{capital_cap, risk_pct, size_position};
