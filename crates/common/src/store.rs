use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{NewTrade, Pair, Result, ResultSummary, Trade, TradeExit, TradingMode};

/// System of record for trades. Every call commits on its own.
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Persist a new trade in `opened` state and return its identifier.
    async fn create(&self, trade: &NewTrade) -> Result<i64>;

    async fn get(&self, id: i64) -> Result<Trade>;

    /// Opened trades, optionally restricted to one pair.
    async fn list_open(&self, pair: Option<&Pair>) -> Result<Vec<Trade>>;

    /// Set post-entry overrides. `None` leaves the current value untouched.
    async fn update_thresholds(
        &self,
        id: i64,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Result<()>;

    /// Write every exit field and the final status in one commit.
    /// Fails with `TradeNotFound` unless the trade is currently opened.
    async fn close(&self, id: i64, exit: &TradeExit) -> Result<()>;

    /// Closed trades of `mode` with an exit time in `[from, to)`, grouped by
    /// status.
    async fn results_between(
        &self,
        mode: TradingMode,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ResultSummary>>;
}
