use async_trait::async_trait;

use crate::{MarketSnapshot, Pair, Result};

/// Third-party market listing used to choose which pairs to scan.
#[async_trait]
pub trait MarketDirectory: Send + Sync {
    /// Pairs listed on `exchange_id` quoted in `counter`, first-seen order,
    /// without duplicates.
    async fn list_tradable_pairs(&self, exchange_id: &str, counter: &str) -> Result<Vec<Pair>>;

    /// Top markets by capitalisation priced in `counter`.
    async fn top_market_snapshot(&self, counter: &str) -> Result<Vec<MarketSnapshot>>;
}
