use async_trait::async_trait;

use crate::{CandleSeries, Fill, MarketLimits, Pair, Result};

/// Abstraction over the exchange connection.
///
/// `BinanceClient` implements this for live data and orders.
/// `PaperExchange` implements this for simulation.
///
/// Any `Err` is read by the engine as "unavailable this cycle": the current
/// symbol or action is skipped and retried on the next scan.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Latest `count` candles, oldest first. With `include_unclosed` the last
    /// candle is the one still forming.
    async fn recent_candles(
        &self,
        pair: &Pair,
        timeframe: &str,
        count: usize,
        include_unclosed: bool,
    ) -> Result<CandleSeries>;

    async fn current_price(&self, pair: &Pair) -> Result<f64>;

    /// Taker fee as a fraction (0.001 = 0.1%).
    async fn taker_fee(&self, pair: &Pair) -> Result<f64>;

    /// Buy `quantity` base units at market.
    async fn market_buy(&self, pair: &Pair, quantity: f64) -> Result<Fill>;

    /// Sell `quantity` base units at market, shrinking the quantity when the
    /// exchange reports an insufficient balance.
    async fn market_sell_reducing(&self, pair: &Pair, quantity: f64) -> Result<Fill>;

    async fn market_limits(&self, pair: &Pair) -> Result<MarketLimits>;

    /// Balance of `asset` available for new orders.
    async fn free_balance(&self, asset: &str) -> Result<f64>;

    /// Free plus locked balance of `asset`.
    async fn total_balance(&self, asset: &str) -> Result<f64>;
}
