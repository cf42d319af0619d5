use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{
    CandleSeries, Error, ExchangeGateway, Fill, MarketLimits, OrderSide, Pair, Result,
};

/// Taker fee used when neither a local override nor an upstream is set.
pub const DEFAULT_TAKER_FEE: f64 = 0.001;

/// Simulated exchange gateway.
///
/// Balances and fills are kept in memory; no real order ever leaves the
/// process. Market data comes from values set locally (tests) and otherwise
/// from an optional upstream gateway (paper trading against live prices).
pub struct PaperExchange {
    upstream: Option<Arc<dyn ExchangeGateway>>,
    /// Slippage in basis points applied to all fills.
    slippage_bps: f64,
    state: RwLock<PaperState>,
}

#[derive(Default)]
struct PaperState {
    balances: HashMap<String, f64>,
    prices: HashMap<Pair, f64>,
    candles: HashMap<(Pair, String), CandleSeries>,
    fees: HashMap<Pair, f64>,
    limits: HashMap<Pair, MarketLimits>,
}

impl PaperExchange {
    pub fn new(slippage_bps: f64) -> Self {
        info!(slippage_bps, "PaperExchange initialized");
        Self {
            upstream: None,
            slippage_bps,
            state: RwLock::new(PaperState::default()),
        }
    }

    /// Read market data from `upstream` whenever nothing was set locally.
    pub fn with_upstream(mut self, upstream: Arc<dyn ExchangeGateway>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    pub async fn deposit(&self, asset: &str, amount: f64) {
        *self
            .state
            .write()
            .await
            .balances
            .entry(asset.to_uppercase())
            .or_default() += amount;
    }

    pub async fn set_price(&self, pair: &Pair, price: f64) {
        self.state.write().await.prices.insert(pair.clone(), price);
    }

    /// Serve `series` for `timeframe`; its last candle counts as unclosed.
    pub async fn set_candles(&self, pair: &Pair, timeframe: &str, series: CandleSeries) {
        self.state
            .write()
            .await
            .candles
            .insert((pair.clone(), timeframe.to_string()), series);
    }

    pub async fn set_taker_fee(&self, pair: &Pair, fee: f64) {
        self.state.write().await.fees.insert(pair.clone(), fee);
    }

    pub async fn set_limits(&self, pair: &Pair, limits: MarketLimits) {
        self.state.write().await.limits.insert(pair.clone(), limits);
    }

    fn upstream(&self, what: &str, pair: &Pair) -> Result<&Arc<dyn ExchangeGateway>> {
        self.upstream.as_ref().ok_or_else(|| {
            Error::Exchange(format!("PaperExchange has no {what} for '{pair}'"))
        })
    }

    fn slipped(&self, mid_price: f64, side: OrderSide) -> f64 {
        // Buys pay more, sells receive less
        match side {
            OrderSide::Buy => mid_price * (1.0 + self.slippage_bps / 10_000.0),
            OrderSide::Sell => mid_price * (1.0 - self.slippage_bps / 10_000.0),
        }
    }

    fn fill(pair: &Pair, side: OrderSide, fill_price: f64, quantity: f64, fee: f64) -> Fill {
        Fill {
            order_id: format!("paper-{}", uuid::Uuid::new_v4()),
            pair: pair.clone(),
            side,
            fill_price,
            quantity,
            fee,
            cost: fill_price * quantity,
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
impl ExchangeGateway for PaperExchange {
    async fn recent_candles(
        &self,
        pair: &Pair,
        timeframe: &str,
        count: usize,
        include_unclosed: bool,
    ) -> Result<CandleSeries> {
        let local = self
            .state
            .read()
            .await
            .candles
            .get(&(pair.clone(), timeframe.to_string()))
            .cloned();

        match local {
            Some(series) => {
                let series = if include_unclosed { series } else { series.closed() };
                let skip = series.len().saturating_sub(count);
                CandleSeries::new(series.candles()[skip..].to_vec())
            }
            None => {
                self.upstream("candles", pair)?
                    .recent_candles(pair, timeframe, count, include_unclosed)
                    .await
            }
        }
    }

    async fn current_price(&self, pair: &Pair) -> Result<f64> {
        let local = self.state.read().await.prices.get(pair).copied();
        match local {
            Some(price) => Ok(price),
            None => self.upstream("price", pair)?.current_price(pair).await,
        }
    }

    async fn taker_fee(&self, pair: &Pair) -> Result<f64> {
        let local = self.state.read().await.fees.get(pair).copied();
        match (local, &self.upstream) {
            (Some(fee), _) => Ok(fee),
            (None, Some(upstream)) => upstream.taker_fee(pair).await,
            (None, None) => Ok(DEFAULT_TAKER_FEE),
        }
    }

    async fn market_buy(&self, pair: &Pair, quantity: f64) -> Result<Fill> {
        if quantity <= 0.0 {
            return Err(Error::InvalidArgument(format!("buy quantity must be positive, got {quantity}")));
        }
        let fill_price = self.slipped(self.current_price(pair).await?, OrderSide::Buy);
        let fee_rate = self.taker_fee(pair).await?;
        let cost = fill_price * quantity;

        let mut state = self.state.write().await;
        let counter = state.balances.entry(pair.counter.clone()).or_default();
        if *counter < cost {
            return Err(Error::Exchange(format!(
                "insufficient {} balance: need {cost:.8}, have {:.8}",
                pair.counter, *counter
            )));
        }
        *counter -= cost;
        // Buy fees are charged in the received asset.
        let fee_base = quantity * fee_rate;
        *state.balances.entry(pair.base.clone()).or_default() += quantity - fee_base;
        drop(state);

        debug!(pair = %pair, fill = fill_price, qty = quantity, "Paper buy simulated");
        Ok(Self::fill(pair, OrderSide::Buy, fill_price, quantity, fee_base * fill_price))
    }

    async fn market_sell_reducing(&self, pair: &Pair, quantity: f64) -> Result<Fill> {
        let fill_price = self.slipped(self.current_price(pair).await?, OrderSide::Sell);
        let fee_rate = self.taker_fee(pair).await?;

        let mut state = self.state.write().await;
        let held = state.balances.get(&pair.base).copied().unwrap_or(0.0);
        let quantity = quantity.min(held);
        if quantity <= 0.0 {
            return Err(Error::Exchange(format!("no {} balance to sell", pair.base)));
        }
        let proceeds = fill_price * quantity;
        let fee = proceeds * fee_rate;
        *state.balances.entry(pair.base.clone()).or_default() -= quantity;
        *state.balances.entry(pair.counter.clone()).or_default() += proceeds - fee;
        drop(state);

        debug!(pair = %pair, fill = fill_price, qty = quantity, "Paper sell simulated");
        Ok(Self::fill(pair, OrderSide::Sell, fill_price, quantity, fee))
    }

    async fn market_limits(&self, pair: &Pair) -> Result<MarketLimits> {
        let local = self.state.read().await.limits.get(pair).copied();
        match (local, &self.upstream) {
            (Some(limits), _) => Ok(limits),
            (None, Some(upstream)) => upstream.market_limits(pair).await,
            (None, None) => Ok(MarketLimits {
                min_order_value: 0.0,
                max_order_value: f64::MAX,
                min_qty: 0.0,
                max_qty: f64::MAX,
                step_size: 0.0,
            }),
        }
    }

    async fn free_balance(&self, asset: &str) -> Result<f64> {
        Ok(self
            .state
            .read()
            .await
            .balances
            .get(&asset.to_uppercase())
            .copied()
            .unwrap_or(0.0))
    }

    async fn total_balance(&self, asset: &str) -> Result<f64> {
        // Nothing is ever locked in open orders.
        self.free_balance(asset).await
    }
}
