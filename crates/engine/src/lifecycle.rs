use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use common::{
    ExchangeGateway, Fill, MarketSnapshot, NewTrade, Notifier, Pair, Result, StrategyOutput,
    Trade, TradeExit, TradeStatus, TradeStore, TradingMode,
};

/// Timeframe of the candle used to manage open trades.
pub const MANAGE_TIMEFRAME: &str = "1m";

/// Everything needed to open a position once the risk gate has accepted it.
#[derive(Debug, Clone)]
pub struct EntryRequest {
    pub pair: Pair,
    pub timeframe: String,
    pub output: StrategyOutput,
    /// Gross base quantity to buy, already rounded to the market step.
    pub quantity: f64,
    pub strategy_name: String,
    pub snapshot: Option<MarketSnapshot>,
}

/// Sole writer of trade status transitions and modified thresholds.
///
/// Paper trades are booked without touching the gateway's order endpoints;
/// live trades take their numbers from the exchange fills.
pub struct PositionController {
    gateway: Arc<dyn ExchangeGateway>,
    store: Arc<dyn TradeStore>,
    notifier: Arc<dyn Notifier>,
    mode: TradingMode,
    /// Fraction of the take-profit distance kept by a reduction.
    take_profit_reduction: f64,
}

impl PositionController {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        store: Arc<dyn TradeStore>,
        notifier: Arc<dyn Notifier>,
        mode: TradingMode,
        take_profit_reduction: f64,
    ) -> Self {
        Self {
            gateway,
            store,
            notifier,
            mode,
            take_profit_reduction,
        }
    }

    pub fn mode(&self) -> TradingMode {
        self.mode
    }

    // ─── Open ────────────────────────────────────────────────────────────────

    /// Open a position unless one is already open for the pair.
    ///
    /// Returns the new trade id, or `None` when nothing was opened: a trade
    /// already exists, a live order is below the market minimum, or the buy
    /// failed (the failure is logged and notified).
    pub async fn open(&self, request: EntryRequest) -> Result<Option<i64>> {
        let pair = &request.pair;
        if !self.store.list_open(Some(pair)).await?.is_empty() {
            debug!(pair = %pair, "Position already open, not entering");
            return Ok(None);
        }

        let booked = match self.mode {
            TradingMode::Paper => {
                let fee = self.gateway.taker_fee(pair).await?;
                Some(simulated_entry(&request, fee))
            }
            TradingMode::Live => self.live_entry(&request).await?,
        };
        let Some(booked) = booked else {
            return Ok(None);
        };

        let snapshot = request.snapshot.as_ref();
        let trade = NewTrade {
            pair: pair.clone(),
            timeframe: request.timeframe.clone(),
            stop_loss: request.output.stop_loss,
            entry_price: booked.entry_price,
            take_profit: request.output.take_profit,
            counter_entry: booked.counter_entry,
            quantity_entry: booked.quantity_held,
            entry_fee: booked.entry_fee,
            position: request.output.position_type,
            entry_time: Utc::now(),
            entry_order_id: booked.order_id,
            change_1h_on_entry: snapshot.and_then(|s| s.price_change_1h),
            change_24h_on_entry: snapshot.and_then(|s| s.price_change_24h),
            change_7d_on_entry: snapshot.and_then(|s| s.price_change_7d),
            strategy_name: request.strategy_name.clone(),
            mode: self.mode,
        };
        let id = self.store.create(&trade).await?;

        info!(
            id,
            pair = %pair,
            mode = %self.mode,
            entry = trade.entry_price,
            stop_loss = trade.stop_loss,
            take_profit = trade.take_profit,
            quantity = trade.quantity_entry,
            "Position opened"
        );
        self.notifier
            .notify(&format!(
                "Entered {} position {} at {:.8} | SL {:.8} | TP {:.8} | {:.2} {}",
                self.mode,
                pair,
                trade.entry_price,
                trade.stop_loss,
                trade.take_profit,
                trade.counter_entry,
                pair.counter
            ))
            .await;
        Ok(Some(id))
    }

    async fn live_entry(&self, request: &EntryRequest) -> Result<Option<BookedEntry>> {
        let pair = &request.pair;
        let limits = self.gateway.market_limits(pair).await?;
        if let Some(reason) = limits.breach(request.quantity, request.output.entry_price) {
            info!(
                pair = %pair,
                quantity = request.quantity,
                value = request.quantity * request.output.entry_price,
                ?limits,
                reason,
                "Order outside market limits, skipping entry"
            );
            return Ok(None);
        }

        match self.gateway.market_buy(pair, request.quantity).await {
            Ok(fill) => Ok(Some(BookedEntry::from_fill(&fill))),
            Err(e) => {
                error!(pair = %pair, quantity = request.quantity, error = %e, "Market buy failed");
                self.notifier
                    .notify(&format!("Could not buy {} {}: {e}", request.quantity, pair))
                    .await;
                Ok(None)
            }
        }
    }

    // ─── Threshold adjustments ───────────────────────────────────────────────

    /// Move the stop to the entry price once the price has covered half the
    /// way to the original take-profit. Reapplying is harmless.
    pub async fn apply_break_even(&self, trade: &mut Trade, current_price: f64) -> Result<bool> {
        let entry = trade.entry.entry_price;
        let midpoint = entry + (trade.entry.take_profit - entry) / 2.0;
        if current_price < midpoint {
            return Ok(false);
        }
        self.store.update_thresholds(trade.id, Some(entry), None).await?;
        trade.modified_stop_loss = Some(entry);
        debug!(id = trade.id, pair = %trade.pair(), stop_loss = entry, "Stop moved to break-even");
        Ok(true)
    }

    /// Pull the take-profit towards the entry once the price has fallen half
    /// the way to the original stop-loss.
    pub async fn apply_take_profit_reduction(
        &self,
        trade: &mut Trade,
        current_price: f64,
    ) -> Result<bool> {
        let entry = trade.entry.entry_price;
        let midpoint = entry - (entry - trade.entry.stop_loss) / 2.0;
        if current_price > midpoint {
            return Ok(false);
        }
        let take_profit = entry + self.take_profit_reduction * (trade.entry.take_profit - entry);
        self.store
            .update_thresholds(trade.id, None, Some(take_profit))
            .await?;
        trade.modified_take_profit = Some(take_profit);
        debug!(id = trade.id, pair = %trade.pair(), take_profit, "Take-profit reduced");
        Ok(true)
    }

    // ─── Close ───────────────────────────────────────────────────────────────

    /// Close the trade if the bar touched a threshold.
    ///
    /// Take-profit is checked before stop-loss; OHLC bars do not say which
    /// was reached first. A failed live sell leaves the trade open for the
    /// next scan.
    pub async fn try_close(&self, trade: &Trade, high: f64, low: f64) -> Result<Option<TradeStatus>> {
        let take_profit = trade.effective_take_profit();
        let stop_loss = trade.effective_stop_loss();
        let threshold = if high >= take_profit {
            take_profit
        } else if low <= stop_loss {
            stop_loss
        } else {
            return Ok(None);
        };

        let pair = trade.pair();
        let booked = if trade.entry.mode.is_real() {
            match self
                .gateway
                .market_sell_reducing(pair, trade.entry.quantity_entry)
                .await
            {
                Ok(fill) => BookedExit::from_fill(&fill),
                Err(e) => {
                    error!(id = trade.id, pair = %pair, error = %e, "Market sell failed, trade stays open");
                    self.notifier
                        .notify(&format!("Could not close {} (trade {}): {e}", pair, trade.id))
                        .await;
                    return Ok(None);
                }
            }
        } else {
            let fee = self.gateway.taker_fee(pair).await?;
            BookedExit::simulated(trade.entry.quantity_entry, threshold, fee)
        };

        let result_no_fees = booked.proceeds - trade.entry.counter_entry + trade.entry.entry_fee;
        let net = result_no_fees - trade.entry.entry_fee - booked.exit_fee;
        let status = if net > 0.0 { TradeStatus::Won } else { TradeStatus::Lost };

        let exit = TradeExit {
            result_no_fees,
            quantity_exit: booked.quantity,
            exit_fee: booked.exit_fee,
            exit_price: booked.exit_price,
            exit_time: Utc::now(),
            status,
        };
        self.store.close(trade.id, &exit).await?;

        info!(
            id = trade.id,
            pair = %pair,
            status = %status,
            exit = exit.exit_price,
            net,
            "Position closed"
        );
        self.notifier
            .notify(&format!(
                "Closed {} position {} ({status}) at {:.8} | net {net:.2} {}",
                trade.entry.mode, pair, exit.exit_price, pair.counter
            ))
            .await;
        Ok(Some(status))
    }

    // ─── Sweep ───────────────────────────────────────────────────────────────

    /// Break-even and take-profit reduction against the current price, then
    /// the close check against the latest 1-minute candle, for every open
    /// trade, optionally restricted to one pair. Returns how many trades
    /// were closed.
    pub async fn manage_open_trades(&self, pair: Option<&Pair>) -> Result<usize> {
        let mut closed = 0;
        for mut trade in self.store.list_open(pair).await? {
            let candles = match self
                .gateway
                .recent_candles(trade.pair(), MANAGE_TIMEFRAME, 1, true)
                .await
            {
                Ok(candles) => candles,
                Err(e) if e.is_transient() => {
                    warn!(id = trade.id, pair = %trade.pair(), error = %e, "No market data, trade skipped this cycle");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let Some(bar) = candles.last().copied() else {
                warn!(id = trade.id, pair = %trade.pair(), "Empty candle response, trade skipped this cycle");
                continue;
            };

            let price = match self.gateway.current_price(trade.pair()).await {
                Ok(price) => price,
                Err(e) if e.is_transient() => {
                    warn!(id = trade.id, pair = %trade.pair(), error = %e, "No current price, trade skipped this cycle");
                    continue;
                }
                Err(e) => return Err(e),
            };

            self.apply_break_even(&mut trade, price).await?;
            self.apply_take_profit_reduction(&mut trade, price).await?;
            match self.try_close(&trade, bar.high, bar.low).await {
                Ok(Some(_)) => closed += 1,
                Ok(None) => {}
                Err(e) if e.is_transient() => {
                    warn!(id = trade.id, pair = %trade.pair(), error = %e, "Close check skipped this cycle");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(closed)
    }
}

/// Entry numbers as they will be stored.
struct BookedEntry {
    entry_price: f64,
    counter_entry: f64,
    quantity_held: f64,
    entry_fee: f64,
    order_id: String,
}

impl BookedEntry {
    /// Buy fees are charged in the bought asset.
    fn from_fill(fill: &Fill) -> Self {
        Self {
            entry_price: fill.fill_price,
            counter_entry: fill.cost,
            quantity_held: fill.quantity - fill.fee / fill.fill_price,
            entry_fee: fill.fee,
            order_id: fill.order_id.clone(),
        }
    }
}

fn simulated_entry(request: &EntryRequest, fee: f64) -> BookedEntry {
    let price = request.output.entry_price;
    BookedEntry {
        entry_price: price,
        counter_entry: request.quantity * price,
        quantity_held: request.quantity * (1.0 - fee),
        entry_fee: request.quantity * fee * price,
        order_id: format!("simulated-{}", uuid::Uuid::new_v4()),
    }
}

/// Exit numbers; `proceeds` is before the exit fee.
struct BookedExit {
    exit_price: f64,
    quantity: f64,
    proceeds: f64,
    exit_fee: f64,
}

impl BookedExit {
    fn from_fill(fill: &Fill) -> Self {
        Self {
            exit_price: fill.fill_price,
            quantity: fill.quantity,
            proceeds: fill.cost,
            exit_fee: fill.fee,
        }
    }

    fn simulated(quantity: f64, exit_price: f64, fee: f64) -> Self {
        let proceeds = quantity * exit_price;
        Self {
            exit_price,
            quantity,
            proceeds,
            exit_fee: proceeds * fee,
        }
    }
}
