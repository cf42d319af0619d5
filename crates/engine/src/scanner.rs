use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use common::{
    ExchangeGateway, MarketDirectory, MarketSnapshot, Pair, Result, TradeStore,
};
use risk::{assess, capital_cap, size_position, RiskConfig};
use strategy::{MarketView, Strategy};

use crate::config::BotFileConfig;
use crate::lifecycle::{EntryRequest, PositionController};

/// Wait between attempts to fetch the market list.
pub const MARKET_RETRY: Duration = Duration::from_secs(70);

/// What a single pair scan ended with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScanOutcome {
    /// A trade for the pair is already open.
    AlreadyOpen,
    NoSignal,
    /// The risk gate turned the entry down.
    Rejected,
    /// Accepted, but nothing was opened (zero size, order failure, minimum).
    NotOpened,
    Entered(i64),
}

/// How a scan cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleEnd {
    Completed,
    StopRequested,
}

#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub entry_timeframe: String,
    pub higher_timeframe: String,
    pub candles: usize,
    pub counter_currency: String,
    /// Pause after each pair step.
    pub pause: Duration,
    pub stop_file: Option<PathBuf>,
}

impl ScanSettings {
    pub fn from_config(cfg: &BotFileConfig) -> Self {
        Self {
            entry_timeframe: cfg.entry_timeframe.clone(),
            higher_timeframe: cfg.higher_timeframe.clone(),
            candles: cfg.candles,
            counter_currency: cfg.counter_currency.clone(),
            pause: Duration::from_secs(cfg.scan_pause_secs),
            stop_file: cfg.stop_file.as_ref().map(PathBuf::from),
        }
    }
}

/// Walks the market list: evaluates the strategy per pair, gates and sizes
/// entries, and keeps open trades managed between steps.
pub struct Scanner {
    gateway: Arc<dyn ExchangeGateway>,
    store: Arc<dyn TradeStore>,
    controller: PositionController,
    strategy: Box<dyn Strategy>,
    settings: ScanSettings,
    risk: RiskConfig,
    capital_cap: f64,
    snapshots: HashMap<String, MarketSnapshot>,
}

impl Scanner {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        store: Arc<dyn TradeStore>,
        controller: PositionController,
        strategy: Box<dyn Strategy>,
        settings: ScanSettings,
        risk: RiskConfig,
    ) -> Self {
        let capital_cap = risk.min_order_value;
        Self {
            gateway,
            store,
            controller,
            strategy,
            settings,
            risk,
            capital_cap,
            snapshots: HashMap::new(),
        }
    }

    pub fn controller(&self) -> &PositionController {
        &self.controller
    }

    pub fn capital_cap(&self) -> f64 {
        self.capital_cap
    }

    /// Recompute the per-trade ceiling from total counter-currency holdings.
    pub async fn refresh_cap(&mut self) -> Result<f64> {
        let total = self
            .gateway
            .total_balance(&self.settings.counter_currency)
            .await?;
        self.capital_cap = capital_cap(total, self.risk.cap_divisor, self.risk.min_order_value);
        info!(total, cap = self.capital_cap, "Capital cap refreshed");
        Ok(self.capital_cap)
    }

    /// Market statistics recorded with new entries, keyed by base symbol.
    pub fn set_snapshots(&mut self, snapshots: Vec<MarketSnapshot>) {
        self.snapshots = snapshots
            .into_iter()
            .map(|s| (s.symbol.to_uppercase(), s))
            .collect();
    }

    // ─── Scan ────────────────────────────────────────────────────────────────

    pub async fn scan_pair(&mut self, pair: &Pair) -> Result<ScanOutcome> {
        if self.controller.manage_open_trades(Some(pair)).await? > 0 {
            self.refresh_cap_or_keep().await;
        }
        if !self.store.list_open(Some(pair)).await?.is_empty() {
            return Ok(ScanOutcome::AlreadyOpen);
        }

        let s = &self.settings;
        let entry = self
            .gateway
            .recent_candles(pair, &s.entry_timeframe, s.candles, true)
            .await?;
        let higher = self
            .gateway
            .recent_candles(pair, &s.higher_timeframe, s.candles, true)
            .await?;
        let price = self.gateway.current_price(pair).await?;

        let output = self.strategy.evaluate(
            price,
            &MarketView {
                entry: &entry,
                higher: &higher,
            },
        )?;
        if !output.can_enter {
            return Ok(ScanOutcome::NoSignal);
        }
        debug!(
            pair = %pair,
            entry = output.entry_price,
            stop_loss = output.stop_loss,
            take_profit = output.take_profit,
            "Entry signal"
        );

        let available = self.gateway.free_balance(&pair.counter).await?;
        let capital = size_position(available, &output, self.capital_cap, self.risk.max_risk_pct);
        let limits = self.gateway.market_limits(pair).await?;
        let quantity = limits.quantity_to_precision(capital / output.entry_price);
        if quantity <= 0.0 {
            debug!(pair = %pair, capital, "Quantity rounds to zero, no entry");
            return Ok(ScanOutcome::NotOpened);
        }

        let fee = self.gateway.taker_fee(pair).await?;
        let assessment = assess(fee, &output, quantity, self.risk.take_profit_policy())?;
        if !assessment.accepted {
            info!(pair = %pair, ratio = assessment.ratio, "Entry rejected by profitability gate");
            return Ok(ScanOutcome::Rejected);
        }

        let request = EntryRequest {
            pair: pair.clone(),
            timeframe: self.settings.entry_timeframe.clone(),
            output: assessment.output,
            quantity,
            strategy_name: self.strategy.strategy_name().to_string(),
            snapshot: self.snapshots.get(&pair.base).cloned(),
        };
        Ok(match self.controller.open(request).await? {
            Some(id) => ScanOutcome::Entered(id),
            None => ScanOutcome::NotOpened,
        })
    }

    /// One pass over `pairs`. Exchange trouble on a pair is logged and the
    /// pair skipped; anything else ends the cycle with an error.
    pub async fn run_cycle(&mut self, pairs: &[Pair]) -> Result<CycleEnd> {
        for pair in pairs {
            match self.scan_pair(pair).await {
                Ok(outcome) => debug!(pair = %pair, ?outcome, "Pair scanned"),
                Err(e) if e.is_transient() => {
                    warn!(pair = %pair, error = %e, "Scan skipped this cycle")
                }
                Err(e) => return Err(e),
            }

            match self.controller.manage_open_trades(None).await {
                Ok(0) => {}
                Ok(_) => self.refresh_cap_or_keep().await,
                Err(e) if e.is_transient() => warn!(error = %e, "Trade management skipped"),
                Err(e) => return Err(e),
            }

            if self.stop_requested() {
                return Ok(CycleEnd::StopRequested);
            }
            tokio::time::sleep(self.settings.pause).await;
        }
        Ok(CycleEnd::Completed)
    }

    pub fn stop_requested(&self) -> bool {
        self.settings
            .stop_file
            .as_ref()
            .is_some_and(|path| path.exists())
    }

    async fn refresh_cap_or_keep(&mut self) {
        if let Err(e) = self.refresh_cap().await {
            warn!(error = %e, cap = self.capital_cap, "Could not refresh capital cap, keeping previous");
        }
    }
}

/// Markets to scan, from the directory, retrying every `retry` until it
/// returns a non-empty list. The result has no duplicates.
pub async fn resolve_markets(
    directory: &dyn MarketDirectory,
    exchange_id: &str,
    counter: &str,
    retry: Duration,
) -> Vec<Pair> {
    loop {
        match directory.list_tradable_pairs(exchange_id, counter).await {
            Ok(found) if !found.is_empty() => {
                let mut pairs: Vec<Pair> = Vec::with_capacity(found.len());
                for pair in found {
                    if !pairs.contains(&pair) {
                        pairs.push(pair);
                    }
                }
                info!(count = pairs.len(), exchange_id, counter, "Markets resolved");
                return pairs;
            }
            Ok(_) => warn!(exchange_id, counter, "Market directory returned no pairs, retrying"),
            Err(e) => warn!(error = %e, "Market directory unavailable, retrying"),
        }
        tokio::time::sleep(retry).await;
    }
}
