use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn is_bullish_body(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish_body(&self) -> bool {
        self.close < self.open
    }

    /// Lower edge of the real body (wick excluded).
    pub fn body_low(&self) -> f64 {
        self.open.min(self.close)
    }

    /// Upper edge of the real body (wick excluded).
    pub fn body_high(&self) -> f64 {
        self.open.max(self.close)
    }
}

/// Time-ordered candles, strictly increasing by `open_time`.
///
/// The last candle may still be forming. Indicator code that must only see
/// finished intervals works on [`CandleSeries::closed`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(candles: Vec<Candle>) -> Result<Self> {
        if let Some(w) = candles.windows(2).find(|w| w[1].open_time <= w[0].open_time) {
            return Err(Error::InvalidArgument(format!(
                "candle open times must be strictly increasing ({} then {})",
                w[0].open_time, w[1].open_time
            )));
        }
        Ok(Self { candles })
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// Every candle except the last (possibly unfinished) one.
    pub fn closed(&self) -> CandleSeries {
        let end = self.candles.len().saturating_sub(1);
        CandleSeries {
            candles: self.candles[..end].to_vec(),
        }
    }

    pub fn opens(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.open).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.low).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.volume).collect()
    }

    pub fn body_lows(&self) -> Vec<f64> {
        self.candles.iter().map(Candle::body_low).collect()
    }

    pub fn body_highs(&self) -> Vec<f64> {
        self.candles.iter().map(Candle::body_high).collect()
    }
}

/// A tradable market: base asset priced in a counter-currency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pair {
    pub base: String,
    pub counter: String,
}

impl Pair {
    pub fn new(base: impl Into<String>, counter: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            counter: counter.into().to_uppercase(),
        }
    }
}

/// Exchange symbol form, e.g. `BTCEUR`.
impl std::fmt::Display for Pair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.base, self.counter)
    }
}

impl std::str::FromStr for Pair {
    type Err = Error;

    /// Parses `BASE/COUNTER`.
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((base, counter)) if !base.trim().is_empty() && !counter.trim().is_empty() => {
                Ok(Pair::new(base.trim(), counter.trim()))
            }
            _ => Err(Error::Config(format!(
                "market '{s}' must be written as BASE/COUNTER"
            ))),
        }
    }
}

/// Side of an exchange order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum PositionType {
    Long,
    Short,
}

impl std::fmt::Display for PositionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionType::Long => write!(f, "long"),
            PositionType::Short => write!(f, "short"),
        }
    }
}

/// Decision produced by a strategy.
///
/// When `can_enter` is false the prices are diagnostics only, but they are
/// always present.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyOutput {
    pub can_enter: bool,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub position_type: PositionType,
}

impl StrategyOutput {
    pub fn enter_long(entry_price: f64, stop_loss: f64, take_profit: f64) -> Self {
        Self {
            can_enter: true,
            entry_price,
            stop_loss,
            take_profit,
            position_type: PositionType::Long,
        }
    }

    /// The canonical no-entry decision.
    pub fn no_entry(current_price: f64) -> Self {
        Self {
            can_enter: false,
            entry_price: current_price,
            stop_loss: 0.0,
            take_profit: 0.0,
            position_type: PositionType::Long,
        }
    }
}

/// Whether trades are simulated or placed with real money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl TradingMode {
    pub fn is_real(&self) -> bool {
        matches!(self, TradingMode::Live)
    }
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}

/// Lifecycle status of a persisted trade.
///
/// `Partial` is reserved: it round-trips through the store but nothing
/// transitions into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum TradeStatus {
    Opened,
    Won,
    Lost,
    Partial,
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeStatus::Opened => write!(f, "opened"),
            TradeStatus::Won => write!(f, "won"),
            TradeStatus::Lost => write!(f, "lost"),
            TradeStatus::Partial => write!(f, "partial"),
        }
    }
}

/// Entry-time fields of a trade, as handed to the store on creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTrade {
    pub pair: Pair,
    pub timeframe: String,
    pub stop_loss: f64,
    pub entry_price: f64,
    pub take_profit: f64,
    /// Counter-currency spent, fee included.
    pub counter_entry: f64,
    /// Base quantity held after the entry fee.
    pub quantity_entry: f64,
    /// Entry fee valued in counter-currency.
    pub entry_fee: f64,
    pub position: PositionType,
    pub entry_time: DateTime<Utc>,
    pub entry_order_id: String,
    pub change_1h_on_entry: Option<f64>,
    pub change_24h_on_entry: Option<f64>,
    pub change_7d_on_entry: Option<f64>,
    pub strategy_name: String,
    pub mode: TradingMode,
}

/// Exit-time fields written atomically when a trade closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeExit {
    /// Result of the price move alone, before either fee.
    pub result_no_fees: f64,
    pub quantity_exit: f64,
    /// Exit fee valued in counter-currency.
    pub exit_fee: f64,
    pub exit_price: f64,
    pub exit_time: DateTime<Utc>,
    pub status: TradeStatus,
}

/// The persisted record of one position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: i64,
    pub status: TradeStatus,
    pub entry: NewTrade,
    pub modified_stop_loss: Option<f64>,
    pub modified_take_profit: Option<f64>,
    pub exit: Option<TradeExit>,
}

impl Trade {
    pub fn pair(&self) -> &Pair {
        &self.entry.pair
    }

    /// Stop-loss used for exit decisions; a post-entry override wins.
    pub fn effective_stop_loss(&self) -> f64 {
        self.modified_stop_loss.unwrap_or(self.entry.stop_loss)
    }

    /// Take-profit used for exit decisions; a post-entry override wins.
    pub fn effective_take_profit(&self) -> f64 {
        self.modified_take_profit.unwrap_or(self.entry.take_profit)
    }

    /// Realised result after both fees, once closed.
    pub fn net_result(&self) -> Option<f64> {
        self.exit
            .as_ref()
            .map(|x| x.result_no_fees - self.entry.entry_fee - x.exit_fee)
    }
}

/// Confirmation of a filled market order. Fees are valued in counter-currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub pair: Pair,
    pub side: OrderSide,
    pub fill_price: f64,
    pub quantity: f64,
    pub fee: f64,
    /// Gross counter-currency value of the fill.
    pub cost: f64,
    pub timestamp: DateTime<Utc>,
}

/// Order size limits published by the exchange for one market.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketLimits {
    pub min_order_value: f64,
    pub max_order_value: f64,
    pub min_qty: f64,
    pub max_qty: f64,
    /// Quantity increment; 0 means unrestricted.
    pub step_size: f64,
}

impl MarketLimits {
    /// Round a quantity down to the market's step size.
    pub fn quantity_to_precision(&self, quantity: f64) -> f64 {
        if self.step_size <= 0.0 {
            return quantity;
        }
        // The epsilon absorbs representation error like 0.3 / 0.1 = 2.9999...
        let steps = (quantity / self.step_size + 1e-9).floor();
        steps * self.step_size
    }

    /// The first limit an order of `quantity` at `price` breaks, if any.
    pub fn breach(&self, quantity: f64, price: f64) -> Option<&'static str> {
        let value = quantity * price;
        if quantity < self.min_qty {
            Some("quantity below market minimum")
        } else if quantity > self.max_qty {
            Some("quantity above market maximum")
        } else if value < self.min_order_value {
            Some("order value below market minimum")
        } else if value > self.max_order_value {
            Some("order value above market maximum")
        } else {
            None
        }
    }
}

/// Market statistics used for candidate selection and entry snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub current_price: Option<f64>,
    pub market_cap: Option<f64>,
    pub market_cap_rank: Option<u32>,
    pub price_change_1h: Option<f64>,
    pub price_change_24h: Option<f64>,
    pub price_change_7d: Option<f64>,
}

/// One line of a performance summary: closed trades grouped by status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub status: TradeStatus,
    pub count: i64,
    pub net_result: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candle(minute: u32, open: f64, close: f64) -> Candle {
        Candle {
            open_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap(),
            open,
            high: open.max(close) + 1.0,
            low: open.min(close) - 1.0,
            close,
            volume: 10.0,
        }
    }

    #[test]
    fn body_edges_ignore_wicks() {
        let c = candle(0, 10.0, 8.0);
        assert_eq!(c.body_low(), 8.0);
        assert_eq!(c.body_high(), 10.0);
        assert!(c.is_bearish_body());
        assert!(!c.is_bullish_body());
    }

    #[test]
    fn series_rejects_unordered_candles() {
        let err = CandleSeries::new(vec![candle(1, 1.0, 2.0), candle(1, 2.0, 3.0)]);
        assert!(matches!(err, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn closed_drops_forming_candle() {
        let series =
            CandleSeries::new(vec![candle(0, 1.0, 2.0), candle(1, 2.0, 3.0), candle(2, 3.0, 4.0)])
                .unwrap();
        let closed = series.closed();
        assert_eq!(closed.len(), 2);
        assert_eq!(closed.closes(), vec![2.0, 3.0]);
        assert!(CandleSeries::default().closed().is_empty());
    }

    #[test]
    fn pair_parses_and_displays() {
        let pair: Pair = "btc/eur".parse().unwrap();
        assert_eq!(pair, Pair::new("BTC", "EUR"));
        assert_eq!(pair.to_string(), "BTCEUR");
        assert!("BTCEUR".parse::<Pair>().is_err());
    }

    #[test]
    fn quantity_rounds_down_to_step() {
        let limits = MarketLimits {
            min_order_value: 10.0,
            max_order_value: 1e9,
            min_qty: 0.001,
            max_qty: 1e6,
            step_size: 0.001,
        };
        assert!((limits.quantity_to_precision(1.23456) - 1.234).abs() < 1e-12);
        assert!((limits.quantity_to_precision(0.3) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn every_order_limit_is_checked() {
        let limits = MarketLimits {
            min_order_value: 10.0,
            max_order_value: 1_000.0,
            min_qty: 0.01,
            max_qty: 5.0,
            step_size: 0.01,
        };
        assert_eq!(limits.breach(1.0, 100.0), None);
        assert_eq!(limits.breach(0.005, 10_000.0), Some("quantity below market minimum"));
        assert_eq!(limits.breach(6.0, 1.0), Some("quantity above market maximum"));
        assert_eq!(limits.breach(0.05, 100.0), Some("order value below market minimum"));
        assert_eq!(limits.breach(4.0, 300.0), Some("order value above market maximum"));
    }

    #[test]
    fn modified_thresholds_take_precedence() {
        let entry = NewTrade {
            pair: Pair::new("BTC", "EUR"),
            timeframe: "5m".into(),
            stop_loss: 90.0,
            entry_price: 100.0,
            take_profit: 120.0,
            counter_entry: 100.0,
            quantity_entry: 1.0,
            entry_fee: 0.0,
            position: PositionType::Long,
            entry_time: Utc::now(),
            entry_order_id: "sim".into(),
            change_1h_on_entry: None,
            change_24h_on_entry: None,
            change_7d_on_entry: None,
            strategy_name: "test".into(),
            mode: TradingMode::Paper,
        };
        let mut trade = Trade {
            id: 1,
            status: TradeStatus::Opened,
            entry,
            modified_stop_loss: None,
            modified_take_profit: None,
            exit: None,
        };
        assert_eq!(trade.effective_stop_loss(), 90.0);
        trade.modified_stop_loss = Some(100.0);
        trade.modified_take_profit = Some(102.0);
        assert_eq!(trade.effective_stop_loss(), 100.0);
        assert_eq!(trade.effective_take_profit(), 102.0);
        assert_eq!(trade.net_result(), None);
    }
}
