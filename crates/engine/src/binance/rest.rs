use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use common::{
    Candle, CandleSeries, Error, ExchangeGateway, Fill, MarketLimits, OrderSide, Pair, Result,
};

const BASE_URL: &str = "https://api.binance.com";

/// Binance rejects orders the account cannot cover with this code.
const INSUFFICIENT_BALANCE: &str = "-2010";

/// Sell attempts, each one step smaller, before giving up.
const SELL_ATTEMPTS: usize = 5;

/// Most klines one request returns.
const MAX_KLINES: usize = 1000;

/// REST client for the Binance spot API: market data, fees, market orders
/// and account balances.
pub struct BinanceClient {
    api_key: String,
    secret: String,
    http: Client,
    fees: RwLock<HashMap<Pair, f64>>,
    limits: RwLock<HashMap<Pair, MarketLimits>>,
}

impl BinanceClient {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            secret: secret.into(),
            http,
            fees: RwLock::new(HashMap::new()),
            limits: RwLock::new(HashMap::new()),
        })
    }

    fn sign(&self, query: &str) -> Result<String> {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| Error::Config(format!("unusable Binance secret: {e}")))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn signed_query(&self, params: &str) -> Result<String> {
        let ts = Utc::now().timestamp_millis();
        let query = if params.is_empty() {
            format!("timestamp={ts}")
        } else {
            format!("{params}&timestamp={ts}")
        };
        let signature = self.sign(&query)?;
        Ok(format!("{query}&signature={signature}"))
    }

    async fn public_get(&self, path: &str, params: &str) -> Result<String> {
        let url = format!("{BASE_URL}{path}?{params}");
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        Self::body(resp).await
    }

    async fn signed_get(&self, path: &str, params: &str) -> Result<String> {
        let url = format!("{BASE_URL}{path}?{}", self.signed_query(params)?);
        let resp = self
            .http
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        Self::body(resp).await
    }

    async fn signed_post(&self, path: &str, params: &str) -> Result<String> {
        let body = self.signed_query(params)?;
        let url = format!("{BASE_URL}{path}");
        let resp = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        Self::body(resp).await
    }

    async fn body(resp: reqwest::Response) -> Result<String> {
        let status = resp.status();
        let text = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {text}")));
        }
        Ok(text)
    }

    async fn market_order(&self, pair: &Pair, side: OrderSide, quantity: f64) -> Result<Fill> {
        let params = format!(
            "symbol={pair}&side={side}&type=MARKET&quantity={}&newOrderRespType=FULL",
            format_quantity(quantity)
        );
        debug!(pair = %pair, side = %side, quantity, "Submitting market order to Binance");
        let body = self.signed_post("/api/v3/order", &params).await?;
        let resp: OrderResponse = decode(&body)?;
        self.fill_from_response(pair, side, resp).await
    }

    /// Commissions are reported per fill in whatever asset was charged;
    /// the returned fee is in the counter currency.
    async fn fill_from_response(
        &self,
        pair: &Pair,
        side: OrderSide,
        resp: OrderResponse,
    ) -> Result<Fill> {
        let quantity = parse_num(&resp.executed_qty)?;
        let cost = parse_num(&resp.cummulative_quote_qty)?;
        if quantity <= 0.0 {
            return Err(Error::Exchange(format!(
                "order {} on {pair} executed nothing",
                resp.order_id
            )));
        }
        let fill_price = cost / quantity;

        let mut fee = 0.0;
        for part in &resp.fills {
            let commission = parse_num(&part.commission)?;
            let asset = part.commission_asset.to_uppercase();
            fee += if asset == pair.counter {
                commission
            } else if asset == pair.base {
                commission * parse_num(&part.price)?
            } else {
                let fee_pair = Pair::new(&asset, &pair.counter);
                match self.current_price(&fee_pair).await {
                    Ok(price) => commission * price,
                    Err(e) => {
                        warn!(asset = %asset, error = %e, "Could not price commission asset, fee recorded as 0");
                        0.0
                    }
                }
            };
        }

        Ok(Fill {
            order_id: resp.order_id.to_string(),
            pair: pair.clone(),
            side,
            fill_price,
            quantity,
            fee,
            cost,
            timestamp: Utc::now(),
        })
    }

    async fn account(&self) -> Result<AccountResponse> {
        let body = self.signed_get("/api/v3/account", "").await?;
        decode(&body)
    }

    async fn balance(&self, asset: &str, with_locked: bool) -> Result<f64> {
        let account = self.account().await?;
        let Some(balance) = account
            .balances
            .iter()
            .find(|b| b.asset.eq_ignore_ascii_case(asset))
        else {
            return Ok(0.0);
        };
        let free = parse_num(&balance.free)?;
        Ok(if with_locked {
            free + parse_num(&balance.locked)?
        } else {
            free
        })
    }
}

#[async_trait]
impl ExchangeGateway for BinanceClient {
    async fn recent_candles(
        &self,
        pair: &Pair,
        timeframe: &str,
        count: usize,
        include_unclosed: bool,
    ) -> Result<CandleSeries> {
        // The newest kline is always the one still forming.
        let limit = if include_unclosed { count } else { count + 1 };
        let params = format!(
            "symbol={pair}&interval={timeframe}&limit={}",
            limit.clamp(1, MAX_KLINES)
        );
        let body = self.public_get("/api/v3/klines", &params).await?;
        let series = parse_klines(&body)?;
        Ok(if include_unclosed { series } else { series.closed() })
    }

    async fn current_price(&self, pair: &Pair) -> Result<f64> {
        let body = self
            .public_get("/api/v3/ticker/price", &format!("symbol={pair}"))
            .await?;
        let ticker: PriceTicker = decode(&body)?;
        parse_num(&ticker.price)
    }

    async fn taker_fee(&self, pair: &Pair) -> Result<f64> {
        if let Some(fee) = self.fees.read().await.get(pair).copied() {
            return Ok(fee);
        }
        let body = self
            .signed_get("/sapi/v1/asset/tradeFee", &format!("symbol={pair}"))
            .await?;
        let fees: Vec<TradeFee> = decode(&body)?;
        let fee = fees
            .first()
            .ok_or_else(|| Error::Exchange(format!("no trade fee returned for {pair}")))
            .and_then(|f| parse_num(&f.taker_commission))?;
        self.fees.write().await.insert(pair.clone(), fee);
        Ok(fee)
    }

    async fn market_buy(&self, pair: &Pair, quantity: f64) -> Result<Fill> {
        self.market_order(pair, OrderSide::Buy, quantity).await
    }

    async fn market_sell_reducing(&self, pair: &Pair, quantity: f64) -> Result<Fill> {
        let limits = self.market_limits(pair).await?;
        let mut quantity = limits.quantity_to_precision(quantity);
        let mut attempt = 1;
        loop {
            match self.market_order(pair, OrderSide::Sell, quantity).await {
                Err(Error::Exchange(msg))
                    if msg.contains(INSUFFICIENT_BALANCE) && attempt < SELL_ATTEMPTS =>
                {
                    let reduced = limits.quantity_to_precision(quantity - limits.step_size);
                    warn!(pair = %pair, attempt, from = quantity, to = reduced, "Insufficient balance, retrying sell with less");
                    if reduced <= 0.0 {
                        return Err(Error::Exchange(msg));
                    }
                    quantity = reduced;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn market_limits(&self, pair: &Pair) -> Result<MarketLimits> {
        if let Some(limits) = self.limits.read().await.get(pair).copied() {
            return Ok(limits);
        }
        let body = self
            .public_get("/api/v3/exchangeInfo", &format!("symbol={pair}"))
            .await?;
        let limits = parse_limits(&body)?;
        self.limits.write().await.insert(pair.clone(), limits);
        Ok(limits)
    }

    async fn free_balance(&self, asset: &str) -> Result<f64> {
        self.balance(asset, false).await
    }

    async fn total_balance(&self, asset: &str) -> Result<f64> {
        self.balance(asset, true).await
    }
}

// ─── Parsing ──────────────────────────────────────────────────────────────────

/// Malformed responses count as exchange trouble, like HTTP failures.
fn decode<T: serde::de::DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| Error::Exchange(format!("unexpected Binance response: {e}")))
}

fn parse_num(raw: &str) -> Result<f64> {
    raw.parse::<f64>()
        .map_err(|e| Error::Exchange(format!("bad number '{raw}' from Binance: {e}")))
}

/// Up to eight decimals without trailing zeros, as Binance expects.
fn format_quantity(quantity: f64) -> String {
    let text = format!("{quantity:.8}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Klines arrive as arrays mixing numbers and decimal strings:
/// `[openTime, open, high, low, close, volume, closeTime, ...]`.
fn parse_klines(body: &str) -> Result<CandleSeries> {
    let rows: Vec<Vec<serde_json::Value>> = decode(body)?;
    let candles = rows
        .iter()
        .map(|row| -> Result<Candle> {
            let open_ms = row
                .first()
                .and_then(serde_json::Value::as_i64)
                .ok_or_else(|| Error::Exchange("kline without open time".into()))?;
            let open_time = DateTime::from_timestamp_millis(open_ms)
                .ok_or_else(|| Error::Exchange(format!("kline open time {open_ms} out of range")))?;
            Ok(Candle {
                open_time,
                open: kline_field(row, 1)?,
                high: kline_field(row, 2)?,
                low: kline_field(row, 3)?,
                close: kline_field(row, 4)?,
                volume: kline_field(row, 5)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    CandleSeries::new(candles)
}

fn kline_field(row: &[serde_json::Value], i: usize) -> Result<f64> {
    match row.get(i) {
        Some(serde_json::Value::String(s)) => parse_num(s),
        Some(serde_json::Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| Error::Exchange(format!("kline field {i} out of range"))),
        _ => Err(Error::Exchange(format!("kline field {i} missing"))),
    }
}

fn parse_limits(body: &str) -> Result<MarketLimits> {
    let info: ExchangeInfo = decode(body)?;
    let symbol = info
        .symbols
        .into_iter()
        .next()
        .ok_or_else(|| Error::Exchange("exchangeInfo returned no symbol".into()))?;

    let mut limits = MarketLimits {
        min_order_value: 0.0,
        max_order_value: f64::MAX,
        min_qty: 0.0,
        max_qty: f64::MAX,
        step_size: 0.0,
    };
    for filter in &symbol.filters {
        match filter.filter_type.as_str() {
            "LOT_SIZE" => {
                if let Some(v) = &filter.min_qty {
                    limits.min_qty = parse_num(v)?;
                }
                if let Some(v) = &filter.max_qty {
                    limits.max_qty = parse_num(v)?;
                }
                if let Some(v) = &filter.step_size {
                    limits.step_size = parse_num(v)?;
                }
            }
            "NOTIONAL" | "MIN_NOTIONAL" => {
                if let Some(v) = &filter.min_notional {
                    limits.min_order_value = parse_num(v)?;
                }
                if let Some(v) = &filter.max_notional {
                    limits.max_order_value = parse_num(v)?;
                }
            }
            _ => {}
        }
    }
    Ok(limits)
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: i64,
    executed_qty: String,
    cummulative_quote_qty: String,
    #[serde(default)]
    fills: Vec<FillDetail>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FillDetail {
    price: String,
    commission: String,
    commission_asset: String,
}

#[derive(Deserialize)]
struct AccountResponse {
    balances: Vec<Balance>,
}

#[derive(Deserialize)]
struct Balance {
    asset: String,
    free: String,
    locked: String,
}

#[derive(Deserialize)]
struct PriceTicker {
    price: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TradeFee {
    taker_commission: String,
}

#[derive(Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Deserialize)]
struct SymbolInfo {
    #[serde(default)]
    filters: Vec<SymbolFilter>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolFilter {
    filter_type: String,
    min_qty: Option<String>,
    max_qty: Option<String>,
    step_size: Option<String>,
    min_notional: Option<String>,
    max_notional: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn klines_parse_mixed_arrays() {
        let body = r#"[
            [1714000000000, "100.0", "101.5", "99.5", "101.0", "12.5", 1714000059999, "0", 10, "0", "0", "0"],
            [1714000060000, "101.0", "102.0", "100.5", "101.8", "3.25", 1714000119999, "0", 4, "0", "0", "0"]
        ]"#;
        let series = parse_klines(body).unwrap();
        assert_eq!(series.len(), 2);
        let last = series.last().unwrap();
        assert_eq!(last.open_time.timestamp_millis(), 1714000060000);
        assert_eq!((last.high, last.low, last.close, last.volume), (102.0, 100.5, 101.8, 3.25));
    }

    #[test]
    fn klines_with_garbage_are_rejected() {
        assert!(matches!(
            parse_klines(r#"[[1714000000000, "abc", "1", "1", "1", "1"]]"#),
            Err(Error::Exchange(_))
        ));
    }

    #[test]
    fn limits_read_lot_size_and_notional() {
        let body = r#"{"symbols":[{"symbol":"BTCEUR","filters":[
            {"filterType":"PRICE_FILTER","minPrice":"0.01","maxPrice":"1000000","tickSize":"0.01"},
            {"filterType":"LOT_SIZE","minQty":"0.00001","maxQty":"9000","stepSize":"0.00001"},
            {"filterType":"NOTIONAL","minNotional":"5.0","applyMinToMarket":true,"maxNotional":"9000000"}
        ]}]}"#;
        let limits = parse_limits(body).unwrap();
        assert_eq!(limits.min_qty, 0.00001);
        assert_eq!(limits.max_qty, 9000.0);
        assert_eq!(limits.step_size, 0.00001);
        assert_eq!(limits.min_order_value, 5.0);
        assert_eq!(limits.max_order_value, 9_000_000.0);
    }

    #[test]
    fn quantities_are_formatted_without_trailing_zeros() {
        assert_eq!(format_quantity(1.5), "1.5");
        assert_eq!(format_quantity(2.0), "2");
        assert_eq!(format_quantity(0.000123456789), "0.00012346");
    }

    #[tokio::test]
    async fn fill_fee_is_converted_to_counter() {
        let client = BinanceClient::new("key", "secret").unwrap();
        let resp: OrderResponse = serde_json::from_str(
            r#"{"orderId":42,"executedQty":"2.0","cummulativeQuoteQty":"200.0","fills":[
                {"price":"100.0","qty":"1.5","commission":"0.0015","commissionAsset":"BTC"},
                {"price":"100.0","qty":"0.5","commission":"0.05","commissionAsset":"EUR"}
            ]}"#,
        )
        .unwrap();
        let fill = client
            .fill_from_response(&Pair::new("BTC", "EUR"), OrderSide::Buy, resp)
            .await
            .unwrap();
        assert_eq!(fill.order_id, "42");
        assert_eq!(fill.fill_price, 100.0);
        assert!((fill.fee - 0.2).abs() < 1e-12);
        assert_eq!(fill.cost, 200.0);
    }

    #[test]
    fn signature_is_stable() {
        let client = BinanceClient::new("key", "secret").unwrap();
        let a = client.sign("symbol=BTCEUR&timestamp=1").unwrap();
        assert_eq!(a, client.sign("symbol=BTCEUR&timestamp=1").unwrap());
        assert_eq!(a.len(), 64);
    }
}
