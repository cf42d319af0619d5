use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use common::{Error, MarketDirectory, MarketSnapshot, Pair, Result};

const BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Wait after the free tier answers 429.
const RATE_LIMIT_WAIT: Duration = Duration::from_secs(3);
const RATE_LIMIT_ATTEMPTS: usize = 5;

/// Ticker pages are fetched until an empty one; this bounds a misbehaving API.
const MAX_TICKER_PAGES: u32 = 100;

/// Market listings and statistics from the public CoinGecko API.
pub struct CoinGeckoDirectory {
    http: Client,
}

impl CoinGeckoDirectory {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }

    async fn get(&self, path_and_query: &str) -> Result<String> {
        let url = format!("{BASE_URL}{path_and_query}");
        for attempt in 1..=RATE_LIMIT_ATTEMPTS {
            let resp = self
                .http
                .get(&url)
                .header("Accept", "application/json")
                .send()
                .await
                .map_err(|e| Error::Http(e.to_string()))?;
            let status = resp.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                warn!(attempt, "CoinGecko rate limit hit, waiting");
                tokio::time::sleep(RATE_LIMIT_WAIT).await;
                continue;
            }
            let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
            if !status.is_success() {
                return Err(Error::Http(format!("CoinGecko HTTP {status}: {body}")));
            }
            return Ok(body);
        }
        Err(Error::Http("CoinGecko rate limit persisted".into()))
    }
}

#[async_trait]
impl MarketDirectory for CoinGeckoDirectory {
    async fn list_tradable_pairs(&self, exchange_id: &str, counter: &str) -> Result<Vec<Pair>> {
        let mut tickers = Vec::new();
        for page in 1..=MAX_TICKER_PAGES {
            let body = self
                .get(&format!("/exchanges/{exchange_id}/tickers?page={page}"))
                .await?;
            let resp: TickersPage = decode(&body)?;
            if resp.tickers.is_empty() {
                break;
            }
            debug!(page, count = resp.tickers.len(), "Ticker page fetched");
            tickers.extend(resp.tickers);
        }
        let pairs = pairs_quoted_in(&tickers, counter);
        info!(exchange_id, counter, count = pairs.len(), "Tradable pairs listed");
        Ok(pairs)
    }

    async fn top_market_snapshot(&self, counter: &str) -> Result<Vec<MarketSnapshot>> {
        let body = self
            .get(&format!(
                "/coins/markets?vs_currency={}&order=market_cap_desc&per_page=250&page=1&price_change_percentage=1h,24h,7d",
                counter.to_lowercase()
            ))
            .await?;
        let markets: Vec<CoinMarket> = decode(&body)?;
        Ok(markets.into_iter().map(CoinMarket::into_snapshot).collect())
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| Error::Http(format!("unexpected CoinGecko response: {e}")))
}

/// Pairs whose target is `counter`, upper-cased, first-seen order, no duplicates.
fn pairs_quoted_in(tickers: &[Ticker], counter: &str) -> Vec<Pair> {
    let mut pairs: Vec<Pair> = Vec::new();
    for ticker in tickers {
        if !ticker.target.eq_ignore_ascii_case(counter) {
            continue;
        }
        let pair = Pair::new(&ticker.base, &ticker.target);
        if !pairs.contains(&pair) {
            pairs.push(pair);
        }
    }
    pairs
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TickersPage {
    #[serde(default)]
    tickers: Vec<Ticker>,
}

#[derive(Deserialize)]
struct Ticker {
    base: String,
    target: String,
}

#[derive(Deserialize)]
struct CoinMarket {
    symbol: String,
    current_price: Option<f64>,
    market_cap: Option<f64>,
    market_cap_rank: Option<u32>,
    price_change_percentage_1h_in_currency: Option<f64>,
    price_change_percentage_24h_in_currency: Option<f64>,
    price_change_percentage_7d_in_currency: Option<f64>,
}

impl CoinMarket {
    fn into_snapshot(self) -> MarketSnapshot {
        MarketSnapshot {
            symbol: self.symbol.to_uppercase(),
            current_price: self.current_price,
            market_cap: self.market_cap,
            market_cap_rank: self.market_cap_rank,
            price_change_1h: self.price_change_percentage_1h_in_currency,
            price_change_24h: self.price_change_percentage_24h_in_currency,
            price_change_7d: self.price_change_percentage_7d_in_currency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tickers_are_filtered_by_counter_and_deduplicated() {
        let page: TickersPage = decode(
            r#"{"name":"Binance","tickers":[
                {"base":"BTC","target":"EUR","last":60000.0},
                {"base":"eth","target":"eur"},
                {"base":"BTC","target":"USDT"},
                {"base":"BTC","target":"EUR"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(
            pairs_quoted_in(&page.tickers, "EUR"),
            vec![Pair::new("BTC", "EUR"), Pair::new("ETH", "EUR")]
        );
    }

    #[test]
    fn market_rows_become_snapshots() {
        let markets: Vec<CoinMarket> = decode(
            r#"[{"id":"bitcoin","symbol":"btc","current_price":61000.5,"market_cap":1.2e12,
                 "market_cap_rank":1,"price_change_percentage_1h_in_currency":0.12,
                 "price_change_percentage_24h_in_currency":-1.5,
                 "price_change_percentage_7d_in_currency":null}]"#,
        )
        .unwrap();
        let snapshot = markets.into_iter().next().unwrap().into_snapshot();
        assert_eq!(snapshot.symbol, "BTC");
        assert_eq!(snapshot.market_cap_rank, Some(1));
        assert_eq!(snapshot.price_change_1h, Some(0.12));
        assert_eq!(snapshot.price_change_7d, None);
    }

    #[test]
    fn empty_page_has_no_tickers() {
        let page: TickersPage = decode(r#"{"name":"Binance","tickers":[]}"#).unwrap();
        assert!(page.tickers.is_empty());
    }
}
