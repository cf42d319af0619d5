use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};

use common::{
    Error, NewTrade, Pair, Result, ResultSummary, Trade, TradeExit, TradeStatus, TradeStore,
    TradingMode,
};

/// SQLite-backed trade store. Each call is a single statement, so every
/// write commits on its own.
#[derive(Clone)]
pub struct SqliteTradeStore {
    pool: SqlitePool,
}

impl SqliteTradeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        info!(url, "Database connected");
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Other(format!("bad timestamp '{raw}' in trades table: {e}")))
}

fn trade_from_row(row: &SqliteRow) -> Result<Trade> {
    let entry = NewTrade {
        pair: Pair::new(
            row.try_get::<String, _>("symbol")?,
            row.try_get::<String, _>("counter_symbol")?,
        ),
        timeframe: row.try_get("timeframe")?,
        stop_loss: row.try_get("stop_loss")?,
        entry_price: row.try_get("entry_price")?,
        take_profit: row.try_get("take_profit")?,
        counter_entry: row.try_get("counter_entry")?,
        quantity_entry: row.try_get("quantity_entry")?,
        entry_fee: row.try_get("entry_fee")?,
        position: row.try_get("position")?,
        entry_time: parse_timestamp(&row.try_get::<String, _>("entry_time")?)?,
        entry_order_id: row.try_get("entry_order_id")?,
        change_1h_on_entry: row.try_get("change_1h_on_entry")?,
        change_24h_on_entry: row.try_get("change_24h_on_entry")?,
        change_7d_on_entry: row.try_get("change_7d_on_entry")?,
        strategy_name: row.try_get("strategy_name")?,
        mode: row.try_get("mode")?,
    };

    let status: TradeStatus = row.try_get("status")?;
    let exit = match row.try_get::<Option<String>, _>("exit_time")? {
        Some(exit_time) if status != TradeStatus::Opened => Some(TradeExit {
            result_no_fees: row.try_get("result_no_fees")?,
            quantity_exit: row.try_get("quantity_exit")?,
            exit_fee: row.try_get("exit_fee")?,
            exit_price: row.try_get("exit_price")?,
            exit_time: parse_timestamp(&exit_time)?,
            status,
        }),
        _ => None,
    };

    Ok(Trade {
        id: row.try_get("id")?,
        status,
        entry,
        modified_stop_loss: row.try_get("modified_stop_loss")?,
        modified_take_profit: row.try_get("modified_take_profit")?,
        exit,
    })
}

#[async_trait]
impl TradeStore for SqliteTradeStore {
    async fn create(&self, trade: &NewTrade) -> Result<i64> {
        let id = sqlx::query(
            r#"
            INSERT INTO trades (
                symbol, counter_symbol, timeframe, stop_loss, entry_price, take_profit,
                counter_entry, quantity_entry, entry_fee, position, entry_time, entry_order_id,
                change_1h_on_entry, change_24h_on_entry, change_7d_on_entry, strategy_name,
                mode, status
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, 'opened')
            "#,
        )
        .bind(&trade.pair.base)
        .bind(&trade.pair.counter)
        .bind(&trade.timeframe)
        .bind(trade.stop_loss)
        .bind(trade.entry_price)
        .bind(trade.take_profit)
        .bind(trade.counter_entry)
        .bind(trade.quantity_entry)
        .bind(trade.entry_fee)
        .bind(trade.position)
        .bind(timestamp(&trade.entry_time))
        .bind(&trade.entry_order_id)
        .bind(trade.change_1h_on_entry)
        .bind(trade.change_24h_on_entry)
        .bind(trade.change_7d_on_entry)
        .bind(&trade.strategy_name)
        .bind(trade.mode)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        debug!(id, pair = %trade.pair, "Trade stored");
        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<Trade> {
        let row = sqlx::query("SELECT * FROM trades WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Error::TradeNotFound(id))?;
        trade_from_row(&row)
    }

    async fn list_open(&self, pair: Option<&Pair>) -> Result<Vec<Trade>> {
        let rows = match pair {
            Some(pair) => {
                sqlx::query(
                    "SELECT * FROM trades WHERE status = 'opened' \
                     AND symbol = ?1 AND counter_symbol = ?2 ORDER BY id",
                )
                .bind(&pair.base)
                .bind(&pair.counter)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM trades WHERE status = 'opened' ORDER BY id")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(trade_from_row).collect()
    }

    async fn update_thresholds(
        &self,
        id: i64,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE trades
            SET modified_stop_loss   = COALESCE(?1, modified_stop_loss),
                modified_take_profit = COALESCE(?2, modified_take_profit)
            WHERE id = ?3
            "#,
        )
        .bind(stop_loss)
        .bind(take_profit)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(Error::TradeNotFound(id));
        }
        Ok(())
    }

    async fn close(&self, id: i64, exit: &TradeExit) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE trades
            SET result_no_fees = ?1,
                quantity_exit  = ?2,
                exit_fee       = ?3,
                exit_price     = ?4,
                exit_time      = ?5,
                status         = ?6
            WHERE id = ?7 AND status = 'opened'
            "#,
        )
        .bind(exit.result_no_fees)
        .bind(exit.quantity_exit)
        .bind(exit.exit_fee)
        .bind(exit.exit_price)
        .bind(timestamp(&exit.exit_time))
        .bind(exit.status)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(Error::TradeNotFound(id));
        }
        debug!(id, status = %exit.status, "Trade closed in store");
        Ok(())
    }

    async fn results_between(
        &self,
        mode: TradingMode,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ResultSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT status,
                   COUNT(*) AS count,
                   COALESCE(SUM(result_no_fees - entry_fee - exit_fee), 0.0) AS net_result
            FROM trades
            WHERE mode = ?1 AND status != 'opened' AND exit_time >= ?2 AND exit_time < ?3
            GROUP BY status
            ORDER BY status
            "#,
        )
        .bind(mode)
        .bind(timestamp(&from))
        .bind(timestamp(&to))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<ResultSummary> {
                Ok(ResultSummary {
                    status: row.try_get("status")?,
                    count: row.try_get("count")?,
                    net_result: row.try_get("net_result")?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use common::PositionType;
    use sqlx::sqlite::SqlitePoolOptions;

    pub(crate) async fn memory_store() -> SqliteTradeStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteTradeStore::new(pool);
        store.migrate().await.unwrap();
        store
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 9, 30, 0).unwrap()
    }

    pub(crate) fn new_trade(pair: Pair, mode: TradingMode) -> NewTrade {
        NewTrade {
            pair,
            timeframe: "5m".into(),
            stop_loss: 90.0,
            entry_price: 100.0,
            take_profit: 120.0,
            counter_entry: 100.0,
            quantity_entry: 0.999,
            entry_fee: 0.1,
            position: PositionType::Long,
            entry_time: t0(),
            entry_order_id: "simulated-1".into(),
            change_1h_on_entry: Some(0.5),
            change_24h_on_entry: None,
            change_7d_on_entry: Some(-3.0),
            strategy_name: "volume_trading_strategy".into(),
            mode,
        }
    }

    fn exit(status: TradeStatus, result_no_fees: f64, at: DateTime<Utc>) -> TradeExit {
        TradeExit {
            result_no_fees,
            quantity_exit: 0.999,
            exit_fee: 0.1,
            exit_price: 110.0,
            exit_time: at,
            status,
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips_entry_fields() {
        let store = memory_store().await;
        let trade = new_trade(Pair::new("btc", "eur"), TradingMode::Paper);
        let id = store.create(&trade).await.unwrap();

        let loaded = store.get(id).await.unwrap();
        assert_eq!(loaded.status, TradeStatus::Opened);
        assert_eq!(loaded.entry, trade);
        assert!(loaded.exit.is_none());
        assert_eq!(loaded.modified_stop_loss, None);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let store = memory_store().await;
        assert!(matches!(store.get(42).await, Err(Error::TradeNotFound(42))));
        assert!(matches!(
            store.update_thresholds(42, Some(1.0), None).await,
            Err(Error::TradeNotFound(42))
        ));
    }

    #[tokio::test]
    async fn list_open_filters_by_pair() {
        let store = memory_store().await;
        let btc = Pair::new("BTC", "EUR");
        let eth = Pair::new("ETH", "EUR");
        store.create(&new_trade(btc.clone(), TradingMode::Paper)).await.unwrap();
        store.create(&new_trade(eth.clone(), TradingMode::Paper)).await.unwrap();

        assert_eq!(store.list_open(None).await.unwrap().len(), 2);
        let only_eth = store.list_open(Some(&eth)).await.unwrap();
        assert_eq!(only_eth.len(), 1);
        assert_eq!(only_eth[0].pair(), &eth);
    }

    #[tokio::test]
    async fn thresholds_update_independently() {
        let store = memory_store().await;
        let id = store
            .create(&new_trade(Pair::new("BTC", "EUR"), TradingMode::Paper))
            .await
            .unwrap();

        store.update_thresholds(id, Some(100.0), None).await.unwrap();
        store.update_thresholds(id, None, Some(102.0)).await.unwrap();

        let trade = store.get(id).await.unwrap();
        assert_eq!(trade.modified_stop_loss, Some(100.0));
        assert_eq!(trade.modified_take_profit, Some(102.0));
        assert_eq!(trade.effective_stop_loss(), 100.0);
        assert_eq!(trade.effective_take_profit(), 102.0);
    }

    #[tokio::test]
    async fn close_is_single_shot() {
        let store = memory_store().await;
        let pair = Pair::new("BTC", "EUR");
        let id = store.create(&new_trade(pair.clone(), TradingMode::Paper)).await.unwrap();

        let won = exit(TradeStatus::Won, 9.8, t0() + Duration::hours(1));
        store.close(id, &won).await.unwrap();

        let trade = store.get(id).await.unwrap();
        assert_eq!(trade.status, TradeStatus::Won);
        assert_eq!(trade.exit.as_ref(), Some(&won));
        assert!((trade.net_result().unwrap() - 9.6).abs() < 1e-9);
        assert!(store.list_open(Some(&pair)).await.unwrap().is_empty());

        assert!(matches!(store.close(id, &won).await, Err(Error::TradeNotFound(_))));
    }

    #[tokio::test]
    async fn results_group_by_status_within_window() {
        let store = memory_store().await;
        let pair = Pair::new("BTC", "EUR");
        let day = t0();
        for (status, result, offset_h, mode) in [
            (TradeStatus::Won, 10.2, 1, TradingMode::Paper),
            (TradeStatus::Won, 5.2, 2, TradingMode::Paper),
            (TradeStatus::Lost, -3.8, 3, TradingMode::Paper),
            (TradeStatus::Won, 100.0, 30, TradingMode::Paper),
            (TradeStatus::Won, 100.0, 2, TradingMode::Live),
        ] {
            let id = store.create(&new_trade(pair.clone(), mode)).await.unwrap();
            store
                .close(id, &exit(status, result, day + Duration::hours(offset_h)))
                .await
                .unwrap();
        }
        store.create(&new_trade(pair, TradingMode::Paper)).await.unwrap();

        let results = store
            .results_between(TradingMode::Paper, day, day + Duration::hours(24))
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status, TradeStatus::Lost);
        assert_eq!(results[0].count, 1);
        assert!((results[0].net_result - (-4.0)).abs() < 1e-9);
        assert_eq!(results[1].status, TradeStatus::Won);
        assert_eq!(results[1].count, 2);
        assert!((results[1].net_result - 15.0).abs() < 1e-9);
    }
}
