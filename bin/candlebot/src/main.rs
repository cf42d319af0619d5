use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use common::{
    Config, ExchangeGateway, LogNotifier, MarketDirectory, Notifier, Pair, TradeStore, TradingMode,
};
use engine::{
    report, resolve_markets, BinanceClient, BotFileConfig, CoinGeckoDirectory, CycleEnd,
    PositionController, ScanSettings, Scanner, SqliteTradeStore,
};
use paper::PaperExchange;
use strategy::build_strategy;
use telegram_notify::TelegramNotifier;

/// Back-off after a cycle ends with an unexpected error.
const ERROR_BACKOFF: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env();
    let bot_cfg = BotFileConfig::load(&cfg.bot_config_path);
    info!(
        mode = %cfg.trading_mode,
        strategy = %bot_cfg.strategy.strategy_type,
        counter = %bot_cfg.counter_currency,
        "CandleBot starting"
    );

    // ── Database ──────────────────────────────────────────────────────────────
    let store = SqliteTradeStore::connect(&cfg.database_url)
        .await
        .unwrap_or_else(|e| panic!("Failed to connect to database: {e}"));
    store
        .migrate()
        .await
        .unwrap_or_else(|e| panic!("Database migration failed: {e}"));
    info!("Database ready");
    let store: Arc<dyn TradeStore> = Arc::new(store);

    // ── Exchange gateway (injected based on TRADING_MODE) ─────────────────────
    let binance = Arc::new(
        BinanceClient::new(&cfg.binance_api_key, &cfg.binance_secret)
            .unwrap_or_else(|e| panic!("Failed to create Binance client: {e}")),
    );
    let gateway: Arc<dyn ExchangeGateway> = match cfg.trading_mode {
        TradingMode::Live => {
            info!("Live trading mode, using BinanceClient");
            binance
        }
        TradingMode::Paper => {
            info!(
                slippage_bps = cfg.paper_slippage_bps,
                balance = cfg.paper_balance,
                "Paper trading mode, using PaperExchange over Binance market data"
            );
            let paper = PaperExchange::new(cfg.paper_slippage_bps).with_upstream(binance);
            paper.deposit(&bot_cfg.counter_currency, cfg.paper_balance).await;
            Arc::new(paper)
        }
    };

    // ── Notifier ──────────────────────────────────────────────────────────────
    let notifier: Arc<dyn Notifier> = match &cfg.telegram_token {
        Some(token) if !cfg.telegram_chat_ids.is_empty() => {
            Arc::new(TelegramNotifier::new(token.clone(), &cfg.telegram_chat_ids))
        }
        _ => {
            info!("Telegram not configured, notifications go to the log only");
            Arc::new(LogNotifier)
        }
    };

    // ── Strategy, controller, scanner ─────────────────────────────────────────
    let strategy = build_strategy(&bot_cfg.strategy)
        .unwrap_or_else(|e| panic!("Invalid [strategy] in bot config: {e}"));
    let controller = PositionController::new(
        gateway.clone(),
        store.clone(),
        notifier.clone(),
        cfg.trading_mode,
        bot_cfg.risk.take_profit_reduction,
    );
    let scanner = Scanner::new(
        gateway,
        store.clone(),
        controller,
        strategy,
        ScanSettings::from_config(&bot_cfg),
        bot_cfg.risk.clone(),
    );
    let directory = CoinGeckoDirectory::new()
        .unwrap_or_else(|e| panic!("Failed to create market directory: {e}"));

    // ── Reports ───────────────────────────────────────────────────────────────
    tokio::spawn(report::run_schedule(
        store,
        notifier.clone(),
        cfg.trading_mode,
        bot_cfg.counter_currency.clone(),
        bot_cfg.report_hours.clone(),
    ));

    tokio::select! {
        _ = run(scanner, &directory, &bot_cfg, notifier.as_ref(), cfg.trading_mode) => {
            info!("CandleBot stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting.");
        }
    }
}

/// Start-up sequence followed by the poll loop. Returns when the stop file
/// appears.
async fn run(
    mut scanner: Scanner,
    directory: &dyn MarketDirectory,
    bot_cfg: &BotFileConfig,
    notifier: &dyn Notifier,
    mode: TradingMode,
) {
    notifier.notify(&format!("CandleBot started ({mode})")).await;

    if let Err(e) = scanner.controller().manage_open_trades(None).await {
        warn!(error = %e, "Start-up trade management failed");
    }
    if let Err(e) = scanner.refresh_cap().await {
        warn!(error = %e, "Could not compute capital cap at start-up");
    }

    let refresh_every = Duration::from_secs(bot_cfg.market_refresh_hours * 3600);
    let mut markets = load_markets(&mut scanner, directory, bot_cfg).await;
    notifier
        .notify(&format!("Markets initialized: {} pairs", markets.len()))
        .await;
    let mut refreshed_at = Instant::now();

    loop {
        match scanner.run_cycle(&markets).await {
            Ok(CycleEnd::Completed) => {}
            Ok(CycleEnd::StopRequested) => {
                info!("Stop file found, shutting down");
                notifier.notify("Stop file found, CandleBot stopping").await;
                return;
            }
            Err(e) => {
                error!(error = %e, "Scan cycle failed");
                notifier.notify(&format!("Scan cycle failed: {e}")).await;
                tokio::time::sleep(ERROR_BACKOFF).await;
            }
        }

        if refreshed_at.elapsed() >= refresh_every {
            markets = load_markets(&mut scanner, directory, bot_cfg).await;
            refreshed_at = Instant::now();
        }
    }
}

/// Explicit markets from the bot file, otherwise the directory's listing.
/// Also refreshes the market snapshots recorded with new entries.
async fn load_markets(
    scanner: &mut Scanner,
    directory: &dyn MarketDirectory,
    bot_cfg: &BotFileConfig,
) -> Vec<Pair> {
    match directory.top_market_snapshot(&bot_cfg.counter_currency).await {
        Ok(snapshots) => scanner.set_snapshots(snapshots),
        Err(e) => warn!(error = %e, "Market snapshots unavailable"),
    }

    let explicit = bot_cfg
        .explicit_markets()
        .unwrap_or_else(|e| panic!("Invalid markets in bot config: {e}"));
    if !explicit.is_empty() {
        info!(count = explicit.len(), "Using markets from bot config");
        return explicit;
    }
    resolve_markets(
        directory,
        &bot_cfg.exchange_id,
        &bot_cfg.counter_currency,
        engine::scanner::MARKET_RETRY,
    )
    .await
}
