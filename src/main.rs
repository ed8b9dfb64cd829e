use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use polaris_reconciler::adapters::{
    AnchorWebhook, PostgresAssetRepository, PostgresQuoteRepository, PostgresTransactionRepository,
};
use polaris_reconciler::cli::{self, Cli, Commands, DbCommands, TxCommands};
use polaris_reconciler::config::assets::AssetCache;
use polaris_reconciler::config::{Config, LogFormat};
use polaris_reconciler::db;
use polaris_reconciler::ports::{ScheduleFee, TransactionRepository};
use polaris_reconciler::services::{
    CallbackNotifier, OutgoingProcessor, Reconciler, TransactionMatcher, TransactionWatcher,
};
use polaris_reconciler::stellar::{AccountCache, HorizonClient, LedgerClient};

struct Services {
    assets: Arc<AssetCache>,
    watcher: TransactionWatcher,
    outgoing: OutgoingProcessor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    match cli.command.unwrap_or(Commands::Watch) {
        Commands::Config => cli::handle_config_validate(&config).await,
        Commands::Db(DbCommands::Migrate) => {
            let pool = db::create_pool(&config).await?;
            cli::handle_db_migrate(&pool).await
        }
        Commands::Tx(TxCommands::ResetCursors) => {
            let pool = db::create_pool(&config).await?;
            cli::handle_tx_reset_cursors(&PostgresTransactionRepository::new(pool)).await
        }
        Commands::Process => {
            let services = build_services(&config).await?;
            services.outgoing.run(config.outgoing_poll_interval).await?;
            Ok(())
        }
        Commands::Watch => {
            let services = build_services(&config).await?;
            let accounts = services.assets.distribution_accounts();
            tracing::info!(accounts = accounts.len(), "Starting watchers");

            tokio::select! {
                result = services.watcher.run(accounts) => result?,
                result = services.outgoing.run(config.outgoing_poll_interval) => result?,
                _ = tokio::signal::ctrl_c() => tracing::info!("Shutdown signal received"),
            }
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn build_services(config: &Config) -> anyhow::Result<Services> {
    let pool = db::create_pool(config).await?;
    db::migrate(&pool).await?;

    let transactions: Arc<dyn TransactionRepository> =
        Arc::new(PostgresTransactionRepository::new(pool.clone()));
    let quotes = Arc::new(PostgresQuoteRepository::new(pool.clone()));
    let assets = AssetCache::start(
        Arc::new(PostgresAssetRepository::new(pool)),
        config.asset_refresh_interval,
    )
    .await?;

    let settlement_url = config
        .anchor_settlement_url
        .as_deref()
        .context("ANCHOR_SETTLEMENT_URL must be set")?;
    let mut webhook = AnchorWebhook::new(settlement_url, config.horizon_timeout)?;
    if let Some(rates_url) = &config.anchor_rates_url {
        webhook = webhook.with_rates_url(rates_url)?;
    }
    let webhook = Arc::new(webhook);

    let reconciler = Arc::new(Reconciler::new(
        quotes,
        webhook.clone(),
        Arc::new(ScheduleFee),
        assets.clone(),
    ));
    let notifier = CallbackNotifier::new(config.horizon_timeout);

    let horizon = HorizonClient::with_circuit_breaker(
        config.stellar_horizon_url.clone(),
        config.circuit_breaker_threshold,
        config.circuit_breaker_reset_secs,
    )
    .with_poll_interval(config.horizon_poll_interval)
    .with_http_client(
        reqwest::Client::builder()
            .timeout(config.horizon_timeout)
            .build()?,
    );
    tracing::info!("Stellar Horizon client initialized with URL: {}", config.stellar_horizon_url);

    let client: Arc<dyn LedgerClient> = Arc::new(horizon);
    let matcher = Arc::new(
        TransactionMatcher::new(transactions.clone(), assets.clone(), reconciler.clone())
            .with_notifier(notifier.clone()),
    );
    let watcher = TransactionWatcher::new(
        client.clone(),
        transactions.clone(),
        matcher,
        Arc::new(AccountCache::new(client)),
    );
    let outgoing = OutgoingProcessor::new(transactions, assets.clone(), reconciler, webhook)
        .with_notifier(notifier);

    Ok(Services {
        assets,
        watcher,
        outgoing,
    })
}
