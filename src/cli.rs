use clap::{Parser, Subcommand};
use sqlx::PgPool;

use crate::config::Config;
use crate::ports::TransactionRepository;

#[derive(Parser)]
#[command(name = "polaris-reconciler")]
#[command(about = "Polaris Reconciler - matches Stellar payments to anchor transactions", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch distribution accounts and settle matched transactions (default)
    Watch,

    /// Only settle already matched transactions
    Process,

    /// Transaction management commands
    #[command(subcommand)]
    Tx(TxCommands),

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Configuration validation
    Config,
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// Clear stored paging tokens so watchers restart from the newest ledger
    ResetCursors,
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

pub async fn handle_tx_reset_cursors(transactions: &dyn TransactionRepository) -> anyhow::Result<()> {
    let cleared = transactions.reset_paging_tokens().await?;

    tracing::info!(cleared, "Paging tokens reset");
    println!("✓ Cleared paging token on {} transaction(s)", cleared);
    Ok(())
}

pub async fn handle_db_migrate(pool: &PgPool) -> anyhow::Result<()> {
    tracing::info!("Running database migrations...");
    crate::db::migrate(pool).await?;

    println!("✓ Database migrations completed");
    Ok(())
}

pub async fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Stellar Horizon URL: {}", config.stellar_horizon_url);
    println!("  Horizon poll interval: {:?}", config.horizon_poll_interval);
    println!(
        "  Circuit breaker: {} failures, {}s reset",
        config.circuit_breaker_threshold, config.circuit_breaker_reset_secs
    );
    println!(
        "  Anchor settlement URL: {}",
        config.anchor_settlement_url.as_deref().unwrap_or("<unset>")
    );
    println!(
        "  Anchor rates URL: {}",
        config.anchor_rates_url.as_deref().unwrap_or("<unset>")
    );

    let pool = match crate::db::create_pool(config).await {
        Ok(pool) => Some(pool),
        Err(e) => {
            tracing::warn!(error = %e, "Database unreachable");
            None
        }
    };

    let report = crate::startup::validate_environment(config, pool.as_ref()).await?;
    report.print();

    if !report.is_valid() {
        anyhow::bail!("Configuration is invalid");
    }
    tracing::info!("Configuration is valid");
    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user_start = slash_pos + 2;
                let user = &url[user_start..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
