use crate::config::Config;
use anyhow::{Context, Result};
use sqlx::PgPool;

/// Outcome of one startup check; `error` is `None` when it passed.
pub struct Check {
    pub name: &'static str,
    pub error: Option<String>,
}

impl Check {
    fn from_result(name: &'static str, result: Result<()>) -> Self {
        Check {
            name,
            error: result.err().map(|e| format!("{:#}", e)),
        }
    }

    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

pub struct ValidationReport {
    pub checks: Vec<Check>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.checks.iter().all(Check::passed)
    }

    pub fn check(&self, name: &str) -> Option<&Check> {
        self.checks.iter().find(|c| c.name == name)
    }

    pub fn print(&self) {
        println!("\n=== Reconciler Startup Checks ===");
        for check in &self.checks {
            let mark = if check.passed() { "✅ OK" } else { "❌ FAIL" };
            println!("{:<22} {}", check.name, mark);
        }

        let failures: Vec<&Check> = self.checks.iter().filter(|c| !c.passed()).collect();
        if !failures.is_empty() {
            println!("\nErrors:");
            for check in failures {
                println!("  ❌ {}: {}", check.name, check.error.as_deref().unwrap_or_default());
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=================================\n");
    }
}

/// Checks configuration, database contents and Horizon. `pool` is `None`
/// when the database could not be reached at all.
pub async fn validate_environment(
    config: &Config,
    pool: Option<&PgPool>,
) -> Result<ValidationReport> {
    let mut checks = vec![Check::from_result("Environment", validate_env_vars(config))];

    match pool {
        Some(pool) => {
            checks.push(Check::from_result("Database", validate_database(pool).await));
            checks.push(Check::from_result("Watched accounts", validate_assets(pool).await));
        }
        None => checks.push(Check {
            name: "Database",
            error: Some("Failed to connect to database".to_string()),
        }),
    }

    checks.push(Check::from_result("Horizon", validate_horizon(config).await));

    Ok(ValidationReport { checks })
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL is empty");
    }
    if config.circuit_breaker_threshold == 0 {
        anyhow::bail!("CIRCUIT_BREAKER_THRESHOLD must be greater than 0");
    }

    url::Url::parse(&config.stellar_horizon_url)
        .context("STELLAR_HORIZON_URL is not a valid URL")?;
    if let Some(rates) = &config.anchor_rates_url {
        url::Url::parse(rates).context("ANCHOR_RATES_URL is not a valid URL")?;
    }
    let settlement = config
        .anchor_settlement_url
        .as_deref()
        .context("ANCHOR_SETTLEMENT_URL is not set")?;
    url::Url::parse(settlement).context("ANCHOR_SETTLEMENT_URL is not a valid URL")?;

    Ok(())
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Migrations table missing; run `db migrate`")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }
    Ok(())
}

async fn validate_assets(pool: &PgPool) -> Result<()> {
    let watched: i64 = sqlx::query_scalar(
        "SELECT COUNT(DISTINCT distribution_account) FROM assets WHERE distribution_account IS NOT NULL",
    )
    .fetch_one(pool)
    .await
    .context("Failed to read assets")?;

    if watched == 0 {
        anyhow::bail!("No asset has a distribution account to watch");
    }
    tracing::debug!(watched, "Distribution accounts configured");
    Ok(())
}

async fn validate_horizon(config: &Config) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(config.horizon_timeout)
        .build()?;

    let response = client
        .get(&config.stellar_horizon_url)
        .send()
        .await
        .context("Failed to connect to Horizon")?;

    if !response.status().is_success() {
        anyhow::bail!("Horizon returned status: {}", response.status());
    }
    Ok(())
}
