//! Streams ledger transactions for every distribution account and feeds them
//! to the matcher.

use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::error::AppError;
use crate::ports::TransactionRepository;
use crate::services::matcher::{MatchOutcome, TransactionMatcher};
use crate::stellar::{AccountCache, LedgerClient, CURSOR_NOW};

#[derive(Clone)]
pub struct TransactionWatcher {
    client: Arc<dyn LedgerClient>,
    transactions: Arc<dyn TransactionRepository>,
    matcher: Arc<TransactionMatcher>,
    accounts: Arc<AccountCache>,
}

impl TransactionWatcher {
    pub fn new(
        client: Arc<dyn LedgerClient>,
        transactions: Arc<dyn TransactionRepository>,
        matcher: Arc<TransactionMatcher>,
        accounts: Arc<AccountCache>,
    ) -> Self {
        Self {
            client,
            transactions,
            matcher,
            accounts,
        }
    }

    /// Watches all `accounts` concurrently. Returns when every stream has
    /// ended, or with the first fatal error after stopping the others.
    pub async fn run(&self, accounts: Vec<String>) -> Result<(), AppError> {
        if accounts.is_empty() {
            return Err(AppError::Config(
                "no distribution accounts to watch".to_string(),
            ));
        }

        let mut tasks = JoinSet::new();
        for account in accounts {
            let watcher = self.clone();
            tasks.spawn(async move { watcher.watch_account(account).await });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "Account watcher failed");
                    tasks.abort_all();
                    return Err(e);
                }
                Err(e) => {
                    tasks.abort_all();
                    return Err(AppError::Task(e));
                }
            }
        }
        Ok(())
    }

    /// Processes `account`'s stream in cursor order, resuming after the
    /// newest stored paging token.
    pub async fn watch_account(&self, account: String) -> Result<(), AppError> {
        let details = self.accounts.get_or_load(&account).await?;
        let cursor = self
            .transactions
            .latest_paging_token(&account)
            .await?
            .unwrap_or_else(|| CURSOR_NOW.to_string());

        info!(
            account = %account,
            cursor = %cursor,
            signers = details.signers.len(),
            "Watching account for incoming payments"
        );

        let mut stream = self.client.watch(&account, &cursor);
        while let Some(item) = stream.next().await {
            let ledger_tx = item?;
            let outcome = self.matcher.process(&account, &ledger_tx).await?;
            if let MatchOutcome::Matched(tx) = &outcome {
                debug!(account = %account, transaction_id = %tx.id, "Ledger transaction matched");
            }
        }

        info!(account = %account, "Ledger stream ended");
        Ok(())
    }
}
