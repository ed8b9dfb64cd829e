use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{AccountResponse, HorizonError, LedgerClient};

/// Snapshot cache of distribution accounts loaded from Horizon.
pub struct AccountCache {
    client: Arc<dyn LedgerClient>,
    inner: ArcSwap<HashMap<String, AccountResponse>>,
}

impl AccountCache {
    pub fn new(client: Arc<dyn LedgerClient>) -> Self {
        Self {
            client,
            inner: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    pub fn get(&self, account: &str) -> Option<AccountResponse> {
        self.inner.load().get(account).cloned()
    }

    pub async fn get_or_load(&self, account: &str) -> Result<AccountResponse, HorizonError> {
        if let Some(cached) = self.get(account) {
            return Ok(cached);
        }
        self.refresh(account).await
    }

    /// Reloads `account` from Horizon and replaces the cached entry.
    pub async fn refresh(&self, account: &str) -> Result<AccountResponse, HorizonError> {
        let loaded = self.client.load_account(account).await?;
        debug!(account = %account, sequence = %loaded.sequence, "Loaded account");

        self.inner.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(account.to_string(), loaded.clone());
            next
        });
        Ok(loaded)
    }

    pub fn invalidate(&self, account: &str) {
        self.inner.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.remove(account);
            next
        });
    }

    pub fn clear(&self) {
        self.inner.store(Arc::new(HashMap::new()));
    }

    pub fn len(&self) -> usize {
        self.inner.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
