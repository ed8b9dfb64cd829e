//! In-memory repositories for tests and dry runs.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    Asset, AwaitingPayment, OffChainAsset, Quote, Transaction, TransactionKind, TransactionStatus,
};
use crate::ports::{
    AssetRepository, QuoteRepository, RepositoryError, RepositoryResult, TransactionRepository,
};

fn oldest_first(rows: &mut [Transaction]) {
    rows.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
}

#[derive(Default)]
pub struct InMemoryTransactionRepository {
    rows: RwLock<HashMap<Uuid, Transaction>>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Transaction> {
        let mut rows: Vec<Transaction> = self.rows.read().await.values().cloned().collect();
        oldest_first(&mut rows);
        rows
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        tx.check_account_fields()
            .map_err(|e| RepositoryError::Corrupt(e.to_string()))?;
        self.rows.write().await.insert(tx.id, tx.clone());
        Ok(tx.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Transaction> {
        self.rows
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn find_awaiting_payment(
        &self,
        filter: &AwaitingPayment,
    ) -> RepositoryResult<Vec<Transaction>> {
        let mut rows: Vec<Transaction> = self
            .rows
            .read()
            .await
            .values()
            .filter(|tx| filter.matches(tx))
            .cloned()
            .collect();
        oldest_first(&mut rows);
        Ok(rows)
    }

    async fn find_by_status(
        &self,
        statuses: &[TransactionStatus],
        kinds: &[TransactionKind],
    ) -> RepositoryResult<Vec<Transaction>> {
        let mut rows: Vec<Transaction> = self
            .rows
            .read()
            .await
            .values()
            .filter(|tx| statuses.contains(&tx.status) && kinds.contains(&tx.kind))
            .cloned()
            .collect();
        oldest_first(&mut rows);
        Ok(rows)
    }

    async fn update_if_status(
        &self,
        tx: &Transaction,
        expected: TransactionStatus,
    ) -> RepositoryResult<bool> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&tx.id) {
            Some(stored) if stored.status == expected => {
                *stored = tx.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(RepositoryError::NotFound(tx.id.to_string())),
        }
    }

    async fn latest_paging_token(&self, account: &str) -> RepositoryResult<Option<String>> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|tx| tx.receiving_anchor_account.as_deref() == Some(account))
            .filter_map(|tx| tx.paging_token.clone())
            .max_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b))))
    }

    async fn reset_paging_tokens(&self) -> RepositoryResult<u64> {
        let mut cleared = 0;
        for tx in self.rows.write().await.values_mut() {
            if tx.paging_token.take().is_some() {
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}

#[derive(Default)]
pub struct InMemoryQuoteRepository {
    rows: RwLock<HashMap<Uuid, Quote>>,
}

impl InMemoryQuoteRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuoteRepository for InMemoryQuoteRepository {
    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Quote> {
        self.rows
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn save(&self, quote: &Quote) -> RepositoryResult<()> {
        self.rows.write().await.insert(quote.id, quote.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAssetRepository {
    assets: RwLock<Vec<Asset>>,
    off_chain: RwLock<Vec<OffChainAsset>>,
}

impl InMemoryAssetRepository {
    pub fn new(assets: Vec<Asset>, off_chain: Vec<OffChainAsset>) -> Self {
        Self {
            assets: RwLock::new(assets),
            off_chain: RwLock::new(off_chain),
        }
    }

    pub async fn replace_assets(&self, assets: Vec<Asset>) {
        *self.assets.write().await = assets;
    }
}

#[async_trait]
impl AssetRepository for InMemoryAssetRepository {
    async fn fetch_assets(&self) -> RepositoryResult<Vec<Asset>> {
        Ok(self.assets.read().await.clone())
    }

    async fn fetch_off_chain_assets(&self) -> RepositoryResult<Vec<OffChainAsset>> {
        Ok(self.off_chain.read().await.clone())
    }
}
