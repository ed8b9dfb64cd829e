//! Interfaces the reconciliation core depends on. Storage and anchor
//! integrations are supplied from outside; adapters live in `crate::adapters`.

pub mod integrations;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    Asset, AwaitingPayment, OffChainAsset, Quote, Transaction, TransactionKind,
    TransactionStatus,
};

pub use integrations::{
    FeeIntegration, FeeParams, IntegrationError, RateError, RateIntegration, ScheduleFee,
    SettlementIntegration, SettlementOutcome,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction>;

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Transaction>;

    /// Transactions selected by `filter`, oldest `started_at` first, ties
    /// broken by `id`.
    async fn find_awaiting_payment(
        &self,
        filter: &AwaitingPayment,
    ) -> RepositoryResult<Vec<Transaction>>;

    async fn find_by_status(
        &self,
        statuses: &[TransactionStatus],
        kinds: &[TransactionKind],
    ) -> RepositoryResult<Vec<Transaction>>;

    /// Writes `tx` only if the stored row is still in `expected`. Returns
    /// `false` when another writer moved it first.
    async fn update_if_status(
        &self,
        tx: &Transaction,
        expected: TransactionStatus,
    ) -> RepositoryResult<bool>;

    /// Most recently matched paging token for `account`, if any.
    async fn latest_paging_token(&self, account: &str) -> RepositoryResult<Option<String>>;

    /// Clears every stored paging token. Used after a ledger reset.
    async fn reset_paging_tokens(&self) -> RepositoryResult<u64>;
}

#[async_trait]
pub trait QuoteRepository: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Quote>;

    /// Stores `quote` as given. Implementations do not validate: asset
    /// decimals live outside the store, so callers check the quote with
    /// `Quote::validate_for_creation` or `Quote::validate_for_settlement`
    /// first. `Reconciler` only hands over quotes that passed the latter.
    async fn save(&self, quote: &Quote) -> RepositoryResult<()>;
}

#[async_trait]
pub trait AssetRepository: Send + Sync {
    async fn fetch_assets(&self) -> RepositoryResult<Vec<Asset>>;

    async fn fetch_off_chain_assets(&self) -> RepositoryResult<Vec<OffChainAsset>>;
}
