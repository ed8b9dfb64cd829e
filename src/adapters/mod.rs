//! Implementations of the ports: Postgres and in-memory storage, and the
//! HTTP anchor integrations.

pub mod anchor_webhook;
pub mod in_memory;
pub mod postgres_asset_repository;
pub mod postgres_quote_repository;
pub mod postgres_transaction_repository;

pub use anchor_webhook::AnchorWebhook;
pub use in_memory::{InMemoryAssetRepository, InMemoryQuoteRepository, InMemoryTransactionRepository};
pub use postgres_asset_repository::PostgresAssetRepository;
pub use postgres_quote_repository::PostgresQuoteRepository;
pub use postgres_transaction_repository::PostgresTransactionRepository;
