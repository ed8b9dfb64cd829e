//! Stellar network access: Horizon HTTP client, XDR decoding and the
//! distribution-account cache.

pub mod accounts;
pub mod client;
pub mod xdr;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::domain::LedgerTransaction;

pub use accounts::AccountCache;
pub use client::{AccountResponse, HorizonClient, HorizonError, TransactionRecord};

/// Infinite stream of ledger transactions touching one account, in cursor order.
pub type LedgerStream = Pin<Box<dyn Stream<Item = Result<LedgerTransaction, HorizonError>> + Send>>;

/// Cursor value meaning "start from the newest transaction".
pub const CURSOR_NOW: &str = "now";

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Streams transactions for `account` after `cursor`. An error on the very
    /// first request ends the stream; later transport errors are retried.
    fn watch(&self, account: &str, cursor: &str) -> LedgerStream;

    async fn load_account(&self, account: &str) -> Result<AccountResponse, HorizonError>;
}
