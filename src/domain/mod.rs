//! Framework-agnostic domain model: transactions, assets, quotes, ledger
//! payments and the status state machine that ties them together.

pub mod asset;
pub mod ledger;
pub mod quote;
pub mod status;
pub mod transaction;

pub use asset::{round_amount, Asset, OffChainAsset};
pub use ledger::{
    extract_payment, LedgerAsset, LedgerOperation, LedgerTransaction, MatchedPayment, OperationBody,
    OperationResult, PaymentData,
};
pub use quote::{Quote, QuoteDecimals, QuoteType};
pub use status::{AwaitingPayment, TransactionStatus, TransitionError};
pub use transaction::{MemoType, Protocol, Transaction, TransactionKind, UnknownVariant};
