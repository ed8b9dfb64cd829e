//! Anchor-supplied integration points.
//!
//! Failures come in two explicit kinds so the core can branch without
//! inspecting error types: a recoverable failure parks the transaction in
//! `error`, a fault is propagated and takes the worker down.

use async_trait::async_trait;
use bigdecimal::{BigDecimal, Zero};
use thiserror::Error;

use crate::domain::{round_amount, Asset, Quote, Transaction, TransactionKind, TransactionStatus};

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("{message}")]
    Recoverable { message: String },

    #[error("integration fault: {0}")]
    Fault(#[source] anyhow::Error),
}

impl IntegrationError {
    pub fn recoverable(message: impl Into<String>) -> Self {
        IntegrationError::Recoverable {
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RateError {
    #[error("price unavailable: {0}")]
    Unavailable(String),

    #[error("rate integration fault: {0}")]
    Fault(#[source] anyhow::Error),
}

/// What the anchor reports after handling a reconciled transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// The off-chain leg is done.
    Completed,
    /// Still in flight; the transaction moves to the given pending status.
    InProgress(TransactionStatus),
}

#[async_trait]
pub trait RateIntegration: Send + Sync {
    /// Current price for an indicative quote, in sell units per buy unit.
    async fn refresh_price(&self, quote: &Quote) -> Result<BigDecimal, RateError>;
}

#[async_trait]
pub trait SettlementIntegration: Send + Sync {
    /// Called once a transaction's incoming payment is matched and its
    /// amounts are reconciled.
    async fn on_reconciled(&self, tx: &Transaction) -> Result<SettlementOutcome, IntegrationError>;
}

#[derive(Debug, Clone)]
pub struct FeeParams<'a> {
    pub kind: TransactionKind,
    pub asset: &'a Asset,
    pub amount: &'a BigDecimal,
}

pub trait FeeIntegration: Send + Sync {
    /// Fee in units of the transaction's on-chain asset.
    fn calculate_fee(&self, params: &FeeParams<'_>) -> BigDecimal;
}

/// Fixed plus percentage fee from the asset's configured schedule.
#[derive(Debug, Clone, Default)]
pub struct ScheduleFee;

impl FeeIntegration for ScheduleFee {
    fn calculate_fee(&self, params: &FeeParams<'_>) -> BigDecimal {
        let (fixed, percent) = params.asset.fee_schedule(params.kind);
        let fee = fixed + (percent * params.amount) / BigDecimal::from(100);
        if fee < BigDecimal::zero() {
            return BigDecimal::zero();
        }
        round_amount(&fee, params.asset.significant_decimals)
    }
}
