//! Matching of incoming ledger payments to transactions awaiting them.

use bigdecimal::BigDecimal;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::assets::AssetCache;
use crate::domain::{Asset, AwaitingPayment, LedgerTransaction, Transaction, TransactionStatus};
use crate::error::AppError;
use crate::ports::TransactionRepository;
use crate::services::callback::CallbackNotifier;
use crate::services::reconciliation::Reconciler;

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// The ledger transaction failed on-chain and was ignored.
    Unsuccessful,
    /// No transaction is waiting for a payment with this memo.
    NoCandidates,
    /// Candidates exist but no operation pays one of them.
    NoPayment,
    /// The matched transaction could not be updated consistently.
    Rejected(String),
    /// Another writer moved the transaction first.
    Superseded,
    Matched(Transaction),
}

pub struct TransactionMatcher {
    transactions: Arc<dyn TransactionRepository>,
    assets: Arc<AssetCache>,
    reconciler: Arc<Reconciler>,
    notifier: Option<CallbackNotifier>,
}

impl TransactionMatcher {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        assets: Arc<AssetCache>,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        Self {
            transactions,
            assets,
            reconciler,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: CallbackNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Applies one ledger transaction seen on `account`. Only fatal errors
    /// are returned; everything else is reported through the outcome.
    pub async fn process(
        &self,
        account: &str,
        ledger_tx: &LedgerTransaction,
    ) -> Result<MatchOutcome, AppError> {
        match self.match_payment(account, ledger_tx).await {
            Err(e) if !e.is_fatal() => {
                error!(
                    account = %account,
                    stellar_transaction_id = %ledger_tx.id,
                    error = %e,
                    "Skipping ledger transaction after data error"
                );
                Ok(MatchOutcome::Rejected(e.to_string()))
            }
            outcome => outcome,
        }
    }

    async fn match_payment(
        &self,
        account: &str,
        ledger_tx: &LedgerTransaction,
    ) -> Result<MatchOutcome, AppError> {
        if !ledger_tx.successful {
            debug!(stellar_transaction_id = %ledger_tx.id, "Skipping unsuccessful transaction");
            return Ok(MatchOutcome::Unsuccessful);
        }

        let filter = AwaitingPayment::new(account, ledger_tx.memo.clone());
        let candidates = self.transactions.find_awaiting_payment(&filter).await?;

        if candidates.is_empty() {
            info!(
                account = %account,
                memo = ?ledger_tx.memo,
                stellar_transaction_id = %ledger_tx.id,
                "No pending transaction for ledger transaction"
            );
            return Ok(MatchOutcome::NoCandidates);
        }
        if candidates.len() > 1 {
            let ids: Vec<String> = candidates.iter().map(|tx| tx.id.to_string()).collect();
            error!(
                account = %account,
                memo = ?ledger_tx.memo,
                candidates = %ids.join(","),
                "Multiple pending transactions share a memo; using the oldest"
            );
        }

        for candidate in candidates {
            let Some(asset) = self.assets.get(&candidate.asset_code, &candidate.asset_issuer) else {
                error!(
                    transaction_id = %candidate.id,
                    asset = %format!("{}:{}", candidate.asset_code, candidate.asset_issuer),
                    "Pending transaction references an unknown asset"
                );
                continue;
            };

            if let Some(matched) = ledger_tx.find_payment_to(account, &asset) {
                debug!(
                    transaction_id = %candidate.id,
                    operation = matched.operation_index,
                    "Found matching payment operation"
                );
                let amount_in = asset.round(&matched.payment.amount);
                return self
                    .apply(candidate, ledger_tx, matched.source, amount_in, &asset)
                    .await;
            }
        }

        info!(
            account = %account,
            memo = ?ledger_tx.memo,
            stellar_transaction_id = %ledger_tx.id,
            "Ledger transaction carries no payment for any pending transaction"
        );
        Ok(MatchOutcome::NoPayment)
    }

    async fn apply(
        &self,
        mut tx: Transaction,
        ledger_tx: &LedgerTransaction,
        source: String,
        amount_in: BigDecimal,
        asset: &Asset,
    ) -> Result<MatchOutcome, AppError> {
        let expected = tx.status;
        if !AwaitingPayment::status_and_kind_match(tx.status, tx.kind) {
            error!(
                transaction_id = %tx.id,
                status = %tx.status,
                kind = %tx.kind,
                "Candidate is not awaiting a payment"
            );
            return Ok(MatchOutcome::Rejected(format!(
                "{} transaction in status {}",
                tx.kind, tx.status
            )));
        }

        tx.amount_in = Some(amount_in);
        tx.stellar_transaction_id = Some(ledger_tx.id.clone());
        tx.from_address = Some(source);
        tx.paging_token = Some(ledger_tx.paging_token.clone());
        if let Err(e) = tx.transition(TransactionStatus::after_match(tx.protocol)) {
            error!(transaction_id = %tx.id, error = %e, "Match transition rejected");
            return Ok(MatchOutcome::Rejected(e.to_string()));
        }

        let reconciliation = match self.reconciler.reconcile(&mut tx, asset).await {
            Ok(reconciliation) => Some(reconciliation),
            Err(AppError::PriceUnavailable(reason)) => {
                warn!(
                    transaction_id = %tx.id,
                    reason = %reason,
                    "Price unavailable; amounts will be reconciled before settlement"
                );
                None
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                error!(transaction_id = %tx.id, error = %e, "Reconciliation rejected the match");
                return Ok(MatchOutcome::Rejected(e.to_string()));
            }
        };

        if !self.transactions.update_if_status(&tx, expected).await? {
            info!(
                transaction_id = %tx.id,
                "Transaction changed concurrently; leaving it to the other writer"
            );
            return Ok(MatchOutcome::Superseded);
        }
        if let Some(reconciliation) = reconciliation {
            self.reconciler.commit(reconciliation).await?;
        }

        info!(
            transaction_id = %tx.id,
            status = %tx.status,
            amount_in = ?tx.amount_in.as_ref().map(|a| a.to_string()),
            stellar_transaction_id = %ledger_tx.id,
            "Matched incoming payment"
        );
        if let Some(notifier) = &self.notifier {
            notifier.notify(&tx).await;
        }
        Ok(MatchOutcome::Matched(tx))
    }
}
