//! Hands matched transactions to the anchor's settlement integration and
//! applies the result.

use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use crate::config::assets::AssetCache;
use crate::domain::{Transaction, TransactionKind, TransactionStatus};
use crate::error::AppError;
use crate::ports::{IntegrationError, SettlementIntegration, SettlementOutcome, TransactionRepository};
use crate::services::callback::CallbackNotifier;
use crate::services::reconciliation::{Reconciler, Reconciliation};

const READY_STATUSES: [TransactionStatus; 2] =
    [TransactionStatus::PendingAnchor, TransactionStatus::PendingReceiver];

const READY_KINDS: [TransactionKind; 3] = [
    TransactionKind::Withdrawal,
    TransactionKind::WithdrawalExchange,
    TransactionKind::Send,
];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub completed: usize,
    pub in_progress: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct OutgoingProcessor {
    transactions: Arc<dyn TransactionRepository>,
    assets: Arc<AssetCache>,
    reconciler: Arc<Reconciler>,
    settlement: Arc<dyn SettlementIntegration>,
    notifier: Option<CallbackNotifier>,
}

enum Step {
    Completed,
    InProgress,
    Failed,
    Skipped,
}

impl OutgoingProcessor {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        assets: Arc<AssetCache>,
        reconciler: Arc<Reconciler>,
        settlement: Arc<dyn SettlementIntegration>,
    ) -> Self {
        Self {
            transactions,
            assets,
            reconciler,
            settlement,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: CallbackNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Polls for matched transactions until a fatal error occurs.
    pub async fn run(&self, poll_interval: Duration) -> Result<(), AppError> {
        info!("Outgoing processor started");

        loop {
            let report = self.process_batch().await?;
            if report != BatchReport::default() {
                info!(
                    completed = report.completed,
                    in_progress = report.in_progress,
                    failed = report.failed,
                    skipped = report.skipped,
                    "Outgoing batch processed"
                );
            }

            sleep(poll_interval).await;
        }
    }

    pub async fn process_batch(&self) -> Result<BatchReport, AppError> {
        let ready = self
            .transactions
            .find_by_status(&READY_STATUSES, &READY_KINDS)
            .await?;

        let mut report = BatchReport::default();
        if ready.is_empty() {
            return Ok(report);
        }
        debug!("Processing {} matched transaction(s)", ready.len());

        for tx in ready {
            let id = tx.id;
            let step = match self.process_one(tx).await {
                Ok(step) => step,
                Err(e) if !e.is_fatal() => {
                    error!(transaction_id = %id, error = %e, "Skipping transaction after data error");
                    Step::Skipped
                }
                Err(e) => return Err(e),
            };
            match step {
                Step::Completed => report.completed += 1,
                Step::InProgress => report.in_progress += 1,
                Step::Failed => report.failed += 1,
                Step::Skipped => report.skipped += 1,
            }
        }
        Ok(report)
    }

    async fn process_one(&self, mut tx: Transaction) -> Result<Step, AppError> {
        let expected = tx.status;
        if expected != TransactionStatus::after_match(tx.protocol) {
            return Ok(Step::Skipped);
        }

        let mut reconciliation = None;
        if tx.amount_out.is_none() {
            match self.reconcile_late(&mut tx).await? {
                Some(reconciled) => reconciliation = Some(reconciled),
                None => return Ok(Step::Skipped),
            }
        }

        let step = match self.settlement.on_reconciled(&tx).await {
            Ok(SettlementOutcome::Completed) => match tx.transition(TransactionStatus::Completed) {
                Ok(()) => Step::Completed,
                Err(e) => {
                    error!(transaction_id = %tx.id, error = %e, "Cannot complete transaction");
                    return Ok(Step::Skipped);
                }
            },
            Ok(SettlementOutcome::InProgress(status)) if status == tx.status => Step::InProgress,
            Ok(SettlementOutcome::InProgress(status)) => match tx.transition(status) {
                Ok(()) => Step::InProgress,
                Err(e) => {
                    error!(transaction_id = %tx.id, error = %e, "Anchor reported an illegal status");
                    return Ok(Step::Skipped);
                }
            },
            Err(IntegrationError::Recoverable { message }) => {
                warn!(transaction_id = %tx.id, message = %message, "Settlement failed");
                tx.fail(message)?;
                Step::Failed
            }
            Err(IntegrationError::Fault(e)) => {
                error!(transaction_id = %tx.id, error = %e, "Settlement integration fault");
                return Err(AppError::IntegrationFault(e));
            }
        };

        if !self.transactions.update_if_status(&tx, expected).await? {
            info!(
                transaction_id = %tx.id,
                "Transaction changed concurrently; dropping settlement result"
            );
            return Ok(Step::Skipped);
        }
        if let Some(reconciliation) = reconciliation {
            self.reconciler.commit(reconciliation).await?;
        }

        if tx.status != expected {
            info!(transaction_id = %tx.id, from = %expected, to = %tx.status, "Transaction status changed");
            if let Some(notifier) = &self.notifier {
                notifier.notify(&tx).await;
            }
        }
        Ok(step)
    }

    /// Retries reconciliation for a transaction matched while pricing was
    /// unavailable. Returns `None` when it still cannot be priced.
    async fn reconcile_late(&self, tx: &mut Transaction) -> Result<Option<Reconciliation>, AppError> {
        let Some(asset) = self.assets.get(&tx.asset_code, &tx.asset_issuer) else {
            error!(
                transaction_id = %tx.id,
                asset_code = %tx.asset_code,
                "Matched transaction references an unknown asset"
            );
            return Ok(None);
        };

        match self.reconciler.reconcile(tx, &asset).await {
            Ok(reconciliation) => Ok(Some(reconciliation)),
            Err(AppError::PriceUnavailable(reason)) => {
                warn!(transaction_id = %tx.id, reason = %reason, "Reconciliation still pending");
                Ok(None)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                error!(transaction_id = %tx.id, error = %e, "Matched transaction cannot be reconciled");
                Ok(None)
            }
        }
    }
}
