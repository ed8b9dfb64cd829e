//! Transaction status state machine.
//!
//! Legal transitions are per protocol. Every legal edge other than the move to
//! `error` strictly increases [`TransactionStatus::phase`], which is what keeps
//! a transaction from ever regressing. [`AwaitingPayment`] is the predicate the
//! matcher uses to find transactions waiting on an incoming ledger payment; it
//! lives here so the filter and the transitions it feeds stay in step.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::transaction::{Protocol, Transaction, TransactionKind, UnknownVariant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Incomplete,
    PendingUserTransferStart,
    PendingUserTransferComplete,
    PendingAnchor,
    PendingReceiver,
    PendingSender,
    PendingStellar,
    PendingTrust,
    PendingUser,
    PendingExternal,
    PendingTransactionInfoUpdate,
    PendingCustomerInfoUpdate,
    NoMarket,
    TooSmall,
    TooLarge,
    Completed,
    Refunded,
    Expired,
    Error,
}

use TransactionStatus::*;

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 19] = [
        Incomplete,
        PendingUserTransferStart,
        PendingUserTransferComplete,
        PendingAnchor,
        PendingReceiver,
        PendingSender,
        PendingStellar,
        PendingTrust,
        PendingUser,
        PendingExternal,
        PendingTransactionInfoUpdate,
        PendingCustomerInfoUpdate,
        NoMarket,
        TooSmall,
        TooLarge,
        Completed,
        Refunded,
        Expired,
        Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Incomplete => "incomplete",
            PendingUserTransferStart => "pending_user_transfer_start",
            PendingUserTransferComplete => "pending_user_transfer_complete",
            PendingAnchor => "pending_anchor",
            PendingReceiver => "pending_receiver",
            PendingSender => "pending_sender",
            PendingStellar => "pending_stellar",
            PendingTrust => "pending_trust",
            PendingUser => "pending_user",
            PendingExternal => "pending_external",
            PendingTransactionInfoUpdate => "pending_transaction_info_update",
            PendingCustomerInfoUpdate => "pending_customer_info_update",
            NoMarket => "no_market",
            TooSmall => "too_small",
            TooLarge => "too_large",
            Completed => "completed",
            Refunded => "refunded",
            Expired => "expired",
            Error => "error",
        }
    }

    /// Status a freshly created transaction starts in.
    pub fn initial(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Sep31 => PendingSender,
            Protocol::Sep6 | Protocol::Sep24 => Incomplete,
        }
    }

    /// Status in which the anchor waits for the user's on-chain payment.
    pub fn awaiting_payment(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Sep31 => PendingSender,
            Protocol::Sep6 | Protocol::Sep24 => PendingUserTransferStart,
        }
    }

    /// Status a transaction moves to once its incoming payment is matched.
    pub fn after_match(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Sep31 => PendingReceiver,
            Protocol::Sep6 | Protocol::Sep24 => PendingAnchor,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Completed | Refunded | Expired | Error)
    }

    /// Ordering rank used to enforce forward-only progress.
    pub fn phase(&self) -> u8 {
        match self {
            Incomplete => 0,
            PendingUser
            | PendingCustomerInfoUpdate
            | PendingTransactionInfoUpdate
            | NoMarket
            | TooSmall
            | TooLarge => 1,
            PendingUserTransferStart | PendingSender => 2,
            PendingUserTransferComplete | PendingAnchor | PendingReceiver => 3,
            PendingTrust | PendingExternal => 4,
            PendingStellar => 5,
            Completed | Refunded | Expired | Error => 6,
        }
    }

    /// Non-error successors of `self` under `protocol`.
    pub fn successors(&self, protocol: Protocol) -> &'static [TransactionStatus] {
        match protocol {
            Protocol::Sep31 => match self {
                Incomplete => &[PendingCustomerInfoUpdate, PendingTransactionInfoUpdate, PendingSender],
                PendingCustomerInfoUpdate | PendingTransactionInfoUpdate => &[PendingSender],
                PendingSender => &[PendingReceiver, Expired],
                PendingReceiver => &[PendingExternal, Completed, Refunded],
                PendingExternal => &[Completed, Refunded],
                _ => &[],
            },
            Protocol::Sep6 | Protocol::Sep24 => match self {
                Incomplete => &[
                    PendingUser,
                    PendingCustomerInfoUpdate,
                    PendingTransactionInfoUpdate,
                    NoMarket,
                    TooSmall,
                    TooLarge,
                    PendingUserTransferStart,
                    PendingAnchor,
                    PendingExternal,
                    PendingTrust,
                    PendingStellar,
                    Completed,
                    Expired,
                ],
                PendingUser
                | PendingCustomerInfoUpdate
                | PendingTransactionInfoUpdate
                | NoMarket
                | TooSmall
                | TooLarge => &[PendingUserTransferStart, PendingAnchor, Expired],
                PendingUserTransferStart => &[
                    PendingUserTransferComplete,
                    PendingAnchor,
                    PendingExternal,
                    Expired,
                ],
                PendingUserTransferComplete => &[PendingExternal, PendingStellar, Completed],
                PendingAnchor => &[PendingTrust, PendingExternal, PendingStellar, Completed, Refunded],
                PendingTrust | PendingExternal => &[PendingStellar, Completed, Refunded],
                PendingStellar => &[Completed],
                _ => &[],
            },
        }
    }

    pub fn can_transition(&self, protocol: Protocol, next: TransactionStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Error || self.successors(protocol).contains(&next)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("status", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal {protocol} transition from {from} to {to}")]
pub struct TransitionError {
    pub protocol: Protocol,
    pub from: TransactionStatus,
    pub to: TransactionStatus,
}

impl Transaction {
    /// Moves the transaction to `next` if the state machine allows it.
    pub fn transition(&mut self, next: TransactionStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition(self.protocol, next) {
            return Err(TransitionError {
                protocol: self.protocol,
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        if next == Completed {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    /// Terminal failure reported by the anchor; the message is kept for
    /// diagnostics.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(Error)?;
        self.status_message = Some(message.into());
        Ok(())
    }
}

/// `(status, kinds)` pairs a transaction must satisfy to be waiting for an
/// incoming on-chain payment.
pub const AWAITING_PAYMENT_RULES: [(TransactionStatus, &[TransactionKind]); 2] = [
    (
        PendingUserTransferStart,
        &[TransactionKind::Withdrawal, TransactionKind::WithdrawalExchange],
    ),
    (PendingSender, &[TransactionKind::Send]),
];

/// Selects the transactions a ledger payment to `receiving_account` carrying
/// `memo` could settle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwaitingPayment {
    pub receiving_account: String,
    pub memo: Option<String>,
}

impl AwaitingPayment {
    pub fn new(receiving_account: impl Into<String>, memo: Option<String>) -> Self {
        Self {
            receiving_account: receiving_account.into(),
            memo,
        }
    }

    pub fn rules(&self) -> &'static [(TransactionStatus, &'static [TransactionKind])] {
        &AWAITING_PAYMENT_RULES
    }

    pub fn status_and_kind_match(status: TransactionStatus, kind: TransactionKind) -> bool {
        AWAITING_PAYMENT_RULES
            .iter()
            .any(|(rule_status, kinds)| *rule_status == status && kinds.contains(&kind))
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        tx.receiving_anchor_account.as_deref() == Some(self.receiving_account.as_str())
            && tx.memo == self.memo
            && Self::status_and_kind_match(tx.status, tx.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Asset;

    fn tx(protocol: Protocol, kind: TransactionKind, status: TransactionStatus) -> Transaction {
        let mut tx = Transaction::new(
            protocol,
            kind,
            &Asset::new("USD", "GISSUER", 2),
            "GUSER".to_string(),
        );
        tx.status = status;
        tx
    }

    #[test]
    fn test_status_round_trips_through_wire_string() {
        for status in TransactionStatus::ALL {
            assert_eq!(status.as_str().parse::<TransactionStatus>(), Ok(status));
        }
    }

    #[test]
    fn test_every_legal_edge_moves_forward() {
        for protocol in [Protocol::Sep6, Protocol::Sep24, Protocol::Sep31] {
            for from in TransactionStatus::ALL {
                for to in from.successors(protocol) {
                    assert!(
                        to.phase() > from.phase(),
                        "{protocol}: {from} -> {to} does not move forward"
                    );
                }
            }
        }
    }

    #[test]
    fn test_repeating_a_transition_never_regresses() {
        for protocol in [Protocol::Sep6, Protocol::Sep24, Protocol::Sep31] {
            for from in TransactionStatus::ALL {
                for &to in from.successors(protocol) {
                    assert!(!to.can_transition(protocol, to), "{protocol}: {to} -> {to}");
                    assert!(!to.can_transition(protocol, from), "{protocol}: {to} -> {from}");
                }
            }
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [Completed, Refunded, Expired, Error] {
            for next in TransactionStatus::ALL {
                assert!(!terminal.can_transition(Protocol::Sep24, next));
                assert!(!terminal.can_transition(Protocol::Sep31, next));
            }
        }
    }

    #[test]
    fn test_match_transitions_per_protocol() {
        let mut withdrawal = tx(Protocol::Sep24, TransactionKind::Withdrawal, PendingUserTransferStart);
        withdrawal.transition(TransactionStatus::after_match(Protocol::Sep24)).unwrap();
        assert_eq!(withdrawal.status, PendingAnchor);

        let mut send = tx(Protocol::Sep31, TransactionKind::Send, PendingSender);
        send.transition(TransactionStatus::after_match(Protocol::Sep31)).unwrap();
        assert_eq!(send.status, PendingReceiver);
    }

    #[test]
    fn test_completion_sets_completed_at() {
        let mut t = tx(Protocol::Sep6, TransactionKind::Withdrawal, PendingAnchor);
        assert!(t.completed_at.is_none());
        t.transition(Completed).unwrap();
        assert!(t.completed_at.is_some());

        let err = t.transition(PendingAnchor).unwrap_err();
        assert_eq!(err.from, Completed);
        assert_eq!(err.to, PendingAnchor);
    }

    #[test]
    fn test_fail_records_message() {
        let mut t = tx(Protocol::Sep31, TransactionKind::Send, PendingReceiver);
        t.fail("bank rejected transfer").unwrap();
        assert_eq!(t.status, Error);
        assert_eq!(t.status_message.as_deref(), Some("bank rejected transfer"));
        assert!(t.fail("again").is_err());
    }

    #[test]
    fn test_awaiting_payment_predicate() {
        let filter = AwaitingPayment::new("GANCHOR", Some("ABC123".to_string()));

        let mut t = tx(Protocol::Sep24, TransactionKind::Withdrawal, PendingUserTransferStart);
        t.receiving_anchor_account = Some("GANCHOR".to_string());
        t.memo = Some("ABC123".to_string());
        assert!(filter.matches(&t));

        t.kind = TransactionKind::Deposit;
        assert!(!filter.matches(&t));

        t.kind = TransactionKind::WithdrawalExchange;
        t.status = PendingAnchor;
        assert!(!filter.matches(&t));

        let mut send = tx(Protocol::Sep31, TransactionKind::Send, PendingSender);
        send.receiving_anchor_account = Some("GANCHOR".to_string());
        send.memo = Some("ABC123".to_string());
        assert!(filter.matches(&send));

        send.memo = Some("OTHER".to_string());
        assert!(!filter.matches(&send));
    }
}
