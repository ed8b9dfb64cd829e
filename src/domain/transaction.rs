//! Transaction domain entity.
//! Framework-agnostic representation of an anchor transaction as tracked by the
//! reconciliation core.

use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::asset::Asset;
use super::status::TransactionStatus;
use crate::validation::ValidationError;

/// Returned when a stored string does not name a known enum variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Send,
    DepositExchange,
    WithdrawalExchange,
}

impl TransactionKind {
    pub const ALL: [TransactionKind; 5] = [
        TransactionKind::Deposit,
        TransactionKind::Withdrawal,
        TransactionKind::Send,
        TransactionKind::DepositExchange,
        TransactionKind::WithdrawalExchange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::Send => "send",
            TransactionKind::DepositExchange => "deposit-exchange",
            TransactionKind::WithdrawalExchange => "withdrawal-exchange",
        }
    }

    /// Kinds where the user pays the anchor on-chain.
    pub fn is_incoming_on_chain(&self) -> bool {
        matches!(
            self,
            TransactionKind::Withdrawal | TransactionKind::WithdrawalExchange | TransactionKind::Send
        )
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("kind", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Sep6,
    Sep24,
    Sep31,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Sep6 => "sep6",
            Protocol::Sep24 => "sep24",
            Protocol::Sep31 => "sep31",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sep6" => Ok(Protocol::Sep6),
            "sep24" => Ok(Protocol::Sep24),
            "sep31" => Ok(Protocol::Sep31),
            other => Err(UnknownVariant::new("protocol", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoType {
    Text,
    Id,
    Hash,
}

impl MemoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoType::Text => "text",
            MemoType::Id => "id",
            MemoType::Hash => "hash",
        }
    }
}

impl FromStr for MemoType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MemoType::Text),
            "id" => Ok(MemoType::Id),
            "hash" => Ok(MemoType::Hash),
            other => Err(UnknownVariant::new("memo_type", other)),
        }
    }
}

/// Domain entity representing an anchor transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub kind: TransactionKind,
    pub protocol: Protocol,
    pub status: TransactionStatus,
    pub status_eta: Option<i64>,
    pub status_message: Option<String>,
    pub stellar_account: String,
    pub muxed_account: Option<String>,
    pub account_memo: Option<String>,
    pub receiving_anchor_account: Option<String>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub asset_code: String,
    pub asset_issuer: String,
    pub quote_id: Option<Uuid>,
    pub amount_in: Option<BigDecimal>,
    pub amount_expected: Option<BigDecimal>,
    pub amount_out: Option<BigDecimal>,
    pub amount_fee: Option<BigDecimal>,
    pub fee_asset: Option<String>,
    pub stellar_transaction_id: Option<String>,
    pub external_transaction_id: Option<String>,
    pub paging_token: Option<String>,
    pub memo: Option<String>,
    pub memo_type: Option<MemoType>,
    pub on_change_callback: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Creates a transaction in the protocol's initial status.
    pub fn new(
        protocol: Protocol,
        kind: TransactionKind,
        asset: &Asset,
        stellar_account: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            protocol,
            status: TransactionStatus::initial(protocol),
            status_eta: None,
            status_message: None,
            stellar_account,
            muxed_account: None,
            account_memo: None,
            receiving_anchor_account: None,
            from_address: None,
            to_address: None,
            asset_code: asset.code.clone(),
            asset_issuer: asset.issuer.clone(),
            quote_id: None,
            amount_in: None,
            amount_expected: None,
            amount_out: None,
            amount_fee: None,
            fee_asset: None,
            stellar_transaction_id: None,
            external_transaction_id: None,
            paging_token: None,
            memo: None,
            memo_type: None,
            on_change_callback: None,
            started_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_sep31(&self) -> bool {
        self.protocol == Protocol::Sep31
    }

    /// A transaction identifies its user either by muxed account or by
    /// account memo, never both.
    pub fn check_account_fields(&self) -> Result<(), ValidationError> {
        if self.muxed_account.is_some() && self.account_memo.is_some() {
            return Err(ValidationError::new(
                "muxed_account",
                "must not be set together with account_memo",
            ));
        }
        Ok(())
    }

    /// Marks the record as being in the pending-user-transfer state with the
    /// memo and account the user was told to pay.
    pub fn awaiting_payment_to(mut self, receiving_account: &str, memo: Option<&str>) -> Self {
        self.status = TransactionStatus::awaiting_payment(self.protocol);
        self.receiving_anchor_account = Some(receiving_account.to_string());
        self.memo = memo.map(str::to_string);
        self.memo_type = memo.map(|_| MemoType::Text);
        self
    }
}
