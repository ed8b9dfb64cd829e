//! Ledger-side view of a Stellar transaction and payment extraction.
//!
//! Operations are a tagged union; each payment-like variant has its own rule
//! for where the delivered amount comes from.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use super::asset::Asset;

/// Stellar amounts are 64-bit integers with seven implied decimal places.
pub const AMOUNT_SCALE: i64 = 7;

pub fn stroops_to_decimal(stroops: i64) -> BigDecimal {
    BigDecimal::new(stroops.into(), AMOUNT_SCALE)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerAsset {
    Native,
    Credit { code: String, issuer: String },
}

impl LedgerAsset {
    pub fn credit(code: &str, issuer: &str) -> Self {
        LedgerAsset::Credit {
            code: code.to_string(),
            issuer: issuer.to_string(),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            LedgerAsset::Native => "XLM",
            LedgerAsset::Credit { code, .. } => code,
        }
    }

    pub fn issuer(&self) -> Option<&str> {
        match self {
            LedgerAsset::Native => None,
            LedgerAsset::Credit { issuer, .. } => Some(issuer),
        }
    }

    pub fn is(&self, asset: &Asset) -> bool {
        self.code() == asset.code && self.issuer() == Some(asset.issuer.as_str())
    }
}

/// Operation request as submitted in the transaction envelope. Accounts are
/// base `G...` addresses; amounts are in stroops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationBody {
    Payment {
        destination: String,
        asset: LedgerAsset,
        amount: i64,
    },
    PathPaymentStrictReceive {
        destination: String,
        dest_asset: LedgerAsset,
        dest_amount: i64,
    },
    PathPaymentStrictSend {
        destination: String,
        dest_asset: LedgerAsset,
        dest_min: i64,
    },
    Other,
}

/// Per-operation outcome taken from the transaction result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationResult {
    Success,
    /// Strict-send success carries the amount actually delivered (`last.amount`).
    PathPaymentStrictSendSuccess { delivered: i64 },
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerOperation {
    /// Operation-level source, muxed form when the source was muxed.
    pub source: Option<String>,
    pub body: OperationBody,
    pub result: OperationResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentData {
    pub destination: String,
    pub asset: LedgerAsset,
    pub amount: BigDecimal,
}

/// Extracts the payment an operation delivered, if it is a payment at all.
///
/// Strict-send requests only state a minimum; the delivered amount is read
/// from the result. A strict-send whose result carries no delivery is not a
/// payment, and neither is any operation that failed.
pub fn extract_payment(body: &OperationBody, result: &OperationResult) -> Option<PaymentData> {
    if *result == OperationResult::Failed {
        return None;
    }
    match body {
        OperationBody::Payment {
            destination,
            asset,
            amount,
        } => Some(PaymentData {
            destination: destination.clone(),
            asset: asset.clone(),
            amount: stroops_to_decimal(*amount),
        }),
        OperationBody::PathPaymentStrictReceive {
            destination,
            dest_asset,
            dest_amount,
        } => Some(PaymentData {
            destination: destination.clone(),
            asset: dest_asset.clone(),
            amount: stroops_to_decimal(*dest_amount),
        }),
        OperationBody::PathPaymentStrictSend {
            destination,
            dest_asset,
            ..
        } => match result {
            OperationResult::PathPaymentStrictSendSuccess { delivered } => Some(PaymentData {
                destination: destination.clone(),
                asset: dest_asset.clone(),
                amount: stroops_to_decimal(*delivered),
            }),
            _ => None,
        },
        OperationBody::Other => None,
    }
}

/// A transaction as delivered by the ledger stream for a watched account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: String,
    pub paging_token: String,
    pub successful: bool,
    /// Transaction-level source, muxed form when the source was muxed.
    pub source_account: String,
    pub memo: Option<String>,
    pub operations: Vec<LedgerOperation>,
}

/// The payment in a ledger transaction that settles a given transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedPayment {
    pub operation_index: usize,
    pub source: String,
    pub payment: PaymentData,
}

impl LedgerTransaction {
    /// First operation paying `asset` to `destination`. Later operations are
    /// not inspected once one matches.
    pub fn find_payment_to(&self, destination: &str, asset: &Asset) -> Option<MatchedPayment> {
        self.operations
            .iter()
            .enumerate()
            .find_map(|(index, op)| {
                extract_payment(&op.body, &op.result)
                    .filter(|p| p.destination == destination && p.asset.is(asset))
                    .map(|payment| MatchedPayment {
                        operation_index: index,
                        source: op
                            .source
                            .clone()
                            .unwrap_or_else(|| self.source_account.clone()),
                        payment,
                    })
            })
    }
}
