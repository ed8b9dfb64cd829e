//! Row types as stored in Postgres and their conversion to domain types.
//! Enum columns are TEXT; a value that fails to parse marks the row corrupt.

use chrono::{DateTime, Utc};
use sqlx::types::BigDecimal;
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::{Asset, OffChainAsset, Quote, Transaction};
use crate::ports::{RepositoryError, RepositoryResult};

fn parse_column<T>(table: &str, id: impl std::fmt::Display, column: &str, raw: &str) -> RepositoryResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e| {
        RepositoryError::Corrupt(format!("{} {} column {}: {}", table, id, column, e))
    })
}

#[derive(Debug, FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub kind: String,
    pub protocol: String,
    pub status: String,
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
    pub memo_type: Option<String>,
    pub on_change_callback: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TransactionRow {
    pub fn into_domain(self) -> RepositoryResult<Transaction> {
        let memo_type = self
            .memo_type
            .as_deref()
            .map(|raw| parse_column("transaction", self.id, "memo_type", raw))
            .transpose()?;

        Ok(Transaction {
            id: self.id,
            kind: parse_column("transaction", self.id, "kind", &self.kind)?,
            protocol: parse_column("transaction", self.id, "protocol", &self.protocol)?,
            status: parse_column("transaction", self.id, "status", &self.status)?,
            status_eta: self.status_eta,
            status_message: self.status_message,
            stellar_account: self.stellar_account,
            muxed_account: self.muxed_account,
            account_memo: self.account_memo,
            receiving_anchor_account: self.receiving_anchor_account,
            from_address: self.from_address,
            to_address: self.to_address,
            asset_code: self.asset_code,
            asset_issuer: self.asset_issuer,
            quote_id: self.quote_id,
            amount_in: self.amount_in,
            amount_expected: self.amount_expected,
            amount_out: self.amount_out,
            amount_fee: self.amount_fee,
            fee_asset: self.fee_asset,
            stellar_transaction_id: self.stellar_transaction_id,
            external_transaction_id: self.external_transaction_id,
            paging_token: self.paging_token,
            memo: self.memo,
            memo_type,
            on_change_callback: self.on_change_callback,
            started_at: self.started_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct QuoteRow {
    pub id: Uuid,
    #[sqlx(rename = "type")]
    pub quote_type: String,
    pub stellar_account: String,
    pub sell_asset: String,
    pub buy_asset: String,
    pub sell_amount: Option<BigDecimal>,
    pub buy_amount: Option<BigDecimal>,
    pub price: Option<BigDecimal>,
    pub expires_at: Option<DateTime<Utc>>,
    pub requested_expire_after: Option<DateTime<Utc>>,
    pub sell_delivery_method: Option<String>,
    pub buy_delivery_method: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl QuoteRow {
    pub fn into_domain(self) -> RepositoryResult<Quote> {
        Ok(Quote {
            id: self.id,
            quote_type: parse_column("quote", self.id, "type", &self.quote_type)?,
            stellar_account: self.stellar_account,
            sell_asset: self.sell_asset,
            buy_asset: self.buy_asset,
            sell_amount: self.sell_amount,
            buy_amount: self.buy_amount,
            price: self.price,
            expires_at: self.expires_at,
            requested_expire_after: self.requested_expire_after,
            sell_delivery_method: self.sell_delivery_method,
            buy_delivery_method: self.buy_delivery_method,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct AssetRow {
    pub code: String,
    pub issuer: String,
    pub significant_decimals: i32,
    pub distribution_account: Option<String>,
    pub deposit_fee_fixed: BigDecimal,
    pub deposit_fee_percent: BigDecimal,
    pub withdrawal_fee_fixed: BigDecimal,
    pub withdrawal_fee_percent: BigDecimal,
    pub send_fee_fixed: BigDecimal,
    pub send_fee_percent: BigDecimal,
}

fn decimals(owner: &str, raw: i32) -> RepositoryResult<u32> {
    u32::try_from(raw)
        .map_err(|_| RepositoryError::Corrupt(format!("{} has negative significant_decimals", owner)))
}

impl AssetRow {
    pub fn into_domain(self) -> RepositoryResult<Asset> {
        let significant_decimals =
            decimals(&format!("asset {}:{}", self.code, self.issuer), self.significant_decimals)?;
        Ok(Asset {
            code: self.code,
            issuer: self.issuer,
            significant_decimals,
            distribution_account: self.distribution_account,
            deposit_fee_fixed: self.deposit_fee_fixed,
            deposit_fee_percent: self.deposit_fee_percent,
            withdrawal_fee_fixed: self.withdrawal_fee_fixed,
            withdrawal_fee_percent: self.withdrawal_fee_percent,
            send_fee_fixed: self.send_fee_fixed,
            send_fee_percent: self.send_fee_percent,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct OffChainAssetRow {
    pub scheme: String,
    pub identifier: String,
    pub significant_decimals: i32,
}

impl OffChainAssetRow {
    pub fn into_domain(self) -> RepositoryResult<OffChainAsset> {
        let significant_decimals = decimals(
            &format!("off-chain asset {}:{}", self.scheme, self.identifier),
            self.significant_decimals,
        )?;
        Ok(OffChainAsset {
            scheme: self.scheme,
            identifier: self.identifier,
            significant_decimals,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::{Protocol, TransactionKind, TransactionStatus};

    pub(crate) fn row(status: &str) -> TransactionRow {
        let now = Utc::now();
        TransactionRow {
            id: Uuid::new_v4(),
            kind: "withdrawal".to_string(),
            protocol: "sep24".to_string(),
            status: status.to_string(),
            status_eta: None,
            status_message: None,
            stellar_account: "GUSER".to_string(),
            muxed_account: None,
            account_memo: None,
            receiving_anchor_account: Some("GDIST".to_string()),
            from_address: None,
            to_address: None,
            asset_code: "USD".to_string(),
            asset_issuer: "GISSUER".to_string(),
            quote_id: None,
            amount_in: None,
            amount_expected: None,
            amount_out: None,
            amount_fee: None,
            fee_asset: None,
            stellar_transaction_id: None,
            external_transaction_id: None,
            paging_token: None,
            memo: Some("ABC123".to_string()),
            memo_type: Some("text".to_string()),
            on_change_callback: None,
            started_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    #[test]
    fn test_transaction_row_into_domain() {
        let tx = row("pending_user_transfer_start").into_domain().unwrap();
        assert_eq!(tx.kind, TransactionKind::Withdrawal);
        assert_eq!(tx.protocol, Protocol::Sep24);
        assert_eq!(tx.status, TransactionStatus::PendingUserTransferStart);
    }

    #[test]
    fn test_unknown_status_is_corrupt() {
        let result = row("pending_teleport").into_domain();
        assert!(matches!(result, Err(RepositoryError::Corrupt(msg)) if msg.contains("status")));
    }

    #[test]
    fn test_negative_decimals_is_corrupt() {
        let row = OffChainAssetRow {
            scheme: "iso4217".to_string(),
            identifier: "USD".to_string(),
            significant_decimals: -1,
        };
        assert!(matches!(row.into_domain(), Err(RepositoryError::Corrupt(_))));
    }
}
