//! Postgres implementation of TransactionRepository.

use async_trait::async_trait;
use sqlx::postgres::PgArguments;
use sqlx::query::QueryAs;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::db::models::TransactionRow;
use crate::domain::{AwaitingPayment, Transaction, TransactionKind, TransactionStatus};
use crate::ports::{RepositoryError, RepositoryResult, TransactionRepository};

/// Postgres-backed transaction repository.
#[derive(Clone)]
pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn kind_names(kinds: &[TransactionKind]) -> Vec<String> {
    kinds.iter().map(|k| k.as_str().to_string()).collect()
}

/// `WHERE` clause for the awaiting-payment rules, with placeholders numbered
/// from `$3` (`$1` is the account, `$2` the memo).
fn awaiting_payment_clause(filter: &AwaitingPayment) -> String {
    let rules = filter
        .rules()
        .iter()
        .enumerate()
        .map(|(i, _)| format!("(status = ${} AND kind = ANY(${}))", 3 + i * 2, 4 + i * 2))
        .collect::<Vec<_>>()
        .join(" OR ");
    format!(
        "receiving_anchor_account = $1 AND memo IS NOT DISTINCT FROM $2 AND ({})",
        rules
    )
}

/// Converts fetched rows, dropping any that no longer parse so one bad record
/// cannot block every other transaction behind the same query.
fn rows_into_domain(rows: Vec<TransactionRow>) -> Vec<Transaction> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.id;
            match row.into_domain() {
                Ok(tx) => Some(tx),
                Err(e) => {
                    tracing::error!(transaction_id = %id, error = %e, "Skipping corrupt transaction row");
                    None
                }
            }
        })
        .collect()
}

fn bind_mutable<'q>(
    query: QueryAs<'q, Postgres, TransactionRow, PgArguments>,
    tx: &'q Transaction,
) -> QueryAs<'q, Postgres, TransactionRow, PgArguments> {
    query
        .bind(tx.status.as_str())
        .bind(tx.status_eta)
        .bind(&tx.status_message)
        .bind(&tx.receiving_anchor_account)
        .bind(&tx.from_address)
        .bind(&tx.to_address)
        .bind(tx.quote_id)
        .bind(&tx.amount_in)
        .bind(&tx.amount_expected)
        .bind(&tx.amount_out)
        .bind(&tx.amount_fee)
        .bind(&tx.fee_asset)
        .bind(&tx.stellar_transaction_id)
        .bind(&tx.external_transaction_id)
        .bind(&tx.paging_token)
        .bind(&tx.memo)
        .bind(tx.memo_type.as_ref().map(|m| m.as_str()))
        .bind(tx.updated_at)
        .bind(tx.completed_at)
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        tx.check_account_fields()
            .map_err(|e| RepositoryError::Corrupt(e.to_string()))?;

        let query = sqlx::query_as::<_, TransactionRow>(
            r#"
            INSERT INTO transactions (
                status, status_eta, status_message, receiving_anchor_account,
                from_address, to_address, quote_id, amount_in, amount_expected,
                amount_out, amount_fee, fee_asset, stellar_transaction_id,
                external_transaction_id, paging_token, memo, memo_type,
                updated_at, completed_at,
                id, kind, protocol, stellar_account, muxed_account, account_memo,
                asset_code, asset_issuer, on_change_callback, started_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29
            )
            RETURNING *
            "#,
        );

        let row = bind_mutable(query, tx)
            .bind(tx.id)
            .bind(tx.kind.as_str())
            .bind(tx.protocol.as_str())
            .bind(&tx.stellar_account)
            .bind(&tx.muxed_account)
            .bind(&tx.account_memo)
            .bind(&tx.asset_code)
            .bind(&tx.asset_issuer)
            .bind(&tx.on_change_callback)
            .bind(tx.started_at)
            .fetch_one(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        row.into_domain()
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>("SELECT * FROM transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        row.ok_or_else(|| RepositoryError::NotFound(id.to_string()))?
            .into_domain()
    }

    async fn find_awaiting_payment(
        &self,
        filter: &AwaitingPayment,
    ) -> RepositoryResult<Vec<Transaction>> {
        let sql = format!(
            "SELECT * FROM transactions WHERE {} ORDER BY started_at ASC, id ASC",
            awaiting_payment_clause(filter)
        );

        let mut query = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(&filter.receiving_account)
            .bind(&filter.memo);
        for (status, kinds) in filter.rules() {
            query = query.bind(status.as_str()).bind(kind_names(kinds));
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(rows_into_domain(rows))
    }

    async fn find_by_status(
        &self,
        statuses: &[TransactionStatus],
        kinds: &[TransactionKind],
    ) -> RepositoryResult<Vec<Transaction>> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();

        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT * FROM transactions
            WHERE status = ANY($1) AND kind = ANY($2)
            ORDER BY started_at ASC, id ASC
            "#,
        )
        .bind(statuses)
        .bind(kind_names(kinds))
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(rows_into_domain(rows))
    }

    async fn update_if_status(
        &self,
        tx: &Transaction,
        expected: TransactionStatus,
    ) -> RepositoryResult<bool> {
        let query = sqlx::query_as::<_, TransactionRow>(
            r#"
            UPDATE transactions SET
                status = $1, status_eta = $2, status_message = $3,
                receiving_anchor_account = $4, from_address = $5, to_address = $6,
                quote_id = $7, amount_in = $8, amount_expected = $9, amount_out = $10,
                amount_fee = $11, fee_asset = $12, stellar_transaction_id = $13,
                external_transaction_id = $14, paging_token = $15, memo = $16,
                memo_type = $17, updated_at = $18, completed_at = $19
            WHERE id = $20 AND status = $21
            RETURNING *
            "#,
        );

        let updated = bind_mutable(query, tx)
            .bind(tx.id)
            .bind(expected.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        Ok(updated.is_some())
    }

    async fn latest_paging_token(&self, account: &str) -> RepositoryResult<Option<String>> {
        // Paging tokens are decimal integers; comparing by length first keeps
        // the text ordering numeric.
        let token: Option<String> = sqlx::query_scalar(
            r#"
            SELECT paging_token FROM transactions
            WHERE receiving_anchor_account = $1 AND paging_token IS NOT NULL
            ORDER BY length(paging_token) DESC, paging_token DESC
            LIMIT 1
            "#,
        )
        .bind(account)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(token)
    }

    async fn reset_paging_tokens(&self) -> RepositoryResult<u64> {
        let result = sqlx::query(
            "UPDATE transactions SET paging_token = NULL WHERE paging_token IS NOT NULL",
        )
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(result.rows_affected())
    }
}
