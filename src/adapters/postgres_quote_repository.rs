//! Postgres implementation of QuoteRepository.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::QuoteRow;
use crate::domain::Quote;
use crate::ports::{QuoteRepository, RepositoryError, RepositoryResult};

#[derive(Clone)]
pub struct PostgresQuoteRepository {
    pool: PgPool,
}

impl PostgresQuoteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuoteRepository for PostgresQuoteRepository {
    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Quote> {
        let row = sqlx::query_as::<_, QuoteRow>("SELECT * FROM quotes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        row.ok_or_else(|| RepositoryError::NotFound(id.to_string()))?
            .into_domain()
    }

    async fn save(&self, quote: &Quote) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO quotes (
                id, type, stellar_account, sell_asset, buy_asset, sell_amount, buy_amount,
                price, expires_at, requested_expire_after, sell_delivery_method,
                buy_delivery_method, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE SET
                sell_amount = EXCLUDED.sell_amount,
                buy_amount = EXCLUDED.buy_amount,
                price = EXCLUDED.price,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(quote.id)
        .bind(quote.quote_type.as_str())
        .bind(&quote.stellar_account)
        .bind(&quote.sell_asset)
        .bind(&quote.buy_asset)
        .bind(&quote.sell_amount)
        .bind(&quote.buy_amount)
        .bind(&quote.price)
        .bind(quote.expires_at)
        .bind(quote.requested_expire_after)
        .bind(&quote.sell_delivery_method)
        .bind(&quote.buy_delivery_method)
        .bind(quote.created_at)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(())
    }
}
