//! Postgres implementation of AssetRepository.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::models::{AssetRow, OffChainAssetRow};
use crate::domain::{Asset, OffChainAsset};
use crate::ports::{AssetRepository, RepositoryError, RepositoryResult};

#[derive(Clone)]
pub struct PostgresAssetRepository {
    pool: PgPool,
}

impl PostgresAssetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssetRepository for PostgresAssetRepository {
    async fn fetch_assets(&self) -> RepositoryResult<Vec<Asset>> {
        let rows = sqlx::query_as::<_, AssetRow>("SELECT * FROM assets ORDER BY code, issuer")
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        rows.into_iter().map(AssetRow::into_domain).collect()
    }

    async fn fetch_off_chain_assets(&self) -> RepositoryResult<Vec<OffChainAsset>> {
        let rows = sqlx::query_as::<_, OffChainAssetRow>(
            "SELECT * FROM off_chain_assets ORDER BY scheme, identifier",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        rows.into_iter().map(OffChainAssetRow::into_domain).collect()
    }
}
