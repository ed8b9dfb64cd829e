use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::domain::{Asset, OffChainAsset, QuoteDecimals};
use crate::ports::{AssetRepository, RepositoryResult};

#[derive(Debug, Default)]
struct Snapshot {
    assets: HashMap<String, Asset>,
    off_chain: HashMap<String, OffChainAsset>,
}

pub struct AssetCache {
    inner: ArcSwap<Snapshot>,
}

fn asset_key(code: &str, issuer: &str) -> String {
    format!("{}:{}", code, issuer)
}

impl AssetCache {
    pub fn from_assets(assets: Vec<Asset>, off_chain: Vec<OffChainAsset>) -> Self {
        AssetCache {
            inner: ArcSwap::from_pointee(snapshot(assets, off_chain)),
        }
    }

    /// Loads assets once and keeps them fresh from a background task.
    pub async fn start(
        repo: Arc<dyn AssetRepository>,
        refresh_interval: Duration,
    ) -> RepositoryResult<Arc<Self>> {
        let cache = Arc::new(AssetCache::from_assets(Vec::new(), Vec::new()));
        cache.reload_once(repo.as_ref()).await?;

        let cache_clone = cache.clone();
        tokio::spawn(async move {
            loop {
                sleep(refresh_interval).await;
                if let Err(e) = cache_clone.reload_once(repo.as_ref()).await {
                    tracing::warn!(error = %e, "Asset refresh failed, keeping previous snapshot");
                }
            }
        });

        Ok(cache)
    }

    pub async fn reload_once(&self, repo: &dyn AssetRepository) -> RepositoryResult<()> {
        let assets = repo.fetch_assets().await?;
        let off_chain = repo.fetch_off_chain_assets().await?;
        tracing::debug!(
            assets = assets.len(),
            off_chain = off_chain.len(),
            "Asset cache reloaded"
        );
        self.inner.store(Arc::new(snapshot(assets, off_chain)));
        Ok(())
    }

    pub fn get(&self, code: &str, issuer: &str) -> Option<Asset> {
        self.inner.load().assets.get(&asset_key(code, issuer)).cloned()
    }

    pub fn get_off_chain(&self, identification: &str) -> Option<OffChainAsset> {
        self.inner.load().off_chain.get(identification).cloned()
    }

    /// Significant decimals for either an on-chain (`stellar:CODE:ISSUER`) or
    /// off-chain (`iso4217:CCY`) identification.
    pub fn decimals_for(&self, identification: &str) -> Option<u32> {
        let snapshot = self.inner.load();
        if let Some(rest) = identification.strip_prefix("stellar:") {
            let (code, issuer) = rest.split_once(':')?;
            return snapshot
                .assets
                .get(&asset_key(code, issuer))
                .map(|a| a.significant_decimals);
        }
        snapshot
            .off_chain
            .get(identification)
            .map(|a| a.significant_decimals)
    }

    pub fn quote_decimals(&self, sell_asset: &str, buy_asset: &str) -> Option<QuoteDecimals> {
        Some(QuoteDecimals {
            sell: self.decimals_for(sell_asset)?,
            buy: self.decimals_for(buy_asset)?,
        })
    }

    /// Distribution accounts of every on-chain asset, deduplicated.
    pub fn distribution_accounts(&self) -> Vec<String> {
        let mut accounts: Vec<String> = self
            .inner
            .load()
            .assets
            .values()
            .filter_map(|a| a.distribution_account.clone())
            .collect();
        accounts.sort();
        accounts.dedup();
        accounts
    }
}

fn snapshot(assets: Vec<Asset>, off_chain: Vec<OffChainAsset>) -> Snapshot {
    Snapshot {
        assets: assets
            .into_iter()
            .map(|a| (asset_key(&a.code, &a.issuer), a))
            .collect(),
        off_chain: off_chain
            .into_iter()
            .map(|a| (a.identification(), a))
            .collect(),
    }
}
