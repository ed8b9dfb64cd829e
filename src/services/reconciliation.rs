//! Fee and payout computation for a transaction whose incoming payment has
//! been matched.

use bigdecimal::{BigDecimal, Zero};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::assets::AssetCache;
use crate::domain::{round_amount, Asset, Quote, QuoteDecimals, QuoteType, Transaction};
use crate::error::AppError;
use crate::ports::{FeeIntegration, FeeParams, QuoteRepository, RateIntegration};
use crate::validation::{validate_positive, ValidationError};

/// Outcome of a successful reconciliation. A repriced indicative quote is
/// held here and only stored through [`Reconciler::commit`] once the
/// transaction update that relied on it has been written.
#[derive(Debug, Default)]
pub struct Reconciliation {
    repriced: Option<Quote>,
}

impl Reconciliation {
    pub fn repriced(&self) -> Option<&Quote> {
        self.repriced.as_ref()
    }
}

pub struct Reconciler {
    quotes: Arc<dyn QuoteRepository>,
    rates: Arc<dyn RateIntegration>,
    fees: Arc<dyn FeeIntegration>,
    assets: Arc<AssetCache>,
}

impl Reconciler {
    pub fn new(
        quotes: Arc<dyn QuoteRepository>,
        rates: Arc<dyn RateIntegration>,
        fees: Arc<dyn FeeIntegration>,
        assets: Arc<AssetCache>,
    ) -> Self {
        Self {
            quotes,
            rates,
            fees,
            assets,
        }
    }

    /// Fills `amount_fee` and `amount_out` from the actual `amount_in`.
    ///
    /// An indicative quote is re-priced, a firm quote keeps its price. A
    /// payout below zero is rejected. Nothing on `tx` changes and nothing is
    /// stored when an error is returned.
    pub async fn reconcile(
        &self,
        tx: &mut Transaction,
        asset: &Asset,
    ) -> Result<Reconciliation, AppError> {
        let amount_in = tx
            .amount_in
            .clone()
            .ok_or_else(|| ValidationError::new("amount_in", "must be set before reconciling"))?;

        let fee = asset.round(&self.fees.calculate_fee(&FeeParams {
            kind: tx.kind,
            asset,
            amount: &amount_in,
        }));

        let mut reconciliation = Reconciliation::default();
        let amount_out = match tx.quote_id {
            None => asset.round(&(&amount_in - &fee)),
            Some(quote_id) => {
                let quote = self.quotes.get_by_id(quote_id).await?;
                let decimals = self.quote_decimals(&quote, asset)?;
                let price = match quote.quote_type {
                    QuoteType::Indicative => {
                        let (price, priced) = self.reprice(&quote, &amount_in, decimals).await?;
                        reconciliation.repriced = Some(priced);
                        price
                    }
                    QuoteType::Firm => locked_price(&quote, &amount_in, decimals)?,
                };
                payout(&amount_in, &fee, &price, decimals.buy)
            }
        };

        if amount_out < BigDecimal::zero() {
            return Err(ValidationError::new(
                "amount_out",
                format!("must not be negative (amount_in {}, fee {})", amount_in, fee),
            )
            .into());
        }

        debug!(
            transaction_id = %tx.id,
            amount_in = %amount_in,
            amount_fee = %fee,
            amount_out = %amount_out,
            "Reconciled amounts"
        );

        tx.amount_fee = Some(fee);
        tx.amount_out = Some(amount_out);
        tx.fee_asset = Some(asset.identification());
        Ok(reconciliation)
    }

    /// Stores the quote repriced by a reconciliation whose transaction update
    /// has been committed.
    pub async fn commit(&self, reconciliation: Reconciliation) -> Result<(), AppError> {
        if let Some(quote) = reconciliation.repriced {
            self.quotes.save(&quote).await?;
            debug!(quote_id = %quote.id, "Stored repriced quote");
        }
        Ok(())
    }

    fn quote_decimals(&self, quote: &Quote, asset: &Asset) -> Result<QuoteDecimals, AppError> {
        let buy = self.assets.decimals_for(&quote.buy_asset).ok_or_else(|| {
            ValidationError::new("buy_asset", format!("unknown asset {}", quote.buy_asset))
        })?;
        Ok(QuoteDecimals {
            sell: asset.significant_decimals,
            buy,
        })
    }

    async fn reprice(
        &self,
        quote: &Quote,
        amount_in: &BigDecimal,
        decimals: QuoteDecimals,
    ) -> Result<(BigDecimal, Quote), AppError> {
        let price = self.rates.refresh_price(quote).await?;
        validate_positive("price", &price)?;

        let mut priced = quote.clone();
        priced.buy_amount = Some(round_amount(&(amount_in / &price), decimals.buy));
        priced.sell_amount = Some(amount_in.clone());
        priced.price = Some(price.clone());
        priced.validate_for_settlement(decimals)?;
        Ok((price, priced))
    }
}

fn locked_price(
    quote: &Quote,
    amount_in: &BigDecimal,
    decimals: QuoteDecimals,
) -> Result<BigDecimal, AppError> {
    quote.validate_for_settlement(decimals)?;
    let price = quote
        .price
        .clone()
        .ok_or_else(|| ValidationError::new("price", "must be set"))?;

    if quote.sell_amount.as_ref() != Some(amount_in) {
        warn!(
            quote_id = %quote.id,
            amount_in = %amount_in,
            sell_amount = ?quote.sell_amount.as_ref().map(|a| a.to_string()),
            "Received amount differs from firm quote; keeping the locked price"
        );
    }
    Ok(price)
}

/// Buy-side payout: the sell amount converted at `price`, less the fee
/// converted the same way, each rounded to the buy asset's decimals.
fn payout(amount_in: &BigDecimal, fee: &BigDecimal, price: &BigDecimal, buy_decimals: u32) -> BigDecimal {
    let gross = round_amount(&(amount_in / price), buy_decimals);
    let fee = round_amount(&(fee / price), buy_decimals);
    round_amount(&(gross - fee), buy_decimals)
}
