//! Exchange quotes between a Stellar asset and an off-chain asset.

use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::asset::round_amount;
use super::transaction::UnknownVariant;
use crate::validation::{
    parse_asset_identification, validate_positive, validate_significant_decimals,
    ValidationError, ValidationResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteType {
    Firm,
    Indicative,
}

impl QuoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteType::Firm => "firm",
            QuoteType::Indicative => "indicative",
        }
    }
}

impl fmt::Display for QuoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuoteType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "firm" => Ok(QuoteType::Firm),
            "indicative" => Ok(QuoteType::Indicative),
            other => Err(UnknownVariant::new("quote type", other)),
        }
    }
}

/// Significant decimals of the two assets a quote prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteDecimals {
    pub sell: u32,
    pub buy: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub id: Uuid,
    pub quote_type: QuoteType,
    pub stellar_account: String,
    pub sell_asset: String,
    pub buy_asset: String,
    pub sell_amount: Option<BigDecimal>,
    pub buy_amount: Option<BigDecimal>,
    /// Units of sell asset per unit of buy asset.
    pub price: Option<BigDecimal>,
    pub expires_at: Option<DateTime<Utc>>,
    pub requested_expire_after: Option<DateTime<Utc>>,
    pub sell_delivery_method: Option<String>,
    pub buy_delivery_method: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Quote {
    pub fn new(
        quote_type: QuoteType,
        stellar_account: String,
        sell_asset: String,
        buy_asset: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            quote_type,
            stellar_account,
            sell_asset,
            buy_asset,
            sell_amount: None,
            buy_amount: None,
            price: None,
            expires_at: None,
            requested_expire_after: None,
            sell_delivery_method: None,
            buy_delivery_method: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_firm(&self) -> bool {
        self.quote_type == QuoteType::Firm
    }

    /// Checks a quote returned by the anchor's pricing integration before it
    /// is stored: the client fixed exactly one side, the anchor priced it.
    pub fn validate_for_creation(&self, now: DateTime<Utc>, decimals: QuoteDecimals) -> ValidationResult {
        self.validate_common(decimals)?;

        if self.sell_amount.is_some() == self.buy_amount.is_some() {
            return Err(ValidationError::new(
                "sell_amount",
                "exactly one of sell_amount or buy_amount must be set",
            ));
        }

        match self.expires_at {
            Some(expires_at) => {
                if expires_at <= now {
                    return Err(ValidationError::new("expires_at", "must be in the future"));
                }
                if let Some(expire_after) = self.requested_expire_after {
                    if expires_at < expire_after {
                        return Err(ValidationError::new(
                            "expires_at",
                            "must not be earlier than the requested expire_after",
                        ));
                    }
                }
            }
            None if self.is_firm() => {
                return Err(ValidationError::new("expires_at", "firm quotes must expire"));
            }
            None => {}
        }

        Ok(())
    }

    /// Checks a quote after settlement amounts were filled in from the
    /// actual ledger payment.
    pub fn validate_for_settlement(&self, decimals: QuoteDecimals) -> ValidationResult {
        self.validate_common(decimals)?;

        let (Some(sell_amount), Some(buy_amount), Some(price)) =
            (&self.sell_amount, &self.buy_amount, &self.price)
        else {
            return Err(ValidationError::new(
                "buy_amount",
                "sell_amount and buy_amount must both be set",
            ));
        };

        if &round_amount(&(sell_amount / price), decimals.buy) != buy_amount {
            return Err(ValidationError::new(
                "buy_amount",
                "does not equal sell_amount / price",
            ));
        }

        Ok(())
    }

    fn validate_common(&self, decimals: QuoteDecimals) -> ValidationResult {
        match &self.price {
            Some(price) => validate_positive("price", price)?,
            None => return Err(ValidationError::new("price", "must be set")),
        }

        let sell = parse_asset_identification("sell_asset", &self.sell_asset)?;
        let buy = parse_asset_identification("buy_asset", &self.buy_asset)?;
        if sell.is_stellar() == buy.is_stellar() {
            return Err(ValidationError::new(
                "sell_asset",
                "exactly one of sell_asset or buy_asset must be a stellar asset",
            ));
        }

        if self.sell_delivery_method.is_some() == self.buy_delivery_method.is_some() {
            return Err(ValidationError::new(
                "buy_delivery_method",
                "exactly one of buy_delivery_method or sell_delivery_method must be set",
            ));
        }

        if let Some(amount) = &self.sell_amount {
            validate_positive("sell_amount", amount)?;
            validate_significant_decimals("sell_amount", amount, decimals.sell)?;
        }
        if let Some(amount) = &self.buy_amount {
            validate_positive("buy_amount", amount)?;
            validate_significant_decimals("buy_amount", amount, decimals.buy)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const ISSUER: &str = "GA5ZSEJYB37JRC5AVCIA5MOP4RHTM335X2KGX3IHOJAPP5RE34K4KZVN";
    const DECIMALS: QuoteDecimals = QuoteDecimals { sell: 2, buy: 2 };

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn firm_quote() -> Quote {
        let mut quote = Quote::new(
            QuoteType::Firm,
            "GUSER".to_string(),
            format!("stellar:USDC:{}", ISSUER),
            "iso4217:BRL".to_string(),
        );
        quote.sell_amount = Some(dec("100"));
        quote.price = Some(dec("0.20"));
        quote.expires_at = Some(Utc::now() + Duration::minutes(10));
        quote.buy_delivery_method = Some("PIX".to_string());
        quote
    }

    #[test]
    fn test_valid_firm_quote() {
        assert!(firm_quote().validate_for_creation(Utc::now(), DECIMALS).is_ok());
    }

    #[test]
    fn test_both_or_neither_amount_fails() {
        let mut quote = firm_quote();
        quote.buy_amount = Some(dec("500"));
        assert!(quote.validate_for_creation(Utc::now(), DECIMALS).is_err());

        quote.buy_amount = None;
        quote.sell_amount = None;
        assert!(quote.validate_for_creation(Utc::now(), DECIMALS).is_err());
    }

    #[test]
    fn test_exactly_one_stellar_asset() {
        let mut quote = firm_quote();
        quote.buy_asset = format!("stellar:EURC:{}", ISSUER);
        let err = quote.validate_for_creation(Utc::now(), DECIMALS).unwrap_err();
        assert_eq!(err.field, "sell_asset");

        quote.sell_asset = "iso4217:USD".to_string();
        quote.buy_asset = "iso4217:BRL".to_string();
        assert!(quote.validate_for_creation(Utc::now(), DECIMALS).is_err());
    }

    #[test]
    fn test_price_must_be_positive() {
        let mut quote = firm_quote();
        quote.price = Some(dec("0"));
        let err = quote.validate_for_creation(Utc::now(), DECIMALS).unwrap_err();
        assert_eq!(err.field, "price");

        quote.price = None;
        assert!(quote.validate_for_creation(Utc::now(), DECIMALS).is_err());
    }

    #[test]
    fn test_amount_rounding_enforced() {
        let mut quote = firm_quote();
        quote.sell_amount = Some(dec("100.001"));
        let err = quote.validate_for_creation(Utc::now(), DECIMALS).unwrap_err();
        assert_eq!(err.field, "sell_amount");
    }

    #[test]
    fn test_expiration_rules() {
        let now = Utc::now();
        let mut quote = firm_quote();
        quote.expires_at = Some(now - Duration::seconds(1));
        assert!(quote.validate_for_creation(now, DECIMALS).is_err());

        quote.expires_at = Some(now + Duration::minutes(5));
        quote.requested_expire_after = Some(now + Duration::minutes(10));
        assert!(quote.validate_for_creation(now, DECIMALS).is_err());

        quote.expires_at = None;
        quote.requested_expire_after = None;
        assert!(quote.validate_for_creation(now, DECIMALS).is_err());

        quote.quote_type = QuoteType::Indicative;
        assert!(quote.validate_for_creation(now, DECIMALS).is_ok());
    }

    #[test]
    fn test_exactly_one_delivery_method() {
        let mut quote = firm_quote();
        quote.sell_delivery_method = Some("WIRE".to_string());
        assert!(quote.validate_for_creation(Utc::now(), DECIMALS).is_err());

        quote.sell_delivery_method = None;
        quote.buy_delivery_method = None;
        assert!(quote.validate_for_creation(Utc::now(), DECIMALS).is_err());
    }

    #[test]
    fn test_settlement_requires_consistent_amounts() {
        let mut quote = firm_quote();
        quote.buy_amount = Some(dec("500.00"));
        assert!(quote.validate_for_settlement(DECIMALS).is_ok());

        quote.buy_amount = Some(dec("499.99"));
        assert!(quote.validate_for_settlement(DECIMALS).is_err());

        quote.buy_amount = None;
        assert!(quote.validate_for_settlement(DECIMALS).is_err());
    }
}
