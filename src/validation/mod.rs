use bigdecimal::{BigDecimal, Zero};
use std::fmt;

use crate::domain::round_amount;

pub const STELLAR_ACCOUNT_LEN: usize = 56;
pub const ASSET_CODE_MAX_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

/// Checks the shape of a `G...` account strkey (no checksum verification).
pub fn validate_stellar_address(field: &'static str, stellar_address: &str) -> ValidationResult {
    let stellar_address = stellar_address.trim();
    validate_required(field, stellar_address)?;

    if stellar_address.len() != STELLAR_ACCOUNT_LEN {
        return Err(ValidationError::new(
            field,
            format!("must be exactly {} characters", STELLAR_ACCOUNT_LEN),
        ));
    }

    if !stellar_address.starts_with('G') {
        return Err(ValidationError::new(field, "must start with 'G'"));
    }

    if !stellar_address
        .chars()
        .all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit())
    {
        return Err(ValidationError::new(
            field,
            "must contain only uppercase letters and digits",
        ));
    }

    Ok(())
}

pub fn validate_positive(field: &'static str, amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::zero() {
        return Err(ValidationError::new(field, "must be greater than zero"));
    }

    Ok(())
}

pub fn validate_significant_decimals(
    field: &'static str,
    amount: &BigDecimal,
    decimals: u32,
) -> ValidationResult {
    if &round_amount(amount, decimals) != amount {
        return Err(ValidationError::new(
            field,
            format!("must have at most {} decimal places", decimals),
        ));
    }

    Ok(())
}

/// Parsed SEP-38 asset identification string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetIdentification {
    Stellar { code: String, issuer: Option<String> },
    OffChain { scheme: String, identifier: String },
}

impl AssetIdentification {
    pub fn is_stellar(&self) -> bool {
        matches!(self, AssetIdentification::Stellar { .. })
    }
}

/// Accepts `stellar:native`, `stellar:CODE:ISSUER` and `iso4217:CCY`.
pub fn parse_asset_identification(
    field: &'static str,
    value: &str,
) -> Result<AssetIdentification, ValidationError> {
    let parts: Vec<&str> = value.split(':').collect();
    match parts.as_slice() {
        ["stellar", "native"] => Ok(AssetIdentification::Stellar {
            code: "native".to_string(),
            issuer: None,
        }),
        ["stellar", code, issuer] => {
            validate_required(field, code)?;
            if code.len() > ASSET_CODE_MAX_LEN {
                return Err(ValidationError::new(
                    field,
                    format!("asset code must be at most {} characters", ASSET_CODE_MAX_LEN),
                ));
            }
            validate_stellar_address(field, issuer)?;
            Ok(AssetIdentification::Stellar {
                code: code.to_string(),
                issuer: Some(issuer.to_string()),
            })
        }
        ["iso4217", identifier] if identifier.len() == 3 => Ok(AssetIdentification::OffChain {
            scheme: "iso4217".to_string(),
            identifier: identifier.to_string(),
        }),
        _ => Err(ValidationError::new(
            field,
            format!("'{}' is not a recognized asset identification", value),
        )),
    }
}
