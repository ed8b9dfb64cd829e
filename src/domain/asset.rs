use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};

use super::transaction::TransactionKind;

/// Rounds half-up to `decimals` fractional digits and pins the scale, so the
/// result always carries exactly `decimals` digits after the point.
pub fn round_amount(value: &BigDecimal, decimals: u32) -> BigDecimal {
    let scale = i64::from(decimals);
    value.round(scale).with_scale(scale)
}

/// On-chain asset definition. Owned by configuration tooling; read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub code: String,
    pub issuer: String,
    pub significant_decimals: u32,
    pub distribution_account: Option<String>,
    pub deposit_fee_fixed: BigDecimal,
    pub deposit_fee_percent: BigDecimal,
    pub withdrawal_fee_fixed: BigDecimal,
    pub withdrawal_fee_percent: BigDecimal,
    pub send_fee_fixed: BigDecimal,
    pub send_fee_percent: BigDecimal,
}

impl Asset {
    pub fn new(code: &str, issuer: &str, significant_decimals: u32) -> Self {
        Self {
            code: code.to_string(),
            issuer: issuer.to_string(),
            significant_decimals,
            distribution_account: None,
            deposit_fee_fixed: BigDecimal::zero(),
            deposit_fee_percent: BigDecimal::zero(),
            withdrawal_fee_fixed: BigDecimal::zero(),
            withdrawal_fee_percent: BigDecimal::zero(),
            send_fee_fixed: BigDecimal::zero(),
            send_fee_percent: BigDecimal::zero(),
        }
    }

    /// SEP-38 asset identification string, e.g. `stellar:USDC:GA5Z...`.
    pub fn identification(&self) -> String {
        format!("stellar:{}:{}", self.code, self.issuer)
    }

    pub fn round(&self, value: &BigDecimal) -> BigDecimal {
        round_amount(value, self.significant_decimals)
    }

    /// Fixed and percentage fee that apply to `kind`.
    pub fn fee_schedule(&self, kind: TransactionKind) -> (&BigDecimal, &BigDecimal) {
        match kind {
            TransactionKind::Deposit | TransactionKind::DepositExchange => {
                (&self.deposit_fee_fixed, &self.deposit_fee_percent)
            }
            TransactionKind::Withdrawal | TransactionKind::WithdrawalExchange => {
                (&self.withdrawal_fee_fixed, &self.withdrawal_fee_percent)
            }
            TransactionKind::Send => (&self.send_fee_fixed, &self.send_fee_percent),
        }
    }
}

/// Off-chain asset a quote can price against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffChainAsset {
    pub scheme: String,
    pub identifier: String,
    pub significant_decimals: u32,
}

impl OffChainAsset {
    pub fn identification(&self) -> String {
        format!("{}:{}", self.scheme, self.identifier)
    }
}
