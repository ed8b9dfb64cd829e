//! Decoding of Horizon transaction records into [`LedgerTransaction`]s.
//!
//! Destinations are reported as base `G...` accounts so they compare against
//! the watched distribution account; sources keep their muxed `M...` form.

use stellar_xdr::curr as xdr;
use stellar_xdr::curr::{Limits, ReadXdr};

use super::client::{HorizonError, TransactionRecord};
use crate::domain::{LedgerAsset, LedgerOperation, LedgerTransaction, OperationBody, OperationResult};

pub fn decode_transaction(record: &TransactionRecord) -> Result<LedgerTransaction, HorizonError> {
    let envelope = xdr::TransactionEnvelope::from_xdr_base64(&record.envelope_xdr, Limits::none())?;
    let result = xdr::TransactionResult::from_xdr_base64(&record.result_xdr, Limits::none())?;

    let (source_account, operations) = envelope_parts(&envelope);
    let results = operation_results(&result);

    let operations = operations
        .iter()
        .enumerate()
        .map(|(index, op)| LedgerOperation {
            source: op.source_account.as_ref().map(muxed_account),
            body: operation_body(&op.body),
            result: operation_result(results.get(index)),
        })
        .collect();

    Ok(LedgerTransaction {
        id: record.id.clone(),
        paging_token: record.paging_token.clone(),
        successful: record.successful,
        source_account,
        memo: record.memo.clone(),
        operations,
    })
}

fn envelope_parts(envelope: &xdr::TransactionEnvelope) -> (String, &[xdr::Operation]) {
    match envelope {
        xdr::TransactionEnvelope::TxV0(env) => (
            encode_account(&env.tx.source_account_ed25519.0),
            env.tx.operations.as_slice(),
        ),
        xdr::TransactionEnvelope::Tx(env) => (
            muxed_account(&env.tx.source_account),
            env.tx.operations.as_slice(),
        ),
        xdr::TransactionEnvelope::TxFeeBump(env) => match &env.tx.inner_tx {
            xdr::FeeBumpTransactionInnerTx::Tx(inner) => (
                muxed_account(&inner.tx.source_account),
                inner.tx.operations.as_slice(),
            ),
        },
    }
}

fn operation_results(result: &xdr::TransactionResult) -> &[xdr::OperationResult] {
    match &result.result {
        xdr::TransactionResultResult::TxSuccess(results)
        | xdr::TransactionResultResult::TxFailed(results) => results.as_slice(),
        xdr::TransactionResultResult::TxFeeBumpInnerSuccess(pair)
        | xdr::TransactionResultResult::TxFeeBumpInnerFailed(pair) => match &pair.result.result {
            xdr::InnerTransactionResultResult::TxSuccess(results)
            | xdr::InnerTransactionResultResult::TxFailed(results) => results.as_slice(),
            _ => &[],
        },
        _ => &[],
    }
}

fn operation_body(body: &xdr::OperationBody) -> OperationBody {
    match body {
        xdr::OperationBody::Payment(op) => OperationBody::Payment {
            destination: base_account(&op.destination),
            asset: asset(&op.asset),
            amount: op.amount,
        },
        xdr::OperationBody::PathPaymentStrictReceive(op) => OperationBody::PathPaymentStrictReceive {
            destination: base_account(&op.destination),
            dest_asset: asset(&op.dest_asset),
            dest_amount: op.dest_amount,
        },
        xdr::OperationBody::PathPaymentStrictSend(op) => OperationBody::PathPaymentStrictSend {
            destination: base_account(&op.destination),
            dest_asset: asset(&op.dest_asset),
            dest_min: op.dest_min,
        },
        _ => OperationBody::Other,
    }
}

fn operation_result(result: Option<&xdr::OperationResult>) -> OperationResult {
    use xdr::OperationResultTr as Tr;

    let Some(xdr::OperationResult::OpInner(tr)) = result else {
        return OperationResult::Failed;
    };
    match tr {
        Tr::PathPaymentStrictSend(xdr::PathPaymentStrictSendResult::Success(success)) => {
            OperationResult::PathPaymentStrictSendSuccess {
                delivered: success.last.amount,
            }
        }
        Tr::PathPaymentStrictSend(_) => OperationResult::Failed,
        Tr::PathPaymentStrictReceive(xdr::PathPaymentStrictReceiveResult::Success(_)) => {
            OperationResult::Success
        }
        Tr::PathPaymentStrictReceive(_) => OperationResult::Failed,
        Tr::Payment(xdr::PaymentResult::Success) => OperationResult::Success,
        Tr::Payment(_) => OperationResult::Failed,
        _ => OperationResult::Success,
    }
}

fn asset(asset: &xdr::Asset) -> LedgerAsset {
    match asset {
        xdr::Asset::Native => LedgerAsset::Native,
        xdr::Asset::CreditAlphanum4(a) => LedgerAsset::Credit {
            code: asset_code(&a.asset_code.0),
            issuer: account_id(&a.issuer),
        },
        xdr::Asset::CreditAlphanum12(a) => LedgerAsset::Credit {
            code: asset_code(&a.asset_code.0),
            issuer: account_id(&a.issuer),
        },
    }
}

fn asset_code(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .to_string()
}

fn encode_account(key: &[u8; 32]) -> String {
    stellar_strkey::ed25519::PublicKey(*key).to_string()
}

fn account_id(id: &xdr::AccountId) -> String {
    match &id.0 {
        xdr::PublicKey::PublicKeyTypeEd25519(key) => encode_account(&key.0),
    }
}

fn muxed_account(account: &xdr::MuxedAccount) -> String {
    match account {
        xdr::MuxedAccount::Ed25519(key) => encode_account(&key.0),
        xdr::MuxedAccount::MuxedEd25519(muxed) => stellar_strkey::ed25519::MuxedAccount {
            ed25519: muxed.ed25519.0,
            id: muxed.id,
        }
        .to_string(),
    }
}

fn base_account(account: &xdr::MuxedAccount) -> String {
    match account {
        xdr::MuxedAccount::Ed25519(key) => encode_account(&key.0),
        xdr::MuxedAccount::MuxedEd25519(muxed) => encode_account(&muxed.ed25519.0),
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use bigdecimal::BigDecimal;
    use stellar_xdr::curr::WriteXdr;

    fn record(envelope_xdr: String, result_xdr: String) -> TransactionRecord {
        TransactionRecord {
            id: "txhash".to_string(),
            paging_token: "4294967296".to_string(),
            successful: true,
            source_account: strkey(SOURCE_KEY),
            memo: Some("ABC123".to_string()),
            memo_type: Some("text".to_string()),
            envelope_xdr,
            result_xdr,
        }
    }

    #[test]
    fn test_decodes_plain_payment() {
        let decoded = decode_transaction(&record(
            payment_envelope_b64(5_000_000_000),
            payment_success_result_b64(),
        ))
        .unwrap();

        assert_eq!(decoded.source_account, strkey(SOURCE_KEY));
        assert_eq!(decoded.paging_token, "4294967296");
        assert_eq!(decoded.operations.len(), 1);

        let op = &decoded.operations[0];
        assert_eq!(op.source, None);
        assert_eq!(op.result, OperationResult::Success);
        assert_eq!(
            op.body,
            OperationBody::Payment {
                destination: strkey(DESTINATION_KEY),
                asset: LedgerAsset::credit("USD", &strkey(ISSUER_KEY)),
                amount: 5_000_000_000,
            }
        );

        let data = crate::domain::extract_payment(&op.body, &op.result).unwrap();
        assert_eq!(data.amount, BigDecimal::from(500));
    }

    #[test]
    fn test_muxed_destination_reduced_to_base_account() {
        let muxed = xdr::MuxedAccount::MuxedEd25519(xdr::MuxedAccountMed25519 {
            id: 42,
            ed25519: xdr::Uint256(DESTINATION_KEY),
        });
        let mut op = payment_op(muxed.clone(), 10_000_000);
        op.source_account = Some(muxed);

        let envelope_xdr = envelope(vec![op]).to_xdr_base64(Limits::none()).unwrap();
        let decoded = decode_transaction(&record(envelope_xdr, payment_success_result_b64())).unwrap();

        let op = &decoded.operations[0];
        assert!(matches!(
            &op.body,
            OperationBody::Payment { destination, .. } if destination == &strkey(DESTINATION_KEY)
        ));
        assert!(op.source.as_deref().is_some_and(|s| s.starts_with('M')));
    }

    #[test]
    fn test_strict_send_reads_delivered_amount_from_result() {
        let op = xdr::Operation {
            source_account: None,
            body: xdr::OperationBody::PathPaymentStrictSend(xdr::PathPaymentStrictSendOp {
                send_asset: xdr::Asset::Native,
                send_amount: 1_000_000_000,
                destination: xdr::MuxedAccount::Ed25519(xdr::Uint256(DESTINATION_KEY)),
                dest_asset: usd(),
                dest_min: 900_000_000,
                path: xdr::VecM::default(),
            }),
        };
        let op_result = xdr::OperationResult::OpInner(xdr::OperationResultTr::PathPaymentStrictSend(
            xdr::PathPaymentStrictSendResult::Success(xdr::PathPaymentStrictSendResultSuccess {
                offers: xdr::VecM::default(),
                last: xdr::SimplePaymentResult {
                    destination: xdr::AccountId(xdr::PublicKey::PublicKeyTypeEd25519(xdr::Uint256(
                        DESTINATION_KEY,
                    ))),
                    asset: usd(),
                    amount: 950_000_000,
                },
            }),
        ));

        let decoded = decode_transaction(&record(
            envelope(vec![op]).to_xdr_base64(Limits::none()).unwrap(),
            result(vec![op_result]).to_xdr_base64(Limits::none()).unwrap(),
        ))
        .unwrap();

        assert_eq!(
            decoded.operations[0].result,
            OperationResult::PathPaymentStrictSendSuccess {
                delivered: 950_000_000
            }
        );
    }

    #[test]
    fn test_garbage_xdr_is_an_error() {
        let result = decode_transaction(&record("not-xdr".to_string(), "AAAA".to_string()));
        assert!(matches!(result, Err(HorizonError::Xdr(_))));
    }
}
