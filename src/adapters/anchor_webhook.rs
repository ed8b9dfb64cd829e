//! Anchor integrations reached over HTTP.
//!
//! Settlement: `POST {settlement_url}` with `{"transaction": ...}`. The anchor
//! answers `{"status": "completed"}`, a pending status to park the
//! transaction in, or `{"status": "error", "message": "..."}`.
//!
//! Rates: `POST {rates_url}` with `{"quote": ...}`, answered with
//! `{"price": "..."}`. A 503 means no price is available right now.

use anyhow::anyhow;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use url::Url;

use crate::domain::{Quote, Transaction, TransactionStatus};
use crate::ports::{
    IntegrationError, RateError, RateIntegration, SettlementIntegration, SettlementOutcome,
};

#[derive(Debug, Deserialize)]
struct SettlementReply {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PriceReply {
    price: BigDecimal,
}

#[derive(Clone)]
pub struct AnchorWebhook {
    client: Client,
    settlement_url: Url,
    rates_url: Option<Url>,
}

impl AnchorWebhook {
    pub fn new(settlement_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            settlement_url: Url::parse(settlement_url)?,
            rates_url: None,
        })
    }

    pub fn with_rates_url(mut self, rates_url: &str) -> anyhow::Result<Self> {
        self.rates_url = Some(Url::parse(rates_url)?);
        Ok(self)
    }
}

fn settlement_outcome(reply: SettlementReply) -> Result<SettlementOutcome, IntegrationError> {
    match reply.status.as_str() {
        "completed" => Ok(SettlementOutcome::Completed),
        "error" => Err(IntegrationError::recoverable(
            reply
                .message
                .unwrap_or_else(|| "anchor reported an error".to_string()),
        )),
        other => {
            let status: TransactionStatus = other
                .parse()
                .map_err(|e| IntegrationError::Fault(anyhow!("settlement reply: {}", e)))?;
            if status.is_terminal() {
                return Err(IntegrationError::Fault(anyhow!(
                    "settlement reply: {} cannot be reported as in progress",
                    status
                )));
            }
            Ok(SettlementOutcome::InProgress(status))
        }
    }
}

#[async_trait]
impl SettlementIntegration for AnchorWebhook {
    async fn on_reconciled(&self, tx: &Transaction) -> Result<SettlementOutcome, IntegrationError> {
        let response = self
            .client
            .post(self.settlement_url.clone())
            .json(&json!({ "transaction": tx }))
            .send()
            .await
            .map_err(|e| IntegrationError::Fault(e.into()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IntegrationError::Fault(anyhow!(
                "settlement endpoint returned {}",
                status
            )));
        }

        let reply: SettlementReply = response
            .json()
            .await
            .map_err(|e| IntegrationError::Fault(e.into()))?;
        settlement_outcome(reply)
    }
}

#[async_trait]
impl RateIntegration for AnchorWebhook {
    async fn refresh_price(&self, quote: &Quote) -> Result<BigDecimal, RateError> {
        let Some(rates_url) = &self.rates_url else {
            return Err(RateError::Unavailable("no rates endpoint configured".to_string()));
        };

        let response = self
            .client
            .post(rates_url.clone())
            .json(&json!({ "quote": quote }))
            .send()
            .await
            .map_err(|e| RateError::Fault(e.into()))?;

        match response.status() {
            StatusCode::SERVICE_UNAVAILABLE => Err(RateError::Unavailable(format!(
                "no price for {} -> {}",
                quote.sell_asset, quote.buy_asset
            ))),
            status if status.is_success() => {
                let reply: PriceReply = response
                    .json()
                    .await
                    .map_err(|e| RateError::Fault(e.into()))?;
                Ok(reply.price)
            }
            status => Err(RateError::Fault(anyhow!("rates endpoint returned {}", status))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Asset, Protocol, QuoteType, TransactionKind};
    use std::str::FromStr;

    fn tx() -> Transaction {
        Transaction::new(
            Protocol::Sep24,
            TransactionKind::Withdrawal,
            &Asset::new("USD", "GISSUER", 2),
            "GUSER".to_string(),
        )
    }

    fn quote() -> Quote {
        Quote::new(
            QuoteType::Indicative,
            "GUSER".to_string(),
            "stellar:USD:GISSUER".to_string(),
            "iso4217:BRL".to_string(),
        )
    }

    fn webhook(server: &mockito::ServerGuard) -> AnchorWebhook {
        AnchorWebhook::new(&format!("{}/settle", server.url()), Duration::from_secs(5))
            .unwrap()
            .with_rates_url(&format!("{}/rates", server.url()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_settlement_completed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/settle")
            .match_body(mockito::Matcher::Regex(r#""transaction""#.to_string()))
            .with_status(200)
            .with_body(r#"{"status":"completed"}"#)
            .create_async()
            .await;

        let outcome = webhook(&server).on_reconciled(&tx()).await.unwrap();
        assert_eq!(outcome, SettlementOutcome::Completed);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_settlement_in_progress() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/settle")
            .with_status(200)
            .with_body(r#"{"status":"pending_external"}"#)
            .create_async()
            .await;

        let outcome = webhook(&server).on_reconciled(&tx()).await.unwrap();
        assert_eq!(
            outcome,
            SettlementOutcome::InProgress(TransactionStatus::PendingExternal)
        );
    }

    #[tokio::test]
    async fn test_settlement_error_is_recoverable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/settle")
            .with_status(200)
            .with_body(r#"{"status":"error","message":"bank account closed"}"#)
            .create_async()
            .await;

        let err = webhook(&server).on_reconciled(&tx()).await.unwrap_err();
        assert!(
            matches!(err, IntegrationError::Recoverable { ref message } if message == "bank account closed")
        );
    }

    #[tokio::test]
    async fn test_settlement_server_error_is_fault() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/settle")
            .with_status(500)
            .create_async()
            .await;

        let err = webhook(&server).on_reconciled(&tx()).await.unwrap_err();
        assert!(matches!(err, IntegrationError::Fault(_)));
    }

    #[tokio::test]
    async fn test_settlement_unknown_status_is_fault() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/settle")
            .with_status(200)
            .with_body(r#"{"status":"refunded"}"#)
            .create_async()
            .await;

        let err = webhook(&server).on_reconciled(&tx()).await.unwrap_err();
        assert!(matches!(err, IntegrationError::Fault(_)));
    }

    #[tokio::test]
    async fn test_refresh_price() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rates")
            .with_status(200)
            .with_body(r#"{"price":"0.20"}"#)
            .create_async()
            .await;

        let price = webhook(&server).refresh_price(&quote()).await.unwrap();
        assert_eq!(price, BigDecimal::from_str("0.20").unwrap());
    }

    #[tokio::test]
    async fn test_refresh_price_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rates")
            .with_status(503)
            .create_async()
            .await;

        let err = webhook(&server).refresh_price(&quote()).await.unwrap_err();
        assert!(matches!(err, RateError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_refresh_price_without_endpoint() {
        let webhook = AnchorWebhook::new("http://localhost:1/settle", Duration::from_secs(1)).unwrap();
        let err = webhook.refresh_price(&quote()).await.unwrap_err();
        assert!(matches!(err, RateError::Unavailable(_)));
    }
}
