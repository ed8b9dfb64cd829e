use std::future::Future;
use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use futures::Stream;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, warn};
use url::Url;

use super::{xdr, LedgerClient, LedgerStream, CURSOR_NOW};
use crate::domain::LedgerTransaction;

const PAGE_LIMIT: &str = "200";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum HorizonError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Account not found: {0}")]
    AccountNotFound(String),
    #[error("Invalid response from Horizon: {0}")]
    InvalidResponse(String),
    #[error("Invalid Horizon URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("XDR decoding failed: {0}")]
    Xdr(#[from] stellar_xdr::curr::Error),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

/// Response from Horizon /accounts endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResponse {
    pub id: String,
    pub account_id: String,
    pub balances: Vec<Balance>,
    pub sequence: String,
    pub subentry_count: i32,
    pub home_domain: Option<String>,
    pub last_modified_ledger: i64,
    pub last_modified_time: String,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub signers: Vec<Signer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub balance: String,
    pub limit: Option<String>,
    pub asset_type: String,
    pub asset_code: Option<String>,
    pub asset_issuer: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub low_threshold: u8,
    pub med_threshold: u8,
    pub high_threshold: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    pub key: String,
    pub weight: i32,
    #[serde(rename = "type")]
    pub signer_type: String,
}

/// A record from Horizon's /accounts/{id}/transactions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub paging_token: String,
    pub successful: bool,
    pub source_account: String,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub memo_type: Option<String>,
    pub envelope_xdr: String,
    pub result_xdr: String,
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(rename = "_embedded")]
    embedded: Embedded,
}

#[derive(Debug, Deserialize)]
struct Embedded {
    records: Vec<TransactionRecord>,
}

/// HTTP client for interacting with the Stellar Horizon API
#[derive(Clone)]
pub struct HorizonClient {
    client: Client,
    base_url: String,
    poll_interval: Duration,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl HorizonClient {
    /// Creates a new HorizonClient with the specified base URL
    pub fn new(base_url: String) -> Self {
        Self::with_circuit_breaker(base_url, 3, 60)
    }

    /// Creates a new HorizonClient with custom circuit breaker configuration
    pub fn with_circuit_breaker(
        base_url: String,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        HorizonClient {
            client,
            base_url,
            poll_interval: DEFAULT_POLL_INTERVAL,
            circuit_breaker,
        }
    }

    /// Sets how long the transaction stream sleeps once it has caught up.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Replaces the underlying HTTP client, e.g. to change the request timeout.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Returns the current state of the circuit breaker
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, HorizonError> {
        let mut url = Url::parse(&self.base_url)?;
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                HorizonError::InvalidResponse(format!("{} cannot be a base URL", self.base_url))
            })?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    async fn guarded<T, F>(&self, request: F) -> Result<T, HorizonError>
    where
        F: Future<Output = Result<T, HorizonError>>,
    {
        match self.circuit_breaker.call(request).await {
            Ok(value) => Ok(value),
            Err(FailsafeError::Rejected) => Err(HorizonError::CircuitBreakerOpen(
                "Horizon API circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }

    /// Fetches account details from the Horizon API
    pub async fn get_account(&self, address: &str) -> Result<AccountResponse, HorizonError> {
        let url = self.endpoint(&["accounts", address])?;
        let client = self.client.clone();
        let addr = address.to_string();

        self.guarded(async move {
            let response = client.get(url).send().await?;

            if response.status() == 404 {
                return Err(HorizonError::AccountNotFound(addr));
            }

            let account = response.error_for_status()?.json::<AccountResponse>().await?;
            Ok(account)
        })
        .await
    }

    /// Fetches one page of transactions for `account` after `cursor`.
    pub async fn transactions_page(
        &self,
        account: &str,
        cursor: &str,
        descending: bool,
    ) -> Result<Vec<TransactionRecord>, HorizonError> {
        let mut url = self.endpoint(&["accounts", account, "transactions"])?;
        {
            let mut query = url.query_pairs_mut();
            if !cursor.is_empty() {
                query.append_pair("cursor", cursor);
            }
            query
                .append_pair("order", if descending { "desc" } else { "asc" })
                .append_pair("limit", if descending { "1" } else { PAGE_LIMIT })
                .append_pair("include_failed", "true");
        }
        let client = self.client.clone();
        let addr = account.to_string();

        self.guarded(async move {
            let response = client.get(url).send().await?;

            if response.status() == 404 {
                return Err(HorizonError::AccountNotFound(addr));
            }

            let page = response.error_for_status()?.json::<Page>().await?;
            Ok(page.embedded.records)
        })
        .await
    }

    /// Paging token of the newest transaction for `account`, or `"0"` if the
    /// account has none.
    pub async fn latest_cursor(&self, account: &str) -> Result<String, HorizonError> {
        let newest = self.transactions_page(account, "", true).await?;
        Ok(newest
            .into_iter()
            .next()
            .map(|record| record.paging_token)
            .unwrap_or_else(|| "0".to_string()))
    }

    /// Polls Horizon page by page, yielding decoded transactions in cursor order.
    pub fn stream_transactions(
        &self,
        account: String,
        cursor: String,
    ) -> impl Stream<Item = Result<LedgerTransaction, HorizonError>> + Send + 'static {
        let client = self.clone();
        try_stream! {
            let mut cursor = if cursor == CURSOR_NOW {
                client.latest_cursor(&account).await?
            } else {
                cursor
            };
            let mut connected = false;

            loop {
                let page = match client.transactions_page(&account, &cursor, false).await {
                    Ok(page) => {
                        connected = true;
                        page
                    }
                    Err(err) if connected => {
                        warn!(account = %account, "Horizon request failed, retrying: {}", err);
                        sleep(client.poll_interval).await;
                        continue;
                    }
                    Err(err) => Err(err)?,
                };

                if page.is_empty() {
                    sleep(client.poll_interval).await;
                    continue;
                }

                debug!(account = %account, "Fetched {} transaction(s) after cursor {}", page.len(), cursor);
                for record in page {
                    cursor = record.paging_token.clone();
                    match xdr::decode_transaction(&record) {
                        Ok(transaction) => yield transaction,
                        Err(err) => error!(
                            transaction_id = %record.id,
                            "Skipping undecodable ledger transaction: {}",
                            err
                        ),
                    }
                }
            }
        }
    }
}

#[async_trait]
impl LedgerClient for HorizonClient {
    fn watch(&self, account: &str, cursor: &str) -> LedgerStream {
        Box::pin(self.stream_transactions(account.to_string(), cursor.to_string()))
    }

    async fn load_account(&self, account: &str) -> Result<AccountResponse, HorizonError> {
        self.get_account(account).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stellar::xdr::fixtures;
    use futures::StreamExt;

    const ACCOUNT: &str = "GBBD47UZQ5CSKQPV456PYYH4FSYJHBWGQJUVNMCNWZ2NBEHKQPW3KXKJ";

    fn page_body(records: &[serde_json::Value]) -> String {
        serde_json::json!({ "_embedded": { "records": records } }).to_string()
    }

    fn record(paging_token: &str) -> serde_json::Value {
        serde_json::json!({
            "id": format!("hash-{}", paging_token),
            "paging_token": paging_token,
            "successful": true,
            "source_account": ACCOUNT,
            "memo": "ABC123",
            "memo_type": "text",
            "envelope_xdr": fixtures::payment_envelope_b64(500_0000000),
            "result_xdr": fixtures::payment_success_result_b64(),
        })
    }

    #[test]
    fn test_horizon_client_creation() {
        let client = HorizonClient::new("https://horizon-testnet.stellar.org".to_string());
        assert_eq!(client.base_url, "https://horizon-testnet.stellar.org");
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let client = HorizonClient::new("https://horizon-testnet.stellar.org/".to_string());
        let url = client.endpoint(&["accounts", ACCOUNT, "transactions"]).unwrap();
        assert_eq!(
            url.as_str(),
            format!("https://horizon-testnet.stellar.org/accounts/{}/transactions", ACCOUNT)
        );
    }

    #[tokio::test]
    async fn test_get_account_with_mock() {
        let mut server = mockito::Server::new_async().await;

        let mock_response = r#"{
            "id": "GBBD47UZQ5CSKQPV456PYYH4FSYJHBWGQJUVNMCNWZ2NBEHKQPW3KXKJ",
            "account_id": "GBBD47UZQ5CSKQPV456PYYH4FSYJHBWGQJUVNMCNWZ2NBEHKQPW3KXKJ",
            "balances": [
                {
                    "balance": "100.0000000",
                    "limit": null,
                    "asset_type": "native",
                    "asset_code": null,
                    "asset_issuer": null
                }
            ],
            "sequence": "1",
            "subentry_count": 0,
            "home_domain": null,
            "last_modified_ledger": 1,
            "last_modified_time": "2021-01-01T00:00:00Z",
            "thresholds": { "low_threshold": 1, "med_threshold": 2, "high_threshold": 3 },
            "signers": [
                { "key": "GBBD47UZQ5CSKQPV456PYYH4FSYJHBWGQJUVNMCNWZ2NBEHKQPW3KXKJ", "weight": 1, "type": "ed25519_public_key" }
            ]
        }"#;

        let _mock = server
            .mock("GET", mockito::Matcher::Regex(r".*/accounts/.*".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(mock_response)
            .create_async()
            .await;

        let client = HorizonClient::new(server.url());
        let account = client.get_account(ACCOUNT).await.unwrap();

        assert_eq!(account.account_id, ACCOUNT);
        assert_eq!(account.thresholds.med_threshold, 2);
        assert_eq!(account.signers.len(), 1);
    }

    #[tokio::test]
    async fn test_get_account_not_found() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("GET", mockito::Matcher::Regex(r".*/accounts/.*".into()))
            .with_status(404)
            .create_async()
            .await;

        let client = HorizonClient::new(server.url());
        let result = client.get_account(ACCOUNT).await;

        assert!(matches!(result, Err(HorizonError::AccountNotFound(_))));
    }

    #[tokio::test]
    async fn test_stream_decodes_records_in_order() {
        let mut server = mockito::Server::new_async().await;

        let _first = server
            .mock("GET", mockito::Matcher::Regex(r".*/transactions.*".into()))
            .match_query(mockito::Matcher::UrlEncoded("cursor".into(), "0".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(page_body(&[record("100"), record("101")]))
            .create_async()
            .await;
        let _rest = server
            .mock("GET", mockito::Matcher::Regex(r".*/transactions.*".into()))
            .match_query(mockito::Matcher::UrlEncoded("cursor".into(), "101".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(page_body(&[]))
            .create_async()
            .await;

        let client = HorizonClient::new(server.url()).with_poll_interval(Duration::from_millis(10));
        let mut stream = client.watch(ACCOUNT, "0");

        let first = stream.next().await.unwrap().unwrap();
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(first.paging_token, "100");
        assert_eq!(second.paging_token, "101");
        assert_eq!(first.memo.as_deref(), Some("ABC123"));
        assert_eq!(first.operations.len(), 1);
    }

    #[tokio::test]
    async fn test_stream_fails_when_first_request_fails() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("GET", mockito::Matcher::Regex(r".*/transactions.*".into()))
            .match_query(mockito::Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let client = HorizonClient::new(server.url());
        let mut stream = client.watch(ACCOUNT, "0");

        let first = stream.next().await.unwrap();
        assert!(matches!(first, Err(HorizonError::AccountNotFound(_))));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_now_cursor_resolves_to_newest_transaction() {
        let mut server = mockito::Server::new_async().await;

        let _newest = server
            .mock("GET", mockito::Matcher::Regex(r".*/transactions.*".into()))
            .match_query(mockito::Matcher::UrlEncoded("order".into(), "desc".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(page_body(&[record("555")]))
            .create_async()
            .await;

        let client = HorizonClient::new(server.url());
        assert_eq!(client.latest_cursor(ACCOUNT).await.unwrap(), "555");
    }

    #[test]
    fn test_circuit_breaker_state() {
        let client = HorizonClient::new("https://horizon-testnet.stellar.org".to_string());
        let state = client.circuit_state();
        assert_eq!(state, "closed");
    }

    #[test]
    fn test_custom_circuit_breaker_config() {
        let client = HorizonClient::with_circuit_breaker(
            "https://horizon-testnet.stellar.org".to_string(),
            5,
            30,
        );
        let state = client.circuit_state();
        assert_eq!(state, "closed");
    }
}
