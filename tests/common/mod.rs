#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use polaris_reconciler::adapters::{InMemoryQuoteRepository, InMemoryTransactionRepository};
use polaris_reconciler::config::assets::AssetCache;
use polaris_reconciler::domain::{
    Asset, AwaitingPayment, LedgerAsset, LedgerOperation, LedgerTransaction, OffChainAsset, OperationBody,
    OperationResult, Protocol, Quote, Transaction, TransactionKind, TransactionStatus,
};
use polaris_reconciler::ports::{
    IntegrationError, RateError, RateIntegration, RepositoryError, RepositoryResult, ScheduleFee,
    SettlementIntegration, SettlementOutcome, TransactionRepository,
};
use polaris_reconciler::services::{OutgoingProcessor, Reconciler, TransactionMatcher};

pub const ISSUER: &str = "GA5ZSEJYB37JRC5AVCIA5MOP4RHTM335X2KGX3IHOJAPP5RE34K4KZVN";
pub const DIST: &str = "GBBD47UZQ5CSKQPV456PYYH4FSYJHBWGQJUVNMCNWZ2NBEHKQPW3KXKJ";
pub const SENDER: &str = "GSENDER";

pub fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

pub fn usd() -> Asset {
    let mut asset = Asset::new("USD", ISSUER, 2);
    asset.distribution_account = Some(DIST.to_string());
    asset
}

pub fn brl() -> OffChainAsset {
    OffChainAsset {
        scheme: "iso4217".to_string(),
        identifier: "BRL".to_string(),
        significant_decimals: 2,
    }
}

pub fn withdrawal(memo: &str) -> Transaction {
    Transaction::new(
        Protocol::Sep24,
        TransactionKind::Withdrawal,
        &usd(),
        "GUSER".to_string(),
    )
    .awaiting_payment_to(DIST, Some(memo))
}

pub fn send(memo: &str) -> Transaction {
    Transaction::new(Protocol::Sep31, TransactionKind::Send, &usd(), "GUSER".to_string())
        .awaiting_payment_to(DIST, Some(memo))
}

pub fn payment(destination: &str, stroops: i64) -> LedgerOperation {
    LedgerOperation {
        source: None,
        body: OperationBody::Payment {
            destination: destination.to_string(),
            asset: LedgerAsset::credit("USD", ISSUER),
            amount: stroops,
        },
        result: OperationResult::Success,
    }
}

pub fn ledger_tx(paging_token: &str, memo: Option<&str>, operations: Vec<LedgerOperation>) -> LedgerTransaction {
    LedgerTransaction {
        id: format!("hash-{}", paging_token),
        paging_token: paging_token.to_string(),
        successful: true,
        source_account: SENDER.to_string(),
        memo: memo.map(str::to_string),
        operations,
    }
}

pub enum Price {
    Fixed(BigDecimal),
    Unavailable,
}

pub struct FakeRates {
    pub price: Mutex<Price>,
    pub calls: Mutex<usize>,
}

impl FakeRates {
    pub fn new(price: Price) -> Self {
        Self {
            price: Mutex::new(price),
            calls: Mutex::new(0),
        }
    }

    pub fn set(&self, price: Price) {
        *self.price.lock().unwrap() = price;
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl RateIntegration for FakeRates {
    async fn refresh_price(&self, _quote: &Quote) -> Result<BigDecimal, RateError> {
        *self.calls.lock().unwrap() += 1;
        match &*self.price.lock().unwrap() {
            Price::Fixed(price) => Ok(price.clone()),
            Price::Unavailable => Err(RateError::Unavailable("market closed".to_string())),
        }
    }
}

#[derive(Clone)]
pub enum Reply {
    Completed,
    InProgress(TransactionStatus),
    Recoverable(String),
    Fault(String),
}

#[derive(Default)]
pub struct ScriptedSettlement {
    replies: Mutex<VecDeque<Reply>>,
    pub seen: Mutex<Vec<Uuid>>,
}

impl ScriptedSettlement {
    pub fn replying(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<Uuid> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl SettlementIntegration for ScriptedSettlement {
    async fn on_reconciled(&self, tx: &Transaction) -> Result<SettlementOutcome, IntegrationError> {
        self.seen.lock().unwrap().push(tx.id);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::InProgress(tx.status));
        match reply {
            Reply::Completed => Ok(SettlementOutcome::Completed),
            Reply::InProgress(status) => Ok(SettlementOutcome::InProgress(status)),
            Reply::Recoverable(message) => Err(IntegrationError::recoverable(message)),
            Reply::Fault(message) => Err(IntegrationError::Fault(anyhow::anyhow!(message))),
        }
    }
}

pub struct Harness {
    pub transactions: Arc<InMemoryTransactionRepository>,
    pub quotes: Arc<InMemoryQuoteRepository>,
    pub assets: Arc<AssetCache>,
    pub rates: Arc<FakeRates>,
    pub reconciler: Arc<Reconciler>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_assets(vec![usd()])
    }

    pub fn with_assets(assets: Vec<Asset>) -> Self {
        let transactions = Arc::new(InMemoryTransactionRepository::new());
        let quotes = Arc::new(InMemoryQuoteRepository::new());
        let assets = Arc::new(AssetCache::from_assets(assets, vec![brl()]));
        let rates = Arc::new(FakeRates::new(Price::Fixed(dec("0.20"))));
        let reconciler = Arc::new(Reconciler::new(
            quotes.clone(),
            rates.clone(),
            Arc::new(ScheduleFee),
            assets.clone(),
        ));
        Self {
            transactions,
            quotes,
            assets,
            rates,
            reconciler,
        }
    }

    pub fn matcher(&self) -> TransactionMatcher {
        TransactionMatcher::new(
            self.transactions.clone(),
            self.assets.clone(),
            self.reconciler.clone(),
        )
    }

    pub fn outgoing(&self, settlement: Arc<ScriptedSettlement>) -> OutgoingProcessor {
        OutgoingProcessor::new(
            self.transactions.clone(),
            self.assets.clone(),
            self.reconciler.clone(),
            settlement,
        )
    }
}

/// Wraps the in-memory store to simulate a concurrent writer winning every
/// conditional update, or a row that no longer parses for one memo.
pub struct InterceptingRepository {
    pub inner: Arc<InMemoryTransactionRepository>,
    pub lose_updates: bool,
    pub corrupt_memo: Option<String>,
}

impl InterceptingRepository {
    pub fn new(inner: Arc<InMemoryTransactionRepository>) -> Self {
        Self {
            inner,
            lose_updates: false,
            corrupt_memo: None,
        }
    }
}

#[async_trait]
impl TransactionRepository for InterceptingRepository {
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        self.inner.insert(tx).await
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Transaction> {
        self.inner.get_by_id(id).await
    }

    async fn find_awaiting_payment(
        &self,
        filter: &AwaitingPayment,
    ) -> RepositoryResult<Vec<Transaction>> {
        if filter.memo.is_some() && filter.memo == self.corrupt_memo {
            return Err(RepositoryError::Corrupt("unknown status 'pending_teleport'".to_string()));
        }
        self.inner.find_awaiting_payment(filter).await
    }

    async fn find_by_status(
        &self,
        statuses: &[TransactionStatus],
        kinds: &[TransactionKind],
    ) -> RepositoryResult<Vec<Transaction>> {
        self.inner.find_by_status(statuses, kinds).await
    }

    async fn update_if_status(
        &self,
        tx: &Transaction,
        expected: TransactionStatus,
    ) -> RepositoryResult<bool> {
        if self.lose_updates {
            return Ok(false);
        }
        self.inner.update_if_status(tx, expected).await
    }

    async fn latest_paging_token(&self, account: &str) -> RepositoryResult<Option<String>> {
        self.inner.latest_paging_token(account).await
    }

    async fn reset_paging_tokens(&self) -> RepositoryResult<u64> {
        self.inner.reset_paging_tokens().await
    }
}

#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Routes error-level events on the current thread into a buffer until the
/// guard is dropped.
pub fn capture_errors() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::ERROR)
        .finish();
    (buffer, tracing::subscriber::set_default(subscriber))
}
