//! End-to-end conversation flows against in-memory fakes.
//!
//! Drives the full dispatch path (registration, purchases, funding,
//! reports) through [`MessageHandler`] with a recording transport, a
//! scripted fulfillment provider, and a transparent PIN hasher.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use kobowallet::agent::dialog::{PendingPurchase, PurchaseKind};
use kobowallet::agent::handler::{HandlerDeps, MessageHandler};
use kobowallet::agent::intent::{Network, PatternClassifier};
use kobowallet::agent::orchestrator::PurchaseOrchestrator;
use kobowallet::channels::{IncomingMessage, Transport};
use kobowallet::error::{ChannelError, OrchestratorError, ProviderError, StoreError};
use kobowallet::ledger::{Direction, LedgerGateway};
use kobowallet::providers::{
    DataPlan, FulfillmentOutcome, FulfillmentProvider, PaymentLink, PaymentLinkProvider,
};
use kobowallet::security::PinHasher;
use kobowallet::store::{
    MemoryStore, NewTransaction, NewUser, RecordStore, Transaction, TxKind, TxStatus, User,
};

const TELEGRAM_ID: i64 = 1001;

// ==================== fakes ====================

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<(i64, String)>>,
    deleted: Mutex<Vec<(i64, i64)>>,
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ChannelError> {
        self.sent.lock().await.push((chat_id, text.to_string()));
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), ChannelError> {
        self.deleted.lock().await.push((chat_id, message_id));
        Ok(())
    }
}

/// Fulfillment fake: scripted outcome, fixed two-plan catalogue.
struct ScriptedFulfillment {
    outcome: FulfillmentOutcome,
}

impl ScriptedFulfillment {
    fn succeeding() -> Self {
        Self {
            outcome: FulfillmentOutcome::ok("REQ_1", "Delivered"),
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            outcome: FulfillmentOutcome::failed(message),
        }
    }
}

#[async_trait]
impl FulfillmentProvider for ScriptedFulfillment {
    async fn purchase_airtime(
        &self,
        _network: Network,
        _amount: Decimal,
        _phone_number: &str,
    ) -> FulfillmentOutcome {
        self.outcome.clone()
    }

    async fn purchase_data(
        &self,
        _network: Network,
        _data_size: &str,
        _phone_number: &str,
    ) -> FulfillmentOutcome {
        self.outcome.clone()
    }

    async fn data_plans(&self, _network: Network) -> Vec<DataPlan> {
        vec![
            DataPlan {
                name: "1GB - 30 days".to_string(),
                code: "1000".to_string(),
                amount: dec!(500),
            },
            DataPlan {
                name: "2GB - 30 days".to_string(),
                code: "2000".to_string(),
                amount: dec!(1000),
            },
        ]
    }
}

struct StaticPayments;

#[async_trait]
impl PaymentLinkProvider for StaticPayments {
    async fn generate_payment_link(
        &self,
        _email: &str,
        _amount: Decimal,
        reference: &str,
        _metadata: Value,
    ) -> Result<PaymentLink, ProviderError> {
        Ok(PaymentLink {
            url: format!("https://pay.example/{reference}"),
            reference: reference.to_string(),
        })
    }
}

/// Transparent hasher so tests can skip real bcrypt work.
struct PlainHasher;

#[async_trait]
impl PinHasher for PlainHasher {
    async fn hash(&self, pin: &str) -> Option<String> {
        Some(format!("digest:{pin}"))
    }

    async fn verify(&self, pin: &str, digest: &str) -> bool {
        digest == format!("digest:{pin}")
    }
}

/// Store that refuses balance credits once armed; debits still succeed.
/// Used to force the refund leg of a purchase to fail.
struct CreditFailingStore {
    inner: MemoryStore,
    refuse: AtomicBool,
}

impl CreditFailingStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            refuse: AtomicBool::new(false),
        }
    }

    fn refuse_credits(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for CreditFailingStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        self.inner.create_user(new_user).await
    }

    async fn user_by_telegram_id(&self, telegram_id: i64) -> Result<Option<User>, StoreError> {
        self.inner.user_by_telegram_id(telegram_id).await
    }

    async fn user_by_id(&self, user_id: Uuid) -> Result<User, StoreError> {
        self.inner.user_by_id(user_id).await
    }

    async fn set_pin_hash(&self, user_id: Uuid, pin_hash: String) -> Result<(), StoreError> {
        self.inner.set_pin_hash(user_id, pin_hash).await
    }

    async fn wallet_balance(&self, user_id: Uuid) -> Result<Decimal, StoreError> {
        self.inner.wallet_balance(user_id).await
    }

    async fn adjust_balance(&self, user_id: Uuid, delta: Decimal) -> Result<Decimal, StoreError> {
        if delta > Decimal::ZERO && self.refuse.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("write rejected".to_string()));
        }
        self.inner.adjust_balance(user_id, delta).await
    }

    async fn create_transaction(&self, tx: NewTransaction) -> Result<Transaction, StoreError> {
        self.inner.create_transaction(tx).await
    }

    async fn settle_transaction(
        &self,
        tx_id: Uuid,
        status: TxStatus,
        reference: Option<String>,
    ) -> Result<(), StoreError> {
        self.inner.settle_transaction(tx_id, status, reference).await
    }

    async fn recent_transactions(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Transaction>, StoreError> {
        self.inner.recent_transactions(user_id, limit).await
    }

    async fn transactions_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, StoreError> {
        self.inner.transactions_since(user_id, since).await
    }
}

// ==================== harness ====================

struct Harness {
    handler: MessageHandler,
    transport: Arc<RecordingTransport>,
    store: Arc<dyn RecordStore>,
    next_message_id: Mutex<i64>,
}

impl Harness {
    fn new(fulfillment: Arc<dyn FulfillmentProvider>) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), fulfillment)
    }

    fn with_store(
        store: Arc<dyn RecordStore>,
        fulfillment: Arc<dyn FulfillmentProvider>,
    ) -> Self {
        let transport = Arc::new(RecordingTransport::default());
        let handler = MessageHandler::new(HandlerDeps {
            transport: transport.clone(),
            store: store.clone(),
            classifier: Arc::new(PatternClassifier::new()),
            fulfillment,
            payments: Arc::new(StaticPayments),
            hasher: Arc::new(PlainHasher),
            min_funding: dec!(100),
        });
        Self {
            handler,
            transport,
            store,
            next_message_id: Mutex::new(0),
        }
    }

    async fn say(&self, text: &str) -> String {
        let message_id = {
            let mut next = self.next_message_id.lock().await;
            *next += 1;
            *next
        };
        self.handler
            .handle_message(IncomingMessage {
                chat_id: TELEGRAM_ID,
                user_id: TELEGRAM_ID,
                message_id,
                text: text.to_string(),
            })
            .await
            .unwrap();
        self.last_reply().await
    }

    async fn last_reply(&self) -> String {
        self.transport
            .sent
            .lock()
            .await
            .last()
            .map(|(_, text)| text.clone())
            .unwrap_or_default()
    }

    async fn register(&self) -> uuid::Uuid {
        self.say("/start").await;
        self.say("Ada").await;
        self.say("Obi").await;
        self.say("ada@example.com").await;
        self.say("08123456789").await;
        self.say("1234").await;
        self.store
            .user_by_telegram_id(TELEGRAM_ID)
            .await
            .unwrap()
            .expect("user registered")
            .id
    }

    async fn credit(&self, user_id: uuid::Uuid, amount: Decimal) {
        LedgerGateway::new(self.store.clone())
            .adjust(user_id, amount, Direction::Credit)
            .await
            .unwrap();
    }
}

// ==================== registration ====================

#[tokio::test]
async fn registration_walks_every_step_and_creates_the_account() {
    let harness = Harness::new(Arc::new(ScriptedFulfillment::succeeding()));

    let reply = harness.say("/start").await;
    assert!(reply.contains("first name"), "got: {reply}");

    let reply = harness.say("Ada").await;
    assert!(reply.contains("last name"), "got: {reply}");

    let reply = harness.say("Obi").await;
    assert!(reply.contains("email"), "got: {reply}");

    let reply = harness.say("ada@example.com").await;
    assert!(reply.contains("phone number"), "got: {reply}");

    let reply = harness.say("08123456789").await;
    assert!(reply.contains("PIN"), "got: {reply}");

    let reply = harness.say("1234").await;
    assert!(reply.contains("ready to use"), "got: {reply}");

    let user = harness
        .store
        .user_by_telegram_id(TELEGRAM_ID)
        .await
        .unwrap()
        .expect("account created");
    assert_eq!(user.first_name, "Ada");
    assert_eq!(user.email, "ada@example.com");
    assert_eq!(user.pin_hash.as_deref(), Some("digest:1234"));
    assert_eq!(harness.store.wallet_balance(user.id).await.unwrap(), dec!(0));
}

#[tokio::test]
async fn invalid_email_reprompts_without_losing_progress() {
    let harness = Harness::new(Arc::new(ScriptedFulfillment::succeeding()));
    harness.say("/start").await;
    harness.say("Ada").await;
    harness.say("Obi").await;

    let reply = harness.say("not-an-email").await;
    assert!(reply.contains("valid email"), "got: {reply}");

    // Still on the email step; a valid value moves on.
    let reply = harness.say("ada@example.com").await;
    assert!(reply.contains("phone number"), "got: {reply}");
}

#[tokio::test]
async fn invalid_phone_number_reprompts_the_same_step() {
    let harness = Harness::new(Arc::new(ScriptedFulfillment::succeeding()));
    harness.say("/start").await;
    harness.say("Ada").await;
    harness.say("Obi").await;
    harness.say("ada@example.com").await;

    let reply = harness.say("0612345678").await;
    assert!(reply.contains("valid Nigerian phone number"), "got: {reply}");
    assert!(
        harness
            .store
            .user_by_telegram_id(TELEGRAM_ID)
            .await
            .unwrap()
            .is_none(),
        "no account until the phone step passes"
    );
}

#[tokio::test]
async fn unregistered_user_is_pointed_at_start() {
    let harness = Harness::new(Arc::new(ScriptedFulfillment::succeeding()));
    let reply = harness.say("check my balance").await;
    assert!(reply.contains("/start"), "got: {reply}");
}

#[tokio::test]
async fn pin_messages_are_deleted_from_the_chat() {
    let harness = Harness::new(Arc::new(ScriptedFulfillment::succeeding()));
    harness.say("/start").await;
    harness.say("Ada").await;
    harness.say("Obi").await;
    harness.say("ada@example.com").await;
    harness.say("08123456789").await;
    harness.say("1234").await; // message_id 6, the PIN

    let deleted = harness.transport.deleted.lock().await.clone();
    assert_eq!(deleted, vec![(TELEGRAM_ID, 6)]);
}

// ==================== purchases ====================

#[tokio::test]
async fn airtime_purchase_debits_fulfills_and_records() {
    let harness = Harness::new(Arc::new(ScriptedFulfillment::succeeding()));
    let user_id = harness.register().await;
    harness.credit(user_id, dec!(1000)).await;

    let reply = harness.say("Buy ₦500 MTN airtime for 08123456789").await;
    assert!(reply.contains("Confirm airtime purchase"), "got: {reply}");
    assert!(reply.contains("₦500.00"), "got: {reply}");

    let reply = harness.say("yes").await;
    assert!(reply.contains("PIN"), "got: {reply}");

    let reply = harness.say("1234").await;
    assert!(reply.contains("New balance: ₦500.00"), "got: {reply}");

    assert_eq!(harness.store.wallet_balance(user_id).await.unwrap(), dec!(500));
    let transactions = harness.store.recent_transactions(user_id, 5).await.unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].kind, TxKind::Airtime);
    assert_eq!(transactions[0].status, TxStatus::Completed);
    assert_eq!(transactions[0].reference.as_deref(), Some("REQ_1"));
}

#[tokio::test]
async fn failed_fulfillment_refunds_and_marks_the_transaction_failed() {
    let harness = Harness::new(Arc::new(ScriptedFulfillment::failing("Network busy")));
    let user_id = harness.register().await;
    harness.credit(user_id, dec!(1000)).await;

    harness.say("Buy ₦500 MTN airtime for 08123456789").await;
    harness.say("yes").await;
    let reply = harness.say("1234").await;
    assert!(reply.contains("refunded"), "got: {reply}");
    assert!(reply.contains("Network busy"), "got: {reply}");

    // The debit was compensated in full.
    assert_eq!(
        harness.store.wallet_balance(user_id).await.unwrap(),
        dec!(1000)
    );
    let transactions = harness.store.recent_transactions(user_id, 5).await.unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].status, TxStatus::Failed);
}

#[tokio::test]
async fn purchase_beyond_balance_is_rejected_before_confirmation() {
    let harness = Harness::new(Arc::new(ScriptedFulfillment::succeeding()));
    let user_id = harness.register().await;
    harness.credit(user_id, dec!(100)).await;

    let reply = harness.say("Buy ₦500 MTN airtime for 08123456789").await;
    assert!(reply.contains("Insufficient wallet balance"), "got: {reply}");

    // Nothing was staged: an affirmative next message is plain text again.
    let reply = harness.say("yes").await;
    assert!(reply.contains("didn't quite understand"), "got: {reply}");
    assert!(harness
        .store
        .recent_transactions(user_id, 5)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn declining_confirmation_cancels_the_purchase() {
    let harness = Harness::new(Arc::new(ScriptedFulfillment::succeeding()));
    let user_id = harness.register().await;
    harness.credit(user_id, dec!(1000)).await;

    harness.say("Buy ₦500 MTN airtime for 08123456789").await;
    let reply = harness.say("no").await;
    assert!(reply.contains("cancelled"), "got: {reply}");
    assert_eq!(
        harness.store.wallet_balance(user_id).await.unwrap(),
        dec!(1000)
    );
}

#[tokio::test]
async fn wrong_pin_cancels_the_purchase() {
    let harness = Harness::new(Arc::new(ScriptedFulfillment::succeeding()));
    let user_id = harness.register().await;
    harness.credit(user_id, dec!(1000)).await;

    harness.say("Buy ₦500 MTN airtime for 08123456789").await;
    harness.say("yes").await;
    let reply = harness.say("9999").await;
    assert!(reply.contains("Invalid PIN"), "got: {reply}");
    assert_eq!(
        harness.store.wallet_balance(user_id).await.unwrap(),
        dec!(1000)
    );
    assert!(harness
        .store
        .recent_transactions(user_id, 5)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn data_purchase_resolves_the_plan_price() {
    let harness = Harness::new(Arc::new(ScriptedFulfillment::succeeding()));
    let user_id = harness.register().await;
    harness.credit(user_id, dec!(2000)).await;

    let reply = harness.say("Get me 2GB MTN data").await;
    assert!(reply.contains("Confirm data purchase"), "got: {reply}");
    assert!(reply.contains("2GB - 30 days"), "got: {reply}");
    assert!(reply.contains("₦1000.00"), "got: {reply}");
    // Falls back to the registered phone number.
    assert!(reply.contains("08123456789"), "got: {reply}");

    harness.say("yes").await;
    harness.say("1234").await;
    assert_eq!(
        harness.store.wallet_balance(user_id).await.unwrap(),
        dec!(1000)
    );
}

#[tokio::test]
async fn unrecognized_network_lists_default_plans() {
    let harness = Harness::new(Arc::new(ScriptedFulfillment::succeeding()));
    harness.register().await;

    let reply = harness.say("Get me 2GB data on starnet").await;
    assert!(reply.contains("Available MTN plans"), "got: {reply}");
    assert!(reply.contains("1GB - 30 days"), "got: {reply}");
    assert!(reply.contains("2GB - 30 days"), "got: {reply}");
}

// ==================== funding ====================

#[tokio::test]
async fn funding_below_the_minimum_reprompts_without_a_link() {
    let harness = Harness::new(Arc::new(ScriptedFulfillment::succeeding()));
    harness.register().await;

    let reply = harness.say("fund my wallet").await;
    assert!(reply.contains("How much"), "got: {reply}");

    let reply = harness.say("50").await;
    assert!(reply.contains("minimum ₦100.00"), "got: {reply}");
    assert!(!reply.contains("https://"), "got: {reply}");

    // Still in the funding dialog; a valid amount completes it.
    let reply = harness.say("500").await;
    assert!(reply.contains("Payment link ready"), "got: {reply}");
    assert!(reply.contains(&format!("FUND_{TELEGRAM_ID}_")), "got: {reply}");
    assert!(reply.contains("https://pay.example/"), "got: {reply}");
}

#[tokio::test]
async fn funding_with_an_inline_amount_skips_the_prompt() {
    let harness = Harness::new(Arc::new(ScriptedFulfillment::succeeding()));
    harness.register().await;

    let reply = harness.say("fund my wallet with ₦2000").await;
    assert!(reply.contains("Payment link ready"), "got: {reply}");
    assert!(reply.contains("₦2000.00"), "got: {reply}");
}

// ==================== reads ====================

#[tokio::test]
async fn balance_command_reports_the_current_balance() {
    let harness = Harness::new(Arc::new(ScriptedFulfillment::succeeding()));
    let user_id = harness.register().await;
    harness.credit(user_id, dec!(750)).await;

    let reply = harness.say("/balance").await;
    assert!(reply.contains("₦750.00"), "got: {reply}");
}

#[tokio::test]
async fn transaction_history_lists_recent_activity() {
    let harness = Harness::new(Arc::new(ScriptedFulfillment::succeeding()));
    let user_id = harness.register().await;

    let reply = harness.say("show my transactions").await;
    assert!(reply.contains("No transactions found"), "got: {reply}");

    harness.credit(user_id, dec!(1000)).await;
    harness.say("Buy ₦500 MTN airtime for 08123456789").await;
    harness.say("yes").await;
    harness.say("1234").await;

    let reply = harness.say("show my transactions").await;
    assert!(reply.contains("AIRTIME"), "got: {reply}");
    assert!(reply.contains("₦500.00"), "got: {reply}");
    assert!(reply.contains("MTN"), "got: {reply}");
}

#[tokio::test]
async fn monthly_report_totals_funded_and_spent() {
    let harness = Harness::new(Arc::new(ScriptedFulfillment::succeeding()));
    let user_id = harness.register().await;
    harness.credit(user_id, dec!(2000)).await;

    harness.say("Buy ₦500 MTN airtime for 08123456789").await;
    harness.say("yes").await;
    harness.say("1234").await;

    let reply = harness.say("monthly report").await;
    assert!(reply.contains("Total spent: ₦500.00"), "got: {reply}");
    assert!(reply.contains("- Airtime: ₦500.00"), "got: {reply}");
    assert!(reply.contains("Successful: 1"), "got: {reply}");
    assert!(reply.contains("Current balance: ₦1500.00"), "got: {reply}");
}

// ==================== pin management ====================

#[tokio::test]
async fn change_pin_intent_sets_a_new_digest() {
    let harness = Harness::new(Arc::new(ScriptedFulfillment::succeeding()));
    let user_id = harness.register().await;

    let reply = harness.say("change pin please").await;
    assert!(reply.contains("new 4-6 digit PIN"), "got: {reply}");

    harness.say("567890").await;
    let user = harness.store.user_by_id(user_id).await.unwrap();
    assert_eq!(user.pin_hash.as_deref(), Some("digest:567890"));
}

// ==================== compensation failure ====================

#[tokio::test]
async fn failed_refund_returns_operator_error() {
    let store = Arc::new(CreditFailingStore::new());
    let ledger = LedgerGateway::new(store.clone() as Arc<dyn RecordStore>);
    let orchestrator = PurchaseOrchestrator::new(
        LedgerGateway::new(store.clone() as Arc<dyn RecordStore>),
        Arc::new(ScriptedFulfillment::failing("provider timeout")),
        Arc::new(StaticPayments),
    );

    let user = store
        .create_user(NewUser {
            telegram_id: TELEGRAM_ID,
            first_name: "Ada".to_string(),
            last_name: "Obi".to_string(),
            email: "ada@example.com".to_string(),
            phone_number: "08123456789".to_string(),
        })
        .await
        .unwrap();
    ledger
        .adjust(user.id, dec!(1000), Direction::Credit)
        .await
        .unwrap();
    store.refuse_credits();

    let purchase = PendingPurchase {
        kind: PurchaseKind::Airtime,
        amount: dec!(500),
        network: Network::Mtn,
        phone_number: "08123456789".to_string(),
        data_size: None,
    };
    let err = orchestrator.execute(user.id, &purchase).await.unwrap_err();
    assert!(
        matches!(
            err,
            OrchestratorError::CompensationFailed { amount, .. } if amount == dec!(500)
        ),
        "got: {err}"
    );

    // The debit stands until an operator restores it.
    let balance = store.wallet_balance(user.id).await.unwrap();
    assert_eq!(balance, dec!(500));
    let rows = store.recent_transactions(user.id, 10).await.unwrap();
    assert_eq!(rows[0].status, TxStatus::Failed);
}

#[tokio::test]
async fn failed_refund_prompts_contact_support() {
    let store = Arc::new(CreditFailingStore::new());
    let harness = Harness::with_store(
        store.clone(),
        Arc::new(ScriptedFulfillment::failing("provider timeout")),
    );
    let user_id = harness.register().await;
    harness.credit(user_id, dec!(1000)).await;
    store.refuse_credits();

    harness.say("Buy ₦500 MTN airtime for 08123456789").await;
    harness.say("yes").await;
    let reply = harness.say("1234").await;
    assert!(reply.contains("contact support"), "got: {reply}");

    let balance = store.wallet_balance(user_id).await.unwrap();
    assert_eq!(balance, dec!(500));
    let rows = store.recent_transactions(user_id, 10).await.unwrap();
    assert_eq!(rows[0].status, TxStatus::Failed);

    // The dialog is cleared, not stuck awaiting the PIN again.
    let reply = harness.say("yes").await;
    assert!(reply.contains("didn't quite understand"), "got: {reply}");
}
