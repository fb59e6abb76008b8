//! The dialog state machine.
//!
//! Advances one user's conversation one message at a time. Dispatch
//! precedence per inbound message:
//!
//! 1. unregistered user + anything but `/start` → registration prompt;
//! 2. an active session entry → dispatch on its step;
//! 3. slash-command → fixed command table;
//! 4. otherwise classify the text and dispatch on the intent.
//!
//! Validation failures re-prompt the same step without touching the
//! accumulated data. Collaborator failures bubble to the catch-all in
//! [`MessageHandler::handle_message`], which replies generically and clears
//! the session so no partially-advanced state survives.

use std::sync::Arc;
use std::sync::OnceLock;

use chrono::{Datelike, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use tracing::{debug, error, info};

use crate::agent::dialog::{
    DialogData, DialogStep, PendingPurchase, PurchaseKind, SessionStore, UserSession,
};
use crate::agent::intent::{Intent, IntentClassifier, Network};
use crate::agent::orchestrator::{PurchaseOrchestrator, PurchaseOutcome};
use crate::channels::{IncomingMessage, Transport};
use crate::error::{Error, OrchestratorError, StoreError};
use crate::ledger::LedgerGateway;
use crate::providers::{DataPlan, FulfillmentProvider, PaymentLinkProvider};
use crate::security::PinHasher;
use crate::store::{NewUser, RecordStore, Transaction, TxKind, TxStatus, User};

const REPLY_GENERIC_FAILURE: &str = "Sorry, something went wrong. Please try again later.";
const REPLY_REGISTER_FIRST: &str = "Welcome! Please type /start to register your account.";
const REPLY_INSUFFICIENT: &str = "Insufficient wallet balance. Please fund your wallet first.";
const REPLY_CONTACT_SUPPORT: &str =
    "Your purchase failed and we could not refund your wallet automatically. \
     Please contact support - your funds are safe and will be restored.";

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("static regex")
    })
}

fn phone_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^0[789][01]\d{8}$").expect("static regex"))
}

fn pin_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4,6}$").expect("static regex"))
}

fn is_valid_email(value: &str) -> bool {
    email_re().is_match(value.trim())
}

fn is_valid_phone_number(value: &str) -> bool {
    phone_number_re().is_match(value.trim())
}

fn is_valid_pin(value: &str) -> bool {
    pin_re().is_match(value.trim())
}

/// NGN display formatting, two decimal places.
fn naira(amount: Decimal) -> String {
    format!("₦{:.2}", amount)
}

/// Collaborators the handler is wired to.
pub struct HandlerDeps {
    pub transport: Arc<dyn Transport>,
    pub store: Arc<dyn RecordStore>,
    pub classifier: Arc<dyn IntentClassifier>,
    pub fulfillment: Arc<dyn FulfillmentProvider>,
    pub payments: Arc<dyn PaymentLinkProvider>,
    pub hasher: Arc<dyn PinHasher>,
    /// Minimum accepted wallet funding amount, NGN.
    pub min_funding: Decimal,
}

/// Per-user conversation state machine plus reply rendering.
pub struct MessageHandler {
    transport: Arc<dyn Transport>,
    store: Arc<dyn RecordStore>,
    classifier: Arc<dyn IntentClassifier>,
    fulfillment: Arc<dyn FulfillmentProvider>,
    hasher: Arc<dyn PinHasher>,
    sessions: SessionStore,
    ledger: LedgerGateway,
    orchestrator: PurchaseOrchestrator,
    min_funding: Decimal,
}

impl MessageHandler {
    pub fn new(deps: HandlerDeps) -> Self {
        let ledger = LedgerGateway::new(Arc::clone(&deps.store));
        let orchestrator =
            PurchaseOrchestrator::new(ledger.clone(), deps.fulfillment.clone(), deps.payments);
        Self {
            transport: deps.transport,
            store: deps.store,
            classifier: deps.classifier,
            fulfillment: deps.fulfillment,
            hasher: deps.hasher,
            sessions: SessionStore::new(),
            ledger,
            orchestrator,
            min_funding: deps.min_funding,
        }
    }

    /// Handle one inbound message end to end.
    ///
    /// Holds the per-user guard for the whole span, so one user's messages
    /// are processed strictly in receipt order even when the poller
    /// dispatches concurrently across users.
    pub async fn handle_message(&self, msg: IncomingMessage) -> Result<(), Error> {
        let _guard = self.sessions.lock_user(msg.user_id).await;

        match self.dispatch(&msg).await {
            Ok(()) => Ok(()),
            Err(err) => {
                // Never leave a half-advanced dialog behind a failure.
                self.sessions.clear(msg.user_id).await;
                let reply = match &err {
                    Error::Orchestrator(OrchestratorError::CompensationFailed { .. }) => {
                        REPLY_CONTACT_SUPPORT
                    }
                    _ => REPLY_GENERIC_FAILURE,
                };
                error!(%err, user_id = msg.user_id, "message handling failed");
                self.send(msg.chat_id, reply).await;
                Ok(())
            }
        }
    }

    async fn dispatch(&self, msg: &IncomingMessage) -> Result<(), Error> {
        let text = msg.text.trim();

        // An active dialog wins over everything: a mid-registration user has
        // no account row yet but their next message belongs to the flow.
        if let Some(session) = self.sessions.get(msg.user_id).await {
            return self.handle_step(msg, session).await;
        }

        let user = self.store.user_by_telegram_id(msg.user_id).await?;

        if user.is_none() && text != "/start" {
            self.send(msg.chat_id, REPLY_REGISTER_FIRST).await;
            return Ok(());
        }

        if text.starts_with('/') {
            return self.handle_command(msg, user.as_ref()).await;
        }

        // Guarded above: a non-command message from an unregistered user
        // never reaches intent dispatch.
        let Some(user) = user else {
            self.send(msg.chat_id, REPLY_REGISTER_FIRST).await;
            return Ok(());
        };
        let intent = self.classifier.classify(text).await;
        debug!(user_id = msg.user_id, ?intent, "intent resolved");
        self.handle_intent(msg, &user, intent).await
    }

    // ==================== commands ====================

    async fn handle_command(
        &self,
        msg: &IncomingMessage,
        user: Option<&User>,
    ) -> Result<(), Error> {
        match msg.text.trim() {
            "/start" => self.handle_start(msg, user).await,
            "/balance" => match user {
                Some(user) => self.reply_balance(msg.chat_id, user).await,
                None => {
                    self.send(msg.chat_id, REPLY_REGISTER_FIRST).await;
                    Ok(())
                }
            },
            "/help" => {
                self.send(msg.chat_id, &help_text()).await;
                Ok(())
            }
            _ => {
                self.send(
                    msg.chat_id,
                    "Unknown command. Type /help to see available commands.",
                )
                .await;
                Ok(())
            }
        }
    }

    async fn handle_start(&self, msg: &IncomingMessage, user: Option<&User>) -> Result<(), Error> {
        if let Some(user) = user {
            self.send(msg.chat_id, &welcome_back_text(&user.first_name))
                .await;
            return Ok(());
        }

        self.sessions
            .set(msg.user_id, UserSession::at(DialogStep::FirstName))
            .await;
        self.send(
            msg.chat_id,
            "Welcome to KoboWallet - your wallet for airtime, data and more.\n\n\
             Let's get you set up in a few steps.\n\n\
             First, what's your first name?",
        )
        .await;
        Ok(())
    }

    // ==================== dialog steps ====================

    async fn handle_step(&self, msg: &IncomingMessage, session: UserSession) -> Result<(), Error> {
        let text = msg.text.trim();
        let mut data = session.data;

        match session.step {
            DialogStep::FirstName => {
                data.first_name = Some(text.to_string());
                let reply = format!(
                    "Nice to meet you, {}!\n\nNow, what's your last name?",
                    text
                );
                self.sessions
                    .set(msg.user_id, UserSession::with_data(DialogStep::LastName, data))
                    .await;
                self.send(msg.chat_id, &reply).await;
            }

            DialogStep::LastName => {
                data.last_name = Some(text.to_string());
                self.sessions
                    .set(msg.user_id, UserSession::with_data(DialogStep::Email, data))
                    .await;
                self.send(
                    msg.chat_id,
                    "What's your email address? We'll use it for payment receipts and reports.",
                )
                .await;
            }

            DialogStep::Email => {
                if !is_valid_email(text) {
                    self.send(
                        msg.chat_id,
                        "That doesn't look like a valid email address.\n\
                         Please enter a valid email (example: ada@gmail.com):",
                    )
                    .await;
                    return Ok(());
                }
                data.email = Some(text.to_string());
                self.sessions
                    .set(
                        msg.user_id,
                        UserSession::with_data(DialogStep::PhoneNumber, data),
                    )
                    .await;
                self.send(
                    msg.chat_id,
                    "What's your phone number?\n\
                     (11 digits starting with 0, e.g. 08123456789)",
                )
                .await;
            }

            DialogStep::PhoneNumber => {
                if !is_valid_phone_number(text) {
                    self.send(
                        msg.chat_id,
                        "That doesn't look like a valid Nigerian phone number.\n\
                         It must be 11 digits starting with 0, e.g. 08123456789:",
                    )
                    .await;
                    return Ok(());
                }
                self.complete_registration(msg, data, text).await?;
            }

            DialogStep::SetPin => {
                self.purge_pin_message(msg).await;
                if !is_valid_pin(text) {
                    self.send(
                        msg.chat_id,
                        "Invalid PIN format. Please enter exactly 4-6 digits:",
                    )
                    .await;
                    return Ok(());
                }
                self.set_pin(msg, data, text).await?;
            }

            DialogStep::ConfirmPurchase => {
                if text.eq_ignore_ascii_case("yes") {
                    self.sessions
                        .set(
                            msg.user_id,
                            UserSession::with_data(DialogStep::EnterPin, data),
                        )
                        .await;
                    self.send(msg.chat_id, "Please enter your transaction PIN:")
                        .await;
                } else {
                    self.sessions.clear(msg.user_id).await;
                    self.send(msg.chat_id, "Purchase cancelled.").await;
                }
            }

            DialogStep::EnterPin => {
                self.purge_pin_message(msg).await;
                self.verify_pin_and_purchase(msg, data, text).await?;
            }

            DialogStep::FundAmount => {
                self.handle_fund_amount(msg, text).await?;
            }
        }
        Ok(())
    }

    async fn complete_registration(
        &self,
        msg: &IncomingMessage,
        data: DialogData,
        phone_number: &str,
    ) -> Result<(), Error> {
        let (Some(first_name), Some(last_name), Some(email)) = (
            data.first_name.clone(),
            data.last_name.clone(),
            data.email.clone(),
        ) else {
            // The accumulated bag can only be incomplete if state was lost;
            // restart cleanly rather than guessing.
            self.sessions.clear(msg.user_id).await;
            self.send(msg.chat_id, "Let's start over - please type /start.")
                .await;
            return Ok(());
        };

        let result = self
            .store
            .create_user(NewUser {
                telegram_id: msg.user_id,
                first_name,
                last_name,
                email,
                phone_number: phone_number.to_string(),
            })
            .await;

        match result {
            Ok(user) => {
                info!(user_id = %user.id, telegram_id = msg.user_id, "account registered");
                let data = DialogData {
                    user_id: Some(user.id),
                    ..Default::default()
                };
                self.sessions
                    .set(msg.user_id, UserSession::with_data(DialogStep::SetPin, data))
                    .await;
                self.send(
                    msg.chat_id,
                    "Your KoboWallet account is ready!\n\n\
                     For security, set a transaction PIN (4-6 digits). \
                     You'll need it to confirm purchases.\n\nEnter your PIN now:",
                )
                .await;
            }
            Err(StoreError::Duplicate { field }) => {
                self.sessions.clear(msg.user_id).await;
                self.send(
                    msg.chat_id,
                    &format!("Registration failed: an account with this {field} already exists."),
                )
                .await;
            }
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }

    async fn set_pin(
        &self,
        msg: &IncomingMessage,
        data: DialogData,
        pin: &str,
    ) -> Result<(), Error> {
        let Some(user_id) = data.user_id else {
            self.sessions.clear(msg.user_id).await;
            self.send(msg.chat_id, REPLY_GENERIC_FAILURE).await;
            return Ok(());
        };

        let Some(digest) = self.hasher.hash(pin).await else {
            self.sessions.clear(msg.user_id).await;
            self.send(msg.chat_id, REPLY_GENERIC_FAILURE).await;
            return Ok(());
        };

        self.store.set_pin_hash(user_id, digest).await?;
        self.sessions.clear(msg.user_id).await;
        self.send(
            msg.chat_id,
            "Your PIN is set and your account is ready to use.\n\n\
             Current wallet balance: ₦0.00\n\n\
             Try \"fund wallet\" to add money, or \"buy airtime\" to get started. \
             Just tell me what you want in plain English.",
        )
        .await;
        Ok(())
    }

    async fn verify_pin_and_purchase(
        &self,
        msg: &IncomingMessage,
        data: DialogData,
        pin: &str,
    ) -> Result<(), Error> {
        let (Some(user_id), Some(purchase)) = (data.user_id, data.purchase.clone()) else {
            self.sessions.clear(msg.user_id).await;
            self.send(msg.chat_id, REPLY_GENERIC_FAILURE).await;
            return Ok(());
        };

        let user = self.store.user_by_id(user_id).await?;
        let verified = match user.pin_hash.as_deref() {
            Some(digest) => self.hasher.verify(pin.trim(), digest).await,
            None => false,
        };

        if !verified {
            self.sessions.clear(msg.user_id).await;
            self.send(msg.chat_id, "Invalid PIN. Transaction cancelled.")
                .await;
            return Ok(());
        }

        // Hand off to the orchestrator; the session is cleared first so no
        // stale state survives regardless of the outcome.
        self.sessions.clear(msg.user_id).await;
        let outcome = self.orchestrator.execute(user_id, &purchase).await?;
        self.reply_purchase_outcome(msg.chat_id, outcome).await;
        Ok(())
    }

    async fn handle_fund_amount(&self, msg: &IncomingMessage, text: &str) -> Result<(), Error> {
        let amount = text.trim_start_matches('₦').trim().parse::<Decimal>().ok();
        let amount = match amount {
            Some(amount) if amount >= self.min_funding => amount,
            _ => {
                self.send(
                    msg.chat_id,
                    &format!(
                        "Please enter a valid amount (minimum {}).",
                        naira(self.min_funding)
                    ),
                )
                .await;
                return Ok(());
            }
        };

        let Some(user) = self.store.user_by_telegram_id(msg.user_id).await? else {
            self.sessions.clear(msg.user_id).await;
            self.send(msg.chat_id, REPLY_REGISTER_FIRST).await;
            return Ok(());
        };
        self.send_funding_link(msg.chat_id, msg.user_id, &user, amount)
            .await
    }

    // ==================== intents ====================

    async fn handle_intent(
        &self,
        msg: &IncomingMessage,
        user: &User,
        intent: Intent,
    ) -> Result<(), Error> {
        match intent {
            Intent::BalanceCheck => self.reply_balance(msg.chat_id, user).await,

            Intent::WalletFund { amount } => match amount {
                Some(amount) if amount >= self.min_funding => {
                    self.send_funding_link(msg.chat_id, msg.user_id, user, amount)
                        .await
                }
                _ => {
                    self.sessions
                        .set(msg.user_id, UserSession::at(DialogStep::FundAmount))
                        .await;
                    self.send(
                        msg.chat_id,
                        &format!(
                            "How much would you like to add to your wallet? (minimum {})",
                            naira(self.min_funding)
                        ),
                    )
                    .await;
                    Ok(())
                }
            },

            Intent::AirtimePurchase {
                amount,
                network,
                phone_number,
            } => {
                self.handle_airtime_purchase(msg, user, amount, network, phone_number)
                    .await
            }

            Intent::DataPurchase {
                network,
                phone_number,
                data_size,
            } => {
                self.handle_data_purchase(msg, user, network, phone_number, data_size)
                    .await
            }

            Intent::Transactions => self.reply_transactions(msg.chat_id, user).await,

            Intent::MonthlyReport => self.reply_monthly_report(msg.chat_id, user).await,

            Intent::SetPin | Intent::ChangePin => {
                let data = DialogData {
                    user_id: Some(user.id),
                    ..Default::default()
                };
                self.sessions
                    .set(msg.user_id, UserSession::with_data(DialogStep::SetPin, data))
                    .await;
                self.send(msg.chat_id, "Please enter your new 4-6 digit PIN:")
                    .await;
                Ok(())
            }

            Intent::Unknown => {
                self.send(msg.chat_id, &capabilities_text()).await;
                Ok(())
            }
        }
    }

    async fn handle_airtime_purchase(
        &self,
        msg: &IncomingMessage,
        user: &User,
        amount: Option<Decimal>,
        network: Option<Network>,
        phone_number: Option<String>,
    ) -> Result<(), Error> {
        let (Some(amount), Some(network), Some(phone_number)) = (amount, network, phone_number)
        else {
            self.send(
                msg.chat_id,
                "Please provide all details: amount, network, and phone number.\n\
                 Example: \"Buy ₦500 MTN airtime for 08123456789\"",
            )
            .await;
            return Ok(());
        };

        if self.ledger.balance(user.id).await? < amount {
            self.send(msg.chat_id, REPLY_INSUFFICIENT).await;
            return Ok(());
        }

        let purchase = PendingPurchase {
            kind: PurchaseKind::Airtime,
            amount,
            network,
            phone_number,
            data_size: None,
        };
        let prompt = format!(
            "Confirm airtime purchase:\n\nNetwork: {}\nAmount: {}\nPhone: {}\n\n\
             Type \"yes\" to confirm or \"no\" to cancel.",
            network,
            naira(amount),
            purchase.phone_number
        );
        self.stage_purchase(msg.user_id, user, purchase).await;
        self.send(msg.chat_id, &prompt).await;
        Ok(())
    }

    async fn handle_data_purchase(
        &self,
        msg: &IncomingMessage,
        user: &User,
        network: Option<Network>,
        phone_number: Option<String>,
        data_size: Option<String>,
    ) -> Result<(), Error> {
        let Some(data_size) = data_size else {
            self.send(
                msg.chat_id,
                "Please specify the network and data size.\n\
                 Example: \"Get me 2GB MTN data\"",
            )
            .await;
            return Ok(());
        };

        // An unrecognized network token degrades to the default catalogue
        // rather than erroring; the user picks from what's actually offered.
        let Some(network) = network else {
            let plans = self.fulfillment.data_plans(Network::Mtn).await;
            self.send(
                msg.chat_id,
                &format!(
                    "I don't recognize that network. Available MTN plans:\n\n{}",
                    render_plans(&plans)
                ),
            )
            .await;
            return Ok(());
        };

        let plans = self.fulfillment.data_plans(network).await;
        let Some(plan) = plans.iter().find(|plan| plan.name.contains(&data_size)) else {
            self.send(
                msg.chat_id,
                &format!(
                    "Data plan not found. Available {} plans:\n\n{}",
                    network,
                    render_plans(&plans)
                ),
            )
            .await;
            return Ok(());
        };

        if self.ledger.balance(user.id).await? < plan.amount {
            self.send(msg.chat_id, REPLY_INSUFFICIENT).await;
            return Ok(());
        }

        let phone_number = phone_number.unwrap_or_else(|| user.phone_number.clone());
        let purchase = PendingPurchase {
            kind: PurchaseKind::Data,
            amount: plan.amount,
            network,
            phone_number,
            data_size: Some(data_size),
        };
        let prompt = format!(
            "Confirm data purchase:\n\nNetwork: {}\nPlan: {}\nAmount: {}\nPhone: {}\n\n\
             Type \"yes\" to confirm or \"no\" to cancel.",
            network,
            plan.name,
            naira(plan.amount),
            purchase.phone_number
        );
        self.stage_purchase(msg.user_id, user, purchase).await;
        self.send(msg.chat_id, &prompt).await;
        Ok(())
    }

    async fn stage_purchase(&self, telegram_id: i64, user: &User, purchase: PendingPurchase) {
        let data = DialogData {
            user_id: Some(user.id),
            purchase: Some(purchase),
            ..Default::default()
        };
        self.sessions
            .set(
                telegram_id,
                UserSession::with_data(DialogStep::ConfirmPurchase, data),
            )
            .await;
    }

    // ==================== read-only replies ====================

    async fn reply_balance(&self, chat_id: i64, user: &User) -> Result<(), Error> {
        let balance = self.ledger.balance(user.id).await?;
        let hint = if balance < self.min_funding {
            "Low balance! Say \"fund wallet\" to add money."
        } else {
            "You're all set for transactions."
        };
        self.send(
            chat_id,
            &format!("KoboWallet balance\n\nCurrent balance: {}\n\n{hint}", naira(balance)),
        )
        .await;
        Ok(())
    }

    async fn reply_transactions(&self, chat_id: i64, user: &User) -> Result<(), Error> {
        let transactions = self.ledger.recent_transactions(user.id, 5).await?;
        if transactions.is_empty() {
            self.send(chat_id, "No transactions found.").await;
            return Ok(());
        }

        let mut message = String::from("Your recent transactions:\n\n");
        for (index, tx) in transactions.iter().enumerate() {
            let marker = match tx.status {
                TxStatus::Completed => "✅",
                TxStatus::Failed => "❌",
                TxStatus::Pending => "⏳",
            };
            message.push_str(&format!(
                "{}. {} {}\n   Amount: {}\n",
                index + 1,
                marker,
                tx.kind.as_str().to_uppercase(),
                naira(tx.amount)
            ));
            if let Some(network) = tx.network {
                message.push_str(&format!("   Network: {network}\n"));
            }
            if let Some(phone) = &tx.phone_number {
                message.push_str(&format!("   Phone: {phone}\n"));
            }
            message.push_str(&format!("   Date: {}\n\n", tx.created_at.format("%Y-%m-%d")));
        }
        self.send(chat_id, &message).await;
        Ok(())
    }

    async fn reply_monthly_report(&self, chat_id: i64, user: &User) -> Result<(), Error> {
        let now = Utc::now();
        let month_name = format!("{} {}", month_name(now.month()), now.year());
        let transactions = self.ledger.current_month_transactions(user.id).await?;

        if transactions.is_empty() {
            self.send(
                chat_id,
                &format!(
                    "Monthly report - {month_name}\n\nNo transactions found for this month."
                ),
            )
            .await;
            return Ok(());
        }

        let completed =
            |tx: &&Transaction| tx.status == TxStatus::Completed;
        let sum = |kind: TxKind| -> Decimal {
            transactions
                .iter()
                .filter(completed)
                .filter(|tx| tx.kind == kind)
                .map(|tx| tx.amount)
                .sum()
        };

        let funded = sum(TxKind::Funding);
        let airtime = sum(TxKind::Airtime);
        let data = sum(TxKind::Data);
        let spent = airtime + data;
        let successful = transactions.iter().filter(completed).count();
        let failed = transactions
            .iter()
            .filter(|tx| tx.status == TxStatus::Failed)
            .count();

        let mut report = format!(
            "KoboWallet monthly report - {month_name}\n\n\
             Financial summary:\n\
             - Total funded: {}\n\
             - Total spent: {}\n\
             - Net flow: {}\n\n",
            naira(funded),
            naira(spent),
            naira(funded - spent)
        );
        if spent > Decimal::ZERO {
            report.push_str("Spending breakdown:\n");
            if airtime > Decimal::ZERO {
                report.push_str(&format!("- Airtime: {}\n", naira(airtime)));
            }
            if data > Decimal::ZERO {
                report.push_str(&format!("- Data: {}\n", naira(data)));
            }
            report.push('\n');
        }
        report.push_str(&format!(
            "Activity:\n- Total transactions: {}\n- Successful: {}\n- Failed: {}\n",
            transactions.len(),
            successful,
            failed
        ));
        if let Ok(balance) = self.ledger.balance(user.id).await {
            report.push_str(&format!("\nCurrent balance: {}", naira(balance)));
        }

        self.send(chat_id, &report).await;
        Ok(())
    }

    // ==================== funding ====================

    async fn send_funding_link(
        &self,
        chat_id: i64,
        telegram_id: i64,
        user: &User,
        amount: Decimal,
    ) -> Result<(), Error> {
        let result = self.orchestrator.funding_link(user, amount).await;
        // Link minted or not, the funding dialog is over.
        self.sessions.clear(telegram_id).await;

        match result {
            Ok(link) => {
                self.send(
                    chat_id,
                    &format!(
                        "Payment link ready!\n\nAmount: {}\nReference: {}\n\n\
                         Pay securely here:\n{}\n\n\
                         Your wallet is credited automatically after payment.",
                        naira(amount),
                        link.reference,
                        link.url
                    ),
                )
                .await;
            }
            Err(err) => {
                error!(%err, user_id = %user.id, "payment link generation failed");
                self.send(
                    chat_id,
                    "Failed to generate a payment link. Please try again later.",
                )
                .await;
            }
        }
        Ok(())
    }

    // ==================== helpers ====================

    async fn reply_purchase_outcome(&self, chat_id: i64, outcome: PurchaseOutcome) {
        let reply = match outcome {
            PurchaseOutcome::Success {
                reference,
                new_balance,
                message,
            } => format!(
                "✅ {message}\n\nReference: {}\nNew balance: {}",
                reference.unwrap_or_else(|| "-".to_string()),
                naira(new_balance)
            ),
            PurchaseOutcome::InsufficientFunds { .. } => REPLY_INSUFFICIENT.to_string(),
            PurchaseOutcome::Refunded { provider_message } => format!(
                "❌ Purchase failed: {provider_message}\n\
                 The amount has been refunded to your wallet."
            ),
        };
        self.send(chat_id, &reply).await;
    }

    /// Send a reply, logging delivery failures. A reply that cannot be
    /// delivered is not recoverable from here.
    async fn send(&self, chat_id: i64, text: &str) {
        if let Err(err) = self.transport.send_message(chat_id, text).await {
            error!(%err, chat_id, "failed to send reply");
        }
    }

    /// Delete a PIN-bearing message from the chat. Best-effort: failure is
    /// logged and never affects the dialog.
    async fn purge_pin_message(&self, msg: &IncomingMessage) {
        if let Err(err) = self
            .transport
            .delete_message(msg.chat_id, msg.message_id)
            .await
        {
            debug!(%err, chat_id = msg.chat_id, "could not delete PIN message");
        }
    }
}

fn render_plans(plans: &[DataPlan]) -> String {
    plans
        .iter()
        .map(|plan| format!("- {} - {}", plan.name, naira(plan.amount)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn month_name(month: u32) -> &'static str {
    match month {
        1 => "January",
        2 => "February",
        3 => "March",
        4 => "April",
        5 => "May",
        6 => "June",
        7 => "July",
        8 => "August",
        9 => "September",
        10 => "October",
        11 => "November",
        _ => "December",
    }
}

fn welcome_back_text(first_name: &str) -> String {
    format!(
        "Welcome back to KoboWallet, {first_name}!\n\n\
         What you can do:\n\
         - Check your wallet balance\n\
         - Buy airtime for any network\n\
         - Purchase data bundles\n\
         - Fund your wallet instantly\n\
         - View transaction history and monthly reports\n\n\
         Just tell me what you want in plain English, e.g. \
         \"Check my balance\" or \"Buy ₦500 MTN airtime\"."
    )
}

fn capabilities_text() -> String {
    "I didn't quite understand that. Here's what I can help with:\n\n\
     Wallet:\n- \"Check my balance\"\n- \"Fund my wallet\"\n- \"Add ₦2000 to wallet\"\n\n\
     Airtime & data:\n- \"Buy ₦500 MTN airtime for 08123456789\"\n- \"Get me 2GB Airtel data\"\n\n\
     Reports:\n- \"Show my transactions\"\n- \"Monthly report\"\n\n\
     Security:\n- \"Change my PIN\"\n\n\
     Just type naturally - I understand plain English."
        .to_string()
}

fn help_text() -> String {
    "KoboWallet help\n\n\
     Commands:\n\
     /start - Register or restart\n\
     /balance - Check wallet balance\n\
     /help - Show this message\n\n\
     Natural language examples:\n\
     - \"Check my balance\"\n\
     - \"Buy ₦500 MTN airtime for 08123456789\"\n\
     - \"Get me 2GB Airtel data\"\n\
     - \"Fund my wallet with ₦2000\"\n\
     - \"Monthly report\"\n\n\
     Supported networks: MTN, Airtel, Glo, 9mobile"
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(is_valid_email("ada@gmail.com"));
        assert!(is_valid_email("a.b+c@sub.domain.ng"));
        assert!(!is_valid_email("ada@gmail"));
        assert!(!is_valid_email("not-an-email"));
    }

    #[test]
    fn phone_validation_requires_valid_prefix() {
        assert!(is_valid_phone_number("08123456789"));
        assert!(is_valid_phone_number("07051234567"));
        assert!(is_valid_phone_number("09112345678"));
        assert!(!is_valid_phone_number("0612345678"));
        assert!(!is_valid_phone_number("8123456789"));
        assert!(!is_valid_phone_number("081234567890"));
    }

    #[test]
    fn pin_validation_is_four_to_six_digits() {
        assert!(is_valid_pin("1234"));
        assert!(is_valid_pin("123456"));
        assert!(!is_valid_pin("123"));
        assert!(!is_valid_pin("1234567"));
        assert!(!is_valid_pin("12a4"));
    }

    #[test]
    fn naira_formats_two_decimal_places() {
        use rust_decimal_macros::dec;
        assert_eq!(naira(dec!(500)), "₦500.00");
        assert_eq!(naira(dec!(1234.5)), "₦1234.50");
    }
}
