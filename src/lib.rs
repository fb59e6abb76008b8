//! KoboWallet: a conversational Telegram wallet for Nigerian airtime and
//! data, with Paystack-backed wallet funding.
//!
//! The crate is organized around a small set of trait seams so the dialog
//! state machine and the purchase orchestrator can be exercised against
//! in-memory fakes:
//!
//! - [`channels::Transport`] - outbound chat messaging
//! - [`agent::IntentClassifier`] - free text to structured intent
//! - [`store::RecordStore`] - users, wallets, and the transaction log
//! - [`providers::FulfillmentProvider`] - airtime/data delivery
//! - [`providers::PaymentLinkProvider`] - hosted payment links
//! - [`security::PinHasher`] - transaction-PIN hashing

pub mod agent;
pub mod channels;
pub mod config;
pub mod error;
pub mod ledger;
pub mod providers;
pub mod security;
pub mod store;

pub use config::Config;
pub use error::Error;
