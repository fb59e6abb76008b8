//! Record-store entities and the backing trait.
//!
//! The store is pure persistence: users, their wallets, and the immutable
//! transaction log. Business rules (minimum amounts, confirmation flows,
//! compensation) live above it in the ledger gateway and the orchestrator.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::agent::intent::Network;
use crate::error::StoreError;

pub use memory::MemoryStore;

/// A registered user, linked to a Telegram identity.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub telegram_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    /// Bcrypt digest of the transaction PIN; `None` until the user sets one.
    pub pin_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields captured during registration.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub telegram_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
}

/// Custodial balance, one per user. Balance is NGN with 2dp precision and is
/// never negative at any observable point.
#[derive(Debug, Clone)]
pub struct Wallet {
    pub user_id: Uuid,
    pub balance: Decimal,
}

/// What a transaction paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    Airtime,
    Data,
    Funding,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Airtime => "airtime",
            Self::Data => "data",
            Self::Funding => "funding",
        }
    }
}

impl std::fmt::Display for TxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction lifecycle. `Pending` transitions exactly once to a terminal
/// state; terminal rows are never mutated again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Completed,
    Failed,
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Immutable-once-settled record of a purchase or funding event.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: TxKind,
    pub amount: Decimal,
    pub network: Option<Network>,
    pub phone_number: Option<String>,
    pub status: TxStatus,
    pub description: String,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields for appending a new transaction row.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: Uuid,
    pub kind: TxKind,
    pub amount: Decimal,
    pub network: Option<Network>,
    pub phone_number: Option<String>,
    pub status: TxStatus,
    pub description: String,
    pub reference: Option<String>,
}

/// Persistence collaborator for users, wallets, and transactions.
///
/// Implementations must make `adjust_balance` a single serialized
/// read-check-write per wallet: a debit that would take the balance below
/// zero is rejected atomically with [`StoreError::Constraint`], leaving the
/// balance untouched.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create a user and their zero-balance wallet as one atomic unit.
    /// Uniqueness on telegram id, email, and phone number is enforced here.
    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError>;

    async fn user_by_telegram_id(&self, telegram_id: i64) -> Result<Option<User>, StoreError>;

    async fn user_by_id(&self, user_id: Uuid) -> Result<User, StoreError>;

    async fn set_pin_hash(&self, user_id: Uuid, pin_hash: String) -> Result<(), StoreError>;

    async fn wallet_balance(&self, user_id: Uuid) -> Result<Decimal, StoreError>;

    /// Apply a signed delta to the wallet balance and return the new balance.
    /// Rejects any delta that would leave the balance negative.
    async fn adjust_balance(&self, user_id: Uuid, delta: Decimal) -> Result<Decimal, StoreError>;

    async fn create_transaction(&self, tx: NewTransaction) -> Result<Transaction, StoreError>;

    /// Transition a pending transaction to a terminal status, recording the
    /// provider reference when one was issued. Settling an already-terminal
    /// row is a constraint violation.
    async fn settle_transaction(
        &self,
        tx_id: Uuid,
        status: TxStatus,
        reference: Option<String>,
    ) -> Result<(), StoreError>;

    /// Most recent transactions for a user, newest first.
    async fn recent_transactions(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// All transactions for a user created at or after `since`, newest first.
    async fn transactions_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, StoreError>;
}
