//! Per-user conversation state.
//!
//! Dialog state is ephemeral and process-local: a user mid-registration or
//! mid-purchase has an entry here, everyone else is idle. Entries are
//! created when a multi-step interaction starts and cleared on completion,
//! cancellation, or any unrecoverable error. Losing the map on restart is
//! acceptable — dialogs are short-lived and resume by re-prompting.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::agent::intent::Network;
use crate::store::TxKind;

/// Named position of a user within a multi-message interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogStep {
    FirstName,
    LastName,
    Email,
    PhoneNumber,
    SetPin,
    ConfirmPurchase,
    EnterPin,
    FundAmount,
}

/// What a staged purchase pays for. Funding is not a purchase; it has its
/// own link-minting path and never enters the debit/fulfill sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseKind {
    Airtime,
    Data,
}

impl PurchaseKind {
    pub fn tx_kind(&self) -> TxKind {
        match self {
            Self::Airtime => TxKind::Airtime,
            Self::Data => TxKind::Data,
        }
    }
}

impl std::fmt::Display for PurchaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tx_kind().as_str())
    }
}

/// A fully-resolved purchase carried through the confirm/PIN steps and
/// handed to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPurchase {
    pub kind: PurchaseKind,
    pub amount: Decimal,
    pub network: Network,
    pub phone_number: String,
    pub data_size: Option<String>,
}

/// Data accumulated over the current dialog.
#[derive(Debug, Clone, Default)]
pub struct DialogData {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    /// Set once the account exists (PIN steps, purchase confirmation).
    pub user_id: Option<Uuid>,
    pub purchase: Option<PendingPurchase>,
}

/// One user's dialog position plus its accumulated data.
#[derive(Debug, Clone)]
pub struct UserSession {
    pub step: DialogStep,
    pub data: DialogData,
}

impl UserSession {
    pub fn at(step: DialogStep) -> Self {
        Self {
            step,
            data: DialogData::default(),
        }
    }

    pub fn with_data(step: DialogStep, data: DialogData) -> Self {
        Self { step, data }
    }
}

/// Process-wide conversation map keyed by Telegram user id.
///
/// Only the dialog state machine writes entries. The per-user guard from
/// [`SessionStore::lock_user`] serializes message handling for one user
/// while distinct users proceed concurrently, which keeps the
/// order-dependent step transitions safe.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<i64, UserSession>>,
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the per-user serialization guard. Held by the dispatcher for
    /// the full span of one message.
    ///
    /// Guards and waiters each hold a clone of the entry's `Arc`, so a
    /// strong count of 1 means the user is idle; those entries are pruned
    /// here to keep the map bounded by concurrently-active users.
    pub async fn lock_user(&self, telegram_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|id, lock| *id == telegram_id || Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(telegram_id).or_default())
        };
        lock.lock_owned().await
    }

    pub async fn get(&self, telegram_id: i64) -> Option<UserSession> {
        self.sessions.lock().await.get(&telegram_id).cloned()
    }

    pub async fn set(&self, telegram_id: i64, session: UserSession) {
        self.sessions.lock().await.insert(telegram_id, session);
    }

    pub async fn clear(&self, telegram_id: i64) {
        self.sessions.lock().await.remove(&telegram_id);
    }
}
