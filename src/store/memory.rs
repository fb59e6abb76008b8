//! In-memory record store.
//!
//! A process-local concurrent map behind the [`RecordStore`] trait. All
//! mutations take the single write lock, which makes `adjust_balance` a
//! serialized read-check-write per wallet and `create_user` atomic across
//! the user row and its wallet.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;

use super::{NewTransaction, NewUser, RecordStore, Transaction, TxStatus, User, Wallet};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    wallets: HashMap<Uuid, Wallet>,
    transactions: Vec<Transaction>,
}

/// Process-local store backing for development and tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.inner.write().await;

        for existing in tables.users.values() {
            if existing.telegram_id == new_user.telegram_id {
                return Err(StoreError::Duplicate { field: "account" });
            }
            if existing.email.eq_ignore_ascii_case(&new_user.email) {
                return Err(StoreError::Duplicate { field: "email" });
            }
            if existing.phone_number == new_user.phone_number {
                return Err(StoreError::Duplicate {
                    field: "phone number",
                });
            }
        }

        let user = User {
            id: Uuid::new_v4(),
            telegram_id: new_user.telegram_id,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            email: new_user.email,
            phone_number: new_user.phone_number,
            pin_hash: None,
            created_at: Utc::now(),
        };

        tables.wallets.insert(
            user.id,
            Wallet {
                user_id: user.id,
                balance: Decimal::ZERO,
            },
        );
        tables.users.insert(user.id, user.clone());

        Ok(user)
    }

    async fn user_by_telegram_id(&self, telegram_id: i64) -> Result<Option<User>, StoreError> {
        let tables = self.inner.read().await;
        Ok(tables
            .users
            .values()
            .find(|user| user.telegram_id == telegram_id)
            .cloned())
    }

    async fn user_by_id(&self, user_id: Uuid) -> Result<User, StoreError> {
        let tables = self.inner.read().await;
        tables
            .users
            .get(&user_id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "user",
                id: user_id.to_string(),
            })
    }

    async fn set_pin_hash(&self, user_id: Uuid, pin_hash: String) -> Result<(), StoreError> {
        let mut tables = self.inner.write().await;
        let user = tables.users.get_mut(&user_id).ok_or(StoreError::NotFound {
            entity: "user",
            id: user_id.to_string(),
        })?;
        user.pin_hash = Some(pin_hash);
        Ok(())
    }

    async fn wallet_balance(&self, user_id: Uuid) -> Result<Decimal, StoreError> {
        let tables = self.inner.read().await;
        tables
            .wallets
            .get(&user_id)
            .map(|wallet| wallet.balance)
            .ok_or(StoreError::NotFound {
                entity: "wallet",
                id: user_id.to_string(),
            })
    }

    async fn adjust_balance(&self, user_id: Uuid, delta: Decimal) -> Result<Decimal, StoreError> {
        let mut tables = self.inner.write().await;
        let wallet = tables
            .wallets
            .get_mut(&user_id)
            .ok_or(StoreError::NotFound {
                entity: "wallet",
                id: user_id.to_string(),
            })?;

        let next = wallet.balance + delta;
        if next < Decimal::ZERO {
            return Err(StoreError::Constraint(format!(
                "balance {} would go negative after {}",
                wallet.balance, delta
            )));
        }
        wallet.balance = next;
        Ok(next)
    }

    async fn create_transaction(&self, tx: NewTransaction) -> Result<Transaction, StoreError> {
        let mut tables = self.inner.write().await;
        if !tables.users.contains_key(&tx.user_id) {
            return Err(StoreError::NotFound {
                entity: "user",
                id: tx.user_id.to_string(),
            });
        }

        let transaction = Transaction {
            id: Uuid::new_v4(),
            user_id: tx.user_id,
            kind: tx.kind,
            amount: tx.amount,
            network: tx.network,
            phone_number: tx.phone_number,
            status: tx.status,
            description: tx.description,
            reference: tx.reference,
            created_at: Utc::now(),
        };
        tables.transactions.push(transaction.clone());
        Ok(transaction)
    }

    async fn settle_transaction(
        &self,
        tx_id: Uuid,
        status: TxStatus,
        reference: Option<String>,
    ) -> Result<(), StoreError> {
        if !status.is_terminal() {
            return Err(StoreError::Constraint(
                "transactions can only settle to a terminal status".to_string(),
            ));
        }

        let mut tables = self.inner.write().await;
        let tx = tables
            .transactions
            .iter_mut()
            .find(|tx| tx.id == tx_id)
            .ok_or(StoreError::NotFound {
                entity: "transaction",
                id: tx_id.to_string(),
            })?;

        if tx.status.is_terminal() {
            return Err(StoreError::Constraint(format!(
                "transaction {} is already settled",
                tx_id
            )));
        }
        tx.status = status;
        if reference.is_some() {
            tx.reference = reference;
        }
        Ok(())
    }

    async fn recent_transactions(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Transaction>, StoreError> {
        let tables = self.inner.read().await;
        let mut rows: Vec<Transaction> = tables
            .transactions
            .iter()
            .filter(|tx| tx.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn transactions_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, StoreError> {
        let tables = self.inner.read().await;
        let mut rows: Vec<Transaction> = tables
            .transactions
            .iter()
            .filter(|tx| tx.user_id == user_id && tx.created_at >= since)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TxKind;
    use rust_decimal_macros::dec;

    fn sample_user(n: i64) -> NewUser {
        NewUser {
            telegram_id: n,
            first_name: "Ada".to_string(),
            last_name: "Obi".to_string(),
            email: format!("ada{n}@example.com"),
            phone_number: format!("0812345{:04}", n),
        }
    }

    #[tokio::test]
    async fn user_and_wallet_created_together_at_zero() {
        let store = MemoryStore::new();
        let user = store.create_user(sample_user(1)).await.unwrap();
        assert_eq!(store.wallet_balance(user.id).await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = MemoryStore::new();
        store.create_user(sample_user(1)).await.unwrap();

        let mut dup = sample_user(2);
        dup.email = "ADA1@example.com".to_string();
        let err = store.create_user(dup).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { field: "email" }));
    }

    #[tokio::test]
    async fn overdraw_is_rejected_and_balance_unchanged() {
        let store = MemoryStore::new();
        let user = store.create_user(sample_user(1)).await.unwrap();
        store.adjust_balance(user.id, dec!(100)).await.unwrap();

        let err = store.adjust_balance(user.id, dec!(-150)).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
        assert_eq!(store.wallet_balance(user.id).await.unwrap(), dec!(100));
    }

    #[tokio::test]
    async fn settled_transaction_cannot_settle_again() {
        let store = MemoryStore::new();
        let user = store.create_user(sample_user(1)).await.unwrap();
        let tx = store
            .create_transaction(NewTransaction {
                user_id: user.id,
                kind: TxKind::Airtime,
                amount: dec!(500),
                network: None,
                phone_number: None,
                status: TxStatus::Pending,
                description: "airtime purchase".to_string(),
                reference: None,
            })
            .await
            .unwrap();

        store
            .settle_transaction(tx.id, TxStatus::Completed, Some("REQ_1".to_string()))
            .await
            .unwrap();
        let err = store
            .settle_transaction(tx.id, TxStatus::Failed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
    }
}
