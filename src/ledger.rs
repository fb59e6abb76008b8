//! Ledger gateway: the only path to wallet balances and the transaction log.
//!
//! Callers never assign balances directly; every mutation goes through
//! [`LedgerGateway::adjust`], which rides the store's serialized
//! read-check-write so a debit below zero is rejected atomically.

use std::sync::Arc;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

use crate::error::{StoreError, WalletError};
use crate::store::{NewTransaction, RecordStore, Transaction, TxStatus};

/// Direction of a balance adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Credit,
    Debit,
}

/// Wallet and transaction operations over the record store.
#[derive(Clone)]
pub struct LedgerGateway {
    store: Arc<dyn RecordStore>,
}

impl LedgerGateway {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn balance(&self, user_id: Uuid) -> Result<Decimal, WalletError> {
        match self.store.wallet_balance(user_id).await {
            Ok(balance) => Ok(balance),
            Err(StoreError::NotFound { .. }) => Err(WalletError::NotFound(user_id)),
            Err(err) => Err(err.into()),
        }
    }

    /// Adjust the wallet by `amount` in the given direction and return the
    /// post-operation balance. A debit exceeding the current balance fails
    /// with [`WalletError::InsufficientFunds`] and leaves the balance
    /// untouched.
    pub async fn adjust(
        &self,
        user_id: Uuid,
        amount: Decimal,
        direction: Direction,
    ) -> Result<Decimal, WalletError> {
        let delta = match direction {
            Direction::Credit => amount,
            Direction::Debit => -amount,
        };

        match self.store.adjust_balance(user_id, delta).await {
            Ok(new_balance) => {
                debug!(%user_id, %amount, ?direction, %new_balance, "wallet adjusted");
                Ok(new_balance)
            }
            Err(StoreError::Constraint(_)) if direction == Direction::Debit => {
                let balance = self.balance(user_id).await?;
                Err(WalletError::InsufficientFunds {
                    balance,
                    requested: amount,
                })
            }
            Err(StoreError::NotFound { .. }) => Err(WalletError::NotFound(user_id)),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn append_transaction(
        &self,
        tx: NewTransaction,
    ) -> Result<Transaction, StoreError> {
        self.store.create_transaction(tx).await
    }

    pub async fn settle_transaction(
        &self,
        tx_id: Uuid,
        status: TxStatus,
        reference: Option<String>,
    ) -> Result<(), StoreError> {
        self.store.settle_transaction(tx_id, status, reference).await
    }

    pub async fn recent_transactions(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Transaction>, StoreError> {
        self.store.recent_transactions(user_id, limit).await
    }

    /// Transactions created since the first day of the current month.
    pub async fn current_month_transactions(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Transaction>, StoreError> {
        let now = Utc::now();
        let month_start = first_of_month(now);
        self.store.transactions_since(user_id, month_start).await
    }
}

fn first_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, NewUser};
    use rust_decimal_macros::dec;

    async fn seeded_ledger(initial: Decimal) -> (LedgerGateway, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .create_user(NewUser {
                telegram_id: 42,
                first_name: "Ada".to_string(),
                last_name: "Obi".to_string(),
                email: "ada@example.com".to_string(),
                phone_number: "08123456789".to_string(),
            })
            .await
            .unwrap();
        let ledger = LedgerGateway::new(store);
        if initial > Decimal::ZERO {
            ledger
                .adjust(user.id, initial, Direction::Credit)
                .await
                .unwrap();
        }
        (ledger, user.id)
    }

    #[tokio::test]
    async fn debit_returns_post_operation_balance() {
        let (ledger, user_id) = seeded_ledger(dec!(1000)).await;
        let new_balance = ledger
            .adjust(user_id, dec!(500), Direction::Debit)
            .await
            .unwrap();
        assert_eq!(new_balance, dec!(500));
    }

    #[tokio::test]
    async fn over_debit_fails_with_insufficient_funds_and_no_change() {
        let (ledger, user_id) = seeded_ledger(dec!(100)).await;
        let err = ledger
            .adjust(user_id, dec!(250), Direction::Debit)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WalletError::InsufficientFunds { balance, requested }
                if balance == dec!(100) && requested == dec!(250)
        ));
        assert_eq!(ledger.balance(user_id).await.unwrap(), dec!(100));
    }

    #[tokio::test]
    async fn credit_then_debit_nets_to_zero() {
        let (ledger, user_id) = seeded_ledger(dec!(1000)).await;
        ledger
            .adjust(user_id, dec!(300), Direction::Debit)
            .await
            .unwrap();
        ledger
            .adjust(user_id, dec!(300), Direction::Credit)
            .await
            .unwrap();
        assert_eq!(ledger.balance(user_id).await.unwrap(), dec!(1000));
    }

    #[tokio::test]
    async fn missing_wallet_is_reported_as_not_found() {
        let store = Arc::new(MemoryStore::new());
        let ledger = LedgerGateway::new(store);
        let ghost = Uuid::new_v4();
        assert!(matches!(
            ledger.balance(ghost).await.unwrap_err(),
            WalletError::NotFound(id) if id == ghost
        ));
    }
}
