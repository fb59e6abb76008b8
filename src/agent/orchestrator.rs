//! Purchase and funding orchestration.
//!
//! The money path: debit the wallet, log a pending transaction, call the
//! fulfillment provider, settle the row, and compensate the debit if the
//! provider failed. The debit and its compensating credit are two separate
//! ledger mutations with no combined rollback, so the compensation step is
//! tried unconditionally on provider failure and its own failure is
//! surfaced as a distinct, operator-actionable error.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agent::dialog::{PendingPurchase, PurchaseKind};
use crate::error::{OrchestratorError, ProviderError, WalletError};
use crate::ledger::{Direction, LedgerGateway};
use crate::providers::{FulfillmentProvider, PaymentLink, PaymentLinkProvider};
use crate::store::{NewTransaction, TxStatus, User};

/// Result of a purchase attempt, folded into a user reply by the handler.
#[derive(Debug, Clone, PartialEq)]
pub enum PurchaseOutcome {
    /// Fulfillment succeeded; the debit stands.
    Success {
        reference: Option<String>,
        new_balance: Decimal,
        message: String,
    },
    /// The debit was rejected up front; nothing was recorded.
    InsufficientFunds { balance: Decimal },
    /// Fulfillment failed and the debit was credited back in full.
    Refunded { provider_message: String },
}

/// Executes resolved purchase/funding requests against the ledger and the
/// remote providers.
pub struct PurchaseOrchestrator {
    ledger: LedgerGateway,
    fulfillment: Arc<dyn FulfillmentProvider>,
    payments: Arc<dyn PaymentLinkProvider>,
}

impl PurchaseOrchestrator {
    pub fn new(
        ledger: LedgerGateway,
        fulfillment: Arc<dyn FulfillmentProvider>,
        payments: Arc<dyn PaymentLinkProvider>,
    ) -> Self {
        Self {
            ledger,
            fulfillment,
            payments,
        }
    }

    /// Run the debit → log → fulfill → settle → compensate sequence.
    pub async fn execute(
        &self,
        user_id: Uuid,
        purchase: &PendingPurchase,
    ) -> Result<PurchaseOutcome, OrchestratorError> {
        // Reserve: fail fast before any record exists.
        let new_balance = match self
            .ledger
            .adjust(user_id, purchase.amount, Direction::Debit)
            .await
        {
            Ok(balance) => balance,
            Err(WalletError::InsufficientFunds { balance, requested }) => {
                info!(%user_id, %balance, %requested, "purchase rejected, insufficient funds");
                return Ok(PurchaseOutcome::InsufficientFunds { balance });
            }
            Err(err) => return Err(err.into()),
        };

        // Log intent before the remote call so a crash in between is auditable.
        let tx = self
            .ledger
            .append_transaction(NewTransaction {
                user_id,
                kind: purchase.kind.tx_kind(),
                amount: purchase.amount,
                network: Some(purchase.network),
                phone_number: Some(purchase.phone_number.clone()),
                status: TxStatus::Pending,
                description: format!("{} purchase - {}", purchase.kind, purchase.network),
                reference: None,
            })
            .await?;

        // Fulfill.
        let outcome = match purchase.kind {
            PurchaseKind::Airtime => {
                self.fulfillment
                    .purchase_airtime(purchase.network, purchase.amount, &purchase.phone_number)
                    .await
            }
            PurchaseKind::Data => {
                let data_size = purchase.data_size.as_deref().unwrap_or_default();
                self.fulfillment
                    .purchase_data(purchase.network, data_size, &purchase.phone_number)
                    .await
            }
        };

        // Settle: attempted for both outcomes, and a failure here must not
        // block compensation.
        let status = if outcome.success {
            TxStatus::Completed
        } else {
            TxStatus::Failed
        };
        if let Err(err) = self
            .ledger
            .settle_transaction(tx.id, status, outcome.reference.clone())
            .await
        {
            error!(%err, tx_id = %tx.id, "failed to settle transaction record");
        }

        if outcome.success {
            info!(
                %user_id,
                tx_id = %tx.id,
                reference = outcome.reference.as_deref().unwrap_or("-"),
                "purchase fulfilled"
            );
            return Ok(PurchaseOutcome::Success {
                reference: outcome.reference,
                new_balance,
                message: outcome.message,
            });
        }

        // Compensate: credit the debit back before replying.
        warn!(%user_id, tx_id = %tx.id, "fulfillment failed, refunding debit");
        match self
            .ledger
            .adjust(user_id, purchase.amount, Direction::Credit)
            .await
        {
            Ok(_) => Ok(PurchaseOutcome::Refunded {
                provider_message: outcome.message,
            }),
            Err(source) => {
                error!(
                    %user_id,
                    amount = %purchase.amount,
                    %source,
                    "compensating credit failed, funds require operator attention"
                );
                Err(OrchestratorError::CompensationFailed {
                    user_id,
                    amount: purchase.amount,
                    source,
                })
            }
        }
    }

    /// Mint a hosted payment link for wallet funding. Crediting happens out
    /// of band via the payment provider's callback, not here.
    pub async fn funding_link(
        &self,
        user: &User,
        amount: Decimal,
    ) -> Result<PaymentLink, ProviderError> {
        let reference = format!("FUND_{}_{}", user.telegram_id, Utc::now().timestamp_millis());
        self.payments
            .generate_payment_link(
                &user.email,
                amount,
                &reference,
                json!({ "userId": user.id, "telegramId": user.telegram_id }),
            )
            .await
    }
}
