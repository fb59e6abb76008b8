//! Remote value providers behind normalizing adapters.
//!
//! Providers return heterogeneous vendor shapes; the adapters here reduce
//! everything the orchestrator sees to [`FulfillmentOutcome`] and
//! [`PaymentLink`], so vendor quirks never leak into the purchase flow.

pub mod paystack;
pub mod vtpass;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::agent::intent::Network;
use crate::error::ProviderError;

pub use paystack::PaystackClient;
pub use vtpass::VtpassClient;

/// Uniform outcome of an airtime/data fulfillment attempt.
///
/// Transport errors and vendor rejections both land here as
/// `success == false` with a user-presentable message; fulfillment never
/// raises past this shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulfillmentOutcome {
    pub success: bool,
    pub reference: Option<String>,
    pub message: String,
}

impl FulfillmentOutcome {
    pub fn ok(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            reference: Some(reference.into()),
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            reference: None,
            message: message.into(),
        }
    }
}

/// One entry in a network's data-plan catalogue.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPlan {
    pub name: String,
    pub code: String,
    pub amount: Decimal,
}

/// Prepaid airtime/data fulfillment collaborator.
#[async_trait]
pub trait FulfillmentProvider: Send + Sync {
    async fn purchase_airtime(
        &self,
        network: Network,
        amount: Decimal,
        phone_number: &str,
    ) -> FulfillmentOutcome;

    async fn purchase_data(
        &self,
        network: Network,
        data_size: &str,
        phone_number: &str,
    ) -> FulfillmentOutcome;

    async fn data_plans(&self, network: Network) -> Vec<DataPlan>;
}

/// A minted hosted-payment page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentLink {
    pub url: String,
    pub reference: String,
}

/// Hosted payment-page collaborator for wallet funding.
#[async_trait]
pub trait PaymentLinkProvider: Send + Sync {
    async fn generate_payment_link(
        &self,
        email: &str,
        amount: Decimal,
        reference: &str,
        metadata: Value,
    ) -> Result<PaymentLink, ProviderError>;
}
