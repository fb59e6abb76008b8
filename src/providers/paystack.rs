//! Paystack payment-link adapter.
//!
//! Mints a hosted payment page via `POST /transaction/initialize`. Amounts
//! are NGN at this boundary and converted to kobo on the wire. Without a
//! secret key the client runs in demo mode and returns a placeholder link.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::config::PaystackConfig;
use crate::error::ProviderError;

use super::{PaymentLink, PaymentLinkProvider};

#[derive(Debug, Deserialize)]
struct InitializeResponse {
    #[serde(default)]
    status: bool,
    #[serde(default)]
    message: Option<String>,
    data: Option<InitializeData>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    reference: String,
}

/// Paystack HTTP client implementing [`PaymentLinkProvider`].
pub struct PaystackClient {
    http: Client,
    base_url: String,
    secret_key: Option<SecretString>,
    callback_url: Option<String>,
}

impl PaystackClient {
    pub fn new(config: &PaystackConfig) -> Self {
        if config.secret_key.is_none() {
            warn!("Paystack secret key not configured, payment links will be simulated");
        }
        Self {
            http: Client::new(),
            base_url: config.base_url.clone(),
            secret_key: config.secret_key.clone(),
            callback_url: config.callback_url.clone(),
        }
    }
}

#[async_trait]
impl PaymentLinkProvider for PaystackClient {
    async fn generate_payment_link(
        &self,
        email: &str,
        amount: Decimal,
        reference: &str,
        metadata: Value,
    ) -> Result<PaymentLink, ProviderError> {
        let Some(secret_key) = &self.secret_key else {
            return Ok(PaymentLink {
                url: format!("https://demo-payment.example/pay?amount={amount}&ref={reference}"),
                reference: reference.to_string(),
            });
        };

        // Paystack expects the amount in kobo.
        let kobo = (amount * dec!(100)).round().to_i64().ok_or_else(|| {
            ProviderError::Rejected {
                provider: "paystack",
                message: format!("amount {amount} is out of range"),
            }
        })?;

        let mut body = serde_json::json!({
            "email": email,
            "amount": kobo,
            "reference": reference,
            "metadata": metadata,
        });
        if let Some(callback_url) = &self.callback_url {
            body["callback_url"] = Value::String(callback_url.clone());
        }

        let response = self
            .http
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(secret_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|err| ProviderError::RequestFailed {
                provider: "paystack",
                reason: err.to_string(),
            })?;

        let payload: InitializeResponse = response.json().await?;
        match payload.data {
            Some(data) if payload.status => Ok(PaymentLink {
                url: data.authorization_url,
                reference: data.reference,
            }),
            _ => Err(ProviderError::Rejected {
                provider: "paystack",
                message: payload
                    .message
                    .unwrap_or_else(|| "Failed to generate payment link".to_string()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PaystackConfig;

    #[tokio::test]
    async fn demo_mode_returns_placeholder_link() {
        let client = PaystackClient::new(&PaystackConfig {
            base_url: "https://api.paystack.co".to_string(),
            secret_key: None,
            callback_url: None,
        });

        let link = client
            .generate_payment_link(
                "ada@example.com",
                dec!(2000),
                "FUND_42_1700000000000",
                serde_json::json!({}),
            )
            .await
            .unwrap();

        assert_eq!(link.reference, "FUND_42_1700000000000");
        assert!(link.url.contains("ref=FUND_42_1700000000000"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_surfaces_a_request_failure() {
        let client = PaystackClient::new(&PaystackConfig {
            // Nothing listens here; the connection is refused immediately.
            base_url: "http://127.0.0.1:9".to_string(),
            secret_key: Some(SecretString::from("sk_test_x")),
            callback_url: None,
        });

        let err = client
            .generate_payment_link(
                "ada@example.com",
                dec!(500),
                "FUND_42_1700000000000",
                serde_json::json!({}),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProviderError::RequestFailed {
                provider: "paystack",
                ..
            }
        ));
    }
}
