//! VTpass fulfillment adapter.
//!
//! Normalizes the vendor's `/pay` responses (`code == "000"` is success)
//! into [`FulfillmentOutcome`]. Service ids, data variation codes, and the
//! plan catalogue are static tables with a baseline fallback: unmapped
//! network or size input degrades to the default entry rather than failing.
//! Every fallback hit is logged at warn because the substitution can charge
//! the user for a different plan than they asked for.
//!
//! Without credentials the client runs in demo mode and simulates success.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{error, warn};

use crate::agent::intent::Network;
use crate::config::VtpassConfig;

use super::{DataPlan, FulfillmentOutcome, FulfillmentProvider};

const SERVICE_UNAVAILABLE: &str = "Service temporarily unavailable";

fn airtime_service_id(network: Network) -> &'static str {
    match network {
        Network::Mtn => "mtn",
        Network::Airtel => "airtel",
        Network::Glo => "glo",
        Network::NineMobile => "etisalat",
    }
}

fn data_service_id(network: Network) -> &'static str {
    match network {
        Network::Mtn => "mtn-data",
        Network::Airtel => "airtel-data",
        Network::Glo => "glo-data",
        Network::NineMobile => "etisalat-data",
    }
}

const DEFAULT_VARIATION_CODE: &str = "1000";

/// (network, size token) -> vendor variation code. Only MTN and Airtel have
/// dedicated tables; everything else falls back to the default code.
fn data_variation_code(network: Network, data_size: &str) -> &'static str {
    let code = match network {
        Network::Mtn => match data_size {
            "500MB" => Some("M500_3"),
            "1GB" => Some("1000"),
            "2GB" => Some("M2000_3"),
            "3GB" => Some("M3000_8"),
            "5GB" => Some("M5000_8"),
            _ => None,
        },
        Network::Airtel => match data_size {
            "500MB" => Some("500MB-30"),
            "1GB" => Some("1GB-30"),
            "2GB" => Some("2GB-30"),
            "3GB" => Some("3GB-30"),
            "5GB" => Some("5GB-30"),
            _ => None,
        },
        Network::Glo | Network::NineMobile => None,
    };

    code.unwrap_or_else(|| {
        warn!(
            %network,
            data_size,
            fallback = DEFAULT_VARIATION_CODE,
            "no variation code mapped, degrading to default"
        );
        DEFAULT_VARIATION_CODE
    })
}

static MTN_PLANS: [(&str, &str, Decimal); 5] = [
    ("500MB - 30 days", "M500_3", dec!(200)),
    ("1GB - 30 days", "1000", dec!(350)),
    ("2GB - 30 days", "M2000_3", dec!(700)),
    ("3GB - 30 days", "M3000_8", dec!(1000)),
    ("5GB - 30 days", "M5000_8", dec!(1500)),
];

static AIRTEL_PLANS: [(&str, &str, Decimal); 5] = [
    ("500MB - 30 days", "500MB-30", dec!(200)),
    ("1GB - 30 days", "1GB-30", dec!(350)),
    ("2GB - 30 days", "2GB-30", dec!(700)),
    ("3GB - 30 days", "3GB-30", dec!(1000)),
    ("5GB - 30 days", "5GB-30", dec!(1500)),
];

fn plan_catalogue(network: Network) -> Vec<DataPlan> {
    let rows: &[(&str, &str, Decimal)] = match network {
        Network::Mtn => &MTN_PLANS,
        Network::Airtel => &AIRTEL_PLANS,
        Network::Glo | Network::NineMobile => {
            warn!(%network, "no plan catalogue mapped, serving the default (MTN) table");
            &MTN_PLANS
        }
    };

    rows.iter()
        .map(|(name, code, amount)| DataPlan {
            name: name.to_string(),
            code: code.to_string(),
            amount: *amount,
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct PayResponse {
    #[serde(default)]
    code: String,
    #[serde(default, rename = "requestId")]
    request_id: Option<String>,
    #[serde(default)]
    response_description: Option<String>,
}

struct Credentials {
    api_key: SecretString,
    secret_key: SecretString,
}

/// VTpass HTTP client implementing [`FulfillmentProvider`].
pub struct VtpassClient {
    http: Client,
    base_url: String,
    credentials: Option<Credentials>,
}

impl VtpassClient {
    pub fn new(config: &VtpassConfig) -> Self {
        let credentials = match (config.api_key.clone(), config.secret_key.clone()) {
            (Some(api_key), Some(secret_key)) => Some(Credentials {
                api_key,
                secret_key,
            }),
            _ => {
                warn!("VTpass credentials not configured, purchases will be simulated");
                None
            }
        };
        Self {
            http: Client::new(),
            base_url: config.base_url.clone(),
            credentials,
        }
    }

    fn demo_outcome(what: &str) -> FulfillmentOutcome {
        FulfillmentOutcome::ok(
            format!("DEMO_{}", Utc::now().timestamp_millis()),
            format!("{what} purchase successful (demo mode)"),
        )
    }

    fn normalize(response: PayResponse, what: &str) -> FulfillmentOutcome {
        if response.code == "000" {
            FulfillmentOutcome {
                success: true,
                reference: response.request_id,
                message: format!("{what} purchase successful"),
            }
        } else {
            FulfillmentOutcome::failed(
                response
                    .response_description
                    .unwrap_or_else(|| "Purchase failed".to_string()),
            )
        }
    }

    async fn pay(
        &self,
        credentials: &Credentials,
        body: serde_json::Value,
        what: &str,
    ) -> FulfillmentOutcome {
        let result = self
            .http
            .post(format!("{}/pay", self.base_url))
            .header("api-key", credentials.api_key.expose_secret())
            .header("secret-key", credentials.secret_key.expose_secret())
            .json(&body)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                error!(%err, what, "fulfillment request failed");
                return FulfillmentOutcome::failed(SERVICE_UNAVAILABLE);
            }
        };

        match response.json::<PayResponse>().await {
            Ok(payload) => Self::normalize(payload, what),
            Err(err) => {
                error!(%err, what, "fulfillment response unreadable");
                FulfillmentOutcome::failed(SERVICE_UNAVAILABLE)
            }
        }
    }
}

#[async_trait]
impl FulfillmentProvider for VtpassClient {
    async fn purchase_airtime(
        &self,
        network: Network,
        amount: Decimal,
        phone_number: &str,
    ) -> FulfillmentOutcome {
        let Some(credentials) = &self.credentials else {
            return Self::demo_outcome("Airtime");
        };

        let body = serde_json::json!({
            "request_id": format!("REQ_{}", Utc::now().timestamp_millis()),
            "serviceID": airtime_service_id(network),
            "amount": amount,
            "phone": phone_number,
        });
        self.pay(credentials, body, "Airtime").await
    }

    async fn purchase_data(
        &self,
        network: Network,
        data_size: &str,
        phone_number: &str,
    ) -> FulfillmentOutcome {
        let Some(credentials) = &self.credentials else {
            return Self::demo_outcome("Data");
        };

        let body = serde_json::json!({
            "request_id": format!("REQ_{}", Utc::now().timestamp_millis()),
            "serviceID": data_service_id(network),
            "billersCode": phone_number,
            "variation_code": data_variation_code(network, data_size),
            "phone": phone_number,
        });
        self.pay(credentials, body, "Data").await
    }

    async fn data_plans(&self, network: Network) -> Vec<DataPlan> {
        plan_catalogue(network)
    }
}
