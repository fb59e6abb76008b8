//! Intent model and free-text classification.
//!
//! The intent set is closed: everything a user can ask for is one of the
//! variants below, and every parameter is optional at this layer. The
//! dialog state machine treats missing parameters as "ask for them", so
//! classifiers are free to be imprecise but must never fail — the LLM
//! classifier degrades to the regex fallback on any error.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

/// Mobile networks the fulfillment provider supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mtn,
    Airtel,
    Glo,
    NineMobile,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mtn => "MTN",
            Self::Airtel => "Airtel",
            Self::Glo => "Glo",
            Self::NineMobile => "9mobile",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mtn" => Some(Self::Mtn),
            "airtel" => Some(Self::Airtel),
            "glo" => Some(Self::Glo),
            "9mobile" | "etisalat" => Some(Self::NineMobile),
            _ => None,
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved intent extracted from a free-text message.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    BalanceCheck,
    WalletFund {
        amount: Option<Decimal>,
    },
    AirtimePurchase {
        amount: Option<Decimal>,
        network: Option<Network>,
        phone_number: Option<String>,
    },
    DataPurchase {
        network: Option<Network>,
        phone_number: Option<String>,
        data_size: Option<String>,
    },
    Transactions,
    MonthlyReport,
    SetPin,
    ChangePin,
    Unknown,
}

/// Free-text to intent extraction. Infallible by contract: implementations
/// return [`Intent::Unknown`] rather than erroring.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Intent;
}

fn amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"₦?(\d+)").expect("static regex"))
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{11})").expect("static regex"))
}

fn network_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(mtn|airtel|glo|9mobile)").expect("static regex"))
}

fn data_size_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(gb|mb)").expect("static regex"))
}

fn extract_amount(text: &str) -> Option<Decimal> {
    amount_re()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<Decimal>().ok())
}

fn extract_phone(text: &str) -> Option<String> {
    phone_re()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn extract_network(text: &str) -> Option<Network> {
    network_re()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| Network::parse(m.as_str()))
}

fn extract_data_size(text: &str) -> Option<String> {
    data_size_re().captures(text).map(|caps| {
        format!(
            "{}{}",
            caps.get(1).map(|m| m.as_str()).unwrap_or_default(),
            caps.get(2)
                .map(|m| m.as_str().to_ascii_uppercase())
                .unwrap_or_default()
        )
    })
}

/// Keyword/regex intent classifier. Used standalone when no LLM key is
/// configured and as the fallback path for [`LlmClassifier`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternClassifier;

impl PatternClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify_text(&self, text: &str) -> Intent {
        let lower = text.to_lowercase();

        if lower.contains("balance") {
            return Intent::BalanceCheck;
        }

        if lower.contains("fund") || lower.contains("add money") || lower.contains("top up") {
            return Intent::WalletFund {
                amount: extract_amount(text),
            };
        }

        if lower.contains("transaction") || lower.contains("history") || lower.contains("last") {
            return Intent::Transactions;
        }

        if lower.contains("monthly") || lower.contains("report") || lower.contains("summary") {
            return Intent::MonthlyReport;
        }

        if lower.contains("set pin") || lower.contains("new pin") {
            return Intent::SetPin;
        }

        if lower.contains("change pin") || lower.contains("reset pin") {
            return Intent::ChangePin;
        }

        if lower.contains("airtime") || lower.contains("recharge") {
            return Intent::AirtimePurchase {
                amount: extract_amount(text),
                network: extract_network(text),
                phone_number: extract_phone(text),
            };
        }

        if lower.contains("data") || lower.contains("gb") || lower.contains("mb") {
            return Intent::DataPurchase {
                network: extract_network(text),
                phone_number: extract_phone(text),
                data_size: extract_data_size(text),
            };
        }

        Intent::Unknown
    }
}

#[async_trait]
impl IntentClassifier for PatternClassifier {
    async fn classify(&self, text: &str) -> Intent {
        self.classify_text(text)
    }
}

/// Wire shape the extraction prompt asks the model to emit.
#[derive(Debug, Deserialize)]
struct IntentWire {
    #[serde(default)]
    intent: String,
    #[serde(default)]
    amount: Option<f64>,
    #[serde(default)]
    network: Option<String>,
    #[serde(default, rename = "phoneNumber")]
    phone_number: Option<String>,
    #[serde(default, rename = "dataSize")]
    data_size: Option<String>,
}

impl IntentWire {
    fn into_intent(self) -> Intent {
        let amount = self.amount.and_then(Decimal::from_f64);
        let network = self.network.as_deref().and_then(Network::parse);
        match self.intent.as_str() {
            "balance_check" => Intent::BalanceCheck,
            "wallet_fund" => Intent::WalletFund { amount },
            "airtime_purchase" => Intent::AirtimePurchase {
                amount,
                network,
                phone_number: self.phone_number,
            },
            "data_purchase" => Intent::DataPurchase {
                network,
                phone_number: self.phone_number,
                data_size: self.data_size,
            },
            "transactions" => Intent::Transactions,
            "monthly_report" => Intent::MonthlyReport,
            "set_pin" => Intent::SetPin,
            "change_pin" => Intent::ChangePin,
            _ => Intent::Unknown,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

const GEMINI_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:generateContent";

/// LLM-backed classifier with a regex fallback.
///
/// Sends an extraction prompt to Gemini and parses the first JSON object in
/// the reply. Any transport, parse, or shape failure falls back to
/// [`PatternClassifier`], so classification itself never fails.
pub struct LlmClassifier {
    http: Client,
    api_key: SecretString,
    endpoint: String,
    fallback: PatternClassifier,
}

impl LlmClassifier {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            http: Client::new(),
            api_key,
            endpoint: GEMINI_ENDPOINT.to_string(),
            fallback: PatternClassifier::new(),
        }
    }

    fn prompt(text: &str) -> String {
        format!(
            "Analyze this message and extract the intent and parameters. \
             Return ONLY a JSON object with this exact structure:\n\
             {{\"intent\":\"balance_check|wallet_fund|airtime_purchase|data_purchase|transactions|monthly_report|set_pin|change_pin|unknown\",\
             \"amount\":number or null,\
             \"network\":\"MTN|Airtel|Glo|9mobile\" or null,\
             \"phoneNumber\":\"phone number\" or null,\
             \"dataSize\":\"data amount like 1GB, 500MB\" or null}}\n\n\
             Message: \"{text}\""
        )
    }

    async fn classify_remote(&self, text: &str) -> Option<Intent> {
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": Self::prompt(text) }] }]
        });

        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("key", self.api_key.expose_secret())])
            .json(&body)
            .send()
            .await
            .ok()?
            .error_for_status()
            .ok()?;

        let payload: GenerateContentResponse = response.json().await.ok()?;
        let reply = payload
            .candidates
            .first()?
            .content
            .parts
            .first()
            .map(|part| part.text.as_str())?;

        // The model wraps its JSON in prose more often than not.
        static JSON_RE: OnceLock<Regex> = OnceLock::new();
        let json_re = JSON_RE.get_or_init(|| Regex::new(r"\{[\s\S]*\}").expect("static regex"));
        let blob = json_re.find(reply)?.as_str();

        let wire: IntentWire = serde_json::from_str(blob).ok()?;
        Some(wire.into_intent())
    }
}

#[async_trait]
impl IntentClassifier for LlmClassifier {
    async fn classify(&self, text: &str) -> Intent {
        match self.classify_remote(text).await {
            Some(intent) => {
                debug!(?intent, "intent extracted by model");
                intent
            }
            None => {
                warn!("intent extraction via model failed, using pattern fallback");
                self.fallback.classify_text(text)
            }
        }
    }
}
