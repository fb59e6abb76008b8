//! Configuration for KoboWallet.
//!
//! Everything comes from env vars (a local `.env` is loaded via dotenvy at
//! startup). Provider credentials are optional: a missing VTpass/Paystack/
//! Gemini key switches the corresponding client into demo mode instead of
//! failing startup, so the bot stays usable in development.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::SecretString;

use crate::error::ConfigError;

/// Read an optional env var, treating empty values as unset.
pub(crate) fn optional_env(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

/// Read a required env var.
pub(crate) fn require_env(key: &str) -> Result<String, ConfigError> {
    optional_env(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Main configuration for the agent.
#[derive(Debug, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub vtpass: VtpassConfig,
    pub paystack: PaystackConfig,
    pub gemini: GeminiConfig,
    pub wallet: WalletConfig,
}

/// Telegram Bot API transport settings.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub api_base: String,
    /// Long-poll timeout passed to `getUpdates`, in seconds.
    pub poll_timeout_secs: u64,
}

/// VTpass fulfillment provider settings. Without both keys the client runs
/// in demo mode and simulates successful purchases.
#[derive(Debug, Clone)]
pub struct VtpassConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub secret_key: Option<SecretString>,
}

/// Paystack payment-link provider settings.
#[derive(Debug, Clone)]
pub struct PaystackConfig {
    pub base_url: String,
    pub secret_key: Option<SecretString>,
    pub callback_url: Option<String>,
}

/// Gemini intent-extraction settings. Without a key the regex fallback
/// classifier is used alone.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<SecretString>,
}

/// Wallet business-rule settings.
#[derive(Debug, Clone)]
pub struct WalletConfig {
    /// Minimum amount accepted for a wallet funding request, in NGN.
    pub min_funding: Decimal,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let min_funding = match optional_env("MIN_FUNDING_AMOUNT") {
            Some(raw) => raw
                .parse::<Decimal>()
                .map_err(|e| ConfigError::InvalidValue {
                    key: "MIN_FUNDING_AMOUNT".to_string(),
                    message: format!("must be a decimal amount: {e}"),
                })?,
            None => dec!(100),
        };

        let poll_timeout_secs = match optional_env("TELEGRAM_POLL_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                key: "TELEGRAM_POLL_TIMEOUT_SECS".to_string(),
                message: format!("must be a number of seconds: {e}"),
            })?,
            None => 30,
        };

        Ok(Self {
            telegram: TelegramConfig {
                bot_token: SecretString::from(require_env("TELEGRAM_BOT_TOKEN")?),
                api_base: optional_env("TELEGRAM_API_BASE")
                    .unwrap_or_else(|| "https://api.telegram.org".to_string()),
                poll_timeout_secs,
            },
            vtpass: VtpassConfig {
                base_url: optional_env("VTPASS_BASE_URL")
                    .unwrap_or_else(|| "https://vtpass.com/api".to_string()),
                api_key: optional_env("VTPASS_API_KEY").map(SecretString::from),
                secret_key: optional_env("VTPASS_SECRET_KEY").map(SecretString::from),
            },
            paystack: PaystackConfig {
                base_url: optional_env("PAYSTACK_BASE_URL")
                    .unwrap_or_else(|| "https://api.paystack.co".to_string()),
                secret_key: optional_env("PAYSTACK_SECRET_KEY").map(SecretString::from),
                callback_url: optional_env("PAYSTACK_CALLBACK_URL"),
            },
            gemini: GeminiConfig {
                api_key: optional_env("GEMINI_API_KEY").map(SecretString::from),
            },
            wallet: WalletConfig { min_funding },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_env_treats_blank_as_unset() {
        std::env::set_var("KOBOWALLET_TEST_BLANK", "   ");
        assert_eq!(optional_env("KOBOWALLET_TEST_BLANK"), None);
        std::env::remove_var("KOBOWALLET_TEST_BLANK");
    }

    #[test]
    fn require_env_reports_missing_key() {
        let err = require_env("KOBOWALLET_TEST_MISSING").unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "KOBOWALLET_TEST_MISSING"));
    }
}
