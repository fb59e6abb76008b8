//! Error types for KoboWallet.

use rust_decimal::Decimal;
use uuid::Uuid;

/// Top-level error type for the agent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Record-store failures. Anything here is a persistence problem; business
/// rules live in the ledger and handler layers.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Duplicate {field}: an account with this {field} already exists")]
    Duplicate { field: &'static str },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Store backend unavailable: {0}")]
    Backend(String),
}

/// Wallet business-rule errors surfaced by the ledger gateway.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("Insufficient funds: balance {balance} cannot cover {requested}")]
    InsufficientFunds { balance: Decimal, requested: Decimal },

    #[error("No wallet for user {0}")]
    NotFound(Uuid),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Remote-provider errors (fulfillment, payment link, intent LLM).
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: &'static str, reason: String },

    #[error("Provider {provider} rejected the request: {message}")]
    Rejected { provider: &'static str, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Transport-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send message to chat {chat_id}: {reason}")]
    SendFailed { chat_id: i64, reason: String },

    #[error("Failed to delete message {message_id} in chat {chat_id}: {reason}")]
    DeleteFailed {
        chat_id: i64,
        message_id: i64,
        reason: String,
    },

    #[error("Polling failed: {0}")]
    PollFailed(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Purchase-orchestration errors that cannot be folded into a user reply by
/// the orchestrator itself.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// The compensating credit after a failed fulfillment also failed. Funds
    /// are in limbo for this user until an operator intervenes, so this is
    /// surfaced distinctly rather than as a generic failure.
    #[error("Compensation failed for user {user_id}: could not refund {amount}: {source}")]
    CompensationFailed {
        user_id: Uuid,
        amount: Decimal,
        #[source]
        source: WalletError,
    },

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
