//! Messaging transport abstraction.
//!
//! The core only ever sends replies and (best-effort) deletes PIN-bearing
//! messages; delivery mechanics live behind [`Transport`].

pub mod telegram;

use async_trait::async_trait;

use crate::error::ChannelError;

pub use telegram::{TelegramClient, TelegramPoller};

/// An inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: i64,
    /// Telegram identity of the sender; the key for sessions and accounts.
    pub user_id: i64,
    pub message_id: i64,
    pub text: String,
}

/// Outbound messaging operations the core depends on.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ChannelError>;

    /// Remove a message from the chat. Callers treat failure as non-fatal;
    /// implementations should still report it so it can be logged.
    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), ChannelError>;
}
