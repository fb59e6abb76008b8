//! The conversational agent: intent classification, dialog state, the
//! message-handling state machine, and the purchase orchestrator.

pub mod dialog;
pub mod handler;
pub mod intent;
pub mod orchestrator;

pub use dialog::{DialogStep, PendingPurchase, PurchaseKind, SessionStore, UserSession};
pub use handler::{HandlerDeps, MessageHandler};
pub use intent::{Intent, IntentClassifier, Network};
pub use orchestrator::{PurchaseOrchestrator, PurchaseOutcome};
