use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use kobowallet::agent::handler::{HandlerDeps, MessageHandler};
use kobowallet::agent::intent::{IntentClassifier, LlmClassifier, PatternClassifier};
use kobowallet::channels::telegram::{TelegramClient, TelegramPoller};
use kobowallet::config::Config;
use kobowallet::providers::paystack::PaystackClient;
use kobowallet::providers::vtpass::VtpassClient;
use kobowallet::security::BcryptPinHasher;
use kobowallet::store::MemoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional .env for local development; absence is fine.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("loading configuration")?;

    let telegram = Arc::new(TelegramClient::new(&config.telegram));
    let classifier: Arc<dyn IntentClassifier> = match config.gemini.api_key.clone() {
        Some(api_key) => Arc::new(LlmClassifier::new(api_key)),
        None => {
            info!("GEMINI_API_KEY not set, using pattern-based intent classification");
            Arc::new(PatternClassifier::new())
        }
    };

    let handler = Arc::new(MessageHandler::new(HandlerDeps {
        transport: telegram.clone(),
        store: Arc::new(MemoryStore::new()),
        classifier,
        fulfillment: Arc::new(VtpassClient::new(&config.vtpass)),
        payments: Arc::new(PaystackClient::new(&config.paystack)),
        hasher: Arc::new(BcryptPinHasher::new()),
        min_funding: config.wallet.min_funding,
    }));

    info!("KoboWallet agent starting");
    let poller = TelegramPoller::new(telegram, handler);
    poller.run().await.context("telegram polling loop exited")?;
    Ok(())
}
