//! Transaction PIN hashing.

use async_trait::async_trait;
use tracing::error;

/// One-way hashing collaborator for transaction PINs.
#[async_trait]
pub trait PinHasher: Send + Sync {
    /// Hash a PIN for storage. Returns `None` only if the hasher itself
    /// fails, which callers surface as a generic retry-later reply.
    async fn hash(&self, pin: &str) -> Option<String>;

    /// Verify a PIN against a stored digest. Any internal failure counts
    /// as a non-match.
    async fn verify(&self, pin: &str, digest: &str) -> bool;
}

/// Bcrypt-backed hasher, cost 12. Hashing runs on the blocking pool so a
/// ~quarter-second bcrypt round never stalls message dispatch.
#[derive(Debug, Clone, Copy, Default)]
pub struct BcryptPinHasher;

const BCRYPT_COST: u32 = 12;

impl BcryptPinHasher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PinHasher for BcryptPinHasher {
    async fn hash(&self, pin: &str) -> Option<String> {
        let pin = pin.to_string();
        let result = tokio::task::spawn_blocking(move || bcrypt::hash(pin, BCRYPT_COST)).await;
        match result {
            Ok(Ok(digest)) => Some(digest),
            Ok(Err(err)) => {
                error!(%err, "bcrypt hashing failed");
                None
            }
            Err(err) => {
                error!(%err, "bcrypt hashing task panicked");
                None
            }
        }
    }

    async fn verify(&self, pin: &str, digest: &str) -> bool {
        let pin = pin.to_string();
        let digest = digest.to_string();
        let result = tokio::task::spawn_blocking(move || bcrypt::verify(pin, &digest)).await;
        matches!(result, Ok(Ok(true)))
    }
}
