/// In-process users collection.
pub mod memory;

/// Firestore REST backend.
pub mod firestore;

pub use firestore::FirestoreRecordStore;
pub use memory::MemoryRecordStore;

use async_trait::async_trait;

use crate::auth::Principal;

/// Failure while resolving an API key.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No principal owns the key.
    #[error("No principal owns this API key")]
    NotFound,

    /// The store answered with a non-success status.
    #[error("Record store unavailable: {0}")]
    Unavailable(String),

    /// The store could not be reached.
    #[error("Record store transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The store answered with a body we could not interpret.
    #[error("Malformed record store response: {0}")]
    Decode(String),
}

/// Resolves API keys to the principal that owns them.
///
/// Implementations return at most one principal per key and must be safe to
/// share across concurrent calls.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Looks up the principal whose API key list contains `api_key`.
    async fn find_principal(&self, api_key: &str) -> Result<Principal, StoreError>;
}
