//! Error types for the conversation starter service

pub use crate::auth::AuthError;
pub use crate::gateway::GatewayError;
pub use crate::inference::InferenceError;
pub use crate::store::StoreError;

/// Top-level error for wiring and running the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration could not be loaded or is invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A listener could not be bound or served.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The gRPC transport failed to start or to connect.
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// An HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Record store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Inference backend failure.
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;
