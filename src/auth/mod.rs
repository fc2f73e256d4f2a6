//! API-key authentication.
//!
//! Callers present `authorization: Bearer <api-key>`. The key is resolved
//! against the injected [`RecordStore`] on every call; nothing is cached and
//! no session is established.

/// Tower layer enforcing authentication in front of gRPC services.
pub mod layer;

pub use layer::{AuthLayer, RequireApiKey};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::HeaderMap;
use metrics::counter;
use tonic::Status;
use tracing::{debug, warn};

use crate::deadline;
use crate::store::{RecordStore, StoreError};

/// Metadata key carrying the credential.
pub const AUTHORIZATION_METADATA_KEY: &str = "authorization";

/// Scheme expected in the authorization header.
pub const BEARER_SCHEME: &str = "bearer";

/// Default bound on a single record store lookup.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Identity resolved from a valid API key, scoped to one call.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Principal(String);

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Opaque identifier assigned by the record store.
    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a call was rejected.
///
/// Every variant surfaces to callers as `Unauthenticated`; the variants only
/// exist so logs and metrics can tell a bad key from a failing store.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No authorization header was sent.
    #[error("missing bearer credential")]
    MissingCredential,

    /// The header is not `Bearer <token>`.
    #[error("malformed authorization header")]
    MalformedCredential,

    /// The store does not know the key.
    #[error("unknown api key")]
    UnknownKey,

    /// The store could not answer.
    #[error("record store lookup failed: {0}")]
    Lookup(#[source] StoreError),

    /// The store did not answer within the lookup deadline.
    #[error("record store lookup timed out after {0:?}")]
    Timeout(Duration),
}

impl AuthError {
    /// Short label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "missing",
            AuthError::MalformedCredential => "malformed",
            AuthError::UnknownKey => "unknown_key",
            AuthError::Lookup(_) => "store_error",
            AuthError::Timeout(_) => "timeout",
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AuthError::UnknownKey,
            other => AuthError::Lookup(other),
        }
    }
}

impl From<AuthError> for Status {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredential | AuthError::MalformedCredential => {
                Status::unauthenticated(err.to_string())
            }
            AuthError::UnknownKey | AuthError::Lookup(_) | AuthError::Timeout(_) => {
                Status::unauthenticated("invalid api key")
            }
        }
    }
}

/// Extracts the bearer token from request headers.
///
/// The scheme is matched case-insensitively; the token must be a single
/// non-empty word.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION_METADATA_KEY)
        .ok_or(AuthError::MissingCredential)?
        .to_str()
        .map_err(|_| AuthError::MalformedCredential)?;

    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or(AuthError::MalformedCredential)?;

    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        return Err(AuthError::MalformedCredential);
    }

    let token = token.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(AuthError::MalformedCredential);
    }

    Ok(token)
}

/// Resolves bearer credentials to principals.
///
/// Cheap to clone; clones share the record store handle.
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn RecordStore>,
    lookup_timeout: Duration,
}

impl Authenticator {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    /// Caps each record store lookup at `timeout`.
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Authenticates a call from its headers.
    ///
    /// The lookup runs under the caller's `grpc-timeout` budget, capped by the
    /// configured lookup timeout.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, AuthError> {
        let result = self.resolve(headers).await;

        match &result {
            Ok(principal) => {
                counter!("auth.success").increment(1);
                debug!(auth.uid = %principal, "api key accepted");
            }
            Err(err) => {
                counter!("auth.failures", "reason" => err.reason()).increment(1);
                warn!(reason = err.reason(), error = %err, "rejected call");
            }
        }

        result
    }

    async fn resolve(&self, headers: &HeaderMap) -> Result<Principal, AuthError> {
        let token = bearer_token(headers)?;
        let limit = deadline::bounded(deadline::from_headers(headers), self.lookup_timeout);

        match tokio::time::timeout(limit, self.store.find_principal(token)).await {
            Ok(found) => Ok(found?),
            Err(_) => Err(AuthError::Timeout(limit)),
        }
    }
}
