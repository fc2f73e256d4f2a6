//! Conversation starter service exposed over gRPC and HTTP/JSON.
//!
//! A single unary operation, `GetConversationStarter`, is served by
//! [`server::StarterService`]. gRPC callers go through [`auth::AuthLayer`],
//! which resolves a bearer API key against a [`store::RecordStore`] before the
//! call is dispatched. HTTP callers go through the [`gateway`], which decodes
//! JSON into the RPC message and maps RPC statuses back to HTTP.

/// Generated protobuf messages and gRPC stubs.
pub mod proto {
    tonic::include_proto!("starter.v1");
}

/// API-key authentication for gRPC and HTTP callers.
pub mod auth;

/// Call deadline helpers.
pub mod deadline;

/// Error types.
pub mod error;

/// HTTP/JSON gateway in front of the RPC service.
pub mod gateway;

/// Downstream text-generation client.
pub mod inference;

/// RPC service, configuration and process wiring.
pub mod server;

/// Principal lookup backends.
pub mod store;

pub use auth::{AuthLayer, Authenticator, Principal};
pub use error::{Error, Result};
pub use inference::InferenceClient;
pub use server::{Config, FixedStarter, StarterGenerator, StarterService};
pub use store::{FirestoreRecordStore, MemoryRecordStore, RecordStore};
