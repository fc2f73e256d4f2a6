//! Common test utilities shared across integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conversation_starter::server::authenticated_service;
use conversation_starter::{Authenticator, MemoryRecordStore, StarterGenerator, StarterService};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::Status;

/// Key registered for [`USER_ID`] in [`memory_store`].
pub const API_KEY: &str = "test-api-key";
pub const USER_ID: &str = "user-1";

/// Initialize test tracing (call once at the beginning of tests).
///
/// Only logs from the library are shown, filtering out HTTP/2 and tower noise.
/// Subsequent calls are safe and will be ignored.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new("conversation_starter=debug");

    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(filter)
        .try_init();
}

pub fn memory_store() -> MemoryRecordStore {
    MemoryRecordStore::from_users([(USER_ID.to_string(), vec![API_KEY.to_string()])])
}

pub fn authenticator() -> Authenticator {
    Authenticator::new(Arc::new(memory_store()))
}

/// Generator that echoes its input and counts how often it was reached.
#[derive(Default)]
pub struct CountingGenerator {
    calls: AtomicUsize,
}

impl CountingGenerator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StarterGenerator for CountingGenerator {
    async fn generate(&self, input: &str, _budget: Option<Duration>) -> Result<String, Status> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("What do you think about {input}?"))
    }
}

/// Serves the authenticated gRPC service on an ephemeral port.
pub async fn start_grpc_server(
    generator: Arc<dyn StarterGenerator>,
) -> (String, tokio::task::JoinHandle<()>) {
    let service = authenticated_service(StarterService::new(generator), authenticator());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let local_addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        Server::builder()
            .add_service(service)
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    (format!("http://{local_addr}"), handle)
}

/// `Bearer <key>` request metadata for `key`.
pub fn with_api_key<T>(message: T, key: &str) -> tonic::Request<T> {
    let mut request = tonic::Request::new(message);
    request
        .metadata_mut()
        .insert("authorization", format!("Bearer {key}").parse().unwrap());
    request
}
