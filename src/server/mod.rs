/// gRPC service implementation.
pub mod service;

/// Service configuration.
pub mod config;

pub use config::{Config, GeneratorKind, RecordStoreKind};
pub use service::{FixedStarter, StarterGenerator, StarterService, EMPTY_INPUT_MESSAGE};

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic_health::server::health_reporter;
use tower::Layer;
use tracing::{info, warn};

use crate::auth::{AuthLayer, Authenticator, RequireApiKey};
use crate::gateway::{self, RemoteStarter};
use crate::inference::InferenceClient;
use crate::proto::conversation_starter_service_server::ConversationStarterServiceServer;
use crate::store::firestore::FirestoreOptions;
use crate::store::{FirestoreRecordStore, MemoryRecordStore, RecordStore};
use crate::{Error, Result};
use config::RecordStoreSettings;

/// The gRPC service as mounted on the server: authentication in front.
pub type AuthenticatedStarter = RequireApiKey<ConversationStarterServiceServer<StarterService>>;

/// Wraps `service` so every gRPC call is authenticated first.
pub fn authenticated_service(
    service: StarterService,
    authenticator: Authenticator,
) -> AuthenticatedStarter {
    AuthLayer::new(authenticator).layer(ConversationStarterServiceServer::new(service))
}

/// Builds the configured record store.
pub fn record_store(settings: &RecordStoreSettings) -> Result<Arc<dyn RecordStore>> {
    match settings.kind {
        RecordStoreKind::Memory => {
            if settings.users.is_empty() {
                warn!("memory record store has no users; every call will be rejected");
            }
            Ok(Arc::new(MemoryRecordStore::from_users(settings.users.clone())))
        }
        RecordStoreKind::Firestore => {
            let project_id = settings
                .project_id
                .clone()
                .ok_or_else(|| Error::Config("record_store.project_id is not set".to_string()))?;

            let mut options = FirestoreOptions::new(project_id).with_base_url(&settings.base_url);
            options.database = settings.database.clone();
            options.collection = settings.collection.clone();
            options.api_keys_field = settings.api_keys_field.clone();
            if let Some(token) = &settings.access_token {
                options = options.with_access_token(token);
            }

            Ok(Arc::new(FirestoreRecordStore::new(options)?))
        }
    }
}

/// Builds the configured conversation starter generator.
pub fn generator(config: &Config) -> Result<Arc<dyn StarterGenerator>> {
    match config.generator.kind {
        GeneratorKind::Placeholder => Ok(Arc::new(FixedStarter::new(
            config.generator.placeholder.clone(),
        ))),
        GeneratorKind::Inference => {
            let endpoint = config
                .inference
                .endpoint
                .clone()
                .ok_or_else(|| Error::Config("inference.endpoint is not set".to_string()))?;

            let client = InferenceClient::new(endpoint)?.with_timeout(config.inference.timeout());
            Ok(Arc::new(client))
        }
    }
}

/// Service and authenticator built from configuration.
pub struct Components {
    pub service: StarterService,
    pub authenticator: Authenticator,
}

impl Components {
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = record_store(&config.record_store)?;
        let authenticator =
            Authenticator::new(store).with_lookup_timeout(config.auth.lookup_timeout());
        let service = StarterService::new(generator(config)?);

        Ok(Self {
            service,
            authenticator,
        })
    }
}

/// Serves according to `config` until `shutdown` resolves.
///
/// With `gateway.upstream` set only the HTTP gateway runs, forwarding to the
/// upstream gRPC server. Otherwise gRPC (with health checks) and the
/// in-process HTTP gateway are served side by side.
pub async fn run<F>(config: Config, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    config.validate().map_err(Error::Config)?;

    let http_addr = config.http.addr().map_err(Error::Config)?;
    let http_listener = TcpListener::bind(http_addr).await?;

    if let Some(upstream) = &config.gateway.upstream {
        let router = gateway::forwarding_router(RemoteStarter::connect_lazy(upstream.clone())?);
        info!(addr = %http_listener.local_addr()?, upstream = %upstream, "HTTP gateway forwarding to gRPC");

        axum::serve(http_listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        return Ok(());
    }

    let components = Components::from_config(&config)?;

    let grpc_addr = config.grpc.addr().map_err(Error::Config)?;
    let grpc_listener = TcpListener::bind(grpc_addr).await?;

    let (mut health_reporter, health_service) = health_reporter();
    health_reporter
        .set_serving::<ConversationStarterServiceServer<StarterService>>()
        .await;

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown.await;
        health_reporter
            .set_not_serving::<ConversationStarterServiceServer<StarterService>>()
            .await;
        info!("Initiating graceful shutdown (allowing in-flight requests to complete)");
        let _ = stop_tx.send(true);
    });

    info!(addr = %grpc_listener.local_addr()?, "gRPC server listening");
    info!(addr = %http_listener.local_addr()?, "HTTP gateway listening");

    let grpc_service =
        authenticated_service(components.service.clone(), components.authenticator.clone());
    let router = gateway::in_process_router(components.service, components.authenticator);

    let mut grpc_stop = stop_rx.clone();
    let grpc = async move {
        Server::builder()
            .add_service(health_service)
            .add_service(grpc_service)
            .serve_with_incoming_shutdown(TcpListenerStream::new(grpc_listener), async move {
                let _ = grpc_stop.changed().await;
            })
            .await
            .map_err(Error::from)
    };

    let mut http_stop = stop_rx;
    let http = async move {
        axum::serve(http_listener, router)
            .with_graceful_shutdown(async move {
                let _ = http_stop.changed().await;
            })
            .await
            .map_err(Error::from)
    };

    tokio::try_join!(grpc, http)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_is_built_from_users() {
        let mut settings = RecordStoreSettings::default();
        settings
            .users
            .insert("uid-1".to_string(), vec!["key-1".to_string()]);

        let store = record_store(&settings).unwrap();
        assert_eq!(store.find_principal("key-1").await.unwrap().id(), "uid-1");
    }

    #[test]
    fn firestore_store_requires_project() {
        let settings = RecordStoreSettings {
            kind: RecordStoreKind::Firestore,
            ..Default::default()
        };
        assert!(matches!(record_store(&settings), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn placeholder_generator_is_built() {
        let mut config = Config::default();
        config.generator.kind = GeneratorKind::Placeholder;
        config.generator.placeholder = "what's new?".to_string();

        let generator = generator(&config).unwrap();
        assert_eq!(generator.generate("x", None).await.unwrap(), "what's new?");
    }

    #[test]
    fn inference_generator_requires_endpoint() {
        assert!(matches!(generator(&Config::default()), Err(Error::Config(_))));
    }
}
