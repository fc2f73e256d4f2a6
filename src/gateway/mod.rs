//! HTTP/JSON gateway for the conversation starter RPC.
//!
//! `POST /api/conversation/starter/v1` takes a JSON
//! `ConversationStarterRequest`, dispatches it to a
//! [`ConversationStarterService`] and answers with the JSON response, or with
//! an [`ErrorBody`] whose HTTP status follows [`http_status_from_code`].
//!
//! The service is either called in-process, behind the same
//! [`Authenticator`] the gRPC server uses, or reached over a gRPC channel with
//! [`RemoteStarter`], in which case the remote server authenticates.

/// gRPC to HTTP status mapping.
pub mod codes;

/// Gateway error responses.
pub mod error;

/// Transport-forwarding dispatch.
pub mod forward;

pub use codes::http_status_from_code;
pub use error::{ErrorBody, GatewayError};
pub use forward::RemoteStarter;

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Extension, Json, Router};
use tonic::metadata::MetadataMap;

use crate::auth::{Authenticator, Principal, AUTHORIZATION_METADATA_KEY};
use crate::deadline;
use crate::proto::conversation_starter_service_server::ConversationStarterService;
use crate::proto::ConversationStarterRequest;

/// Route serving `GetConversationStarter`.
pub const CONVERSATION_STARTER_PATH: &str = "/api/conversation/starter/v1";

/// Prefix for RPC metadata copied into HTTP response headers.
pub const METADATA_HEADER_PREFIX: &str = "grpc-metadata-";

// Transport-level headers that never become response metadata.
const RESERVED_METADATA: &[&str] = &["content-type", "content-length", "date", "te"];

#[derive(Clone)]
struct GatewayState {
    service: Arc<dyn ConversationStarterService>,
}

/// Gateway calling `service` directly, authenticating with `authenticator`.
pub fn in_process_router<S>(service: S, authenticator: Authenticator) -> Router
where
    S: ConversationStarterService,
{
    Router::new()
        .route(CONVERSATION_STARTER_PATH, post(get_conversation_starter))
        .route_layer(middleware::from_fn_with_state(
            authenticator,
            require_api_key,
        ))
        .with_state(GatewayState {
            service: Arc::new(service),
        })
}

/// Gateway forwarding every call to a remote gRPC server.
pub fn forwarding_router(remote: RemoteStarter) -> Router {
    Router::new()
        .route(CONVERSATION_STARTER_PATH, post(get_conversation_starter))
        .with_state(GatewayState {
            service: Arc::new(remote),
        })
}

async fn require_api_key(
    State(authenticator): State<Authenticator>,
    mut request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let headers = request.headers().clone();
    let principal = authenticator
        .authenticate(&headers)
        .await
        .map_err(|e| GatewayError::Rpc(e.into()))?;

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

async fn get_conversation_starter(
    State(state): State<GatewayState>,
    principal: Option<Extension<Principal>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let message = decode_request(&body)?;

    let mut request = tonic::Request::new(message);
    forward_request_headers(&headers, &mut request);
    if let Some(Extension(principal)) = principal {
        request.extensions_mut().insert(principal);
    }

    let (metadata, message, _) = state
        .service
        .get_conversation_starter(request)
        .await?
        .into_parts();

    let mut response = (StatusCode::OK, Json(message)).into_response();
    merge_metadata(&metadata, response.headers_mut());
    Ok(response)
}

/// Decodes a request body; an empty body is the zero-value request.
pub fn decode_request(body: &[u8]) -> Result<ConversationStarterRequest, GatewayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ConversationStarterRequest::default());
    }

    Ok(serde_json::from_slice(body)?)
}

fn forward_request_headers<T>(headers: &HeaderMap, request: &mut tonic::Request<T>) {
    if let Some(value) = headers
        .get(AUTHORIZATION_METADATA_KEY)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
    {
        request
            .metadata_mut()
            .insert(AUTHORIZATION_METADATA_KEY, value);
    }

    if let Some(budget) = deadline::from_headers(headers) {
        request.set_timeout(budget);
    }
}

/// Copies RPC metadata into HTTP headers under [`METADATA_HEADER_PREFIX`].
pub fn merge_metadata(metadata: &MetadataMap, headers: &mut HeaderMap) {
    for (name, value) in metadata.clone().into_headers().iter() {
        let name = name.as_str();
        if name.starts_with("grpc-") || RESERVED_METADATA.contains(&name) {
            continue;
        }

        let prefixed = format!("{METADATA_HEADER_PREFIX}{name}");
        let Ok(header) = HeaderName::from_bytes(prefixed.as_bytes()) else {
            continue;
        };
        if let Ok(value) = HeaderValue::from_bytes(value.as_bytes()) {
            headers.append(header, value);
        }
    }
}
