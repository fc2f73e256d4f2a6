use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tonic::{Code, Status};
use tracing::debug;

use super::codes::http_status_from_code;
use super::merge_metadata;

/// JSON error body returned by the gateway.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Status message from the RPC.
    pub error: String,
    /// Numeric gRPC status code.
    pub code: i32,
}

/// Failure while serving a gateway request.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The body is not a valid request message.
    #[error("{0}")]
    Decode(#[from] serde_json::Error),

    /// The RPC itself failed.
    #[error("{}", .0.message())]
    Rpc(#[from] Status),
}

impl GatewayError {
    /// gRPC code the failure is reported under.
    pub fn code(&self) -> Code {
        match self {
            GatewayError::Decode(_) => Code::InvalidArgument,
            GatewayError::Rpc(status) => status.code(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let code = self.code();
        let status = http_status_from_code(code);

        let mut headers = HeaderMap::new();
        if let GatewayError::Rpc(rpc_status) = &self {
            merge_metadata(rpc_status.metadata(), &mut headers);
        }

        debug!(code = ?code, http_status = %status, "gateway request failed");

        let body = ErrorBody {
            error: self.to_string(),
            code: code as i32,
        };
        (status, headers, Json(body)).into_response()
    }
}
