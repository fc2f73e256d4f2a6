//! Client for the downstream text-generation backend.
//!
//! One POST per call, no retries. The response must match
//! [`InferenceResultV1`] exactly; anything else is a decode error.

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tonic::Status;
use tracing::debug;

use crate::deadline;

/// Default bound on a single inference call.
pub const DEFAULT_INFERENCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Request body sent to the backend.
#[derive(Debug, Serialize)]
pub struct InferencePayload<'a> {
    pub inputs: &'a str,
}

/// Version 1 of the backend's result schema.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InferenceResultV1 {
    pub output: String,
}

/// Inference call failure.
///
/// HTTP failure classes are not distinguished: any status other
/// than 200 is reported the same way.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// The backend could not be reached.
    #[error("Inference transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The backend answered with a status other than 200.
    #[error("Inference backend returned {0}")]
    Status(String),

    /// The body did not match the result schema.
    #[error("Malformed inference response: {0}")]
    Decode(#[source] serde_json::Error),

    /// No answer within the call deadline.
    #[error("Inference call timed out after {0:?}")]
    Timeout(Duration),
}

impl From<InferenceError> for Status {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::Transport(_) | InferenceError::Status(_) => {
                Status::unavailable(err.to_string())
            }
            InferenceError::Decode(_) => Status::internal(err.to_string()),
            InferenceError::Timeout(_) => Status::deadline_exceeded(err.to_string()),
        }
    }
}

/// HTTP client for a fixed inference endpoint.
#[derive(Clone, Debug)]
pub struct InferenceClient {
    endpoint: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl InferenceClient {
    /// Creates a client for `endpoint` with a default HTTP client.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(InferenceError::Transport)?;
        Ok(Self::with_client(endpoint, client))
    }

    /// Creates a client sharing an existing HTTP client.
    pub fn with_client(endpoint: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: DEFAULT_INFERENCE_TIMEOUT,
            client,
        }
    }

    /// Caps every call at `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sends `payload` to the backend and returns its output verbatim.
    ///
    /// `budget` is the caller's remaining time; the call is bounded by the
    /// smaller of it and the configured timeout.
    pub async fn query(
        &self,
        payload: &str,
        budget: Option<Duration>,
    ) -> Result<String, InferenceError> {
        let limit = deadline::bounded(budget, self.timeout);

        tokio::time::timeout(limit, self.send(payload))
            .await
            .map_err(|_| InferenceError::Timeout(limit))?
    }

    async fn send(&self, payload: &str) -> Result<String, InferenceError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&InferencePayload { inputs: payload })
            .send()
            .await
            .map_err(InferenceError::Transport)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(InferenceError::Status(status.to_string()));
        }

        let body = response.bytes().await.map_err(InferenceError::Transport)?;
        let result: InferenceResultV1 =
            serde_json::from_slice(&body).map_err(InferenceError::Decode)?;

        debug!(output_len = result.output.len(), "inference completed");
        Ok(result.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_uses_inputs_key() {
        let body = serde_json::to_value(InferencePayload { inputs: "hi" }).unwrap();
        assert_eq!(body, serde_json::json!({ "inputs": "hi" }));
    }

    #[test]
    fn result_schema_fails_closed() {
        let ok: InferenceResultV1 = serde_json::from_str(r#"{"output":"x"}"#).unwrap();
        assert_eq!(ok.output, "x");

        for body in [
            r#"{}"#,
            r#"{"output":1}"#,
            r#"{"output":"x","score":0.5}"#,
            r#"[{"output":"x"}]"#,
        ] {
            assert!(
                serde_json::from_str::<InferenceResultV1>(body).is_err(),
                "{body} should be rejected"
            );
        }
    }

    #[test]
    fn errors_map_to_rpc_codes() {
        let status = Status::from(InferenceError::Status("500 Internal Server Error".into()));
        assert_eq!(status.code(), tonic::Code::Unavailable);

        let decode = serde_json::from_str::<InferenceResultV1>("nope").unwrap_err();
        assert_eq!(
            Status::from(InferenceError::Decode(decode)).code(),
            tonic::Code::Internal
        );

        let status = Status::from(InferenceError::Timeout(Duration::from_secs(1)));
        assert_eq!(status.code(), tonic::Code::DeadlineExceeded);
    }
}
