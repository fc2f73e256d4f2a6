use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use tonic::{Request, Response, Status};
use tracing::info;

use crate::auth::Principal;
use crate::deadline;
use crate::inference::InferenceClient;
use crate::proto::conversation_starter_service_server::ConversationStarterService;
use crate::proto::{ConversationStarterRequest, ConversationStarterResponse};

/// Message returned for requests without input. Callers match on it.
pub const EMPTY_INPUT_MESSAGE: &str = "input is empty";

/// Produces a conversation starter for a validated input.
#[async_trait]
pub trait StarterGenerator: Send + Sync + 'static {
    async fn generate(&self, input: &str, budget: Option<Duration>) -> Result<String, Status>;
}

#[async_trait]
impl StarterGenerator for InferenceClient {
    async fn generate(
        &self,
        input: &str,
        budget: Option<Duration>,
    ) -> Result<String, Status> {
        self.query(input, budget).await.map_err(Status::from)
    }
}

/// Generator that ignores its input and returns a fixed starter.
#[derive(Clone, Debug)]
pub struct FixedStarter {
    output: String,
}

impl FixedStarter {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
        }
    }
}

impl Default for FixedStarter {
    fn default() -> Self {
        Self::new("random")
    }
}

#[async_trait]
impl StarterGenerator for FixedStarter {
    async fn generate(
        &self,
        _input: &str,
        _budget: Option<Duration>,
    ) -> Result<String, Status> {
        Ok(self.output.clone())
    }
}

/// gRPC service implementation for conversation starters.
#[derive(Clone)]
pub struct StarterService {
    generator: Arc<dyn StarterGenerator>,
}

impl StarterService {
    /// Creates a service delegating valid requests to `generator`.
    pub fn new(generator: Arc<dyn StarterGenerator>) -> Self {
        Self { generator }
    }

    #[allow(clippy::result_large_err)]
    fn validate_input(input: &str) -> Result<(), Status> {
        if input.is_empty() {
            return Err(Status::invalid_argument(EMPTY_INPUT_MESSAGE));
        }

        Ok(())
    }

    async fn handle(
        &self,
        input: &str,
        budget: Option<Duration>,
    ) -> Result<ConversationStarterResponse, Status> {
        Self::validate_input(input)?;

        let output = self.generator.generate(input, budget).await?;
        if output.is_empty() {
            return Err(Status::internal("generator returned an empty conversation starter"));
        }

        Ok(ConversationStarterResponse { output })
    }
}

#[tonic::async_trait]
impl ConversationStarterService for StarterService {
    async fn get_conversation_starter(
        &self,
        request: Request<ConversationStarterRequest>,
    ) -> Result<Response<ConversationStarterResponse>, Status> {
        let start = Instant::now();
        counter!("starter.requests").increment(1);

        let budget = deadline::from_metadata(request.metadata());
        let principal = request
            .extensions()
            .get::<Principal>()
            .map(|p| p.id().to_string());
        let req = request.into_inner();

        info!(input = %req.input, principal = ?principal, "conversation starter requested");

        let result = self.handle(&req.input, budget).await;

        histogram!("starter.duration").record(start.elapsed().as_secs_f64());

        match result {
            Ok(response) => {
                counter!("starter.success").increment(1);
                Ok(Response::new(response))
            }
            Err(status) => {
                counter!("starter.failure", "code" => format!("{:?}", status.code()))
                    .increment(1);
                Err(status)
            }
        }
    }
}
