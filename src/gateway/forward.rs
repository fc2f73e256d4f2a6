use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Response, Status};

use crate::proto::conversation_starter_service_client::ConversationStarterServiceClient;
use crate::proto::conversation_starter_service_server::ConversationStarterService;
use crate::proto::{ConversationStarterRequest, ConversationStarterResponse};

/// Serves the RPC by forwarding it to a remote gRPC server.
///
/// Lets the gateway run as its own process: calls go over the transport and
/// pass through the remote server's authentication layer.
#[derive(Clone)]
pub struct RemoteStarter {
    client: ConversationStarterServiceClient<Channel>,
}

impl RemoteStarter {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: ConversationStarterServiceClient::new(channel),
        }
    }

    /// Creates a forwarder for `upstream`; the connection is made on first use.
    pub fn connect_lazy(upstream: impl Into<String>) -> Result<Self, tonic::transport::Error> {
        let channel = Endpoint::from_shared(upstream.into())?.connect_lazy();
        Ok(Self::new(channel))
    }
}

#[tonic::async_trait]
impl ConversationStarterService for RemoteStarter {
    async fn get_conversation_starter(
        &self,
        request: Request<ConversationStarterRequest>,
    ) -> Result<Response<ConversationStarterResponse>, Status> {
        let mut client = self.client.clone();
        client.get_conversation_starter(request).await
    }
}
