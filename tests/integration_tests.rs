mod common;

use std::sync::Arc;

use common::{init_tracing, start_grpc_server, with_api_key, CountingGenerator, API_KEY};
use conversation_starter::proto::conversation_starter_service_client::ConversationStarterServiceClient;
use conversation_starter::proto::ConversationStarterRequest;
use conversation_starter::FixedStarter;
use tonic::transport::Channel;
use tonic::{Code, Request};

fn request(input: &str) -> ConversationStarterRequest {
    ConversationStarterRequest {
        input: input.to_string(),
    }
}

async fn connect(url: String) -> ConversationStarterServiceClient<Channel> {
    ConversationStarterServiceClient::connect(url)
        .await
        .expect("Failed to connect to server")
}

#[tokio::test]
async fn authenticated_call_returns_starter() {
    init_tracing();
    let generator = Arc::new(CountingGenerator::default());
    let (url, _handle) = start_grpc_server(generator.clone()).await;
    let mut client = connect(url).await;

    let response = client
        .get_conversation_starter(with_api_key(request("hiking"), API_KEY))
        .await
        .expect("Call should succeed")
        .into_inner();

    assert_eq!(response.output, "What do you think about hiking?");
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn empty_input_is_invalid_argument() {
    init_tracing();
    let generator = Arc::new(CountingGenerator::default());
    let (url, _handle) = start_grpc_server(generator.clone()).await;
    let mut client = connect(url).await;

    let status = client
        .get_conversation_starter(with_api_key(request(""), API_KEY))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::InvalidArgument);
    assert_eq!(status.message(), "input is empty");
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn missing_credential_never_reaches_handler() {
    init_tracing();
    let generator = Arc::new(CountingGenerator::default());
    let (url, _handle) = start_grpc_server(generator.clone()).await;
    let mut client = connect(url).await;

    let status = client
        .get_conversation_starter(Request::new(request("hiking")))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::Unauthenticated);
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn unknown_key_is_unauthenticated() {
    init_tracing();
    let generator = Arc::new(CountingGenerator::default());
    let (url, _handle) = start_grpc_server(generator.clone()).await;
    let mut client = connect(url).await;

    let status = client
        .get_conversation_starter(with_api_key(request("hiking"), "not-a-key"))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::Unauthenticated);
    assert_eq!(status.message(), "invalid api key");
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn malformed_credential_is_unauthenticated() {
    init_tracing();
    let generator = Arc::new(CountingGenerator::default());
    let (url, _handle) = start_grpc_server(generator.clone()).await;
    let mut client = connect(url).await;

    let mut call = Request::new(request("hiking"));
    call.metadata_mut()
        .insert("authorization", format!("Basic {API_KEY}").parse().unwrap());

    let status = client.get_conversation_starter(call).await.unwrap_err();

    assert_eq!(status.code(), Code::Unauthenticated);
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn empty_input_without_credential_is_rejected_by_auth_first() {
    init_tracing();
    let (url, _handle) = start_grpc_server(Arc::new(CountingGenerator::default())).await;
    let mut client = connect(url).await;

    let status = client
        .get_conversation_starter(Request::new(request("")))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::Unauthenticated);
}

#[tokio::test]
async fn repeated_calls_are_independent() {
    init_tracing();
    let (url, _handle) = start_grpc_server(Arc::new(FixedStarter::default())).await;
    let mut client = connect(url).await;

    let first = client
        .get_conversation_starter(with_api_key(request("weather"), API_KEY))
        .await
        .unwrap()
        .into_inner();
    let second = client
        .get_conversation_starter(with_api_key(request("weather"), API_KEY))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(first, second);
    assert_eq!(first.output, "random");
}

#[tokio::test]
async fn concurrent_calls_are_served() {
    init_tracing();
    let generator = Arc::new(CountingGenerator::default());
    let (url, _handle) = start_grpc_server(generator.clone()).await;
    let client = connect(url).await;

    let mut handles = Vec::new();
    for i in 0..10 {
        let mut client = client.clone();
        handles.push(tokio::spawn(async move {
            client
                .get_conversation_starter(with_api_key(request(&format!("topic {i}")), API_KEY))
                .await
                .map(|r| r.into_inner().output)
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let output = handle.await.unwrap().expect("Call should succeed");
        assert_eq!(output, format!("What do you think about topic {i}?"));
    }
    assert_eq!(generator.calls(), 10);
}
