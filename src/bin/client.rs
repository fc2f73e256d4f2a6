use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use conversation_starter::gateway::{ErrorBody, CONVERSATION_STARTER_PATH};
use conversation_starter::proto::conversation_starter_service_client::ConversationStarterServiceClient;
use conversation_starter::proto::{ConversationStarterRequest, ConversationStarterResponse};
use tonic::metadata::MetadataValue;
use tonic::Request;

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "Conversation starter client", long_about = None)]
struct Cli {
    /// gRPC endpoint, or the HTTP gateway base URL with --http
    #[arg(short, long, default_value = "http://127.0.0.1:50051")]
    server: String,

    /// API key sent as a bearer credential
    #[arg(short = 'k', long, env = "STARTER_API_KEY")]
    api_key: String,

    /// Call the HTTP/JSON gateway instead of gRPC
    #[arg(long)]
    http: bool,

    /// Text to start a conversation from
    input: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let start = Instant::now();

    let result = if cli.http {
        call_http(&cli).await
    } else {
        call_grpc(&cli).await
    };

    match result {
        Ok(output) => {
            println!("{output}");
            eprintln!("({:.2}ms)", start.elapsed().as_secs_f64() * 1000.0);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn call_grpc(cli: &Cli) -> Result<String, Box<dyn std::error::Error>> {
    let mut client = ConversationStarterServiceClient::connect(cli.server.clone()).await?;

    let mut request = Request::new(ConversationStarterRequest {
        input: cli.input.clone(),
    });
    let credential: MetadataValue<_> = format!("Bearer {}", cli.api_key).parse()?;
    request.metadata_mut().insert("authorization", credential);

    let response = client.get_conversation_starter(request).await?;
    Ok(response.into_inner().output)
}

async fn call_http(cli: &Cli) -> Result<String, Box<dyn std::error::Error>> {
    let url = format!(
        "{}{CONVERSATION_STARTER_PATH}",
        cli.server.trim_end_matches('/')
    );

    let response = reqwest::Client::new()
        .post(url)
        .bearer_auth(&cli.api_key)
        .json(&ConversationStarterRequest {
            input: cli.input.clone(),
        })
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body: ErrorBody = response.json().await?;
        return Err(format!("HTTP {status}: {} (code {})", body.error, body.code).into());
    }

    let body: ConversationStarterResponse = response.json().await?;
    Ok(body.output)
}
