use std::process::ExitCode;

use clap::Parser;
use conversation_starter::server::{self, GeneratorKind};
use conversation_starter::Config;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "server")]
#[command(about = "Conversation starter gRPC server with HTTP/JSON gateway", long_about = None)]
#[command(version)]
struct Args {
    /// Host for the gRPC listener
    #[arg(long, env = "GRPC_HOST")]
    grpc_host: Option<String>,

    /// Port for the gRPC listener
    #[arg(long, env = "GRPC_PORT")]
    grpc_port: Option<u16>,

    /// Host for the HTTP gateway
    #[arg(long, env = "HTTP_HOST")]
    http_host: Option<String>,

    /// Port for the HTTP gateway
    #[arg(long, env = "HTTP_PORT")]
    http_port: Option<u16>,

    /// Run only the HTTP gateway, forwarding to this gRPC endpoint
    #[arg(long, env = "GATEWAY_UPSTREAM")]
    upstream: Option<String>,

    /// Inference endpoint for generating conversation starters
    #[arg(long, env = "INFERENCE_ENDPOINT")]
    inference_endpoint: Option<String>,

    /// Answer with a fixed placeholder instead of calling inference
    #[arg(long)]
    placeholder: bool,

    /// Enable metrics endpoint
    #[arg(long, env = "METRICS_ENABLED")]
    metrics: bool,

    /// Metrics port
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(host) = self.grpc_host {
            config.grpc.host = host;
        }
        if let Some(port) = self.grpc_port {
            config.grpc.port = port;
        }
        if let Some(host) = self.http_host {
            config.http.host = host;
        }
        if let Some(port) = self.http_port {
            config.http.port = port;
        }
        if self.upstream.is_some() {
            config.gateway.upstream = self.upstream;
        }
        if self.inference_endpoint.is_some() {
            config.inference.endpoint = self.inference_endpoint;
        }
        if self.placeholder {
            config.generator.kind = GeneratorKind::Placeholder;
        }
        if self.metrics {
            config.metrics.enabled = true;
        }
        if let Some(port) = self.metrics_port {
            config.metrics.port = port;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    args.apply(&mut config);

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {e}");
        return ExitCode::FAILURE;
    }

    if config.metrics.enabled {
        match config.metrics.addr() {
            Ok(metrics_addr) => {
                if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
                    .with_http_listener(metrics_addr)
                    .install()
                {
                    error!("Failed to start metrics server: {e}");
                } else {
                    info!("Metrics server started on {metrics_addr}");
                }
            }
            Err(e) => error!("Metrics disabled: {e}"),
        }
    }

    if let Err(e) = server::run(config, shutdown_signal()).await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Server stopped");
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
