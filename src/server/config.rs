use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::store::firestore::DEFAULT_FIRESTORE_URL;

const ENV_PREFIX: &str = "STARTER_";

/// Service configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// gRPC listener.
    pub grpc: ListenSettings,
    /// HTTP gateway listener.
    pub http: ListenSettings,
    /// Authentication settings.
    pub auth: AuthSettings,
    /// Where API keys are resolved.
    pub record_store: RecordStoreSettings,
    /// How conversation starters are produced.
    pub generator: GeneratorSettings,
    /// Downstream inference backend.
    pub inference: InferenceSettings,
    /// HTTP gateway dispatch.
    pub gateway: GatewaySettings,
    /// Metrics exporter configuration.
    pub metrics: MetricsSettings,
}

/// Listening address.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListenSettings {
    /// Hostname or IP address to bind to.
    pub host: String,
    /// Port number to listen on.
    pub port: u16,
}

impl ListenSettings {
    fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }

    /// Converts host and port into a socket address.
    pub fn addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| format!("invalid address {}:{}: {e}", self.host, self.port))
    }
}

/// Authentication settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Upper bound on one record store lookup, in milliseconds.
    pub lookup_timeout_ms: u64,
}

impl AuthSettings {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            lookup_timeout_ms: 5_000,
        }
    }
}

/// Record store backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStoreKind {
    /// Users listed in `record_store.users`.
    #[default]
    Memory,
    /// Firestore REST API.
    Firestore,
}

/// Record store settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordStoreSettings {
    pub kind: RecordStoreKind,
    /// Firestore REST base URL.
    pub base_url: String,
    /// Firestore project.
    pub project_id: Option<String>,
    /// Firestore database.
    pub database: String,
    /// Collection with one document per user.
    pub collection: String,
    /// Array field listing each user's API keys.
    pub api_keys_field: String,
    /// Access token for Firestore, if required.
    pub access_token: Option<String>,
    /// Users for the memory backend: user id to API keys.
    pub users: BTreeMap<String, Vec<String>>,
}

impl Default for RecordStoreSettings {
    fn default() -> Self {
        Self {
            kind: RecordStoreKind::Memory,
            base_url: DEFAULT_FIRESTORE_URL.to_string(),
            project_id: None,
            database: "(default)".to_string(),
            collection: "users".to_string(),
            api_keys_field: "apiKeys".to_string(),
            access_token: None,
            users: BTreeMap::new(),
        }
    }
}

/// Generator backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorKind {
    /// Forward input to the inference backend.
    #[default]
    Inference,
    /// Always answer with `generator.placeholder`.
    Placeholder,
}

/// Generator settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorSettings {
    pub kind: GeneratorKind,
    /// Output used by the placeholder generator.
    pub placeholder: String,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            kind: GeneratorKind::Inference,
            placeholder: "random".to_string(),
        }
    }
}

/// Inference backend settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    /// Endpoint receiving `{"inputs": ...}` POSTs.
    pub endpoint: Option<String>,
    /// Upper bound on one inference call, in milliseconds.
    pub timeout_ms: u64,
}

impl InferenceSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 30_000,
        }
    }
}

/// Gateway dispatch settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// When set, the gateway forwards to this gRPC endpoint instead of
    /// calling the service in-process.
    pub upstream: Option<String>,
}

/// Metrics exporter settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// Whether metrics export is enabled.
    pub enabled: bool,
    /// Hostname or IP address for metrics server.
    pub host: String,
    /// Port number for metrics server.
    pub port: u16,
}

impl MetricsSettings {
    /// Converts host and port into a socket address for metrics server.
    pub fn addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| format!("invalid metrics address {}:{}: {e}", self.host, self.port))
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 9090,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grpc: ListenSettings::new("127.0.0.1", 50051),
            http: ListenSettings::new("127.0.0.1", 8080),
            auth: AuthSettings::default(),
            record_store: RecordStoreSettings::default(),
            generator: GeneratorSettings::default(),
            inference: InferenceSettings::default(),
            gateway: GatewaySettings::default(),
            metrics: MetricsSettings::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the environment and a TOML file.
    ///
    /// Configuration priority (highest to lowest):
    /// 1. Environment variables with `STARTER_` prefix, nested with `__`
    ///    (e.g., `STARTER_GRPC__PORT=50052`). Variables from a `.env` file are
    ///    loaded into the environment first, without replacing variables that
    ///    are already set, so they also take priority over the TOML file.
    /// 2. TOML configuration file (if exists)
    /// 3. Built-in defaults
    ///
    /// The TOML file path can be set via `STARTER_CONFIG_PATH`. If not set,
    /// defaults to `./config/gateway.toml`. A missing file is skipped.
    ///
    /// # Environment Variable Examples
    /// ```bash
    /// STARTER_HTTP__PORT=8081
    /// STARTER_RECORD_STORE__KIND=firestore
    /// STARTER_RECORD_STORE__PROJECT_ID=my-project
    /// STARTER_INFERENCE__ENDPOINT=https://inference.internal/generate
    /// STARTER_GATEWAY__UPSTREAM=http://127.0.0.1:50051
    /// ```
    #[allow(clippy::result_large_err)]
    pub fn from_env() -> figment::error::Result<Self> {
        use figment::providers::{Format, Toml};

        let _ = dotenvy::dotenv();

        let config_path = std::env::var("STARTER_CONFIG_PATH")
            .unwrap_or_else(|_| "config/gateway.toml".to_string());

        Self::layered(Toml::file(&config_path), ENV_PREFIX).extract()
    }

    fn layered(file: impl figment::Provider, env_prefix: &str) -> figment::Figment {
        use figment::providers::{Env, Serialized};
        use figment::Figment;

        Figment::from(Serialized::defaults(Config::default()))
            .merge(file)
            .merge(Env::prefixed(env_prefix).ignore(&["CONFIG_PATH"]).split("__"))
    }

    /// Validates the configuration before anything is started.
    ///
    /// # Errors
    /// Returns an error message describing the first invalid setting.
    pub fn validate(&self) -> Result<(), String> {
        self.grpc.addr()?;
        self.http.addr()?;

        if self.auth.lookup_timeout_ms == 0 {
            return Err("auth.lookup_timeout_ms cannot be zero".to_string());
        }

        if self.inference.timeout_ms == 0 {
            return Err("inference.timeout_ms cannot be zero".to_string());
        }

        if self.metrics.enabled {
            self.metrics.addr()?;
        }

        // A forwarding gateway has no local store or generator.
        if self.gateway.upstream.is_some() {
            return Ok(());
        }

        if self.record_store.kind == RecordStoreKind::Firestore
            && self
                .record_store
                .project_id
                .as_deref()
                .map_or(true, str::is_empty)
        {
            return Err("record_store.project_id is required for firestore".to_string());
        }

        match self.generator.kind {
            GeneratorKind::Inference
                if self
                    .inference
                    .endpoint
                    .as_deref()
                    .map_or(true, str::is_empty) =>
            {
                return Err("inference.endpoint is required for the inference generator".to_string());
            }
            GeneratorKind::Placeholder if self.generator.placeholder.is_empty() => {
                return Err("generator.placeholder cannot be empty".to_string());
            }
            _ => {}
        }

        Ok(())
    }
}
