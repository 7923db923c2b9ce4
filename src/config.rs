use anyhow::{Context, Result};
use serde::Deserialize;

/// Default NLS gateway (Shanghai region)
pub const DEFAULT_GATEWAY_URL: &str = "wss://nls-gateway-cn-shanghai.aliyuncs.com/ws/v1";

/// Default CreateToken endpoint
pub const DEFAULT_TOKEN_URL: &str = "https://nls-meta.cn-shanghai.aliyuncs.com/";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub transport: TransportConfig,
    pub recognition: RecognitionSettings,
    pub nls: NlsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

/// Client-facing WebSocket limits
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Path the recognition socket is served on
    pub path: String,
    pub max_binary_message_bytes: usize,
    pub max_text_message_bytes: usize,
    /// Close the connection after this long without an inbound frame
    pub idle_timeout_secs: u64,
}

/// Audio format and feature flags sent with every StartRecognition
#[derive(Debug, Clone, Deserialize)]
pub struct RecognitionSettings {
    pub format: String,
    pub sample_rate: u32,
    pub enable_intermediate_result: bool,
    pub enable_voice_detection: bool,
}

/// Alibaba Cloud NLS credentials and endpoints
///
/// A missing key fails the first recognition request, not process start.
#[derive(Debug, Clone, Deserialize)]
pub struct NlsConfig {
    pub gateway_url: String,
    pub token_url: String,
    pub region_id: String,
    pub access_key_id: Option<String>,
    pub access_key_secret: Option<String>,
    pub app_key: Option<String>,
    /// Pre-issued token, skips CreateToken when set
    pub token: Option<String>,
    pub start_timeout_ms: u64,
    pub stop_timeout_ms: u64,
}

impl Config {
    /// Load configuration from defaults, an optional file and the environment
    ///
    /// `path` is passed to `config::File::with_name`, so the extension is optional.
    pub fn load(path: &str) -> Result<Self> {
        let settings = Self::builder()?
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("ASR_RELAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("nls.access_key_id", env_var("ALIYUN_AK_ID"))?
            .set_override_option("nls.access_key_secret", env_var("ALIYUN_AK_SECRET"))?
            .set_override_option("nls.gateway_url", env_var("NLS_GATEWAY_URL"))?
            .set_override_option("nls.app_key", env_var("NLS_APP_KEY"))?
            .set_override_option("nls.token", env_var("NLS_TOKEN"))?
            .build()
            .with_context(|| format!("Failed to load config from {}", path))?;

        Ok(settings.try_deserialize()?)
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(config::Config::builder()
            .set_default("service.name", "asr-relay")?
            .set_default("service.http.bind", "0.0.0.0")?
            .set_default("service.http.port", 8080)?
            .set_default("transport.path", "/ws/asr")?
            .set_default("transport.max_binary_message_bytes", 4 * 1024 * 1024)?
            .set_default("transport.max_text_message_bytes", 64 * 1024)?
            .set_default("transport.idle_timeout_secs", 300)?
            .set_default("recognition.format", "pcm")?
            .set_default("recognition.sample_rate", 16000)?
            .set_default("recognition.enable_intermediate_result", true)?
            .set_default("recognition.enable_voice_detection", true)?
            .set_default("nls.gateway_url", DEFAULT_GATEWAY_URL)?
            .set_default("nls.token_url", DEFAULT_TOKEN_URL)?
            .set_default("nls.region_id", "cn-shanghai")?
            .set_default("nls.start_timeout_ms", 10_000)?
            .set_default("nls.stop_timeout_ms", 10_000)?)
    }
}

/// Treat empty variables as unset
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
