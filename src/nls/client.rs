use super::task::{NlsTask, TaskParams};
use super::token::create_token;
use crate::config::NlsConfig;
use crate::error::{RelayError, RelayResult};
use crate::recognizer::{
    BackendConnector, EventSender, RecognitionBackend, RecognitionConfig, RecognitionTask,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Shared handle to the NLS gateway
///
/// Holds the gateway address and the access token; every recognition task
/// opens its own socket with them.
pub struct NlsClient {
    gateway_url: String,
    token: String,
    app_key: String,
    start_timeout: Duration,
    stop_timeout: Duration,
    closed: AtomicBool,
}

impl NlsClient {
    pub fn new(gateway_url: String, token: String, app_key: String, config: &NlsConfig) -> Self {
        Self {
            gateway_url,
            token,
            app_key,
            start_timeout: Duration::from_millis(config.start_timeout_ms),
            stop_timeout: Duration::from_millis(config.stop_timeout_ms),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait::async_trait]
impl RecognitionBackend for NlsClient {
    async fn start(
        &self,
        config: &RecognitionConfig,
        events: EventSender,
    ) -> RelayResult<Box<dyn RecognitionTask>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RelayError::BackendUnavailable(
                "NLS client has been shut down".to_string(),
            ));
        }

        let params = TaskParams {
            gateway_url: &self.gateway_url,
            token: &self.token,
            app_key: &self.app_key,
            start_timeout: self.start_timeout,
            stop_timeout: self.stop_timeout,
        };

        let task = NlsTask::start(params, config, events).await?;
        Ok(Box::new(task))
    }

    async fn shutdown(&self) {
        info!("Closing NLS client for {}", self.gateway_url);
        self.closed.store(true, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "nls"
    }
}

/// Builds the `NlsClient` from configuration on first use
pub struct NlsConnector {
    config: NlsConfig,
    http: reqwest::Client,
}

impl NlsConnector {
    pub fn new(config: NlsConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Use the configured token, or request one with the access key pair
    async fn acquire_token(&self) -> RelayResult<String> {
        if let Some(token) = self.config.token.as_ref().filter(|t| !t.is_empty()) {
            info!("Using pre-issued NLS token");
            return Ok(token.clone());
        }

        let (Some(access_key_id), Some(access_key_secret)) = (
            self.config.access_key_id.as_deref(),
            self.config.access_key_secret.as_deref(),
        ) else {
            return Err(RelayError::BackendUnavailable(
                "Aliyun access key is not configured (ALIYUN_AK_ID / ALIYUN_AK_SECRET)".to_string(),
            ));
        };

        let token = create_token(
            &self.http,
            &self.config.token_url,
            &self.config.region_id,
            access_key_id,
            access_key_secret,
        )
        .await?;

        Ok(token.id)
    }
}

#[async_trait::async_trait]
impl BackendConnector for NlsConnector {
    async fn connect(&self) -> RelayResult<Arc<dyn RecognitionBackend>> {
        let app_key = self
            .config
            .app_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                RelayError::BackendUnavailable(
                    "NLS app key is not configured (NLS_APP_KEY)".to_string(),
                )
            })?;

        url::Url::parse(&self.config.gateway_url).map_err(|e| {
            RelayError::BackendUnavailable(format!(
                "invalid NLS gateway URL {}: {}",
                self.config.gateway_url, e
            ))
        })?;

        let token = self.acquire_token().await?;

        info!("NLS client ready for {}", self.config.gateway_url);

        Ok(Arc::new(NlsClient::new(
            self.config.gateway_url.clone(),
            token,
            app_key,
            &self.config,
        )))
    }
}
