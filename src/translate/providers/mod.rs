//! HTTP adapters for the three translation backends.
//! All adapters share one pooled `reqwest::Client` with an explicit timeout.

pub mod deepl;
pub mod gemini;
pub mod google;

use std::sync::Arc;
use std::time::Duration;

use super::{Provider, ProviderKind, TranslateError};
use crate::config::EngineConfig;

pub use deepl::DeepLClient;
pub use gemini::GeminiClient;
pub use google::GoogleFreeClient;

/// One adapter per provider kind, selected by exhaustive match.
#[derive(Clone)]
pub struct ProviderSet {
    pub free: Arc<dyn Provider>,
    pub keyed_a: Arc<dyn Provider>,
    pub keyed_b: Arc<dyn Provider>,
}

impl ProviderSet {
    /// Real HTTP adapters built from the engine configuration.
    pub fn http(config: &EngineConfig) -> Result<Self, TranslateError> {
        let http = build_http_client(config.request_timeout())?;
        Ok(Self {
            free: Arc::new(GoogleFreeClient::new(
                http.clone(),
                &config.free_base_url,
                &config.target_lang,
            )),
            keyed_a: Arc::new(GeminiClient::new(
                http.clone(),
                &config.gemini_base_url,
                &config.gemini_model,
            )),
            keyed_b: Arc::new(DeepLClient::new(
                http,
                config.deepl_base_url.as_deref(),
                &config.target_lang,
            )),
        })
    }

    pub fn get(&self, kind: ProviderKind) -> &Arc<dyn Provider> {
        let provider = match kind {
            ProviderKind::Free => &self.free,
            ProviderKind::KeyedA => &self.keyed_a,
            ProviderKind::KeyedB => &self.keyed_b,
        };
        debug_assert_eq!(provider.kind(), kind, "provider slot holds the wrong adapter");
        provider
    }
}

pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, TranslateError> {
    reqwest::Client::builder()
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(90))
        .timeout(timeout)
        .build()
        .map_err(|e| TranslateError::Transport(e.to_string()))
}

pub(crate) fn transport_error(e: reqwest::Error) -> TranslateError {
    if e.is_timeout() {
        TranslateError::Transport("request timed out".into())
    } else {
        TranslateError::Transport(e.to_string())
    }
}

/// Turn a non-2xx response into a transport error, preferring the provider's
/// own message (`error.message` or top-level `message`) when the body has one.
pub(crate) async fn status_error(resp: reqwest::Response) -> TranslateError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(200).collect());
    if detail.is_empty() {
        TranslateError::Transport(format!("HTTP status {status}"))
    } else {
        TranslateError::Transport(format!("HTTP status {status}: {detail}"))
    }
}

/// Read the body as JSON; anything unparsable is a shape failure.
pub(crate) async fn json_body(
    resp: reqwest::Response,
) -> Result<serde_json::Value, TranslateError> {
    let body = resp.text().await.map_err(transport_error)?;
    serde_json::from_str(&body).map_err(|e| TranslateError::MalformedResponse(e.to_string()))
}
