//! Translation pipeline: request/result types, the provider capability, and the
//! engine that ties preprocessing, caching, coalescing and fallback together.

pub mod cache;
pub mod coalesce;
pub mod engine;
pub mod glossary;
pub mod normalize;
pub mod postprocess;
pub mod providers;
pub mod rate_limit;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::state_machine::Stage;

pub use engine::TranslationEngine;

/// The closed set of translation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ProviderKind {
    /// Unofficial Google endpoint. No credentials, universal fallback target.
    #[default]
    #[serde(rename = "free", alias = "google")]
    Free,
    /// Gemini. One or more credentials, client-side rate budget.
    #[serde(rename = "keyedA", alias = "gemini")]
    KeyedA,
    /// DeepL. Single credential, no client-side rate limiting.
    #[serde(rename = "keyedB", alias = "deepl")]
    KeyedB,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Free => write!(f, "free"),
            ProviderKind::KeyedA => write!(f, "keyedA"),
            ProviderKind::KeyedB => write!(f, "keyedB"),
        }
    }
}

/// Per-request configuration snapshot handed over by the settings collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestConfig {
    pub provider: ProviderKind,
    pub credentials: Vec<String>,
    pub fallback_enabled: bool,
    /// Newline-delimited `original,translation` pairs.
    pub dictionary: String,
}

impl RequestConfig {
    /// Credentials that are non-empty after trimming, in configured order.
    pub fn valid_credentials(&self) -> Vec<String> {
        self.credentials
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Inbound request as received from the scraping collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct TranslationRequest {
    pub text: String,
    #[serde(default)]
    pub config: RequestConfig,
}

/// Outbound record: exactly one of `translation` or `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TranslationResponse {
    Success { translation: String },
    Failure { error: String },
}

impl From<Result<TranslateResult, TranslateError>> for TranslationResponse {
    fn from(result: Result<TranslateResult, TranslateError>) -> Self {
        match result {
            Ok(r) => TranslationResponse::Success {
                translation: r.translated_text,
            },
            Err(e) => TranslationResponse::Failure {
                error: e.to_string(),
            },
        }
    }
}

/// How a caller obtained its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Origin {
    Cache,
    /// Joined a request that was already in flight for the same text.
    Joined,
    Dispatched,
}

/// Which branch of the provider chain produced a dispatched result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Route {
    Primary,
    /// KeyedA window was full; served by Free without touching KeyedA.
    RateRedirect,
    /// Primary failed; served by the single Free fallback hop.
    Fallback,
}

/// Translation result.
#[derive(Debug, Clone, Serialize)]
pub struct TranslateResult {
    pub request_id: String,
    pub translated_text: String,
    /// None for cache hits: the cache keeps only the text.
    pub served_by: Option<ProviderKind>,
    pub origin: Origin,
    pub route: Option<Route>,
    pub stages: Vec<Stage>,
    pub elapsed_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslateError {
    /// The selected provider has no usable credential. Never retried.
    #[error("{0} provider has no credential configured")]
    ConfigurationMissing(ProviderKind),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// Internal admission signal; always redirected to Free, never surfaced.
    #[error("rate budget exceeded")]
    RateExceeded,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl TranslateError {
    /// Whether a primary-provider failure of this kind may hop to Free.
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(
            self,
            TranslateError::Transport(_) | TranslateError::MalformedResponse(_)
        )
    }
}

/// Translator capability (adapter for the different backends).
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Translate `text`. `credential` is `None` for providers that take none.
    async fn translate(&self, text: &str, credential: Option<&str>)
        -> Result<String, TranslateError>;
}
