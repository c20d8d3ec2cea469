//! chat-translate: translation engine for live-chat comments.
//! Caches by raw text, coalesces identical in-flight requests, enforces the
//! Gemini rate budget and falls back to the free endpoint once on failure.

pub mod config;
pub mod metrics;
pub mod state_machine;
pub mod translate;

pub use config::{ConfigError, EngineConfig};
pub use translate::{
    Provider, ProviderKind, RequestConfig, TranslateError, TranslateResult, TranslationEngine,
    TranslationRequest, TranslationResponse,
};

/// Initialize tracing. `RUST_LOG` wins over the default filter.
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("chat_translate=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);
    // a second call (tests, embedding hosts) keeps the first subscriber
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
