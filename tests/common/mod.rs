//! Shared fixtures: scripted providers that record every call.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use chat_translate::translate::providers::ProviderSet;
use chat_translate::{
    EngineConfig, Provider, ProviderKind, RequestConfig, TranslateError, TranslationEngine,
};

/// Replies `{prefix}{text}` unless told to fail.
pub struct MockProvider {
    kind: ProviderKind,
    prefix: String,
    fail_with: Option<TranslateError>,
    fail_if_contains: Option<String>,
    delay: Duration,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl MockProvider {
    pub fn new(kind: ProviderKind, prefix: &str) -> Self {
        Self {
            kind,
            prefix: prefix.to_string(),
            fail_with: None,
            fail_if_contains: None,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(mut self, err: TranslateError) -> Self {
        self.fail_with = Some(err);
        self
    }

    /// Fail with a transport error for texts containing `needle`.
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_if_contains = Some(needle.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn texts(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn credentials(&self) -> Vec<Option<String>> {
        self.calls.lock().iter().map(|(_, c)| c.clone()).collect()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn translate(
        &self,
        text: &str,
        credential: Option<&str>,
    ) -> Result<String, TranslateError> {
        self.calls
            .lock()
            .push((text.to_string(), credential.map(str::to_string)));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        if let Some(needle) = &self.fail_if_contains {
            if text.contains(needle.as_str()) {
                return Err(TranslateError::Transport("HTTP status 503".into()));
            }
        }
        Ok(format!("{}{}", self.prefix, text))
    }
}

pub struct Harness {
    pub engine: TranslationEngine,
    pub free: Arc<MockProvider>,
    pub keyed_a: Arc<MockProvider>,
    pub keyed_b: Arc<MockProvider>,
}

impl Harness {
    pub fn new(free: MockProvider, keyed_a: MockProvider, keyed_b: MockProvider) -> Self {
        Self::with_config(EngineConfig::default(), free, keyed_a, keyed_b)
    }

    pub fn with_config(
        config: EngineConfig,
        free: MockProvider,
        keyed_a: MockProvider,
        keyed_b: MockProvider,
    ) -> Self {
        let free = Arc::new(free);
        let keyed_a = Arc::new(keyed_a);
        let keyed_b = Arc::new(keyed_b);
        let providers = ProviderSet {
            free: free.clone(),
            keyed_a: keyed_a.clone(),
            keyed_b: keyed_b.clone(),
        };
        Self {
            engine: TranslationEngine::with_providers(config, providers),
            free,
            keyed_a,
            keyed_b,
        }
    }

    /// Every provider answers with its own prefix.
    pub fn echoing() -> Self {
        Self::new(
            MockProvider::new(ProviderKind::Free, "free:"),
            MockProvider::new(ProviderKind::KeyedA, "a:"),
            MockProvider::new(ProviderKind::KeyedB, "b:"),
        )
    }
}

pub fn request(provider: ProviderKind, credentials: &[&str], fallback: bool) -> RequestConfig {
    RequestConfig {
        provider,
        credentials: credentials.iter().map(|c| c.to_string()).collect(),
        fallback_enabled: fallback,
        dictionary: String::new(),
    }
}
