//! Translation engine: preprocess → cache → coalesce → rate check / provider
//! selection → provider call (with a single Free fallback hop) → postprocess →
//! cache write.
//!
//! One instance lives for the whole process. All shared state (cache, pending
//! map, rate window, rotation index, compiled dictionary) is owned here; each
//! piece sits behind its own lock and no lock is held across an await.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::cache::{CacheKey, TranslationCache};
use super::coalesce::{Admission, Coalescer, Role};
use super::glossary::GlossaryCache;
use super::normalize::DomainRules;
use super::postprocess::postprocess;
use super::providers::ProviderSet;
use super::rate_limit::{CredentialRotation, SlidingWindowLimiter};
use super::{
    Origin, ProviderKind, RequestConfig, Route, TranslateError, TranslateResult,
    TranslationRequest, TranslationResponse,
};
use crate::config::EngineConfig;
use crate::metrics::{metric_names, new_request_id, MetricsRegistry};
use crate::state_machine::{Stage, StageTrace};

/// What a dispatch hands back to the leader and every joined caller.
#[derive(Debug, Clone)]
struct Dispatched {
    text: String,
    served_by: ProviderKind,
    route: Route,
    /// Stages after CoalesceCheck.
    stages: Vec<Stage>,
}

struct EngineInner {
    config: EngineConfig,
    providers: ProviderSet,
    rules: DomainRules,
    glossary: GlossaryCache,
    cache: TranslationCache,
    coalescer: Coalescer<Dispatched>,
    limiter: SlidingWindowLimiter,
    rotation: CredentialRotation,
    metrics: Arc<MetricsRegistry>,
    shutdown: CancellationToken,
}

#[derive(Clone)]
pub struct TranslationEngine {
    inner: Arc<EngineInner>,
}

impl TranslationEngine {
    /// Engine backed by the real HTTP adapters.
    pub fn new(config: EngineConfig) -> Result<Self, TranslateError> {
        let providers = ProviderSet::http(&config)?;
        Ok(Self::with_providers(config, providers))
    }

    pub fn with_providers(config: EngineConfig, providers: ProviderSet) -> Self {
        let cache = TranslationCache::new(config.cache_max_size, config.cache_ttl());
        let limiter =
            SlidingWindowLimiter::new(config.rate_window(), config.rate_limit_per_credential);
        Self {
            inner: Arc::new(EngineInner {
                providers,
                rules: DomainRules::new(),
                glossary: GlossaryCache::new(),
                cache,
                coalescer: Coalescer::new(),
                limiter,
                rotation: CredentialRotation::new(),
                metrics: Arc::new(MetricsRegistry::new()),
                shutdown: CancellationToken::new(),
                config,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.inner.metrics
    }

    pub fn cache_len(&self) -> usize {
        self.inner.cache.len()
    }

    /// Requests currently waiting on a provider.
    pub fn in_flight(&self) -> usize {
        self.inner.coalescer.in_flight()
    }

    /// Settings changed: drop the compiled dictionary.
    pub fn invalidate_dictionary(&self) {
        self.inner.glossary.invalidate();
        debug!("dictionary invalidated");
    }

    /// Start the periodic expiry sweep. Runs until `shutdown`.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let token = inner.shutdown.child_token();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.config.sweep_interval());
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = inner.cache.sweep_expired();
                        if removed > 0 {
                            inner.metrics.add(metric_names::CACHE_SWEPT, removed as u64);
                            debug!(removed, remaining = inner.cache.len(), "cache sweep");
                        }
                    }
                    _ = token.cancelled() => {
                        info!("cache sweeper stopped");
                        break;
                    }
                }
            }
        })
    }

    /// Stop background tasks. In-flight requests still complete.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    /// Boundary form: every failure becomes `{error}`.
    pub async fn handle(&self, request: TranslationRequest) -> TranslationResponse {
        self.translate(&request.text, &request.config).await.into()
    }

    pub async fn translate(
        &self,
        text: &str,
        config: &RequestConfig,
    ) -> Result<TranslateResult, TranslateError> {
        let request_id = new_request_id();
        let span = info_span!("translate", request_id = %request_id, provider = %config.provider);
        self.run(request_id, text, config).instrument(span).await
    }

    async fn run(
        &self,
        request_id: String,
        text: &str,
        config: &RequestConfig,
    ) -> Result<TranslateResult, TranslateError> {
        let start = Instant::now();
        let inner = &self.inner;
        let mut trace = StageTrace::new();

        if text.trim().is_empty() {
            trace.advance(Stage::ErrorDone);
            return Err(TranslateError::InvalidInput("no text to translate".into()));
        }

        trace.advance(Stage::Preprocess);
        let span = inner.metrics.span(metric_names::PREPROCESS);
        let glossary = inner.glossary.get_or_compile(&config.dictionary);
        let processed = glossary.apply(&inner.rules.apply(text));
        span.finish();

        trace.advance(Stage::CacheCheck);
        let key = TranslationCache::compute_key(text);
        if let Some(hit) = inner.cache.get(&key) {
            return Ok(self.cache_hit(request_id, hit, trace, start));
        }
        inner.metrics.incr(metric_names::CACHE_MISS);

        trace.advance(Stage::CoalesceCheck);
        let worker = Arc::clone(inner);
        let request = config.clone();
        // the cache is re-checked under the pending lock: a dispatch that
        // finished since the lookup above has already written it
        let admission = inner.coalescer.dispatch_unless(
            key,
            || inner.cache.get(&key),
            move || {
                let span = tracing::Span::current();
                async move { worker.dispatch(key, processed, request).await }.instrument(span)
            },
        );
        let (role, outcome) = match admission {
            Admission::Ready(hit) => return Ok(self.cache_hit(request_id, hit, trace, start)),
            Admission::InFlight(role, outcome) => (role, outcome),
        };
        if role == Role::Joined {
            inner.metrics.incr(metric_names::COALESCED);
        }

        let result = outcome.await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        inner
            .metrics
            .record(metric_names::TRANSLATE_DONE, elapsed_ms * 1000.0);

        match result {
            Ok(dispatched) => {
                let origin = match role {
                    Role::Leader => {
                        trace = StageTrace::resume(
                            trace
                                .into_stages()
                                .into_iter()
                                .chain(dispatched.stages.iter().copied())
                                .collect(),
                        );
                        Origin::Dispatched
                    }
                    Role::Joined => {
                        trace.advance(Stage::Done);
                        Origin::Joined
                    }
                };
                info!(
                    served_by = %dispatched.served_by,
                    route = ?dispatched.route,
                    origin = ?origin,
                    elapsed_ms,
                    "translated"
                );
                Ok(TranslateResult {
                    request_id,
                    translated_text: dispatched.text,
                    served_by: Some(dispatched.served_by),
                    origin,
                    route: Some(dispatched.route),
                    stages: trace.into_stages(),
                    elapsed_ms,
                })
            }
            Err(e) => {
                trace.advance(Stage::ErrorDone);
                inner.metrics.incr(metric_names::FAILED);
                warn!(error = %e, role = ?role, "translation failed");
                Err(e)
            }
        }
    }

    fn cache_hit(
        &self,
        request_id: String,
        translated_text: String,
        mut trace: StageTrace,
        start: Instant,
    ) -> TranslateResult {
        self.inner.metrics.incr(metric_names::CACHE_HIT);
        trace.advance(Stage::Done);
        debug!("cache hit");
        TranslateResult {
            request_id,
            translated_text,
            served_by: None,
            origin: Origin::Cache,
            route: None,
            stages: trace.into_stages(),
            elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
        }
    }
}

impl EngineInner {
    /// Rate check, provider selection, provider call, fallback, postprocess
    /// and cache write. Runs once per key on the coalescer's task.
    async fn dispatch(
        &self,
        key: CacheKey,
        text: String,
        config: RequestConfig,
    ) -> Result<Dispatched, TranslateError> {
        self.metrics.incr(metric_names::DISPATCHED);
        let mut trace = StageTrace::resume(vec![Stage::CoalesceCheck]);
        trace.advance(Stage::RateCheck);

        let selected = config.provider;
        let credential = match selected {
            ProviderKind::Free => None,
            ProviderKind::KeyedA => {
                let credentials = config.valid_credentials();
                if credentials.is_empty() {
                    trace.advance(Stage::ErrorDone);
                    return Err(TranslateError::ConfigurationMissing(selected));
                }
                if let Err(TranslateError::RateExceeded) = self.limiter.admit(credentials.len()) {
                    self.metrics.incr(metric_names::RATE_REDIRECT);
                    info!(
                        limit = self.limiter.limit_for(credentials.len()),
                        "keyedA window full, redirecting to free"
                    );
                    return self.free_call(key, &text, Route::RateRedirect, trace).await;
                }
                let picked = self
                    .rotation
                    .advance(credentials.len())
                    .and_then(|i| credentials.get(i).cloned());
                match picked {
                    Some(c) => Some(c),
                    None => {
                        trace.advance(Stage::ErrorDone);
                        return Err(TranslateError::ConfigurationMissing(selected));
                    }
                }
            }
            ProviderKind::KeyedB => match config.valid_credentials().into_iter().next() {
                Some(c) => Some(c),
                None => {
                    trace.advance(Stage::ErrorDone);
                    return Err(TranslateError::ConfigurationMissing(selected));
                }
            },
        };

        trace.advance(Stage::ProviderCall);
        match self.call(selected, &text, credential.as_deref()).await {
            Ok(translated) => Ok(self.finish(key, translated, selected, Route::Primary, trace)),
            Err(e) => {
                trace.advance(Stage::FallbackCheck);
                let may_fall_back = selected != ProviderKind::Free
                    && config.fallback_enabled
                    && e.is_fallback_eligible();
                if !may_fall_back {
                    trace.advance(Stage::ErrorDone);
                    return Err(e);
                }
                self.metrics.incr(metric_names::FALLBACK);
                warn!(provider = %selected, error = %e, "primary failed, falling back to free");
                self.free_call(key, &text, Route::Fallback, trace).await
            }
        }
    }

    /// The single Free hop. Its failure is final.
    async fn free_call(
        &self,
        key: CacheKey,
        text: &str,
        route: Route,
        mut trace: StageTrace,
    ) -> Result<Dispatched, TranslateError> {
        trace.advance(Stage::FreeCall);
        match self.call(ProviderKind::Free, text, None).await {
            Ok(translated) => Ok(self.finish(key, translated, ProviderKind::Free, route, trace)),
            Err(e) => {
                trace.advance(Stage::ErrorDone);
                Err(e)
            }
        }
    }

    async fn call(
        &self,
        kind: ProviderKind,
        text: &str,
        credential: Option<&str>,
    ) -> Result<String, TranslateError> {
        let span = self.metrics.span(metric_names::PROVIDER_CALL);
        let result = self.providers.get(kind).translate(text, credential).await;
        let elapsed_us = span.finish();
        debug!(provider = %kind, elapsed_us, ok = result.is_ok(), "provider call");
        result
    }

    fn finish(
        &self,
        key: CacheKey,
        translated: String,
        served_by: ProviderKind,
        route: Route,
        mut trace: StageTrace,
    ) -> Dispatched {
        trace.advance(Stage::Postprocess);
        let text = postprocess(&translated);
        trace.advance(Stage::CacheWrite);
        self.cache.insert(key, text.clone());
        trace.advance(Stage::Done);

        let mut stages = trace.into_stages();
        stages.remove(0);
        Dispatched {
            text,
            served_by,
            route,
            stages,
        }
    }
}
