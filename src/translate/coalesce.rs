//! Request coalescing: at most one in-flight dispatch per key.
//!
//! The first caller for a key registers a shared future and runs the work on
//! its own task; later callers for the same key await that shared future. The
//! pending entry is dropped by an RAII guard as soon as the work settles, on
//! success, on error and on panic. Callers that stop waiting never abort the
//! work.
//!
//! Work writes its result somewhere visible (the cache) before its guard
//! drops, so a caller that re-checks that place under the pending lock either
//! sees the entry or sees the result; it never starts the same work twice.

use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, error};

use super::cache::CacheKey;
use super::TranslateError;

pub type SharedOutcome<T> = Shared<BoxFuture<'static, Result<T, TranslateError>>>;

/// Whether the caller started the work or joined work already in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Leader,
    Joined,
}

struct Pending<T> {
    id: u64,
    outcome: SharedOutcome<T>,
}

type PendingMap<T> = Arc<Mutex<HashMap<CacheKey, Pending<T>>>>;

/// Outcome of [`Coalescer::dispatch_unless`].
pub enum Admission<T, H> {
    /// The ready check found a result; no work was registered.
    Ready(H),
    InFlight(Role, SharedOutcome<T>),
}

/// Removes its pending entry when dropped, unless a newer entry replaced it.
struct PendingGuard<T> {
    pending: PendingMap<T>,
    key: CacheKey,
    id: u64,
}

impl<T> Drop for PendingGuard<T> {
    fn drop(&mut self) {
        let mut pending = self.pending.lock();
        if pending.get(&self.key).is_some_and(|p| p.id == self.id) {
            pending.remove(&self.key);
        }
    }
}

pub struct Coalescer<T> {
    pending: PendingMap<T>,
    next_id: AtomicU64,
}

impl<T> Coalescer<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Join the in-flight work for `key`, or start `work` on a new task.
    /// `work` is only invoked when this caller becomes the leader.
    pub fn dispatch_or_join<F, Fut>(&self, key: CacheKey, work: F) -> (Role, SharedOutcome<T>)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, TranslateError>> + Send + 'static,
    {
        match self.dispatch_unless(key, || None::<Infallible>, work) {
            Admission::InFlight(role, outcome) => (role, outcome),
            Admission::Ready(never) => match never {},
        }
    }

    /// Like [`dispatch_or_join`](Self::dispatch_or_join), but when nothing is
    /// in flight `ready` is consulted under the pending lock first. A `Some`
    /// from it is returned as-is and no work starts.
    pub fn dispatch_unless<H, R, F, Fut>(
        &self,
        key: CacheKey,
        ready: R,
        work: F,
    ) -> Admission<T, H>
    where
        R: FnOnce() -> Option<H>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, TranslateError>> + Send + 'static,
    {
        let mut pending = self.pending.lock();
        if let Some(existing) = pending.get(&key) {
            debug!("joining in-flight request");
            return Admission::InFlight(Role::Joined, existing.outcome.clone());
        }
        if let Some(hit) = ready() {
            debug!("result landed before registration");
            return Admission::Ready(hit);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let outcome: SharedOutcome<T> = rx
            .map(|received| {
                received.unwrap_or_else(|_| {
                    Err(TranslateError::Internal(
                        "dispatch task ended without a result".into(),
                    ))
                })
            })
            .boxed()
            .shared();
        pending.insert(
            key,
            Pending {
                id,
                outcome: outcome.clone(),
            },
        );
        drop(pending);

        let guard = PendingGuard {
            pending: Arc::clone(&self.pending),
            key,
            id,
        };
        let fut = work();
        tokio::spawn(async move {
            let result = fut.await;
            if let Err(ref e) = result {
                debug!(error = %e, "dispatch settled with error");
            }
            drop(guard);
            if tx.send(result).is_err() {
                error!("no receiver left for dispatch result");
            }
        });

        Admission::InFlight(Role::Leader, outcome)
    }

    /// Number of keys with work in flight.
    pub fn in_flight(&self) -> usize {
        self.pending.lock().len()
    }
}

impl<T> Default for Coalescer<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
