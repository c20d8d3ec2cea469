//! Sliding-window admission control for the credential-rotating provider.
//!
//! A log of call instants is kept per window; instants older than the window
//! are pruned lazily before each admission check. This is a coarse window log,
//! not a token bucket: a burst admitted at the very end of one window still
//! counts against the next until it ages out.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::TranslateError;

pub struct SlidingWindowLimiter {
    window: Duration,
    per_credential: usize,
    calls: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new(window: Duration, per_credential: usize) -> Self {
        Self {
            window,
            per_credential,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    /// Admissible calls per window for `credential_count` valid credentials.
    pub fn limit_for(&self, credential_count: usize) -> usize {
        self.per_credential * credential_count
    }

    fn prune(&self, calls: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = calls.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                calls.pop_front();
            } else {
                break;
            }
        }
    }

    /// Prune, then record a call if the window has room.
    /// Returns false without recording anything when the budget is spent.
    pub fn try_acquire(&self, credential_count: usize) -> bool {
        let limit = self.limit_for(credential_count);
        let mut calls = self.calls.lock();
        let now = Instant::now();
        self.prune(&mut calls, now);
        if calls.len() >= limit {
            return false;
        }
        calls.push_back(now);
        true
    }

    /// `try_acquire` as a pipeline signal: `RateExceeded` when the window is full.
    pub fn admit(&self, credential_count: usize) -> Result<(), TranslateError> {
        if self.try_acquire(credential_count) {
            Ok(())
        } else {
            Err(TranslateError::RateExceeded)
        }
    }

    /// Calls currently counted in the window (after pruning).
    pub fn in_window(&self) -> usize {
        let mut calls = self.calls.lock();
        self.prune(&mut calls, Instant::now());
        calls.len()
    }
}

/// Round-robin credential picker. The index advances on every dispatch
/// attempt whether or not the call later succeeds.
#[derive(Default)]
pub struct CredentialRotation {
    next: AtomicUsize,
}

impl CredentialRotation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index into a list of `count` credentials, or None if empty.
    pub fn advance(&self, count: usize) -> Option<usize> {
        if count == 0 {
            return None;
        }
        Some(self.next.fetch_add(1, Ordering::Relaxed) % count)
    }
}
