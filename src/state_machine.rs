//! Per-request pipeline stages:
//! Init → Preprocess → CacheCheck → CoalesceCheck → RateCheck → ProviderCall →
//! Postprocess → CacheWrite → Done, with FallbackCheck / FreeCall / ErrorDone
//! branches. Transitions are validated and recorded for tracing.

use serde::Serialize;
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    Init,
    Preprocess,
    CacheCheck,
    CoalesceCheck,
    RateCheck,
    ProviderCall,
    FallbackCheck,
    FreeCall,
    Postprocess,
    CacheWrite,
    Done,
    ErrorDone,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Init => "Init",
            Stage::Preprocess => "Preprocess",
            Stage::CacheCheck => "CacheCheck",
            Stage::CoalesceCheck => "CoalesceCheck",
            Stage::RateCheck => "RateCheck",
            Stage::ProviderCall => "ProviderCall",
            Stage::FallbackCheck => "FallbackCheck",
            Stage::FreeCall => "FreeCall",
            Stage::Postprocess => "Postprocess",
            Stage::CacheWrite => "CacheWrite",
            Stage::Done => "Done",
            Stage::ErrorDone => "ErrorDone",
        };
        f.write_str(name)
    }
}

impl Stage {
    /// Returns whether moving from `self` to `next` is valid.
    pub fn can_transition_to(self, next: Stage) -> bool {
        matches!(
            (self, next),
            (Stage::Init, Stage::Preprocess)
                | (Stage::Init, Stage::ErrorDone) // rejected input
                | (Stage::Preprocess, Stage::CacheCheck)
                | (Stage::CacheCheck, Stage::Done) // hit
                | (Stage::CacheCheck, Stage::CoalesceCheck) // miss
                | (Stage::CoalesceCheck, Stage::Done) // joined in-flight work
                | (Stage::CoalesceCheck, Stage::ErrorDone)
                | (Stage::CoalesceCheck, Stage::RateCheck) // dispatch
                | (Stage::RateCheck, Stage::FreeCall) // exceeded
                | (Stage::RateCheck, Stage::ProviderCall) // admitted
                | (Stage::RateCheck, Stage::ErrorDone) // no credential
                | (Stage::ProviderCall, Stage::Postprocess)
                | (Stage::ProviderCall, Stage::FallbackCheck)
                | (Stage::FallbackCheck, Stage::FreeCall)
                | (Stage::FallbackCheck, Stage::ErrorDone)
                | (Stage::FreeCall, Stage::Postprocess)
                | (Stage::FreeCall, Stage::ErrorDone)
                | (Stage::Postprocess, Stage::CacheWrite)
                | (Stage::CacheWrite, Stage::Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::ErrorDone)
    }
}

/// Ordered record of the stages one request went through.
#[derive(Debug, Clone, Serialize)]
pub struct StageTrace {
    stages: Vec<Stage>,
}

impl StageTrace {
    pub fn new() -> Self {
        Self {
            stages: vec![Stage::Init],
        }
    }

    /// Continue a trace from an already-recorded prefix.
    pub fn resume(stages: Vec<Stage>) -> Self {
        if stages.is_empty() {
            return Self::new();
        }
        Self { stages }
    }

    pub fn current(&self) -> Stage {
        self.stages.last().copied().unwrap_or(Stage::Init)
    }

    /// Record a transition. Invalid transitions are logged and still recorded
    /// so the trace reflects what actually happened.
    pub fn advance(&mut self, next: Stage) {
        let current = self.current();
        if current.can_transition_to(next) {
            trace!(from = %current, to = %next, "stage_transition");
        } else {
            warn!(from = %current, to = %next, "invalid stage transition");
        }
        self.stages.push(next);
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn into_stages(self) -> Vec<Stage> {
        self.stages
    }

    /// Whether every recorded step was a valid transition.
    pub fn is_valid(&self) -> bool {
        self.stages
            .windows(2)
            .all(|w| w[0].can_transition_to(w[1]))
    }
}

impl Default for StageTrace {
    fn default() -> Self {
        Self::new()
    }
}
