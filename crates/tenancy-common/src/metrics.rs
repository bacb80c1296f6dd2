//! Metrics for the admission gate
//!
//! - Admission decisions per stage (mutate, validate) and outcome
//! - Workspace type `use` authorization decisions per backend

use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Meter};
use opentelemetry::KeyValue;

static METER: Lazy<Meter> = Lazy::new(|| global::meter("tenancy"));

/// Counter of admission decisions
///
/// Labels:
/// - `stage`: mutate, validate
/// - `result`: allowed, mutated, not_ready, denied, backend_unavailable, malformed
pub static ADMISSION_DECISIONS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("tenancy_admission_decisions_total")
        .with_description("Total number of workspace admission decisions")
        .with_unit("{decisions}")
        .build()
});

/// Counter of workspace type `use` authorization decisions
///
/// Labels:
/// - `backend`: cedar, subject_access_review
/// - `decision`: allow, deny, error
pub static USE_AUTHORIZATIONS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("tenancy_use_authorizations_total")
        .with_description("Total number of workspace type use authorization decisions")
        .with_unit("{decisions}")
        .build()
});

/// Admission chain stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionStage {
    /// Mutating stage
    Mutate,
    /// Validating stage
    Validate,
}

impl AdmissionStage {
    /// Convert to label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mutate => "mutate",
            Self::Validate => "validate",
        }
    }
}

/// Labels for a `use` authorization outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    /// Principal may use the type
    Allow,
    /// Principal may not use the type
    Deny,
    /// No decision could be obtained
    Error,
}

impl AuthDecision {
    /// Convert to label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::Error => "error",
        }
    }
}

/// Record one admission decision
pub fn record_admission_decision(stage: AdmissionStage, result: &'static str) {
    ADMISSION_DECISIONS.add(
        1,
        &[
            KeyValue::new("stage", stage.as_str()),
            KeyValue::new("result", result),
        ],
    );
}

/// Record one `use` authorization decision
pub fn record_use_decision(backend: &'static str, decision: AuthDecision) {
    USE_AUTHORIZATIONS.add(
        1,
        &[
            KeyValue::new("backend", backend),
            KeyValue::new("decision", decision.as_str()),
        ],
    );
}
