//! Admission error taxonomy
//!
//! Every failure inside the gate is resolved into one of these kinds before
//! it leaves the engine. Backend errors never cross the boundary unwrapped.

use thiserror::Error;

/// Why an admission request was rejected
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdmissionError {
    /// The type catalog has not finished its initial sync
    #[error("not yet ready to handle request")]
    NotReady,

    /// Policy says no: unknown type, missing initializer, or `use` denied
    #[error("forbidden: {reason}")]
    PolicyDenied {
        /// Human-readable reason naming the offending type or initializer
        reason: String,
    },

    /// The request does not have the shape its operation implies
    #[error("internal error: {message}")]
    MalformedRequest {
        /// What was wrong with the request
        message: String,
    },

    /// The catalog or authorizer could not answer
    #[error("forbidden: {backend} unavailable: {message}")]
    BackendUnavailable {
        /// Which collaborator failed (e.g. "catalog", "authorizer")
        backend: &'static str,
        /// Underlying failure
        message: String,
    },
}

/// A plugin was started without a collaborator it needs
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum InitializationError {
    /// No WorkspaceType lister was wired in
    #[error("{plugin} plugin needs a WorkspaceType lister")]
    MissingTypeLister {
        /// Plugin that failed its self-check
        plugin: &'static str,
    },

    /// No authorizer factory was wired in
    #[error("{plugin} plugin needs an authorizer factory")]
    MissingAuthorizer {
        /// Plugin that failed its self-check
        plugin: &'static str,
    },
}

impl AdmissionError {
    /// Create a policy denial
    pub fn policy_denied(reason: impl Into<String>) -> Self {
        Self::PolicyDenied {
            reason: reason.into(),
        }
    }

    /// Create a malformed request error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRequest {
            message: message.into(),
        }
    }

    /// Create a backend unavailable error
    pub fn backend_unavailable(backend: &'static str, message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend,
            message: message.into(),
        }
    }

    /// HTTP status code reported in the admission response
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MalformedRequest { .. } => 500,
            Self::NotReady | Self::PolicyDenied { .. } | Self::BackendUnavailable { .. } => 403,
        }
    }

    /// Machine-readable reason reported in the admission response
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotReady => "NotReady",
            Self::PolicyDenied { .. } => "Forbidden",
            Self::MalformedRequest { .. } => "InternalError",
            Self::BackendUnavailable { .. } => "BackendUnavailable",
        }
    }

    /// Label value used for decision metrics
    pub fn metric_label(&self) -> &'static str {
        match self {
            Self::NotReady => "not_ready",
            Self::PolicyDenied { .. } => "denied",
            Self::MalformedRequest { .. } => "malformed",
            Self::BackendUnavailable { .. } => "backend_unavailable",
        }
    }

    /// Whether the tenant caused this (as opposed to an upstream contract violation)
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::MalformedRequest { .. })
    }
}
