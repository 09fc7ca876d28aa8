//! Error types for the gateway.

use std::time::Duration;

/// Coarse taxonomy used for error-propagation policy decisions (spec §7).
///
/// Every top-level `Error` maps to exactly one `ErrorKind` via [`Error::kind`].
/// Components branch on this instead of matching error strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Schema, size, or type violation. Permanent, surfaced as 4xx.
    InputInvalid,
    /// A dependency call exceeded its budget. Transient, retried by the
    /// owning component.
    DependencyTimeout,
    /// A dependency returned an unrecoverable error. Transient if the
    /// capability is non-critical, permanent if critical.
    DependencyUnavailable,
    /// Rate limit or dedup short-circuit. Not a failure.
    PolicyDrop,
    /// Invariant violation inside the gateway itself.
    Internal,
}

/// Top-level error type for the gateway.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("normalization error: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("forward error: {0}")]
    Forward(#[from] ForwardError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

impl Error {
    /// The error-propagation taxonomy this error belongs to (spec §7).
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::InputInvalid,
            Error::Normalize(e) => e.kind(),
            Error::Classifier(e) => e.kind(),
            Error::Sink(e) => e.kind(),
            Error::Forward(e) => e.kind(),
            Error::Pipeline(e) => e.kind(),
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("unrecognized configuration key: {0}")]
    UnrecognizedKey(String),
}

/// Normalizer (C2) errors.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("input exceeds max_envelope_bytes ({size} > {limit})")]
    Oversize { size: u64, limit: u64 },

    #[error("unsupported or undetectable input kind")]
    UnknownKind,

    #[error("normalization failed: {0}")]
    Failed(String),
}

impl NormalizeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NormalizeError::Oversize { .. } | NormalizeError::UnknownKind => {
                ErrorKind::InputInvalid
            }
            NormalizeError::Failed(_) => ErrorKind::Internal,
        }
    }
}

/// Classifier Adapter (C5) errors.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("classifier timed out after {0:?}")]
    Timeout(Duration),

    #[error("classifier unavailable: {0}")]
    Unavailable(String),
}

impl ClassifierError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClassifierError::Timeout(_) => ErrorKind::DependencyTimeout,
            ClassifierError::Unavailable(_) => ErrorKind::DependencyUnavailable,
        }
    }
}

/// Storage Sink Manager (C7) errors.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink {name} put failed: {reason}")]
    PutFailed { name: String, reason: String },

    #[error("sink {name} get failed: {reason}")]
    GetFailed { name: String, reason: String },

    #[error("sink {name} does not accept full content")]
    FullContentRejected { name: String },

    #[error("no primary sink succeeded for tier {tier}")]
    AllPrimarySinksFailed { tier: String },
}

impl SinkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SinkError::AllPrimarySinksFailed { .. } => ErrorKind::DependencyUnavailable,
            _ => ErrorKind::DependencyTimeout,
        }
    }
}

/// Forwarder errors.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("forward to {destination} failed: {reason}")]
    Failed { destination: String, reason: String },

    #[error("forward to {destination} exhausted retries")]
    RetriesExhausted { destination: String },
}

impl ForwardError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::DependencyTimeout
    }
}

/// Pipeline Coordinator (C9) errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("identity unavailable")]
    IdentityUnavailable,

    #[error("pipeline deadline exceeded")]
    Timeout,

    #[error("invariant violation: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::IdentityUnavailable => ErrorKind::InputInvalid,
            PipelineError::Timeout => ErrorKind::DependencyTimeout,
            PipelineError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Result type alias for the gateway.
pub type Result<T> = std::result::Result<T, Error>;
