use thiserror::Error;

/// Error taxonomy for the engine. Every fallible operation in this crate
/// returns one of these variants (directly, or wrapped via `anyhow` at
/// orchestration boundaries that fan out across independent subsystems).
#[derive(Debug, Error)]
pub enum RagError {
    /// Caller-supplied input failed validation. Never retryable.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A required external collaborator (message bus, KV store, LLM) is
    /// unreachable or misconfigured. Not retryable without operator action.
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// A required external collaborator failed in a way that is plausibly
    /// transient (timeout, rate limit, connection reset). Retryable.
    #[error("transient dependency failure: {0}")]
    DependencyTransient(String),

    /// An invariant this crate is responsible for maintaining was violated.
    /// Indicates a bug, not a bad input or a flaky dependency.
    #[error("internal invariant violated: {0}")]
    Internal(String),

    /// Unrecoverable: the process should not continue serving requests.
    #[error("catastrophic failure: {0}")]
    Catastrophic(String),
}

impl RagError {
    /// Whether a caller should consider retrying the operation that produced
    /// this error, as opposed to surfacing it immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RagError::DependencyTransient(_))
    }
}

pub type RagResult<T> = Result<T, RagError>;
