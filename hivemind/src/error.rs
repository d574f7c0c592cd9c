//! Hub error taxonomy.
//!
//! Every operation in the hub resolves to exactly one of these kinds; backend
//! ops translate driver errors locally, sub-servers wrap handler failures into
//! the tool envelope, and the transport maps kinds to status codes.

use thiserror::Error;

/// Result alias used throughout the hub.
pub type HubResult<T> = Result<T, HubError>;

/// Unified error for every hub operation.
#[derive(Debug, Error)]
pub enum HubError {
    /// Schema or argument validation failure. Not retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Missing entity, chain, task, file, or model.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unique-constraint violation, e.g. an existing (label, id) pair.
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Graph or model backend cannot be reached.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Deadline exceeded. Retryable only where routing or pool policy permits.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Governance pre-check failed and the block policy is on; the action was
    /// not executed.
    #[error("governance blocked: {0}")]
    GovernanceBlocked(String),

    /// A candidate log record failed schema validation; the action was not
    /// executed.
    #[error("governance invalid format: {0}")]
    GovernanceInvalidFormat(String),

    /// Invariant violation or unexpected failure.
    #[error("internal: {0}")]
    Internal(String),
}

impl HubError {
    /// Stable snake_case tag for envelopes, sinks, and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            HubError::InvalidInput(_) => "invalid_input",
            HubError::NotFound(_) => "not_found",
            HubError::Duplicate(_) => "duplicate",
            HubError::BackendUnavailable(_) => "backend_unavailable",
            HubError::Timeout(_) => "timeout",
            HubError::GovernanceBlocked(_) => "governance_blocked",
            HubError::GovernanceInvalidFormat(_) => "governance_invalid_format",
            HubError::Internal(_) => "internal",
        }
    }

    /// Whether a caller with a retry budget may retry this failure.
    ///
    /// Only connection-level failures and deadline expiry qualify; everything
    /// else is deterministic and propagates immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HubError::BackendUnavailable(_) | HubError::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for HubError {
    fn from(e: serde_json::Error) -> Self {
        HubError::InvalidInput(format!("json: {}", e))
    }
}

impl From<std::io::Error> for HubError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => HubError::NotFound(e.to_string()),
            std::io::ErrorKind::TimedOut => HubError::Timeout(e.to_string()),
            _ => HubError::Internal(format!("io: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Display of each variant carries its taxonomy phrase.
    #[test]
    fn display_contains_taxonomy_phrase() {
        let cases = [
            (HubError::InvalidInput("x".into()), "invalid input"),
            (HubError::NotFound("x".into()), "not found"),
            (HubError::Duplicate("x".into()), "duplicate"),
            (
                HubError::BackendUnavailable("x".into()),
                "backend unavailable",
            ),
            (HubError::Timeout("x".into()), "timeout"),
            (HubError::GovernanceBlocked("x".into()), "governance blocked"),
            (
                HubError::GovernanceInvalidFormat("x".into()),
                "governance invalid format",
            ),
            (HubError::Internal("x".into()), "internal"),
        ];
        for (err, phrase) in cases {
            let s = err.to_string();
            assert!(s.contains(phrase), "{} should contain {}", s, phrase);
            assert!(s.contains('x'), "{} should carry the message", s);
        }
    }

    /// **Scenario**: Only connection failures and timeouts are retryable.
    #[test]
    fn retryable_kinds() {
        assert!(HubError::BackendUnavailable("net".into()).is_retryable());
        assert!(HubError::Timeout("slow".into()).is_retryable());
        assert!(!HubError::InvalidInput("bad".into()).is_retryable());
        assert!(!HubError::NotFound("gone".into()).is_retryable());
        assert!(!HubError::Duplicate("again".into()).is_retryable());
        assert!(!HubError::Internal("bug".into()).is_retryable());
    }

    /// **Scenario**: io NotFound maps into the taxonomy NotFound kind.
    #[test]
    fn io_not_found_maps_to_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: HubError = io.into();
        assert_eq!(err.kind(), "not_found");
    }
}
