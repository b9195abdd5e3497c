//! The error taxonomy every integration client returns through (spec §7).
//!
//! Service layers wrap lower-level failures with an operation-descriptive
//! message while preserving the category; command layers translate a
//! category into a user-visible message. Never stash a token or an
//! `Authorization` header value in one of these — only the source of the
//! credential (env var name vs. config path).

use std::fmt;

/// A partial-success split for multi-target operations (currently only
/// projects-v2 attachment) where some targets succeeded and some failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialFailure {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl fmt::Display for PartialFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "succeeded: [{}], failed: [{}]",
            self.succeeded.join(", "),
            self.failed
                .iter()
                .map(|(name, reason)| format!("{name} ({reason})"))
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

/// The category of failure a vibe operation can return.
///
/// `NotFound` with `repository` classification is what drives
/// `with_repo_fallback`; the reimplementation dispatches on this enum
/// discriminant rather than matching error message text (spec §4.1).
#[derive(Debug, thiserror::Error)]
pub enum VibeError {
    #[error("validation failed for {field}: {reason} (value: {value:?})")]
    Validation {
        field: String,
        value: String,
        reason: String,
    },

    #[error("configuration error in {path}: missing {field} ({remedy})")]
    Configuration {
        path: String,
        field: String,
        remedy: String,
    },

    #[error("authentication to {service} failed (token from {token_source})")]
    Authentication {
        service: String,
        token_source: String,
    },

    #[error("{resource} not found: {detail}")]
    NotFound {
        resource: NotFoundKind,
        detail: String,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transient failure calling {operation}: {detail}")]
    Transient { operation: String, detail: String },

    #[error("partial failure: {0}")]
    Partial(PartialFailure),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("{operation} failed: {source}")]
    Wrapped {
        operation: String,
        #[source]
        source: Box<VibeError>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// What kind of resource a [`VibeError::NotFound`] refers to. Only
/// `Repository` triggers `with_repo_fallback`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundKind {
    Repository,
    PullRequest,
    Issue,
    Ticket,
    Project,
    Other,
}

impl fmt::Display for NotFoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotFoundKind::Repository => "repository",
            NotFoundKind::PullRequest => "pull request",
            NotFoundKind::Issue => "issue",
            NotFoundKind::Ticket => "ticket",
            NotFoundKind::Project => "project",
            NotFoundKind::Other => "resource",
        };
        f.write_str(s)
    }
}

impl VibeError {
    /// Whether this failure is eligible for retry with backoff (spec §5,
    /// "Rate-limit handling"). Categorized explicitly rather than sniffed
    /// from HTTP status at the call site, so policy lives in one place.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VibeError::Transient { .. })
    }

    /// Whether this is specifically a "repository could not be resolved"
    /// failure, the trigger for `with_repo_fallback`.
    pub fn is_repository_not_found(&self) -> bool {
        matches!(
            self,
            VibeError::NotFound {
                resource: NotFoundKind::Repository,
                ..
            }
        )
    }

    pub fn validation(field: impl Into<String>, value: impl Into<String>, reason: impl Into<String>) -> Self {
        VibeError::Validation {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(path: impl Into<String>, field: impl Into<String>, remedy: impl Into<String>) -> Self {
        VibeError::Configuration {
            path: path.into(),
            field: field.into(),
            remedy: remedy.into(),
        }
    }

    pub fn not_found(resource: NotFoundKind, detail: impl Into<String>) -> Self {
        VibeError::NotFound {
            resource,
            detail: detail.into(),
        }
    }

    pub fn repository_not_found(detail: impl Into<String>) -> Self {
        Self::not_found(NotFoundKind::Repository, detail)
    }

    pub fn transient(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        VibeError::Transient {
            operation: operation.into(),
            detail: detail.into(),
        }
    }

    /// Wrap with an operation-descriptive message while preserving the
    /// retry/fallback-relevant category underneath (spec §7, "Propagation").
    pub fn wrap(self, operation: impl Into<String>) -> Self {
        VibeError::Wrapped {
            operation: operation.into(),
            source: Box::new(self),
        }
    }

    /// The process exit code this error maps to (spec §6): everything
    /// maps to 1 except cancellation, which maps to 130.
    pub fn exit_code(&self) -> i32 {
        match self {
            VibeError::Cancelled(_) => 130,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_not_found_detection() {
        let err = VibeError::repository_not_found("owner/repo");
        assert!(err.is_repository_not_found());

        let err = VibeError::not_found(NotFoundKind::Issue, "#42");
        assert!(!err.is_repository_not_found());
    }

    #[test]
    fn wrap_preserves_category_for_fallback_detection() {
        let err = VibeError::repository_not_found("owner/repo").wrap("CreatePR");
        match &err {
            VibeError::Wrapped { source, .. } => assert!(source.is_repository_not_found()),
            _ => panic!("expected Wrapped"),
        }
    }

    #[test]
    fn transient_is_retryable_others_are_not() {
        assert!(VibeError::transient("GetPR", "timeout").is_retryable());
        assert!(!VibeError::validation("id", "x", "too short").is_retryable());
    }

    #[test]
    fn exit_codes() {
        assert_eq!(VibeError::Cancelled("sigint".into()).exit_code(), 130);
        assert_eq!(
            VibeError::validation("id", "x", "bad").exit_code(),
            1
        );
    }

    #[test]
    fn partial_failure_display() {
        let pf = PartialFailure {
            succeeded: vec!["Sprint 2024".into()],
            failed: vec![("PVT_kwDOABC".into(), "NOT_FOUND".into())],
        };
        let msg = pf.to_string();
        assert!(msg.contains("Sprint 2024"));
        assert!(msg.contains("PVT_kwDOABC"));
        assert!(msg.contains("NOT_FOUND"));
    }
}
