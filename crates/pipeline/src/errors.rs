//! Error taxonomy and retry-policy types for the triage domain.
//!
//! Three classes of failure exist ([`ErrorClass`]):
//!
//! - **Transient**: network timeout, 5xx-equivalent, rate limiting. Retried by
//!   the tracker adapter with back-off; only surfaced once retries are
//!   exhausted.
//! - **Permanent operation**: invalid label, invalid assignee, malformed
//!   comment. Aborts that one operation, is recorded in the run report, and
//!   never retried.
//! - **Configuration**: missing credential, empty roster, unresolvable
//!   mapping. Fatal; the pipeline does not start.
//!
//! [`TrackerError`] carries the first two; [`TriageError`] carries the run-level
//! failures.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Username;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// Returned by [`TrackerError::retry_policy`] so that the adapter's retry loop
/// never has to match on individual variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    ///
    /// `after` optionally specifies the minimum delay before retrying (e.g.
    /// derived from `Retry-After` or `x-ratelimit-reset` response headers).
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

/// Coarse classification used for retry decisions and the run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Transient,
    PermanentOperation,
    Configuration,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Transient => "transient",
            Self::PermanentOperation => "permanent",
            Self::Configuration => "configuration",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Tracker errors
// ---------------------------------------------------------------------------

/// The four write/read operations the pipeline performs against the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerOperation {
    ListIssues,
    AddLabel,
    SetAssignee,
    PostComment,
}

impl std::fmt::Display for TrackerOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ListIssues => "list issues",
            Self::AddLabel => "add label",
            Self::SetAssignee => "set assignee",
            Self::PostComment => "post comment",
        };
        write!(f, "{s}")
    }
}

/// Failures reported by an [`crate::IssueTracker`] implementation.
///
/// Implementations retry transient conditions themselves; a transient variant
/// reaching the caller means the retry budget is spent.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackerError {
    /// The tracker throttled the request.
    #[error("rate limited by the issue tracker (retry after {retry_after:?})")]
    RateLimited {
        /// Reset hint from the response, when present.
        retry_after: Option<Duration>,
    },

    /// Timeout, connection failure, or a 5xx-equivalent response.
    #[error("transient tracker failure: {message}")]
    Transient { message: String },

    /// The user is not an assignable collaborator on the repository.
    #[error("'{username}' is not an assignable collaborator")]
    InvalidAssignee { username: Username },

    /// The tracker rejected the request as invalid (4xx-equivalent).
    #[error("{operation} rejected by the issue tracker (status {status}): {message}")]
    Rejected {
        operation: TrackerOperation,
        status: u16,
        message: String,
    },

    /// The comment body was refused before it was sent.
    #[error("malformed comment: {reason}")]
    MalformedComment { reason: String },
}

impl TrackerError {
    /// Returns the retry decision for this error.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::RateLimited { retry_after } => RetryPolicy::Retryable {
                after: *retry_after,
            },
            Self::Transient { .. } => RetryPolicy::Retryable { after: None },
            Self::InvalidAssignee { .. } | Self::Rejected { .. } | Self::MalformedComment { .. } => {
                RetryPolicy::NonRetryable
            }
        }
    }

    /// Returns the error class used in the run report.
    pub fn class(&self) -> ErrorClass {
        match self.retry_policy() {
            RetryPolicy::Retryable { .. } => ErrorClass::Transient,
            RetryPolicy::NonRetryable => ErrorClass::PermanentOperation,
        }
    }

    /// Shorthand for `class() == ErrorClass::Transient`.
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

// ---------------------------------------------------------------------------
// Run-level errors
// ---------------------------------------------------------------------------

/// Errors that stop a triage run (or prevent it from starting).
#[derive(Debug, Error)]
pub enum TriageError {
    /// The configuration is invalid. Produced at load time; the pipeline never
    /// starts with an invalid configuration.
    #[error("configuration error: {message}")]
    ConfigurationError {
        /// Description of the configuration problem.
        message: String,
    },

    /// Discovering issues failed after the tracker's retries were exhausted.
    #[error("issue discovery failed: {source}")]
    Discovery {
        #[source]
        source: TrackerError,
    },
}

impl TriageError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ConfigurationError { .. } => ErrorClass::Configuration,
            Self::Discovery { source } => source.class(),
        }
    }
}
