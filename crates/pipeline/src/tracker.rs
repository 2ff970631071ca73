//! Port trait for the remote issue tracker.
//!
//! Infrastructure crates implement [`IssueTracker`]; the orchestrator depends
//! only on this trait. Implementations own rate limiting, retries, pagination,
//! and authentication.

use async_trait::async_trait;

use crate::{IssueNumber, IssuePage, LabelName, PageCursor, RepositoryId, TrackerError, Username};

/// Remote operations the triage pipeline needs.
///
/// ## Contract
///
/// - Transient failures are retried inside the implementation with bounded
///   exponential back-off. A transient [`TrackerError`] returned from any
///   method means the retry budget is exhausted.
/// - 4xx-equivalent failures are returned immediately as permanent errors.
/// - Every method is a suspension point; none of them may hold shared locks
///   across the remote call.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Lists one page of open issues that the pipeline has not processed yet.
    ///
    /// An issue is unprocessed when it lacks the sentinel label and has no
    /// comment carrying the pipeline's marker. `cursor = None` requests the
    /// first page. The listing is restartable: passing a previously returned
    /// cursor re-reads that page.
    async fn list_unprocessed_issues(
        &self,
        repository: &RepositoryId,
        cursor: Option<PageCursor>,
    ) -> Result<IssuePage, TrackerError>;

    /// Adds `label` to the issue. Adding a label that is already present is a
    /// no-op.
    async fn add_label(
        &self,
        repository: &RepositoryId,
        issue: IssueNumber,
        label: &LabelName,
    ) -> Result<(), TrackerError>;

    /// Assigns the issue to `username`.
    ///
    /// Returns [`TrackerError::InvalidAssignee`] when the user is not an
    /// assignable collaborator.
    async fn set_assignee(
        &self,
        repository: &RepositoryId,
        issue: IssueNumber,
        username: &Username,
    ) -> Result<(), TrackerError>;

    /// Appends a comment. Not idempotent: each call creates a new comment.
    async fn post_comment(
        &self,
        repository: &RepositoryId,
        issue: IssueNumber,
        body: &str,
    ) -> Result<(), TrackerError>;
}
