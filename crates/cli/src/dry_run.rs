//! `--dry-run` support.

use async_trait::async_trait;
use pipeline::{
    IssueNumber, IssuePage, IssueTracker, LabelName, PageCursor, RepositoryId, TrackerError,
    Username,
};
use tracing::info;

/// Lists through the wrapped tracker but only logs writes.
///
/// Nothing is written, so the same issues are discovered again on every dry
/// run.
pub struct DryRunTracker<T> {
    inner: T,
}

impl<T> DryRunTracker<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<T: IssueTracker> IssueTracker for DryRunTracker<T> {
    async fn list_unprocessed_issues(
        &self,
        repository: &RepositoryId,
        cursor: Option<PageCursor>,
    ) -> Result<IssuePage, TrackerError> {
        self.inner.list_unprocessed_issues(repository, cursor).await
    }

    async fn add_label(
        &self,
        _repository: &RepositoryId,
        issue: IssueNumber,
        label: &LabelName,
    ) -> Result<(), TrackerError> {
        info!(%issue, %label, "[dry run] would add label");
        Ok(())
    }

    async fn set_assignee(
        &self,
        _repository: &RepositoryId,
        issue: IssueNumber,
        username: &Username,
    ) -> Result<(), TrackerError> {
        info!(%issue, %username, "[dry run] would assign");
        Ok(())
    }

    async fn post_comment(
        &self,
        _repository: &RepositoryId,
        issue: IssueNumber,
        body: &str,
    ) -> Result<(), TrackerError> {
        if body.trim().is_empty() {
            return Err(TrackerError::MalformedComment {
                reason: "comment body is empty".into(),
            });
        }
        info!(%issue, comment = body, "[dry run] would comment");
        Ok(())
    }
}
