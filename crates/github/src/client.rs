//! [`IssueTracker`] over the GitHub REST API.
//!
//! Every request carries a bearer token, the GitHub JSON media type, and a
//! pinned API version. Responses are mapped onto [`TrackerError`]:
//!
//! | Response | Error |
//! |----------|-------|
//! | 429, 403 with `x-ratelimit-remaining: 0`, any `retry-after` | `RateLimited` |
//! | 5xx, timeout, connection failure | `Transient` |
//! | other 4xx | `Rejected` |
//!
//! Rate limits and transient failures are retried here; callers only see
//! them once the retry budget is spent. Comment posts are the exception to
//! blind retries: they are not idempotent, so an attempt that may have
//! reached GitHub is followed by a marker check instead of a resend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use pipeline::{
    Issue, IssueNumber, IssuePage, IssueTracker, LabelName, PageCursor, RepositoryId,
    RetryConfig, Timestamp, TrackerError, TrackerOperation, TriageConfig, Username,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, RETRY_AFTER};
use reqwest::{RequestBuilder, Response, StatusCode};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::models::{ApiErrorBody, CommentResource, IssueResource};
use crate::retry::{with_retry, with_retry_if};

/// Public GitHub API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

const API_VERSION: &str = "2022-11-28";
const MEDIA_TYPE: &str = "application/vnd.github+json";
const COMMENTS_PER_PAGE: usize = 100;

/// GitHub refuses comment bodies longer than this many characters.
pub const MAX_COMMENT_CHARS: usize = 65_536;

#[derive(Debug, Error)]
pub enum GithubClientError {
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid API base URL '{0}'")]
    InvalidApiBase(String),
}

/// Connection and discovery settings for [`GithubClient`].
#[derive(Clone)]
pub struct GithubConfig {
    pub api_base: String,
    pub token: String,
    pub user_agent: String,
    pub sentinel_label: LabelName,
    pub marker: String,
    pub page_size: u8,
    /// Only list issues created at or after this time.
    pub since: Option<Timestamp>,
    pub retry: RetryConfig,
}

impl GithubConfig {
    /// Settings for the public API, taking discovery and retry parameters
    /// from `triage`.
    pub fn new(token: impl Into<String>, triage: &TriageConfig) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token: token.into(),
            user_agent: format!("issue-triage/{}", env!("CARGO_PKG_VERSION")),
            sentinel_label: triage.sentinel_label.clone(),
            marker: triage.marker.clone(),
            page_size: triage.page_size,
            since: None,
            retry: triage.retry.clone(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_since(mut self, since: Option<Timestamp>) -> Self {
        self.since = since;
        self
    }
}

impl std::fmt::Debug for GithubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubConfig")
            .field("api_base", &self.api_base)
            .field("token", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .field("sentinel_label", &self.sentinel_label)
            .field("marker", &self.marker)
            .field("page_size", &self.page_size)
            .field("since", &self.since)
            .field("retry", &self.retry)
            .finish()
    }
}

/// GitHub-backed issue tracker.
#[derive(Debug, Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    config: GithubConfig,
}

impl GithubClient {
    pub fn new(config: GithubConfig) -> Result<Self, GithubClientError> {
        if !config.api_base.starts_with("http://") && !config.api_base.starts_with("https://") {
            return Err(GithubClientError::InvalidApiBase(config.api_base));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(MEDIA_TYPE));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(config.retry.request_timeout())
            .build()?;

        Ok(Self { http, config })
    }

    fn repo_url(&self, repository: &RepositoryId, path: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.config.api_base.trim_end_matches('/'),
            repository.owner(),
            repository.name(),
            path
        )
    }

    /// Sends one request. Transport failures are transient; the status is not
    /// inspected.
    async fn execute(&self, request: RequestBuilder) -> Result<Response, TrackerError> {
        request
            .bearer_auth(&self.config.token)
            .send()
            .await
            .map_err(|e| transport_error(&e))
    }

    /// Sends one request and maps any non-2xx status to an error.
    async fn send(
        &self,
        operation: TrackerOperation,
        request: RequestBuilder,
    ) -> Result<Response, TrackerError> {
        let response = self.execute(request).await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(operation, response).await)
        }
    }

    async fn fetch_issue_page(
        &self,
        repository: &RepositoryId,
        page: PageCursor,
    ) -> Result<Vec<IssueResource>, TrackerError> {
        let url = self.repo_url(repository, "/issues");
        let mut query = vec![
            ("state", "open".to_string()),
            ("sort", "created".to_string()),
            ("direction", "asc".to_string()),
            ("per_page", self.config.page_size.to_string()),
            ("page", page.as_page().to_string()),
        ];
        // GitHub's `since` filters on update time. Anything created after the
        // cutoff was also updated after it, so it only narrows the listing;
        // the creation-time check happens in `list_unprocessed_issues`.
        if let Some(since) = self.config.since {
            query.push(("since", since.to_string()));
        }
        let (url, query) = (&url, &query);

        with_retry(&self.config.retry, TrackerOperation::ListIssues, || async move {
            let response = self
                .send(TrackerOperation::ListIssues, self.http.get(url).query(query))
                .await?;
            response
                .json::<Vec<IssueResource>>()
                .await
                .map_err(|e| decode_error(&e))
        })
        .await
    }

    /// `true` if any comment on the issue contains the marker.
    async fn has_marker_comment(
        &self,
        repository: &RepositoryId,
        issue: IssueNumber,
    ) -> Result<bool, TrackerError> {
        let url = self.repo_url(repository, &format!("/issues/{}/comments", issue.as_u64()));
        let mut page = PageCursor::page(1);
        loop {
            let query = [
                ("per_page", COMMENTS_PER_PAGE.to_string()),
                ("page", page.as_page().to_string()),
            ];
            let (url, query) = (&url, &query);
            let comments = with_retry(&self.config.retry, TrackerOperation::ListIssues, || async move {
                let response = self
                    .send(TrackerOperation::ListIssues, self.http.get(url).query(query))
                    .await?;
                response
                    .json::<Vec<CommentResource>>()
                    .await
                    .map_err(|e| decode_error(&e))
            })
            .await?;

            let found = comments
                .iter()
                .filter_map(|c| c.body.as_deref())
                .any(|body| body.contains(&self.config.marker));
            if found {
                return Ok(true);
            }
            if comments.len() < COMMENTS_PER_PAGE {
                return Ok(false);
            }
            page = page.next();
        }
    }

    /// Issues with no creation time are kept.
    fn created_before_cutoff(&self, issue: &Issue) -> bool {
        matches!(
            (self.config.since, issue.created_at),
            (Some(since), Some(created)) if created < since
        )
    }

    async fn is_assignable(
        &self,
        repository: &RepositoryId,
        username: &Username,
    ) -> Result<bool, TrackerError> {
        let url = &self.repo_url(repository, &format!("/assignees/{username}"));
        with_retry(&self.config.retry, TrackerOperation::SetAssignee, || async move {
            let response = self.execute(self.http.get(url)).await?;
            match response.status() {
                StatusCode::NO_CONTENT => Ok(true),
                StatusCode::NOT_FOUND => Ok(false),
                _ => Err(error_from_response(TrackerOperation::SetAssignee, response).await),
            }
        })
        .await
    }
}

#[async_trait]
impl IssueTracker for GithubClient {
    #[instrument(skip_all, fields(repository = %repository, page = cursor.map(PageCursor::as_page)))]
    async fn list_unprocessed_issues(
        &self,
        repository: &RepositoryId,
        cursor: Option<PageCursor>,
    ) -> Result<IssuePage, TrackerError> {
        let page = cursor.unwrap_or(PageCursor::page(1));
        let raw = self.fetch_issue_page(repository, page).await?;
        let next = (raw.len() >= usize::from(self.config.page_size)).then(|| page.next());
        let fetched = raw.len();

        let mut issues = Vec::new();
        for resource in raw {
            if resource.is_pull_request() {
                continue;
            }
            let comment_count = resource.comments;
            let issue = resource.into_issue();
            if issue.has_label(&self.config.sentinel_label) || self.created_before_cutoff(&issue) {
                continue;
            }
            if comment_count > 0 && self.has_marker_comment(repository, issue.number).await? {
                debug!(issue = %issue.number, "Skipping issue with an assessment comment");
                continue;
            }
            issues.push(issue);
        }

        debug!(fetched, unprocessed = issues.len(), "Listed issue page");
        Ok(IssuePage { issues, next })
    }

    #[instrument(skip_all, fields(repository = %repository, issue = %issue, label = %label))]
    async fn add_label(
        &self,
        repository: &RepositoryId,
        issue: IssueNumber,
        label: &LabelName,
    ) -> Result<(), TrackerError> {
        let url = &self.repo_url(repository, &format!("/issues/{}/labels", issue.as_u64()));
        let body = &serde_json::json!({ "labels": [label.as_str()] });
        with_retry(&self.config.retry, TrackerOperation::AddLabel, || async move {
            self.send(TrackerOperation::AddLabel, self.http.post(url).json(body))
                .await
                .map(drop)
        })
        .await?;
        debug!("Label applied");
        Ok(())
    }

    /// GitHub silently ignores assignees who cannot be assigned, so
    /// assignability is checked first.
    #[instrument(skip_all, fields(repository = %repository, issue = %issue, username = %username))]
    async fn set_assignee(
        &self,
        repository: &RepositoryId,
        issue: IssueNumber,
        username: &Username,
    ) -> Result<(), TrackerError> {
        if !self.is_assignable(repository, username).await? {
            return Err(TrackerError::InvalidAssignee {
                username: username.clone(),
            });
        }

        let url = &self.repo_url(repository, &format!("/issues/{}/assignees", issue.as_u64()));
        let body = &serde_json::json!({ "assignees": [username.as_str()] });
        with_retry(&self.config.retry, TrackerOperation::SetAssignee, || async move {
            self.send(TrackerOperation::SetAssignee, self.http.post(url).json(body))
                .await
                .map(drop)
        })
        .await?;
        debug!("Assignee set");
        Ok(())
    }

    #[instrument(skip_all, fields(repository = %repository, issue = %issue, chars = body.chars().count()))]
    async fn post_comment(
        &self,
        repository: &RepositoryId,
        issue: IssueNumber,
        body: &str,
    ) -> Result<(), TrackerError> {
        if body.trim().is_empty() {
            return Err(TrackerError::MalformedComment {
                reason: "comment body is empty".into(),
            });
        }
        if body.chars().count() > MAX_COMMENT_CHARS {
            return Err(TrackerError::MalformedComment {
                reason: format!("comment body exceeds {MAX_COMMENT_CHARS} characters"),
            });
        }

        // A timed-out or 5xx POST may still have created the comment. Before
        // sending again, look for the marker; a body without one cannot be
        // checked, so it gets no second attempt after such a failure.
        let checkable = body.contains(&self.config.marker);
        let maybe_posted = &AtomicBool::new(false);
        let url = &self.repo_url(repository, &format!("/issues/{}/comments", issue.as_u64()));
        let payload = &serde_json::json!({ "body": body });
        with_retry_if(
            &self.config.retry,
            TrackerOperation::PostComment,
            |err| checkable || !may_have_applied(err),
            || async move {
                if maybe_posted.load(Ordering::SeqCst)
                    && self.has_marker_comment(repository, issue).await?
                {
                    debug!("Comment from an earlier attempt found; not posting again");
                    return Ok(());
                }
                let result = self
                    .send(TrackerOperation::PostComment, self.http.post(url).json(payload))
                    .await
                    .map(drop);
                if result.as_ref().is_err_and(may_have_applied) {
                    maybe_posted.store(true, Ordering::SeqCst);
                }
                result
            },
        )
        .await?;
        debug!("Assessment comment posted");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Response classification
// ---------------------------------------------------------------------------

/// Timeouts, dropped connections and 5xx responses leave it unknown whether
/// the server acted on the request.
fn may_have_applied(err: &TrackerError) -> bool {
    matches!(err, TrackerError::Transient { .. })
}

fn transport_error(err: &reqwest::Error) -> TrackerError {
    let message = if err.is_timeout() {
        format!("request timed out: {err}")
    } else {
        format!("request failed: {err}")
    };
    TrackerError::Transient { message }
}

/// A 2xx response whose body could not be read is treated like a dropped
/// connection.
fn decode_error(err: &reqwest::Error) -> TrackerError {
    TrackerError::Transient {
        message: format!("unreadable response body: {err}"),
    }
}

async fn error_from_response(operation: TrackerOperation, response: Response) -> TrackerError {
    let status = response.status();
    if let Some(retry_after) = rate_limit(status, response.headers()) {
        return TrackerError::RateLimited { retry_after };
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&text)
        .map(|b| b.message)
        .unwrap_or_else(|_| status.canonical_reason().unwrap_or("unknown error").to_string());

    if status.is_server_error() {
        TrackerError::Transient {
            message: format!("{operation} returned {status}: {message}"),
        }
    } else {
        TrackerError::Rejected {
            operation,
            status: status.as_u16(),
            message,
        }
    }
}

/// `Some(hint)` when the response is a rate limit. The hint comes from
/// `retry-after` (seconds) or, failing that, `x-ratelimit-reset` (epoch
/// seconds).
fn rate_limit(status: StatusCode, headers: &HeaderMap) -> Option<Option<Duration>> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let retry_after = header(RETRY_AFTER.as_str())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let exhausted = header("x-ratelimit-remaining").is_some_and(|v| v.trim() == "0");

    let limited = status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && exhausted)
        || headers.contains_key(RETRY_AFTER);
    if !limited {
        return None;
    }

    let reset = header("x-ratelimit-reset")
        .and_then(|v| v.trim().parse::<i64>().ok())
        .map(|reset| {
            let now = chrono::Utc::now().timestamp();
            Duration::from_secs(u64::try_from(reset - now).unwrap_or(0))
        });
    Some(retry_after.or(reset))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_too_many_requests_is_a_rate_limit() {
        let hint = rate_limit(StatusCode::TOO_MANY_REQUESTS, &headers(&[("retry-after", "12")]));
        assert_eq!(hint, Some(Some(Duration::from_secs(12))));
    }

    #[test]
    fn test_forbidden_is_a_rate_limit_only_when_exhausted() {
        assert_eq!(rate_limit(StatusCode::FORBIDDEN, &headers(&[])), None);
        assert_eq!(
            rate_limit(
                StatusCode::FORBIDDEN,
                &headers(&[("x-ratelimit-remaining", "12")])
            ),
            None
        );
        let reset = (chrono::Utc::now().timestamp() + 3600).to_string();
        let hint = rate_limit(
            StatusCode::FORBIDDEN,
            &headers(&[("x-ratelimit-remaining", "0"), ("x-ratelimit-reset", &reset)]),
        );
        let wait = hint.flatten().unwrap();
        assert!(wait > Duration::from_secs(3500) && wait <= Duration::from_secs(3600));
    }

    #[test]
    fn test_reset_in_the_past_means_no_wait() {
        let hint = rate_limit(
            StatusCode::FORBIDDEN,
            &headers(&[("x-ratelimit-remaining", "0"), ("x-ratelimit-reset", "1")]),
        );
        assert_eq!(hint, Some(Some(Duration::ZERO)));
    }

    #[test]
    fn test_config_debug_hides_token() {
        let triage = TriageConfig::new(
            RepositoryId::parse("octo/widgets").unwrap(),
            vec![pipeline::TeamMember::new(Username::new("alice").unwrap(), [])],
        );
        let config = GithubConfig::new("ghp_secret", &triage);
        let debug = format!("{config:?}");
        assert!(!debug.contains("ghp_secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_rejects_non_http_api_base() {
        let triage = TriageConfig::new(
            RepositoryId::parse("octo/widgets").unwrap(),
            vec![pipeline::TeamMember::new(Username::new("alice").unwrap(), [])],
        );
        let config = GithubConfig::new("t", &triage).with_api_base("api.github.com");
        assert!(matches!(
            GithubClient::new(config),
            Err(GithubClientError::InvalidApiBase(_))
        ));
    }
}
