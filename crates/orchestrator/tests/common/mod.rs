//! In-memory `IssueTracker` used by the executor tests.
//!
//! Mirrors the remote contract: raw pagination over all open issues with
//! unprocessed filtering applied per page, idempotent labels, collaborator
//! checks on assignment, append-only comments. Failures can be injected per
//! operation and issue.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use pipeline::{
    Domain, Issue, IssueNumber, IssuePage, IssueTracker, LabelName, PageCursor, RepositoryId,
    TeamMember, TrackerError, TrackerOperation, TriageConfig, Username,
};

fn repo() -> RepositoryId {
    RepositoryId::parse("octo/widgets").unwrap()
}

pub fn user(name: &str) -> Username {
    Username::new(name).unwrap()
}

pub fn label(name: &str) -> LabelName {
    LabelName::new(name).unwrap()
}

pub fn member(name: &str, domains: &[&str]) -> TeamMember {
    TeamMember::new(user(name), domains.iter().map(|d| Domain::new(*d).unwrap()))
}

pub fn config(team: Vec<TeamMember>) -> TriageConfig {
    TriageConfig::new(repo(), team)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List(Option<PageCursor>),
    AddLabel(IssueNumber, String),
    SetAssignee(IssueNumber, String),
    PostComment(IssueNumber),
}

#[derive(Debug, Clone)]
pub struct StoredIssue {
    pub issue: Issue,
    pub comments: Vec<String>,
}

struct Injected {
    operation: TrackerOperation,
    issue: Option<IssueNumber>,
    error: TrackerError,
    remaining: Option<usize>,
}

#[derive(Default)]
struct State {
    issues: BTreeMap<IssueNumber, StoredIssue>,
    collaborators: BTreeSet<Username>,
    injected: Vec<Injected>,
    calls: Vec<Call>,
}

pub struct FakeTracker {
    state: Mutex<State>,
    sentinel: LabelName,
    marker: String,
    page_size: usize,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeTracker {
    pub fn new(config: &TriageConfig) -> Self {
        let state = State {
            collaborators: config.roster().into_iter().map(|m| m.username).collect(),
            ..State::default()
        };
        Self {
            state: Mutex::new(state),
            sentinel: config.sentinel_label.clone(),
            marker: config.marker.clone(),
            page_size: usize::from(config.page_size),
            latency: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_issue(self, number: u64, title: &str, body: &str) -> Self {
        self.insert(Issue::new(IssueNumber::new(number), title, body));
        self
    }

    pub fn insert(&self, issue: Issue) {
        self.state.lock().unwrap().issues.insert(
            issue.number,
            StoredIssue {
                issue,
                comments: Vec::new(),
            },
        );
    }

    pub fn add_comment(&self, number: u64, body: &str) {
        if let Some(stored) = self
            .state
            .lock()
            .unwrap()
            .issues
            .get_mut(&IssueNumber::new(number))
        {
            stored.comments.push(body.to_string());
        }
    }

    pub fn remove_collaborator(&self, username: &str) {
        self.state.lock().unwrap().collaborators.remove(&user(username));
    }

    /// Makes `operation` fail with `error`; `issue = None` matches any issue,
    /// `times = None` fails forever.
    pub fn fail(
        &self,
        operation: TrackerOperation,
        issue: Option<u64>,
        error: TrackerError,
        times: Option<usize>,
    ) {
        self.state.lock().unwrap().injected.push(Injected {
            operation,
            issue: issue.map(IssueNumber::new),
            error,
            remaining: times,
        });
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().injected.clear();
    }

    pub fn issue(&self, number: u64) -> StoredIssue {
        self.state.lock().unwrap().issues[&IssueNumber::new(number)].clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn write_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::List(_)))
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn is_unprocessed(&self, stored: &StoredIssue) -> bool {
        !stored.issue.has_label(&self.sentinel)
            && !stored.comments.iter().any(|c| c.contains(&self.marker))
    }

    async fn simulate_latency(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn injected(
        state: &mut State,
        operation: TrackerOperation,
        issue: Option<IssueNumber>,
    ) -> Option<TrackerError> {
        let index = state.injected.iter().position(|i| {
            i.operation == operation && (i.issue.is_none() || i.issue == issue)
        })?;
        let error = state.injected[index].error.clone();
        if let Some(remaining) = state.injected[index].remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                state.injected.remove(index);
            }
        }
        Some(error)
    }
}

#[async_trait]
impl IssueTracker for FakeTracker {
    async fn list_unprocessed_issues(
        &self,
        _repository: &RepositoryId,
        cursor: Option<PageCursor>,
    ) -> Result<IssuePage, TrackerError> {
        self.simulate_latency().await;
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::List(cursor));
        if let Some(err) = Self::injected(&mut state, TrackerOperation::ListIssues, None) {
            return Err(err);
        }

        let page = cursor.unwrap_or(PageCursor::page(1));
        let start = (page.as_page() as usize - 1) * self.page_size;
        let raw: Vec<&StoredIssue> = state.issues.values().collect();
        let end = (start + self.page_size).min(raw.len());
        let issues = raw
            .get(start..end)
            .unwrap_or(&[])
            .iter()
            .filter(|s| self.is_unprocessed(s))
            .map(|s| s.issue.clone())
            .collect();
        let next = (end < raw.len()).then(|| page.next());
        Ok(IssuePage { issues, next })
    }

    async fn add_label(
        &self,
        _repository: &RepositoryId,
        issue: IssueNumber,
        label: &LabelName,
    ) -> Result<(), TrackerError> {
        self.simulate_latency().await;
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::AddLabel(issue, label.to_string()));
        if let Some(err) = Self::injected(&mut state, TrackerOperation::AddLabel, Some(issue)) {
            return Err(err);
        }
        if let Some(stored) = state.issues.get_mut(&issue) {
            if !stored.issue.has_label(label) {
                stored.issue.labels.insert(label.clone());
            }
        }
        Ok(())
    }

    async fn set_assignee(
        &self,
        _repository: &RepositoryId,
        issue: IssueNumber,
        username: &Username,
    ) -> Result<(), TrackerError> {
        self.simulate_latency().await;
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::SetAssignee(issue, username.to_string()));
        if let Some(err) = Self::injected(&mut state, TrackerOperation::SetAssignee, Some(issue)) {
            return Err(err);
        }
        if !state.collaborators.contains(username) {
            return Err(TrackerError::InvalidAssignee {
                username: username.clone(),
            });
        }
        if let Some(stored) = state.issues.get_mut(&issue) {
            stored.issue.assignee = Some(username.clone());
        }
        Ok(())
    }

    async fn post_comment(
        &self,
        _repository: &RepositoryId,
        issue: IssueNumber,
        body: &str,
    ) -> Result<(), TrackerError> {
        self.simulate_latency().await;
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::PostComment(issue));
        if let Some(err) = Self::injected(&mut state, TrackerOperation::PostComment, Some(issue)) {
            return Err(err);
        }
        if body.trim().is_empty() {
            return Err(TrackerError::MalformedComment {
                reason: "comment body is empty".into(),
            });
        }
        if let Some(stored) = state.issues.get_mut(&issue) {
            stored.comments.push(body.to_string());
        }
        Ok(())
    }
}
