//! Per-run outcome reporting.
//!
//! Every issue the executor starts appears in the [`RunReport`] exactly once,
//! either `Done` (possibly with partial failures) or `Failed`. The report is
//! serialisable for machine consumption and renders a plain-text summary via
//! [`std::fmt::Display`].

use std::collections::BTreeSet;

use pipeline::{
    Category, ErrorClass, IssueNumber, LabelName, PipelineRunId, ProcessingState, RepositoryId,
    Timestamp, TrackerError, TrackerOperation, Username,
};
use serde::Serialize;

/// What happened to the assignee for one issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "username", rename_all = "snake_case")]
pub enum AssigneeOutcome {
    /// This run assigned the issue.
    Assigned(Username),
    /// The issue already had an assignee; it was left alone.
    Existing(Username),
    /// No eligible team member.
    Unassigned,
    /// A member was chosen but the tracker refused the assignment.
    Rejected(Username),
    /// The issue failed before the assignee write was attempted.
    NotAttempted,
}

impl std::fmt::Display for AssigneeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Assigned(u) => write!(f, "{u}"),
            Self::Existing(u) => write!(f, "{u} (existing)"),
            Self::Unassigned => write!(f, "unassigned"),
            Self::Rejected(u) => write!(f, "{u} (rejected)"),
            Self::NotAttempted => write!(f, "-"),
        }
    }
}

/// One remote write that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationFailure {
    pub operation: TrackerOperation,
    pub class: ErrorClass,
    pub message: String,
}

impl OperationFailure {
    pub fn new(operation: TrackerOperation, error: &TrackerError) -> Self {
        Self {
            operation,
            class: error.class(),
            message: error.to_string(),
        }
    }
}

/// Summary bucket for one issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Done,
    PartialFailure,
    Failed,
}

/// Final record for one issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueOutcome {
    pub number: IssueNumber,
    pub title: String,
    pub url: Option<String>,
    /// Terminal state: `Done` or `Failed`.
    pub state: ProcessingState,
    pub categories: BTreeSet<Category>,
    /// Labels this run added (category labels and the sentinel).
    pub labels_applied: Vec<LabelName>,
    pub assignee: AssigneeOutcome,
    pub comment_posted: bool,
    pub failures: Vec<OperationFailure>,
}

impl IssueOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self.state {
            ProcessingState::Done if self.failures.is_empty() => OutcomeKind::Done,
            ProcessingState::Done => OutcomeKind::PartialFailure,
            _ => OutcomeKind::Failed,
        }
    }
}

/// Counts per [`OutcomeKind`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub done: usize,
    pub partial_failure: usize,
    pub failed: usize,
}

/// Everything a triage run did.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: PipelineRunId,
    pub repository: RepositoryId,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    /// `true` if cancellation stopped discovery early.
    pub cancelled: bool,
    /// Set when listing issues failed; issues started before the failure are
    /// still reported.
    pub discovery_error: Option<String>,
    /// Worker tasks that ended without producing an outcome.
    pub lost_workers: usize,
    /// Outcomes ordered by issue number.
    pub outcomes: Vec<IssueOutcome>,
}

impl RunReport {
    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for outcome in &self.outcomes {
            match outcome.kind() {
                OutcomeKind::Done => counts.done += 1,
                OutcomeKind::PartialFailure => counts.partial_failure += 1,
                OutcomeKind::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// `true` when no issue failed and discovery completed. Drives the process
    /// exit status.
    pub fn is_success(&self) -> bool {
        self.counts().failed == 0 && self.discovery_error.is_none() && self.lost_workers == 0
    }

    pub fn outcome(&self, number: IssueNumber) -> Option<&IssueOutcome> {
        self.outcomes.iter().find(|o| o.number == number)
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts = self.counts();
        writeln!(f, "Triage run {} on {}", self.run_id, self.repository)?;
        writeln!(
            f,
            "  done: {}  partial failure: {}  failed: {}",
            counts.done, counts.partial_failure, counts.failed
        )?;
        if self.cancelled {
            writeln!(f, "  cancelled before all issues were started")?;
        }
        if let Some(error) = &self.discovery_error {
            writeln!(f, "  {error}")?;
        }
        if self.lost_workers > 0 {
            writeln!(f, "  {} worker(s) ended without an outcome", self.lost_workers)?;
        }
        for outcome in &self.outcomes {
            let categories: Vec<&str> = outcome.categories.iter().map(Category::as_str).collect();
            let kind = match outcome.kind() {
                OutcomeKind::Done => "done",
                OutcomeKind::PartialFailure => "partial",
                OutcomeKind::Failed => "FAILED",
            };
            writeln!(
                f,
                "  {} [{kind}] {} | categories: {} | assignee: {}",
                outcome.number,
                outcome.title,
                categories.join(", "),
                outcome.assignee
            )?;
            for failure in &outcome.failures {
                writeln!(
                    f,
                    "      {} ({}): {}",
                    failure.operation, failure.class, failure.message
                )?;
            }
        }
        Ok(())
    }
}
