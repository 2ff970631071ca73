//! Shared value types for the triage domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! state with invariants (e.g. the processing state only moves forward) and
//! participate in domain computations.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Domain, IssueNumber, LabelName, PageCursor, Username};

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

/// An issue report as read from the remote tracker.
///
/// The pipeline only reads and annotates issues; it never creates or deletes
/// them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Repository-scoped issue number.
    pub number: IssueNumber,

    /// Single-line summary supplied by the reporter.
    pub title: String,

    /// Free-text body. Empty when the reporter left it blank.
    pub body: String,

    /// Labels currently applied to the issue.
    pub labels: BTreeSet<LabelName>,

    /// Current assignee, if any. When the tracker reports several, the first
    /// one is kept.
    pub assignee: Option<Username>,

    /// Browser URL of the issue, when the tracker provides one.
    pub url: Option<String>,

    /// Creation time, when the tracker provides one.
    pub created_at: Option<Timestamp>,
}

impl Issue {
    /// Creates an issue with no labels, assignee, or metadata.
    pub fn new(number: IssueNumber, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            number,
            title: title.into(),
            body: body.into(),
            labels: BTreeSet::new(),
            assignee: None,
            url: None,
            created_at: None,
        }
    }

    /// Title and body joined by a blank line; the text the classifier and
    /// matcher read.
    pub fn text(&self) -> String {
        if self.body.is_empty() {
            self.title.clone()
        } else {
            format!("{}\n\n{}", self.title, self.body)
        }
    }

    /// Returns `true` if `label` is already applied. Label names compare
    /// case-insensitively, as they do on GitHub.
    pub fn has_label(&self, label: &LabelName) -> bool {
        self.labels
            .iter()
            .any(|applied| applied.as_str().eq_ignore_ascii_case(label.as_str()))
    }
}

/// One page of the unprocessed-issue listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssuePage {
    /// Unprocessed issues on this page, in listing order.
    pub issues: Vec<Issue>,

    /// Cursor for the next page; `None` when the listing is exhausted.
    pub next: Option<PageCursor>,
}

// ---------------------------------------------------------------------------
// Processing state
// ---------------------------------------------------------------------------

/// Where an issue is in the triage state machine.
///
/// ```text
/// Discovered → Classified → Assigned → Assessed → Done
///      └──────────┴────────────┴──────────┴──────→ Failed
/// ```
///
/// Progression is strictly forward. [`ProcessingState::Done`] and
/// [`ProcessingState::Failed`] are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    Discovered,
    Classified,
    Assigned,
    Assessed,
    Done,
    Failed,
}

/// Returned when a caller attempts a transition the state machine forbids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid processing transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: ProcessingState,
    pub to: ProcessingState,
}

impl ProcessingState {
    /// Returns `true` for `Done` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// The single state reached by completing the current stage, or `None`
    /// for terminal states.
    pub fn successor(self) -> Option<Self> {
        match self {
            Self::Discovered => Some(Self::Classified),
            Self::Classified => Some(Self::Assigned),
            Self::Assigned => Some(Self::Assessed),
            Self::Assessed => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    /// Moves to `next` if the transition is allowed: the immediate successor,
    /// or `Failed` from any non-terminal state.
    pub fn advance(&mut self, next: ProcessingState) -> Result<(), InvalidTransition> {
        let allowed = match next {
            Self::Failed => !self.is_terminal(),
            other => self.successor() == Some(other),
        };
        if !allowed {
            return Err(InvalidTransition { from: *self, to: next });
        }
        *self = next;
        Ok(())
    }
}

impl std::fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Discovered => "discovered",
            Self::Classified => "classified",
            Self::Assigned => "assigned",
            Self::Assessed => "assessed",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Team
// ---------------------------------------------------------------------------

/// A roster entry: who can be assigned, and for which domains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub username: Username,
    pub domains: BTreeSet<Domain>,
}

impl TeamMember {
    pub fn new(username: Username, domains: impl IntoIterator<Item = Domain>) -> Self {
        Self {
            username,
            domains: domains.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Parses an RFC 3339 string (e.g. `2024-05-01T12:00:00Z`).
    pub fn parse_rfc3339(value: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(value)
            .ok()
            .map(|dt| Self(dt.with_timezone(&Utc)))
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
