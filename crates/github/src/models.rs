//! GitHub REST payloads. Only the fields the adapter reads are modelled.

use pipeline::{Issue, IssueNumber, LabelName, Timestamp, Username};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct IssueResource {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub labels: Vec<LabelResource>,
    #[serde(default)]
    pub assignee: Option<UserResource>,
    #[serde(default)]
    pub assignees: Vec<UserResource>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    /// Comment count.
    #[serde(default)]
    pub comments: u32,
    /// Present only when the item is a pull request.
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

impl IssueResource {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }

    pub fn into_issue(self) -> Issue {
        let assignee = self
            .assignee
            .into_iter()
            .chain(self.assignees)
            .find_map(|u| Username::new(u.login));
        Issue {
            number: IssueNumber::new(self.number),
            title: self.title,
            body: self.body.unwrap_or_default(),
            labels: self
                .labels
                .into_iter()
                .filter_map(|l| LabelName::new(l.name))
                .collect(),
            assignee,
            url: self.html_url,
            created_at: self.created_at.as_deref().and_then(Timestamp::parse_rfc3339),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct LabelResource {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserResource {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommentResource {
    #[serde(default)]
    pub body: Option<String>,
}

/// Error body GitHub returns with 4xx/5xx responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub message: String,
}
