//! Static triage configuration.
//!
//! [`TriageConfig`] is read once at startup (the CLI parses it from TOML),
//! validated with [`TriageConfig::validate`], and then shared immutably with
//! every component. Everything except the repository and the team roster has a
//! built-in default.
//!
//! The roster may be written either as an ordered list of members:
//!
//! ```toml
//! [[team]]
//! username = "alice"
//! domains = ["backend", "devops"]
//! ```
//!
//! or as a domain → usernames table:
//!
//! ```toml
//! [team]
//! backend = ["alice", "bob"]
//! documentation = ["carol"]
//! ```
//!
//! Roster order (the assignment tie-break) is list order for the first form.
//! For the second it is order of first appearance, reading domains
//! alphabetically and each domain's usernames in the order given.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Category, Domain, LabelName, RepositoryId, TeamMember, TriageError, Username};

/// Default label applied last to every processed issue.
pub const DEFAULT_SENTINEL_LABEL: &str = "triaged";

/// Default hidden marker appended to every assessment comment.
pub const DEFAULT_MARKER: &str = "<!-- issue-triage:assessed -->";

/// Largest page size the GitHub REST API accepts.
pub const MAX_PAGE_SIZE: u8 = 100;

// ---------------------------------------------------------------------------
// Top-level configuration
// ---------------------------------------------------------------------------

/// Complete configuration for one repository's triage pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriageConfig {
    /// Repository to triage, in `owner/name` form.
    pub repository: RepositoryId,

    /// Label written as the final step for every processed issue.
    #[serde(default = "default_sentinel_label")]
    pub sentinel_label: LabelName,

    /// Hidden string appended to assessment comments. Its presence in any
    /// comment marks the issue as processed.
    #[serde(default = "default_marker")]
    pub marker: String,

    /// Number of issues processed concurrently.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Upper bound on issues started in one run.
    #[serde(default = "default_max_issues")]
    pub max_issues: usize,

    /// Issues requested per listing page.
    #[serde(default = "default_page_size")]
    pub page_size: u8,

    /// Remote call retry and timeout settings.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Team roster.
    pub team: RosterConfig,

    /// Category rules in evaluation order.
    #[serde(default = "default_categories")]
    pub categories: Vec<CategoryRule>,

    /// Keywords that narrow a multi-domain category to the domains the issue
    /// text actually talks about.
    #[serde(default = "default_domain_hints")]
    pub domain_hints: BTreeMap<Domain, Vec<String>>,

    /// Assessment template overrides, keyed by category.
    #[serde(default)]
    pub templates: BTreeMap<Category, String>,
}

impl TriageConfig {
    /// Builds a configuration with defaults for everything but the repository
    /// and roster.
    pub fn new(repository: RepositoryId, team: Vec<TeamMember>) -> Self {
        Self {
            repository,
            sentinel_label: default_sentinel_label(),
            marker: default_marker(),
            max_workers: default_max_workers(),
            max_issues: default_max_issues(),
            page_size: default_page_size(),
            retry: RetryConfig::default(),
            team: RosterConfig::Members(team),
            categories: default_categories(),
            domain_hints: default_domain_hints(),
            templates: BTreeMap::new(),
        }
    }

    /// The roster in tie-break order.
    pub fn roster(&self) -> Vec<TeamMember> {
        self.team.members()
    }

    /// Category rules including the `unclassified` fallback. A configured
    /// `unclassified` rule replaces the built-in one.
    pub fn category_rules(&self) -> Vec<CategoryRule> {
        let mut rules = self.categories.clone();
        if !rules.iter().any(|r| r.name.is_unclassified()) {
            rules.push(CategoryRule::unclassified());
        }
        rules
    }

    /// Category → label lookup over [`Self::category_rules`].
    pub fn label_table(&self) -> LabelTable {
        LabelTable::from_rules(&self.category_rules())
    }

    /// Domains referenced by some category that no roster member covers.
    /// Categories mapping only to such domains are assigned to nobody.
    pub fn unstaffed_domains(&self) -> BTreeSet<Domain> {
        let staffed: BTreeSet<Domain> = self
            .roster()
            .into_iter()
            .flat_map(|m| m.domains)
            .collect();
        self.category_rules()
            .into_iter()
            .flat_map(|r| r.domains)
            .filter(|d| !d.is_any() && !staffed.contains(d))
            .collect()
    }

    /// Checks every invariant the pipeline relies on.
    ///
    /// Unstaffed domains are not an error; they are logged so that an operator
    /// can see why some categories end up unassigned.
    pub fn validate(&self) -> Result<(), TriageError> {
        let roster = self.roster();
        if roster.is_empty() {
            return Err(TriageError::configuration("team roster is empty"));
        }
        let mut seen = BTreeSet::new();
        for member in &roster {
            if !seen.insert(&member.username) {
                return Err(TriageError::configuration(format!(
                    "team member '{}' is listed more than once",
                    member.username
                )));
            }
        }

        if self.max_workers == 0 {
            return Err(TriageError::configuration("max_workers must be at least 1"));
        }
        if self.max_issues == 0 {
            return Err(TriageError::configuration("max_issues must be at least 1"));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(TriageError::configuration(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        if self.marker.trim().is_empty() {
            return Err(TriageError::configuration("marker must not be empty"));
        }
        self.retry.validate()?;

        let rules = self.category_rules();
        let mut names = BTreeSet::new();
        for rule in &rules {
            if !names.insert(&rule.name) {
                return Err(TriageError::configuration(format!(
                    "category '{}' is defined more than once",
                    rule.name
                )));
            }
            if rule.label() == self.sentinel_label {
                return Err(TriageError::configuration(format!(
                    "category '{}' uses the sentinel label '{}'",
                    rule.name, self.sentinel_label
                )));
            }
        }

        for category in self.templates.keys() {
            if !names.contains(category) {
                return Err(TriageError::configuration(format!(
                    "template defined for unknown category '{category}'"
                )));
            }
        }

        let mapped: BTreeSet<&Domain> = rules.iter().flat_map(|r| &r.domains).collect();
        for domain in self.domain_hints.keys() {
            if !mapped.contains(domain) {
                return Err(TriageError::configuration(format!(
                    "domain hint for '{domain}', which no category maps to"
                )));
            }
        }

        for domain in self.unstaffed_domains() {
            tracing::warn!(
                domain = %domain,
                "No team member covers this domain; matching issues will be unassigned"
            );
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

/// The two accepted roster layouts. See the module documentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RosterConfig {
    Members(Vec<TeamMember>),
    ByDomain(BTreeMap<Domain, Vec<Username>>),
}

impl RosterConfig {
    /// Normalises either layout into an ordered member list.
    pub fn members(&self) -> Vec<TeamMember> {
        match self {
            Self::Members(members) => members.clone(),
            Self::ByDomain(by_domain) => {
                let mut members: Vec<TeamMember> = Vec::new();
                for (domain, usernames) in by_domain {
                    for username in usernames {
                        match members.iter_mut().find(|m| &m.username == username) {
                            Some(member) => {
                                member.domains.insert(domain.clone());
                            }
                            None => members.push(TeamMember::new(
                                username.clone(),
                                [domain.clone()],
                            )),
                        }
                    }
                }
                members
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// How one category is recognised, labelled, and routed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategoryRule {
    pub name: Category,

    /// Label written to the tracker. Defaults to the category name.
    #[serde(default)]
    pub label: Option<LabelName>,

    /// Words or phrases that select this category (case-insensitive, matched
    /// on word boundaries).
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Expertise domains eligible for issues in this category.
    #[serde(default)]
    pub domains: Vec<Domain>,
}

impl CategoryRule {
    /// Convenience constructor used for the built-in rule set.
    pub fn new(name: &str, keywords: &[&str], domains: &[&str]) -> Self {
        Self {
            name: Category::new(name).expect("built-in category names are non-empty"),
            label: None,
            keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
            domains: domains
                .iter()
                .map(|d| Domain::new(*d).expect("built-in domain names are non-empty"))
                .collect(),
        }
    }

    /// The built-in fallback: labelled `unclassified`, open to every member.
    pub fn unclassified() -> Self {
        Self::new(Category::UNCLASSIFIED, &[], &[Domain::ANY])
    }

    /// Label written for this category.
    pub fn label(&self) -> LabelName {
        self.label
            .clone()
            .unwrap_or_else(|| Self::label_from_name(&self.name))
    }

    fn label_from_name(category: &Category) -> LabelName {
        LabelName::new(category.as_str()).expect("category names are non-empty")
    }
}

/// Labels written for each category, resolved once from the rule set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
    by_category: BTreeMap<Category, LabelName>,
}

impl LabelTable {
    pub fn from_rules(rules: &[CategoryRule]) -> Self {
        Self {
            by_category: rules.iter().map(|r| (r.name.clone(), r.label())).collect(),
        }
    }

    /// Label applied for `category`. Categories without a rule (possible with
    /// a custom classifier) are labelled with their own name.
    pub fn label(&self, category: &Category) -> LabelName {
        self.by_category
            .get(category)
            .cloned()
            .unwrap_or_else(|| CategoryRule::label_from_name(category))
    }
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

/// Back-off and deadline settings for remote calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts per call, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub base_delay_ms: u64,
    /// Upper bound for any single delay, including rate-limit waits.
    pub max_delay_ms: u64,
    /// Maximum random delay added on top of the computed back-off.
    pub jitter_ms: u64,
    /// Per-call deadline.
    pub request_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter_ms: 250,
            request_timeout_secs: 30,
        }
    }
}

impl RetryConfig {
    /// Exponential delay before retry number `retry` (1-based), without jitter:
    /// `min(base * 2^(retry-1), max)`.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        let millis = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        Duration::from_millis(millis)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn validate(&self) -> Result<(), TriageError> {
        if self.max_attempts == 0 {
            return Err(TriageError::configuration(
                "retry.max_attempts must be at least 1",
            ));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(TriageError::configuration(
                "retry.max_delay_ms must not be smaller than retry.base_delay_ms",
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(TriageError::configuration(
                "retry.request_timeout_secs must be at least 1",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_sentinel_label() -> LabelName {
    LabelName::new(DEFAULT_SENTINEL_LABEL).expect("default sentinel label is non-empty")
}

fn default_marker() -> String {
    DEFAULT_MARKER.to_string()
}

fn default_max_workers() -> usize {
    4
}

fn default_max_issues() -> usize {
    50
}

fn default_page_size() -> u8 {
    30
}

/// Built-in category rules, in evaluation order.
pub fn default_categories() -> Vec<CategoryRule> {
    vec![
        CategoryRule::new(
            "bug",
            &[
                "bug",
                "crash",
                "crashes",
                "crashed",
                "error",
                "exception",
                "stack trace",
                "stacktrace",
                "traceback",
                "panic",
                "broken",
                "regression",
                "fails",
                "not working",
            ],
            &["backend"],
        ),
        CategoryRule::new(
            "feature-request",
            &[
                "feature request",
                "feature",
                "add support",
                "support for",
                "would be nice",
                "would like",
                "proposal",
            ],
            &["backend", "frontend"],
        ),
        CategoryRule::new(
            "documentation",
            &[
                "docs",
                "documentation",
                "readme",
                "typo",
                "tutorial",
                "guide",
                "example",
            ],
            &["documentation"],
        ),
        CategoryRule::new(
            "question",
            &[
                "question",
                "how do i",
                "how can i",
                "how to",
                "is it possible",
            ],
            &["documentation"],
        ),
        CategoryRule::new(
            "enhancement",
            &[
                "enhancement",
                "improve",
                "improvement",
                "performance",
                "optimize",
                "slow",
            ],
            &["backend", "frontend"],
        ),
    ]
}

/// Built-in domain hints used to narrow multi-domain categories.
pub fn default_domain_hints() -> BTreeMap<Domain, Vec<String>> {
    let hints: [(&str, &[&str]); 2] = [
        (
            "frontend",
            &[
                "ui", "css", "react", "button", "page", "layout", "browser", "style", "screen",
            ],
        ),
        (
            "backend",
            &[
                "api", "database", "server", "endpoint", "query", "auth", "cache",
            ],
        ),
    ];
    hints
        .into_iter()
        .map(|(domain, words)| {
            (
                Domain::new(domain).expect("built-in domain names are non-empty"),
                words.iter().map(|w| (*w).to_string()).collect(),
            )
        })
        .collect()
}
