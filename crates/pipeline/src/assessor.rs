//! Template-driven assessment comments.
//!
//! [`Assessor::assess`] is a pure function of the issue text and its
//! categories. Each category contributes one section; categories without a
//! template of their own fall back to the generic acknowledgment. The hidden
//! marker is always the last line so the tracker adapter can recognise the
//! comment on later runs.
//!
//! Templates may use two placeholders: `{number}` (rendered as `#42`) and
//! `{title}`.

use std::collections::{BTreeMap, BTreeSet};

use crate::{Category, Issue};

const BUG_TEMPLATE: &str = "\
#### Bug report checklist

To help us reproduce {number}, please confirm:

- [ ] Exact steps to reproduce, starting from a clean state
- [ ] Expected behaviour vs. actual behaviour
- [ ] Version, platform, and configuration in use
- [ ] Full error message or stack trace, if any
- [ ] Whether this worked in an earlier version (possible regression)

Likely causes to look at first:

- Recent changes touching the failing code path
- Unhandled edge cases in input validation
- Environment or dependency version differences";

const FEATURE_TEMPLATE: &str = "\
#### Implementation considerations

Before work starts on \"{title}\":

- [ ] What problem does this solve, and for whom?
- [ ] Is there an existing workaround?
- [ ] Which components and public interfaces would change?
- [ ] Backwards-compatibility and migration impact
- [ ] How will the feature be tested and documented?";

const DOCUMENTATION_TEMPLATE: &str = "\
#### Suggested documentation structure

1. **Overview**: what the topic is and when it matters
2. **Prerequisites**: what the reader needs first
3. **Step-by-step guide**: a worked, copy-pasteable example
4. **Reference**: options, parameters, and defaults
5. **Troubleshooting**: common mistakes and their fixes";

const QUESTION_TEMPLATE: &str = "\
#### Question

Thanks for asking. To give an accurate answer, it helps to know:

- [ ] What you are trying to achieve overall
- [ ] What you have already tried
- [ ] Relevant versions and configuration";

const ENHANCEMENT_TEMPLATE: &str = "\
#### Enhancement review

- [ ] What is the measurable improvement (speed, usability, resource use)?
- [ ] Which existing behaviour changes, if any?
- [ ] Can it be delivered incrementally?";

const GENERIC_TEMPLATE: &str = "\
#### Triage

Thanks for opening {number}. A maintainer has been notified and will follow \
up. Adding reproduction steps, screenshots, or links to related issues helps \
us respond faster.";

/// Built-in templates keyed by category name.
pub fn default_templates() -> BTreeMap<Category, String> {
    [
        ("bug", BUG_TEMPLATE),
        ("feature-request", FEATURE_TEMPLATE),
        ("documentation", DOCUMENTATION_TEMPLATE),
        ("question", QUESTION_TEMPLATE),
        ("enhancement", ENHANCEMENT_TEMPLATE),
        (Category::UNCLASSIFIED, GENERIC_TEMPLATE),
    ]
    .into_iter()
    .filter_map(|(name, text)| Some((Category::new(name)?, text.to_string())))
    .collect()
}

/// Renders assessment comments.
#[derive(Debug, Clone)]
pub struct Assessor {
    templates: BTreeMap<Category, String>,
    fallback: String,
    marker: String,
}

impl Assessor {
    /// Built-in templates overlaid with `overrides`. A configured
    /// `unclassified` template also replaces the generic fallback.
    pub fn new(overrides: &BTreeMap<Category, String>, marker: impl Into<String>) -> Self {
        let mut templates = default_templates();
        templates.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        let fallback = templates
            .get(&Category::unclassified())
            .cloned()
            .unwrap_or_else(|| GENERIC_TEMPLATE.to_string());
        Self {
            templates,
            fallback,
            marker: marker.into(),
        }
    }

    /// The marker string appended to every comment.
    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn assess(&self, issue: &Issue, categories: &BTreeSet<Category>) -> String {
        let listed: Vec<String> = categories.iter().map(|c| format!("`{c}`")).collect();
        let mut out = String::from("### Initial triage assessment\n\n");
        if listed.is_empty() {
            out.push_str("**Categories:** `unclassified`\n\n");
        } else {
            out.push_str(&format!("**Categories:** {}\n\n", listed.join(", ")));
        }

        let mut sections: Vec<&str> = categories
            .iter()
            .map(|c| self.templates.get(c).map_or(self.fallback.as_str(), String::as_str))
            .collect();
        if sections.is_empty() {
            sections.push(&self.fallback);
        }
        let mut seen = BTreeSet::new();
        sections.retain(|s| seen.insert(*s));

        for section in sections {
            out.push_str(&render(section, issue));
            out.push_str("\n\n");
        }
        out.push_str(&self.marker);
        out
    }
}

fn render(template: &str, issue: &Issue) -> String {
    template
        .replace("{number}", &issue.number.to_string())
        .replace("{title}", issue.title.trim())
}
