//! Newtype domain identifiers.
//!
//! Every triage concept that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging (for example)
//! a [`Username`] with a [`LabelName`] even though both are strings under the
//! hood.
//!
//! String-backed identifiers reject empty values both at construction and at
//! deserialisation, so a configuration file cannot smuggle in an empty label or
//! username.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Returned when a string identifier is constructed from an invalid value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind}: '{value}'")]
pub struct InvalidIdentifier {
    /// Name of the identifier type that rejected the value.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display, and the
// TryFrom<String>/Into<String> pair serde uses to keep the non-empty invariant.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty
            /// or only whitespace. Surrounding whitespace is trimmed.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                let trimmed = v.trim();
                if trimmed.is_empty() {
                    None
                } else if trimmed.len() == v.len() {
                    Some(Self(v))
                } else {
                    Some(Self(trimmed.to_string()))
                }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = InvalidIdentifier;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value.clone()).ok_or(InvalidIdentifier {
                    kind: stringify!($name),
                    value,
                })
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Macro for u64-wrapped newtypes (tracker-assigned integers).
// Generates: struct (Copy), new(), as_u64(), Display.
// ---------------------------------------------------------------------------
macro_rules! u64_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(u64);

        impl $name {
            /// Creates a new identifier from a raw integer.
            pub fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the underlying integer value.
            pub fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "#{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: tracker-integer-backed
// ---------------------------------------------------------------------------

u64_id! {
    /// Identifies an issue within one repository.
    ///
    /// Wraps the issue number assigned by the remote tracker (positive integer).
    /// Displayed with a leading `#`, the way the tracker renders it.
    IssueNumber
}

/// Opaque position in the paginated issue listing.
///
/// The first page is requested with no cursor; each [`crate::IssuePage`]
/// carries the cursor for the page after it, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageCursor(u32);

impl PageCursor {
    /// Cursor for the given one-based page number.
    pub fn page(number: u32) -> Self {
        Self(number.max(1))
    }

    /// Returns the one-based page number.
    pub fn as_page(self) -> u32 {
        self.0
    }

    /// Returns the cursor for the following page.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single pipeline run (one batch invocation).
///
/// Generated fresh for every run; propagated through spans and the run report
/// so all activity from a single run can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineRunId(Uuid);

impl PipelineRunId {
    /// Generates a new random run identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for PipelineRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: string-backed
// ---------------------------------------------------------------------------

string_id! {
    /// A label name as known to the remote tracker (e.g. `"bug"`, `"triaged"`).
    LabelName
}

string_id! {
    /// A tracker account name (e.g. a GitHub login).
    Username
}

string_id! {
    /// A classification tag (e.g. `"bug"`, `"feature-request"`).
    ///
    /// The set of categories is defined by configuration; only
    /// [`Category::unclassified`] is reserved.
    Category
}

string_id! {
    /// An area of technical expertise (e.g. `"backend"`, `"documentation"`).
    ///
    /// The value `"*"` ([`Domain::any`]) matches every roster member.
    Domain
}

impl Category {
    /// Name of the category substituted when the classifier finds nothing.
    pub const UNCLASSIFIED: &'static str = "unclassified";

    /// The reserved fallback category.
    pub fn unclassified() -> Self {
        Self(Self::UNCLASSIFIED.to_string())
    }

    /// Returns `true` for the reserved fallback category.
    pub fn is_unclassified(&self) -> bool {
        self.0 == Self::UNCLASSIFIED
    }
}

impl Domain {
    /// Wildcard domain value.
    pub const ANY: &'static str = "*";

    /// The wildcard domain: every roster member is eligible.
    pub fn any() -> Self {
        Self(Self::ANY.to_string())
    }

    /// Returns `true` for the wildcard domain.
    pub fn is_any(&self) -> bool {
        self.0 == Self::ANY
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// Identifies a repository in `"owner/name"` format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryId {
    owner: String,
    name: String,
}

impl RepositoryId {
    /// Parses `"owner/name"`. Both halves must be non-empty and contain no
    /// further `/` or whitespace.
    pub fn parse(value: &str) -> Result<Self, InvalidIdentifier> {
        let invalid = || InvalidIdentifier {
            kind: "RepositoryId",
            value: value.to_string(),
        };
        let (owner, name) = value.trim().split_once('/').ok_or_else(invalid)?;
        let valid_part =
            |part: &str| !part.is_empty() && !part.contains('/') && !part.contains(char::is_whitespace);
        if !valid_part(owner) || !valid_part(name) {
            return Err(invalid());
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    /// The owning account or organisation.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The repository name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl TryFrom<String> for RepositoryId {
    type Error = InvalidIdentifier;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RepositoryId> for String {
    fn from(id: RepositoryId) -> String {
        id.to_string()
    }
}

impl std::fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_id_rejects_blank_values() {
        assert!(LabelName::new("").is_none());
        assert!(Username::new("   ").is_none());
        assert_eq!(Category::new(" bug ").unwrap().as_str(), "bug");
    }

    #[test]
    fn test_string_id_deserialisation_enforces_invariant() {
        let ok: Username = serde_json::from_str("\"alice\"").unwrap();
        assert_eq!(ok.as_str(), "alice");

        let err = serde_json::from_str::<Username>("\"\"");
        assert!(err.is_err());
    }

    #[test]
    fn test_repository_id_parse() {
        let repo = RepositoryId::parse("octocat/Hello-World").unwrap();
        assert_eq!(repo.owner(), "octocat");
        assert_eq!(repo.name(), "Hello-World");
        assert_eq!(repo.to_string(), "octocat/Hello-World");

        assert!(RepositoryId::parse("octocat").is_err());
        assert!(RepositoryId::parse("/repo").is_err());
        assert!(RepositoryId::parse("a/b/c").is_err());
        assert!(RepositoryId::parse("owner/ name").is_err());
    }

    #[test]
    fn test_reserved_values() {
        assert!(Category::unclassified().is_unclassified());
        assert!(!Category::new("bug").unwrap().is_unclassified());
        assert!(Domain::any().is_any());
    }

    #[test]
    fn test_issue_number_display_and_cursor() {
        assert_eq!(IssueNumber::new(42).to_string(), "#42");
        assert_eq!(PageCursor::page(0).as_page(), 1);
        assert_eq!(PageCursor::page(2).next().as_page(), 3);
    }
}
