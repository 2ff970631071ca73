//! Core domain for the issue triage pipeline.
//!
//! This crate contains every domain concept, newtype identifier, error type,
//! and the three pure triage stages (classification, assignment, assessment).
//! Infrastructure crates implement the [`IssueTracker`] port defined here; they
//! never add triage rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`IssueNumber`, `Username`, `Category`, etc.) |
//! | [`types`] | `Issue`, `ProcessingState`, `TeamMember`, `Timestamp` |
//! | [`errors`] | `TrackerError`, `TriageError`, `RetryPolicy` |
//! | [`config`] | `TriageConfig` and its validation |
//! | [`tracker`] | The `IssueTracker` port |
//! | [`classifier`] | `Classifier` trait and `KeywordClassifier` |
//! | [`assignment`] | `AssignmentMatcher` and `ExpertiseMap` |
//! | [`assessor`] | Template-driven assessment comments |

pub mod assessor;
pub mod assignment;
pub mod classifier;
pub mod config;
pub mod errors;
pub mod identifiers;
pub mod tracker;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use assessor::Assessor;
pub use assignment::{AssignmentMatcher, ExpertiseMap};
pub use classifier::{Classifier, KeywordClassifier};
pub use config::{CategoryRule, LabelTable, RetryConfig, RosterConfig, TriageConfig};
pub use errors::{ErrorClass, RetryPolicy, TrackerError, TrackerOperation, TriageError};
pub use identifiers::{
    Category, Domain, InvalidIdentifier, IssueNumber, LabelName, PageCursor, PipelineRunId,
    RepositoryId, Username,
};
pub use tracker::IssueTracker;
pub use types::{InvalidTransition, Issue, IssuePage, ProcessingState, TeamMember, Timestamp};
