//! Issue triage orchestration.
//!
//! This crate provides the [`TriageExecutor`], which discovers unprocessed
//! issues through a [`pipeline::IssueTracker`], runs each one through
//! classification, assignment, and assessment on a bounded worker pool, writes
//! the results back, and collects a [`RunReport`].
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** The executor sequences calls between the pure
//! stages in the [`pipeline`] crate and the tracker port. It contains no triage
//! rules of its own.
//!
//! ## Concurrency
//!
//! Up to `max_workers` issues are processed at once; stages within one issue
//! run sequentially. The assignment matcher's load counters are the only state
//! shared between workers.

pub mod executor;
pub mod report;

pub use executor::TriageExecutor;
pub use report::{AssigneeOutcome, IssueOutcome, OperationFailure, OutcomeCounts, OutcomeKind, RunReport};
