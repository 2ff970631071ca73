//! GitHub infrastructure adapter.
//!
//! Implements the [`pipeline::IssueTracker`] port over the GitHub REST API
//! with `reqwest`.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain triage rules. All GitHub
//! API details (authentication, pagination, rate limiting, retries) are
//! handled here; the [`pipeline`] crate never sees them.
//!
//! ## Discovery
//!
//! An issue is unprocessed when it is open, is not a pull request, does not
//! carry the sentinel label, and has no comment containing the marker. The
//! comment check is only made for issues that have comments.

mod client;
mod models;
mod retry;

pub use client::{
    GithubClient, GithubClientError, GithubConfig, DEFAULT_API_BASE, MAX_COMMENT_CHARS,
};
