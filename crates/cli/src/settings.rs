//! Loading `triage.toml`.
//!
//! Every failure here is a [`TriageError::ConfigurationError`] so that the
//! binary can map it to its configuration exit status.

use std::path::Path;

use pipeline::{Timestamp, TriageConfig, TriageError};

/// Reads, parses, and validates the configuration file.
pub fn load(path: &Path) -> Result<TriageConfig, TriageError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        TriageError::configuration(format!("cannot read {}: {e}", path.display()))
    })?;
    parse(&text).map_err(|e| match e {
        TriageError::ConfigurationError { message } => {
            TriageError::configuration(format!("{}: {message}", path.display()))
        }
        other => other,
    })
}

pub fn parse(text: &str) -> Result<TriageConfig, TriageError> {
    let config: TriageConfig =
        toml::from_str(text).map_err(|e| TriageError::configuration(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// The API token is required for every command that talks to GitHub.
pub fn require_token(token: Option<String>) -> Result<String, TriageError> {
    token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| {
            TriageError::configuration("no GitHub token; set GITHUB_TOKEN or pass --token")
        })
}

/// `--since` value parser.
pub fn parse_since(value: &str) -> Result<Timestamp, String> {
    Timestamp::parse_rfc3339(value)
        .ok_or_else(|| format!("'{value}' is not an RFC 3339 timestamp (e.g. 2024-05-01T00:00:00Z)"))
}
