use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum EuDataError {
    #[error("request failed: {0}")]
    Http(String),

    #[error("request returned status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("could not extract a dataset UUID from URI: {0}")]
    UuidNotFound(String),

    #[error("{0}")]
    DatasetNodeNotFound(String),

    #[error("{0}")]
    NoDistributions(String),

    #[error(
        "no suitable distribution with a download or access URL found matching preferred formats or as fallback"
    )]
    NoSuitableDistribution,

    #[error("{0}")]
    SparqlFallback(String),

    #[error("failed to retrieve metadata. REST error: {rest}. SPARQL error: {sparql}")]
    AllStrategiesFailed { rest: String, sparql: String },

    #[error("could not get metadata before fetching content: {0}")]
    MetadataUnavailable(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("invalid search filter: {0}")]
    InvalidFilter(String),
}

impl EuDataError {
    /// True for the family of errors that mean "nothing matched", as opposed to I/O failures.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EuDataError::UuidNotFound(_)
                | EuDataError::DatasetNodeNotFound(_)
                | EuDataError::NoDistributions(_)
                | EuDataError::NoSuitableDistribution
        )
    }
}

/// Cuts a response body down to at most `limit` characters.
pub fn truncate_body(body: &str, limit: usize) -> String {
    match body.char_indices().nth(limit) {
        Some((idx, _)) => body[..idx].to_string(),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        let body = "é".repeat(600);
        let cut = truncate_body(&body, 500);
        assert_eq!(cut.chars().count(), 500);
        assert_eq!(truncate_body("short", 500), "short");
    }

    #[test]
    fn combined_failure_mentions_both_paths() {
        let err = EuDataError::AllStrategiesFailed {
            rest: "no uuid".to_string(),
            sparql: "timeout".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("REST error: no uuid"));
        assert!(message.contains("SPARQL error: timeout"));
    }
}
