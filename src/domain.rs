use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::EuDataError;

const UUID_PATTERN: &str =
    "[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}";

static DATASET_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"/(?:datasets|dataset|set/data)/({UUID_PATTERN})")).unwrap()
});

static SET_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"/set/({UUID_PATTERN})(?:/|$)")).unwrap());

const MAX_FILENAME_COMPONENT: usize = 150;

/// The UUID segment of a data.europa.eu dataset URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetUuid(String);

impl DatasetUuid {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extracts the UUID from `/dataset/{uuid}`, `/datasets/{uuid}`, `/set/data/{uuid}`
    /// or `/set/{uuid}` shaped URIs.
    pub fn from_uri(uri: &str) -> Option<Self> {
        DATASET_PATH_RE
            .captures(uri)
            .or_else(|| SET_PATH_RE.captures(uri))
            .and_then(|caps| caps.get(1))
            .map(|m| Self(m.as_str().to_string()))
    }

    /// The `88u` URI form used by the SPARQL endpoint.
    pub fn canonical_uri(&self) -> String {
        format!("http://data.europa.eu/88u/dataset/{}", self.0)
    }
}

impl fmt::Display for DatasetUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetUuid {
    type Err = EuDataError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_uri(value.trim()).ok_or_else(|| EuDataError::UuidNotFound(value.to_string()))
    }
}

/// Which retrieval strategy produced a metadata record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataSource {
    Rest,
    Sparql,
}

impl fmt::Display for MetadataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataSource::Rest => write!(f, "REST"),
            MetadataSource::Sparql => write!(f, "SPARQL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Date,
    Title,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Turns a URI or free-form key into a safe file name component.
pub fn sanitize_filename(value: &str) -> String {
    let stripped = value.replace("http://", "").replace("https://", "");
    stripped
        .chars()
        .map(|ch| match ch {
            '/' | ':' | '?' | '&' | '=' => '_',
            other => other,
        })
        .filter(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'))
        .take(MAX_FILENAME_COMPONENT)
        .collect()
}
