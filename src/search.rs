//! Dataset search over the SPARQL endpoint.
//!
//! One grouped query finds the page of datasets, then distributions are attached with one
//! `VALUES` query per chunk of dataset URIs. No total count is computed.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::content::select_distribution;
use crate::domain::{SortBy, SortOrder};
use crate::error::EuDataError;
use crate::http::HttpTransport;
use crate::metadata::Distribution;
use crate::sparql::{
    BindingRow, PREFIX_DCAT, PREFIX_DCT, PREFIX_FOAF, PREFIX_XSD, SparqlClient, binding_value,
};

pub const DISTRIBUTION_CHUNK_SIZE: usize = 50;
const LANGUAGE_AUTHORITY: &str = "http://publications.europa.eu/resource/authority/language/";

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());
static LANGUAGE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z]{2,3}$").unwrap());

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub keyword: Option<String>,
    /// Theme URI, or a fragment matched against theme URIs.
    pub topic: Option<String>,
    pub publisher: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    /// ISO 639-1 code.
    pub language: Option<String>,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
    pub preferred_formats: Option<Vec<String>>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            keyword: None,
            topic: None,
            publisher: None,
            date_from: None,
            date_to: None,
            language: None,
            sort_by: SortBy::default(),
            sort_order: SortOrder::default(),
            preferred_formats: None,
            limit: 10,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadOption {
    pub url: String,
    pub format: Option<String>,
    #[serde(rename = "mediaType")]
    pub media_type: Option<String>,
    #[serde(rename = "byteSize")]
    pub byte_size: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub uri: String,
    pub title: Option<String>,
    pub publisher: Option<String>,
    pub keywords: Vec<String>,
    pub modified: Option<String>,
    pub distributions: Vec<Distribution>,
    pub download: Option<DownloadOption>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
    pub results: Vec<DatasetSummary>,
}

fn escape_literal(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('"', "\\\"")
}

/// Keywords are matched with REGEX, so anchors are escaped as well.
fn escape_pattern(value: &str) -> String {
    escape_literal(value).replace('^', "\\^").replace('$', "\\$")
}

fn validate_date(field: &str, value: &str) -> Result<(), EuDataError> {
    if DATE_RE.is_match(value) {
        Ok(())
    } else {
        Err(EuDataError::InvalidFilter(format!(
            "{field} must be YYYY-MM-DD, got '{value}'"
        )))
    }
}

pub fn build_search_query(query: &SearchQuery) -> Result<String, EuDataError> {
    let mut clauses = vec![
        "?dataset a dcat:Dataset .".to_string(),
        r#"OPTIONAL { ?dataset dct:title ?title . FILTER(LANGMATCHES(LANG(?title), "en") || LANG(?title) = "") }"#.to_string(),
        "OPTIONAL { ?dataset dct:publisher ?pubURI . ?pubURI foaf:name ?pubName . }".to_string(),
        "OPTIONAL { ?dataset dct:modified ?mod . }".to_string(),
        "OPTIONAL { ?dataset dct:issued ?iss . }".to_string(),
    ];

    match query.keyword.as_deref().filter(|kw| !kw.trim().is_empty()) {
        Some(keyword) => {
            clauses.push("?dataset dcat:keyword ?kw .".to_string());
            clauses.push(format!(
                r#"FILTER REGEX(STR(?kw), "{}", "i")"#,
                escape_pattern(keyword.trim())
            ));
        }
        None => clauses.push("OPTIONAL { ?dataset dcat:keyword ?kw . }".to_string()),
    }

    if let Some(publisher) = query.publisher.as_deref().filter(|p| !p.trim().is_empty()) {
        clauses.push(format!(
            r#"FILTER EXISTS {{ ?dataset dct:publisher ?pubCheckURI . ?pubCheckURI foaf:name ?pubCheckName . FILTER REGEX(STR(?pubCheckName), "{}", "i") }}"#,
            escape_literal(publisher.trim())
        ));
    }

    if let Some(topic) = query.topic.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        if topic.starts_with('<') || topic.starts_with("http") {
            let uri = topic.trim_start_matches('<').trim_end_matches('>');
            if uri.contains(['<', '>', ' ', '"']) {
                return Err(EuDataError::InvalidFilter(format!("invalid topic URI '{topic}'")));
            }
            clauses.push(format!("?dataset dcat:theme <{uri}> ."));
        } else {
            clauses.push(format!(
                "FILTER EXISTS {{ ?dataset dcat:theme ?themeUri . FILTER CONTAINS(STR(?themeUri), '{}') }}",
                escape_literal(topic)
            ));
        }
    }

    if let Some(language) = query.language.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
        if !LANGUAGE_RE.is_match(language) {
            return Err(EuDataError::InvalidFilter(format!(
                "language must be an ISO 639 code, got '{language}'"
            )));
        }
        clauses.push(format!(
            "?dataset dct:language <{LANGUAGE_AUTHORITY}{}> .",
            language.to_uppercase()
        ));
    }

    for (field, value, op) in [
        ("date_from", query.date_from.as_deref(), ">="),
        ("date_to", query.date_to.as_deref(), "<="),
    ] {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            continue;
        };
        validate_date(field, value)?;
        clauses.push("FILTER(BOUND(?iss) || BOUND(?mod))".to_string());
        clauses.push(format!(
            "FILTER ((BOUND(?iss) && ?iss {op} '{value}'^^xsd:date) || (BOUND(?mod) && ?mod {op} '{value}'^^xsd:date))"
        ));
    }

    let direction = query.sort_order.keyword();
    let order = match query.sort_by {
        SortBy::Date => format!("ORDER BY {direction}(MAX(?mod))"),
        SortBy::Title => format!("ORDER BY {direction}(SAMPLE(?title))"),
    };

    Ok(format!(
        "{PREFIX_DCAT}
{PREFIX_DCT}
{PREFIX_FOAF}
{PREFIX_XSD}
SELECT ?dataset ?title (GROUP_CONCAT(DISTINCT ?kw; SEPARATOR='|') AS ?keywords) (SAMPLE(?pubName) AS ?publisher) (MAX(?mod) AS ?modified)
WHERE {{
  {body}
}}
GROUP BY ?dataset ?title
{order}
LIMIT {limit}
OFFSET {offset}
",
        body = clauses.join("\n  "),
        limit = query.limit,
        offset = query.offset,
    ))
}

pub fn distribution_chunk_query(dataset_uris: &[&str]) -> String {
    let values = dataset_uris
        .iter()
        .map(|uri| format!("<{uri}>"))
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "{PREFIX_DCAT}
{PREFIX_DCT}
SELECT ?dataset ?dist ?format ?downloadURL ?accessURL ?mediaType ?byteSize WHERE {{
  VALUES ?dataset {{ {values} }}
  ?dataset dcat:distribution ?dist .
  OPTIONAL {{ ?dist dct:format ?formatURI . BIND(STR(?formatURI) AS ?format) }}
  OPTIONAL {{ ?dist dcat:downloadURL ?downloadURL . }}
  OPTIONAL {{ ?dist dcat:accessURL ?accessURL . }}
  OPTIONAL {{ ?dist dcat:mediaType ?mediaType . }}
  OPTIONAL {{ ?dist dcat:byteSize ?byteSize . }}
}} LIMIT 1000
"
    )
}

pub struct DatasetSearch<'a, T: HttpTransport> {
    sparql: SparqlClient<'a, T>,
}

impl<'a, T: HttpTransport> DatasetSearch<'a, T> {
    pub fn new(sparql: SparqlClient<'a, T>) -> Self {
        Self { sparql }
    }

    pub fn search(
        &self,
        query: &SearchQuery,
        default_formats: &[String],
        force_refresh: bool,
    ) -> Result<SearchResults, EuDataError> {
        let sparql = build_search_query(query)?;
        let response = self.sparql.execute(&sparql, "search", force_refresh)?;
        let rows: Vec<&BindingRow> = response
            .rows()
            .iter()
            .filter(|row| binding_value(row, "dataset").is_some())
            .collect();
        info!(count = rows.len(), "search returned datasets");
        if rows.is_empty() {
            return Ok(SearchResults::default());
        }

        let dataset_uris: Vec<&str> = rows
            .iter()
            .filter_map(|row| binding_value(row, "dataset"))
            .collect();
        let mut distributions = self.attach_distributions(&dataset_uris, force_refresh);
        let preferred = query.preferred_formats.as_deref().unwrap_or(default_formats);

        let results = rows
            .into_iter()
            .filter_map(|row| {
                let uri = binding_value(row, "dataset")?.to_string();
                let dists = distributions.remove(&uri).unwrap_or_default();
                let download = download_option(&dists, preferred);
                Some(DatasetSummary {
                    title: binding_value(row, "title").map(str::to_string),
                    publisher: binding_value(row, "publisher").map(str::to_string),
                    keywords: binding_value(row, "keywords")
                        .map(|joined| {
                            joined
                                .split('|')
                                .filter(|kw| !kw.is_empty())
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default(),
                    modified: binding_value(row, "modified").map(str::to_string),
                    distributions: dists,
                    download,
                    uri,
                })
            })
            .collect();
        Ok(SearchResults { results })
    }

    /// Distributions per dataset URI, deduplicated by distribution URI. A failed chunk leaves
    /// its datasets without distributions.
    fn attach_distributions(
        &self,
        dataset_uris: &[&str],
        force_refresh: bool,
    ) -> HashMap<String, Vec<Distribution>> {
        let mut by_dataset: HashMap<String, Vec<Distribution>> = HashMap::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();

        for (index, chunk) in dataset_uris.chunks(DISTRIBUTION_CHUNK_SIZE).enumerate() {
            let query = distribution_chunk_query(chunk);
            let suffix = format!("dists_chunk_{index}");
            let response = match self.sparql.execute(&query, &suffix, force_refresh) {
                Ok(response) => response,
                Err(err) => {
                    warn!(chunk = index, error = %err, "distribution lookup failed for search chunk");
                    continue;
                }
            };
            for row in response.rows() {
                let (Some(dataset), Some(dist_uri)) =
                    (binding_value(row, "dataset"), binding_value(row, "dist"))
                else {
                    continue;
                };
                if !seen.insert((dataset.to_string(), dist_uri.to_string())) {
                    continue;
                }
                by_dataset
                    .entry(dataset.to_string())
                    .or_default()
                    .push(Distribution {
                        uri: Some(dist_uri.to_string()),
                        format: binding_value(row, "format").map(str::to_string),
                        media_type: binding_value(row, "mediaType").map(str::to_string),
                        download_url: binding_value(row, "downloadURL").map(str::to_string),
                        access_url: binding_value(row, "accessURL").map(str::to_string),
                        byte_size: binding_value(row, "byteSize").map(str::to_string),
                        ..Distribution::default()
                    });
            }
        }
        by_dataset
    }
}

fn download_option(distributions: &[Distribution], preferred: &[String]) -> Option<DownloadOption> {
    let selected = select_distribution(distributions, preferred).ok()?;
    Some(DownloadOption {
        url: selected.url.to_string(),
        format: selected
            .distribution
            .format
            .clone()
            .or(selected.matched),
        media_type: selected.distribution.media_type.clone(),
        byte_size: selected.distribution.byte_size.clone(),
    })
}
