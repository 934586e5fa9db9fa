//! Distribution selection by preferred format, and content download with its own cache.

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheKey, CacheStore, ContentBody, ContentMetadata};
use crate::error::EuDataError;
use crate::http::{HttpSession, HttpTransport};
use crate::metadata::{DatasetMetadata, Distribution};

const TEXT_CONTENT_TOKENS: &[&str] = &[
    "text",
    "json",
    "xml",
    "csv",
    "html",
    "rdf",
    "turtle",
    "n3",
    "sparql-results",
    "ld+json",
];

const RDF_SYNONYMS: &[&str] = &["RDF", "XML", "TURTLE", "N3", "JSON-LD", "OWL"];

/// The distribution chosen for download and the URL and format it was chosen under.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedDistribution<'a> {
    pub distribution: &'a Distribution,
    pub url: &'a str,
    pub format: String,
    /// Preference token that matched; `None` for the first-addressable fallback.
    pub matched: Option<String>,
}

/// Whether `dist` satisfies the upper-cased preference `token`.
pub fn matches_format(dist: &Distribution, token: &str) -> bool {
    let Some(url) = dist.target_url() else {
        return false;
    };
    let format = dist
        .format_label
        .as_deref()
        .or(dist.format.as_deref())
        .unwrap_or("")
        .to_uppercase();
    let media_type = dist.media_type.as_deref().unwrap_or("").to_uppercase();

    if !format.is_empty() && format.contains(token) {
        return true;
    }
    if media_type
        .split(['/', '+'])
        .skip(1)
        .any(|segment| segment == token)
    {
        return true;
    }
    if url_matches(url, token) {
        return true;
    }
    match token {
        "RDF" => RDF_SYNONYMS.iter().any(|synonym| format.contains(synonym)),
        "XML" | "JSON" => media_type.contains(token) || format.contains(token),
        "CSV" => {
            media_type.contains("CSV")
                || format.contains("CSV")
                || format.contains("COMMA-SEPARATED")
        }
        _ => false,
    }
}

fn url_matches(url: &str, token: &str) -> bool {
    let lower = url.to_lowercase();
    let token = token.to_lowercase();
    let (path, query) = lower.split_once('?').unwrap_or((lower.as_str(), ""));
    let file_name = path.rsplit('/').next().unwrap_or("");
    file_name.contains(&format!(".{token}"))
        || query
            .split('&')
            .any(|pair| pair == format!("format={token}"))
}

/// First distribution matching the earliest preference, else the first addressable one.
pub fn select_distribution<'a>(
    distributions: &'a [Distribution],
    preferred_formats: &[String],
) -> Result<SelectedDistribution<'a>, EuDataError> {
    for token in preferred_formats.iter().map(|token| token.to_uppercase()) {
        let matched = distributions
            .iter()
            .find(|dist| matches_format(dist, &token));
        if let Some(dist) = matched {
            let url = dist.target_url().ok_or(EuDataError::NoSuitableDistribution)?;
            let format = dist
                .format_label
                .clone()
                .or_else(|| dist.format.clone())
                .unwrap_or_else(|| token.clone());
            return Ok(SelectedDistribution {
                distribution: dist,
                url,
                format,
                matched: Some(token),
            });
        }
    }

    distributions
        .iter()
        .find_map(|dist| {
            dist.target_url().map(|url| SelectedDistribution {
                distribution: dist,
                url,
                format: dist
                    .format_label
                    .clone()
                    .or_else(|| dist.format.clone())
                    .unwrap_or_else(|| "unknown".to_string()),
                matched: None,
            })
        })
        .ok_or(EuDataError::NoSuitableDistribution)
}

pub fn is_text_content_type(content_type: &str) -> bool {
    let content_type = content_type.to_lowercase();
    TEXT_CONTENT_TOKENS
        .iter()
        .any(|token| content_type.contains(token))
}

/// Decodes a text body using the Content-Type charset. `None` means "treat as binary".
pub fn decode_text(bytes: &[u8], content_type: &str) -> Option<String> {
    let charset = content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.trim().split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, value)| value.trim().trim_matches('"').to_lowercase());

    match charset.as_deref() {
        None | Some("utf-8" | "utf8" | "us-ascii" | "ascii") => {
            String::from_utf8(bytes.to_vec()).ok()
        }
        Some("iso-8859-1" | "latin1" | "latin-1" | "iso8859-1") => {
            Some(bytes.iter().map(|&byte| char::from(byte)).collect())
        }
        Some(other) => {
            debug!(charset = other, "unsupported charset");
            None
        }
    }
}

/// Downloaded (or cached) content of a dataset distribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetContent {
    #[serde(skip)]
    pub content: ContentBody,
    pub format: Option<String>,
    pub content_type: String,
    pub is_binary: bool,
    pub size: usize,
    pub source_url: String,
}

pub struct ContentFetcher<'a, T: HttpTransport> {
    http: &'a HttpSession<T>,
    cache: &'a CacheStore,
}

impl<'a, T: HttpTransport> ContentFetcher<'a, T> {
    pub fn new(http: &'a HttpSession<T>, cache: &'a CacheStore) -> Self {
        Self { http, cache }
    }

    pub fn fetch(
        &self,
        metadata: &DatasetMetadata,
        preferred_formats: &[String],
        force_refresh: bool,
    ) -> Result<DatasetContent, EuDataError> {
        if metadata.distributions.is_empty() {
            return Err(no_distributions(metadata));
        }
        let selected = select_distribution(&metadata.distributions, preferred_formats)?;
        info!(url = selected.url, format = %selected.format, "selected distribution for download");

        let key = CacheKey::content(selected.url);
        if !force_refresh {
            if let Some(cached) = self.cached(&key, selected.url, metadata.modified.as_deref()) {
                return Ok(cached);
            }
        }

        self.download(&key, &selected, metadata.modified.clone())
    }

    fn cached(
        &self,
        key: &CacheKey,
        url: &str,
        dataset_modified: Option<&str>,
    ) -> Option<DatasetContent> {
        let cached = self.cache.lookup_content(key)?;
        if cached.metadata.source_url != url {
            warn!(url, cached_url = %cached.metadata.source_url, "content cache entry belongs to another URL");
            return None;
        }
        let stale = matches!(
            (cached.metadata.dataset_modified.as_deref(), dataset_modified),
            (Some(recorded), Some(current)) if recorded != current
        );
        if stale {
            info!(url = %cached.metadata.source_url, "content cache stale, dataset was modified");
            return None;
        }
        info!(url = %cached.metadata.source_url, "content cache hit");
        let meta = cached.metadata;
        Some(DatasetContent {
            content: cached.body,
            format: meta.format,
            content_type: meta.content_type,
            is_binary: meta.is_binary,
            size: meta.size,
            source_url: meta.source_url,
        })
    }

    fn download(
        &self,
        key: &CacheKey,
        selected: &SelectedDistribution<'_>,
        dataset_modified: Option<String>,
    ) -> Result<DatasetContent, EuDataError> {
        info!(url = selected.url, "downloading content");
        let response = self
            .http
            .download(selected.url)
            .inspect_err(|err| error!(url = selected.url, error = %err, "download failed"))?;

        let content_type = response.content_type.clone().unwrap_or_default().to_lowercase();
        let content = if is_text_content_type(&content_type) {
            match decode_text(&response.body, &content_type) {
                Some(text) => ContentBody::Text(text),
                None => {
                    warn!(url = selected.url, content_type = %content_type, "could not decode text content, treating as binary");
                    ContentBody::Binary(response.body)
                }
            }
        } else {
            ContentBody::Binary(response.body)
        };
        debug!(content_type = %content_type, is_binary = content.is_binary(), "classified content");

        let record = ContentMetadata {
            format: Some(selected.format.clone()),
            content_type,
            is_binary: content.is_binary(),
            size: content.size(),
            source_url: selected.url.to_string(),
            dataset_modified,
        };
        if let Err(err) = self.cache.store_content(key, &content, &record) {
            error!(url = selected.url, error = %err, "failed to write content cache");
        }

        Ok(DatasetContent {
            content,
            format: record.format,
            content_type: record.content_type,
            is_binary: record.is_binary,
            size: record.size,
            source_url: record.source_url,
        })
    }
}

fn no_distributions(metadata: &DatasetMetadata) -> EuDataError {
    let message = if let Some(reason) = &metadata.error_distributions {
        format!("no distributions could be fetched for this dataset ({reason})")
    } else if metadata.sparql_uri_used.is_some() {
        "no distributions found for this dataset (via SPARQL fallback)".to_string()
    } else {
        "no distributions listed for this dataset in the retrieved metadata".to_string()
    };
    EuDataError::NoDistributions(message)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn dist(format: Option<&str>, media_type: Option<&str>, url: &str) -> Distribution {
        Distribution {
            uri: Some(format!("{url}#dist")),
            format: format.map(str::to_string),
            media_type: media_type.map(str::to_string),
            download_url: Some(url.to_string()),
            ..Distribution::default()
        }
    }

    fn prefs(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|token| token.to_string()).collect()
    }

    #[test]
    fn preference_order_decides_between_csv_and_json() {
        let dists = vec![
            dist(Some("http://publications.europa.eu/resource/authority/file-type/CSV"), None, "https://x/a"),
            dist(Some("http://publications.europa.eu/resource/authority/file-type/JSON"), None, "https://x/b"),
        ];
        let csv = select_distribution(&dists, &prefs(&["CSV", "JSON"])).unwrap();
        assert_eq!(csv.url, "https://x/a");
        let json = select_distribution(&dists, &prefs(&["json", "csv"])).unwrap();
        assert_eq!(json.url, "https://x/b");
        assert_eq!(json.matched.as_deref(), Some("JSON"));
    }

    #[test]
    fn matches_media_type_extension_and_query_parameter() {
        assert!(matches_format(&dist(None, Some("text/csv"), "https://x/data"), "CSV"));
        assert!(matches_format(
            &dist(None, Some("http://www.iana.org/assignments/media-types/application/json"), "https://x/data"),
            "JSON"
        ));
        assert!(matches_format(&dist(None, None, "https://x/data.xml?v=2"), "XML"));
        assert!(matches_format(&dist(None, None, "https://x/export?format=csv"), "CSV"));
        assert!(!matches_format(&dist(None, None, "https://x/export?format=csv"), "JSON"));
    }

    #[test]
    fn rdf_accepts_serialization_synonyms() {
        assert!(matches_format(&dist(Some("TURTLE"), None, "https://x/a"), "RDF"));
        assert!(matches_format(&dist(Some("RDF/XML"), None, "https://x/a"), "RDF"));
        assert!(!matches_format(&dist(Some("PDF"), None, "https://x/a"), "RDF"));
        assert!(matches_format(&dist(Some("Comma-separated values"), None, "https://x/a"), "CSV"));
    }

    #[test]
    fn falls_back_to_first_addressable_distribution() {
        let unaddressable = Distribution {
            uri: Some("d0".to_string()),
            format: Some("CSV".to_string()),
            ..Distribution::default()
        };
        let pdf = Distribution {
            access_url: Some("https://x/report".to_string()),
            ..Distribution::default()
        };
        let dists = [unaddressable.clone(), pdf];
        let selected = select_distribution(&dists, &prefs(&["CSV"])).unwrap();
        assert_eq!(selected.url, "https://x/report");
        assert_eq!(selected.format, "unknown");
        assert!(selected.matched.is_none());

        assert_matches!(
            select_distribution(&[unaddressable], &prefs(&["CSV"])),
            Err(EuDataError::NoSuitableDistribution)
        );
    }

    #[test]
    fn text_detection_and_decoding() {
        assert!(is_text_content_type("application/ld+json"));
        assert!(is_text_content_type("Text/CSV; charset=utf-8"));
        assert!(!is_text_content_type("application/zip"));

        assert_eq!(decode_text(b"a,b", "text/csv").as_deref(), Some("a,b"));
        assert_eq!(
            decode_text(&[0x63, 0x61, 0x66, 0xe9], "text/plain; charset=ISO-8859-1").as_deref(),
            Some("café")
        );
        assert!(decode_text(&[0xff, 0xfe, 0x00], "text/plain; charset=utf-8").is_none());
        assert!(decode_text(b"abc", "text/plain; charset=shift_jis").is_none());
    }
}
