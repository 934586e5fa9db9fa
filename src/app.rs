use serde::Serialize;
use tracing::{info, warn};

use crate::cache::{CacheKey, CacheStore, ClearSummary, metadata_key_base};
use crate::config::ClientConfig;
use crate::content::{ContentFetcher, DatasetContent};
use crate::domain::DatasetUuid;
use crate::error::EuDataError;
use crate::fallback::cache_file_prefixes;
use crate::http::{HttpSession, HttpTransport, ReqwestTransport};
use crate::metadata::{DatasetMetadata, Distribution};
use crate::resolver::{MetadataResolver, Resolution};
use crate::search::{DatasetSearch, SearchQuery, SearchResults};
use crate::sparql::SparqlClient;

/// Result of `clear_cache`, as printed by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct ClearResult {
    pub dataset_uri: Option<String>,
    pub removed: usize,
    pub failed: usize,
}

impl ClearResult {
    fn new(dataset_uri: Option<&str>, summary: ClearSummary) -> Self {
        Self {
            dataset_uri: dataset_uri.map(str::to_string),
            removed: summary.removed,
            failed: summary.failed,
        }
    }
}

/// Entry point to the data.europa.eu catalogue: metadata, distributions, content and search,
/// all sharing one HTTP session (and its rate limit) and one cache directory.
pub struct EuDataClient<T: HttpTransport = ReqwestTransport> {
    config: ClientConfig,
    http: HttpSession<T>,
    cache: CacheStore,
}

impl EuDataClient<ReqwestTransport> {
    pub fn from_config(config: ClientConfig) -> Result<Self, EuDataError> {
        let transport = ReqwestTransport::new(&config.user_agent)?;
        Self::new(config, transport)
    }
}

impl<T: HttpTransport> EuDataClient<T> {
    pub fn new(config: ClientConfig, transport: T) -> Result<Self, EuDataError> {
        let cache = CacheStore::new(
            config.cache_dir.clone(),
            config.cache_ttl(),
            config.cache_enabled,
        )?;
        let http = HttpSession::new(transport, &config);
        Ok(Self {
            config,
            http,
            cache,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn transport(&self) -> &T {
        self.http.transport()
    }

    /// Resolves metadata and reports which strategy produced it.
    pub fn resolve_metadata(
        &self,
        dataset_uri: &str,
        locale: Option<&str>,
        force_refresh: bool,
    ) -> Resolution {
        let locale = locale.unwrap_or(&self.config.default_locale);
        MetadataResolver::new(
            &self.http,
            &self.cache,
            &self.config.rest_api_base,
            &self.config.sparql_endpoint,
        )
        .resolve(dataset_uri.trim(), locale, force_refresh)
    }

    pub fn get_dataset_metadata(
        &self,
        dataset_uri: &str,
        locale: Option<&str>,
        force_refresh: bool,
    ) -> Result<DatasetMetadata, EuDataError> {
        self.resolve_metadata(dataset_uri, locale, force_refresh)
            .into_result()
    }

    /// Distributions of a dataset; empty when metadata cannot be resolved.
    pub fn get_distribution_formats(&self, dataset_uri: &str, force_refresh: bool) -> Vec<Distribution> {
        let metadata = match self.get_dataset_metadata(dataset_uri, None, force_refresh) {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(dataset_uri, error = %err, "cannot list formats, metadata fetch failed");
                return Vec::new();
            }
        };
        if metadata.distributions.is_empty() {
            match &metadata.error_distributions {
                Some(reason) => warn!(dataset_uri, reason = %reason, "distribution lookup failed"),
                None => info!(dataset_uri, "no distributions listed in metadata"),
            }
        }
        metadata.distributions
    }

    /// Downloads the distribution that best matches `preferred_formats` (or the configured
    /// order). `force_refresh` applies to both the metadata and the download.
    pub fn get_dataset_content(
        &self,
        dataset_uri: &str,
        preferred_formats: Option<&[String]>,
        force_refresh: bool,
    ) -> Result<DatasetContent, EuDataError> {
        let metadata = self
            .get_dataset_metadata(dataset_uri, None, force_refresh)
            .map_err(|err| EuDataError::MetadataUnavailable(err.to_string()))?;
        let preferred = preferred_formats.unwrap_or(&self.config.preferred_formats);
        ContentFetcher::new(&self.http, &self.cache).fetch(&metadata, preferred, force_refresh)
    }

    pub fn search_datasets(
        &self,
        query: &SearchQuery,
        force_refresh: bool,
    ) -> Result<SearchResults, EuDataError> {
        DatasetSearch::new(self.sparql())
            .search(query, &self.config.preferred_formats, force_refresh)
    }

    /// Removes cache entries derived from `dataset_uri`, or every cache file when `None`.
    pub fn clear_cache(&self, dataset_uri: Option<&str>) -> ClearResult {
        if !self.cache.is_enabled() {
            info!("cache is disabled, nothing to clear");
            return ClearResult::new(dataset_uri, ClearSummary::default());
        }

        let Some(dataset_uri) = dataset_uri else {
            info!(cache_dir = %self.cache.root(), "clearing all cache files");
            let summary = self.cache.invalidate_all();
            if summary.failed == 0 {
                info!(removed = summary.removed, "cache cleared");
            } else {
                warn!(removed = summary.removed, failed = summary.failed, "cache partially cleared");
            }
            return ClearResult::new(None, summary);
        };

        info!(dataset_uri, "clearing cache entries for dataset");
        let mut uris = vec![dataset_uri.to_string()];
        if let Some(uuid) = DatasetUuid::from_uri(dataset_uri) {
            let canonical = uuid.canonical_uri();
            if canonical != dataset_uri {
                uris.push(canonical);
            }
        }

        let mut prefixes = Vec::new();
        for uri in &uris {
            let base = metadata_key_base(uri);
            prefixes.push(format!("{base}_rest_"));
            prefixes.push(format!("{}.json", CacheKey::metadata_sparql(uri).as_str()));
            prefixes.extend(cache_file_prefixes(uri));
        }
        let summary = self.cache.invalidate_prefixes(&prefixes);
        info!(removed = summary.removed, failed = summary.failed, "dataset cache entries cleared");
        warn!("content cache entries are keyed by download URL and are only removed by a full clear");
        ClearResult::new(Some(dataset_uri), summary)
    }

    fn sparql(&self) -> SparqlClient<'_, T> {
        SparqlClient::new(&self.http, &self.cache, &self.config.sparql_endpoint)
    }
}
