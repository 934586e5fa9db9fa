//! REST-first metadata resolution with a SPARQL fallback.
//!
//! Each strategy owns its own cache entry for the final record, so a forced retry of one path
//! never discards what the other path stored earlier. Failures are never cached.

use tracing::{error, info, warn};

use crate::cache::{CacheKey, CacheStore};
use crate::domain::MetadataSource;
use crate::error::EuDataError;
use crate::fallback::SparqlFallback;
use crate::http::{HttpSession, HttpTransport};
use crate::metadata::DatasetMetadata;
use crate::rest::RestMetadataSource;
use crate::sparql::SparqlClient;

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved {
        source: MetadataSource,
        record: DatasetMetadata,
    },
    Failed {
        rest_error: String,
        sparql_error: String,
    },
}

impl Resolution {
    pub fn source(&self) -> Option<MetadataSource> {
        match self {
            Resolution::Resolved { source, .. } => Some(*source),
            Resolution::Failed { .. } => None,
        }
    }

    pub fn into_result(self) -> Result<DatasetMetadata, EuDataError> {
        match self {
            Resolution::Resolved { record, .. } => Ok(record),
            Resolution::Failed {
                rest_error,
                sparql_error,
            } => Err(EuDataError::AllStrategiesFailed {
                rest: rest_error,
                sparql: sparql_error,
            }),
        }
    }
}

pub struct MetadataResolver<'a, T: HttpTransport> {
    http: &'a HttpSession<T>,
    cache: &'a CacheStore,
    rest_api_base: &'a str,
    sparql_endpoint: &'a str,
}

impl<'a, T: HttpTransport> MetadataResolver<'a, T> {
    pub fn new(
        http: &'a HttpSession<T>,
        cache: &'a CacheStore,
        rest_api_base: &'a str,
        sparql_endpoint: &'a str,
    ) -> Self {
        Self {
            http,
            cache,
            rest_api_base,
            sparql_endpoint,
        }
    }

    pub fn resolve(&self, dataset_uri: &str, locale: &str, force_refresh: bool) -> Resolution {
        let rest_key = CacheKey::metadata_rest(dataset_uri, locale);
        if let Some(record) = self.cached(&rest_key, force_refresh) {
            info!(dataset_uri, "metadata cache hit (REST strategy)");
            return Resolution::Resolved {
                source: MetadataSource::Rest,
                record,
            };
        }

        let rest_error = match RestMetadataSource::new(self.http, self.rest_api_base)
            .fetch(dataset_uri, locale)
        {
            Ok(record) => {
                info!(dataset_uri, "retrieved metadata via REST API");
                return self.finish(MetadataSource::Rest, &rest_key, record);
            }
            Err(err) => err.to_string(),
        };
        warn!(dataset_uri, error = %rest_error, "REST strategy failed, falling back to SPARQL");

        let sparql_key = CacheKey::metadata_sparql(dataset_uri);
        if let Some(record) = self.cached(&sparql_key, force_refresh) {
            info!(dataset_uri, "metadata cache hit (SPARQL strategy)");
            return Resolution::Resolved {
                source: MetadataSource::Sparql,
                record,
            };
        }

        let sparql = SparqlClient::new(self.http, self.cache, self.sparql_endpoint);
        match SparqlFallback::new(sparql).fetch(dataset_uri, force_refresh) {
            Ok(record) => {
                info!(dataset_uri, "retrieved metadata via SPARQL fallback");
                self.finish(MetadataSource::Sparql, &sparql_key, record)
            }
            Err(err) => {
                let sparql_error = err.to_string();
                error!(dataset_uri, error = %sparql_error, "SPARQL fallback also failed");
                Resolution::Failed {
                    rest_error,
                    sparql_error,
                }
            }
        }
    }

    fn cached(&self, key: &CacheKey, force_refresh: bool) -> Option<DatasetMetadata> {
        if force_refresh {
            return None;
        }
        self.cache.lookup(key)
    }

    fn finish(&self, source: MetadataSource, key: &CacheKey, record: DatasetMetadata) -> Resolution {
        if let Err(err) = self.cache.store(key, &record) {
            error!(key = key.as_str(), error = %err, "failed to write metadata cache");
        }
        Resolution::Resolved { source, record }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn failed_resolution_combines_both_messages() {
        let failed = Resolution::Failed {
            rest_error: "a".to_string(),
            sparql_error: "b".to_string(),
        };
        assert!(failed.source().is_none());
        assert_matches!(
            failed.into_result(),
            Err(EuDataError::AllStrategiesFailed { rest, sparql }) if rest == "a" && sparql == "b"
        );
    }
}
