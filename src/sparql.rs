use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::cache::{CacheKey, CacheStore};
use crate::error::EuDataError;
use crate::http::{HttpSession, HttpTransport};

pub const PREFIX_DCAT: &str = "PREFIX dcat: <http://www.w3.org/ns/dcat#>";
pub const PREFIX_DCT: &str = "PREFIX dct: <http://purl.org/dc/terms/>";
pub const PREFIX_FOAF: &str = "PREFIX foaf: <http://xmlns.com/foaf/0.1/>";
pub const PREFIX_SKOS: &str = "PREFIX skos: <http://www.w3.org/2004/02/skos/core#>";
pub const PREFIX_RDFS: &str = "PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>";
pub const PREFIX_XSD: &str = "PREFIX xsd: <http://www.w3.org/2001/XMLSchema#>";

/// `application/sparql-results+json` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparqlResults {
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub head: Value,
    pub results: SparqlBindings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparqlBindings {
    #[serde(default)]
    pub bindings: Vec<BindingRow>,
}

pub type BindingRow = BTreeMap<String, SparqlTerm>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparqlTerm {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub value: String,
    #[serde(rename = "xml:lang", default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
}

impl SparqlResults {
    pub fn rows(&self) -> &[BindingRow] {
        &self.results.bindings
    }
}

/// Value of `var` in a row, ignoring unbound and empty terms.
pub fn binding_value<'a>(row: &'a BindingRow, var: &str) -> Option<&'a str> {
    row.get(var)
        .map(|term| term.value.as_str())
        .filter(|value| !value.is_empty())
}

pub struct SparqlClient<'a, T: HttpTransport> {
    http: &'a HttpSession<T>,
    cache: &'a CacheStore,
    endpoint: &'a str,
}

impl<'a, T: HttpTransport> SparqlClient<'a, T> {
    pub fn new(http: &'a HttpSession<T>, cache: &'a CacheStore, endpoint: &'a str) -> Self {
        Self {
            http,
            cache,
            endpoint,
        }
    }

    /// Runs `query`, consulting the cache first unless `force_refresh` is set.
    /// Only successful responses are cached.
    pub fn execute(
        &self,
        query: &str,
        cache_suffix: &str,
        force_refresh: bool,
    ) -> Result<SparqlResults, EuDataError> {
        let key = CacheKey::sparql(query, cache_suffix);
        if !force_refresh {
            if let Some(results) = self.cache.lookup::<SparqlResults>(&key) {
                debug!(suffix = cache_suffix, "SPARQL cache hit");
                return Ok(results);
            }
        }

        debug!(suffix = cache_suffix, query, "executing SPARQL query");
        let results = self
            .fetch(query)
            .inspect_err(|err| error!(suffix = cache_suffix, error = %err, "SPARQL query failed"))?;

        if let Err(err) = self.cache.store(&key, &results) {
            error!(suffix = cache_suffix, error = %err, "failed to write SPARQL cache");
        }
        Ok(results)
    }

    fn fetch(&self, query: &str) -> Result<SparqlResults, EuDataError> {
        let response = self.http.get_sparql(self.endpoint, query)?;
        serde_json::from_slice(&response.body)
            .map_err(|err| EuDataError::Parse(format!("invalid SPARQL JSON response: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_results_document() {
        let raw = r#"{
            "head": {"vars": ["value"]},
            "results": {"bindings": [
                {"value": {"type": "literal", "xml:lang": "en", "value": "Earnings"}},
                {"value": {"type": "literal", "value": ""}},
                {}
            ]}
        }"#;
        let results: SparqlResults = serde_json::from_str(raw).unwrap();
        let values: Vec<_> = results
            .rows()
            .iter()
            .filter_map(|row| binding_value(row, "value"))
            .collect();
        assert_eq!(values, vec!["Earnings"]);
        assert_eq!(results.rows()[0]["value"].lang.as_deref(), Some("en"));
    }

    #[test]
    fn missing_results_object_is_rejected() {
        assert!(serde_json::from_str::<SparqlResults>(r#"{"boolean": true}"#).is_err());
    }
}
