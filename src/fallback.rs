//! Metadata via one SPARQL query per property plus a distribution query.
//!
//! Each sub-query is cached and may fail on its own; a record with some properties and
//! per-property `error_*` markers is a valid result.

use tracing::{info, warn};

use crate::domain::sanitize_filename;
use crate::error::EuDataError;
use crate::http::HttpTransport;
use crate::metadata::{DatasetMetadata, Distribution, retain_unique};
use crate::sparql::{
    PREFIX_DCAT, PREFIX_DCT, PREFIX_FOAF, PREFIX_RDFS, PREFIX_SKOS, SparqlClient, SparqlResults,
    binding_value,
};

const ENGLISH_OR_UNTAGGED: &str = r#"FILTER(LANGMATCHES(LANG(?value), "en") || LANG(?value) = "")"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackProperty {
    Title,
    Description,
    PublisherName,
    PublisherUri,
    Modified,
    Issued,
    Keywords,
    Themes,
    Languages,
    Licenses,
}

impl FallbackProperty {
    pub const ALL: [FallbackProperty; 10] = [
        FallbackProperty::Title,
        FallbackProperty::Description,
        FallbackProperty::PublisherName,
        FallbackProperty::PublisherUri,
        FallbackProperty::Modified,
        FallbackProperty::Issued,
        FallbackProperty::Keywords,
        FallbackProperty::Themes,
        FallbackProperty::Languages,
        FallbackProperty::Licenses,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            FallbackProperty::Title => "title",
            FallbackProperty::Description => "description",
            FallbackProperty::PublisherName => "publisher_name",
            FallbackProperty::PublisherUri => "publisher_uri",
            FallbackProperty::Modified => "modified",
            FallbackProperty::Issued => "issued",
            FallbackProperty::Keywords => "keywords",
            FallbackProperty::Themes => "themes",
            FallbackProperty::Languages => "languages",
            FallbackProperty::Licenses => "licenses",
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(
            self,
            FallbackProperty::Keywords
                | FallbackProperty::Themes
                | FallbackProperty::Languages
                | FallbackProperty::Licenses
        )
    }

    fn pattern(&self) -> String {
        match self {
            FallbackProperty::Title => format!("dct:title ?value . {ENGLISH_OR_UNTAGGED}"),
            FallbackProperty::Description => {
                format!("dct:description ?value . {ENGLISH_OR_UNTAGGED}")
            }
            FallbackProperty::PublisherName => format!(
                "dct:publisher ?p . OPTIONAL {{ ?p foaf:name ?value . }} \
                 OPTIONAL {{ ?p rdfs:label ?value . {ENGLISH_OR_UNTAGGED} }} \
                 OPTIONAL {{ ?p skos:prefLabel ?value . {ENGLISH_OR_UNTAGGED} }} \
                 FILTER(BOUND(?value))"
            ),
            FallbackProperty::PublisherUri => "dct:publisher ?value . FILTER(ISURI(?value))".to_string(),
            FallbackProperty::Modified => "dct:modified ?date .".to_string(),
            FallbackProperty::Issued => "dct:issued ?date .".to_string(),
            FallbackProperty::Keywords => "dcat:keyword ?value .".to_string(),
            FallbackProperty::Themes => "dcat:theme ?value . FILTER(ISURI(?value))".to_string(),
            FallbackProperty::Languages => {
                "dct:language ?value . FILTER(ISURI(?value))".to_string()
            }
            FallbackProperty::Licenses => "dct:license ?value .".to_string(),
        }
    }

    fn prefixes(&self) -> &'static [&'static str] {
        match self {
            FallbackProperty::PublisherName => &[PREFIX_DCT, PREFIX_FOAF, PREFIX_RDFS, PREFIX_SKOS],
            FallbackProperty::Keywords | FallbackProperty::Themes => &[PREFIX_DCAT],
            _ => &[PREFIX_DCT],
        }
    }

    fn is_aggregate(&self) -> bool {
        matches!(self, FallbackProperty::Modified | FallbackProperty::Issued)
    }
}

/// SELECT for one property of `dataset_uri`, always projecting `?value`.
pub fn property_query(dataset_uri: &str, property: FallbackProperty) -> String {
    let select = if property.is_aggregate() {
        "(MAX(?date) AS ?value)"
    } else {
        "?value"
    };
    let group_by = if property.is_aggregate() {
        "GROUP BY ?dataset"
    } else {
        ""
    };
    let limit = if property.is_multi() { 200 } else { 1 };
    format!(
        "{prefixes}\nSELECT {select}\nWHERE {{ BIND(<{dataset_uri}> AS ?dataset) . ?dataset {pattern} }}\n{group_by}\nLIMIT {limit}\n",
        prefixes = property.prefixes().join("\n"),
        pattern = property.pattern(),
    )
}

pub fn distribution_query(dataset_uri: &str) -> String {
    format!(
        r#"{PREFIX_DCAT}
{PREFIX_DCT}
SELECT DISTINCT ?dist ?downloadURL ?accessURL ?distTitle ?format_str ?mediaType ?byteSize
WHERE {{
  <{dataset_uri}> dcat:distribution ?dist .
  OPTIONAL {{ ?dist dcat:downloadURL ?downloadURL . }}
  OPTIONAL {{ ?dist dcat:accessURL ?accessURL . }}
  OPTIONAL {{ ?dist dct:title ?distTitle . FILTER(LANGMATCHES(LANG(?distTitle), "en") || LANG(?distTitle) = "") }}
  OPTIONAL {{ ?dist dct:format ?formatURI . BIND(COALESCE(STR(?formatURI), "") AS ?format_str) }}
  OPTIONAL {{ ?dist dcat:mediaType ?mediaType . }}
  OPTIONAL {{ ?dist dcat:byteSize ?byteSize . }}
}} ORDER BY ?dist LIMIT 200
"#
    )
}

pub fn property_cache_suffix(dataset_uri: &str, property: FallbackProperty) -> String {
    format!("prop_{}_{}", sanitize_filename(dataset_uri), property.key())
}

pub fn distribution_cache_suffix(dataset_uri: &str) -> String {
    format!("dist_{}", sanitize_filename(dataset_uri))
}

/// File name prefixes of every cached sub-query issued for `dataset_uri`.
pub fn cache_file_prefixes(dataset_uri: &str) -> Vec<String> {
    let sanitized = sanitize_filename(dataset_uri);
    vec![
        format!("sparql_{}", sanitize_filename(&format!("prop_{sanitized}_"))),
        format!("sparql_{}_", sanitize_filename(&format!("dist_{sanitized}"))),
    ]
}

pub struct SparqlFallback<'a, T: HttpTransport> {
    sparql: SparqlClient<'a, T>,
}

impl<'a, T: HttpTransport> SparqlFallback<'a, T> {
    pub fn new(sparql: SparqlClient<'a, T>) -> Self {
        Self { sparql }
    }

    pub fn fetch(&self, dataset_uri: &str, force_refresh: bool) -> Result<DatasetMetadata, EuDataError> {
        info!(dataset_uri, "executing SPARQL fallback");
        let mut metadata = DatasetMetadata::new(dataset_uri);
        metadata.sparql_uri_used = Some(dataset_uri.to_string());
        let mut errors = Vec::new();
        let mut publisher_uri = None;

        for property in FallbackProperty::ALL {
            let query = property_query(dataset_uri, property);
            let suffix = property_cache_suffix(dataset_uri, property);
            match self.sparql.execute(&query, &suffix, force_refresh) {
                Ok(results) => {
                    let values = collect_values(&results, property.is_multi());
                    if property == FallbackProperty::PublisherUri {
                        publisher_uri = values.into_iter().next();
                    } else {
                        apply_property(&mut metadata, property, values);
                    }
                }
                Err(err) => {
                    let message =
                        format!("Failed to fetch SPARQL property '{}': {err}", property.key());
                    warn!(dataset_uri, "{message}");
                    metadata.set_property_error(property.key(), message.clone());
                    errors.push(message);
                }
            }
        }
        if metadata.publisher.is_none() {
            metadata.publisher_uri = publisher_uri;
        }

        let query = distribution_query(dataset_uri);
        match self
            .sparql
            .execute(&query, &distribution_cache_suffix(dataset_uri), force_refresh)
        {
            Ok(results) => metadata.distributions = collect_distributions(&results),
            Err(err) => {
                let message = format!("Failed to fetch SPARQL distributions: {err}");
                warn!(dataset_uri, "{message}");
                metadata.error_distributions = Some(message.clone());
                errors.push(message);
            }
        }

        if !metadata.has_core_data() && metadata.distributions.is_empty() && !errors.is_empty() {
            return Err(EuDataError::SparqlFallback(format!(
                "SPARQL fallback failed to retrieve any metadata or distributions for {dataset_uri}. Errors: {}",
                errors.join("; ")
            )));
        }

        metadata.sparql_errors = errors;
        Ok(metadata)
    }
}

fn collect_values(results: &SparqlResults, is_multi: bool) -> Vec<String> {
    let values = results
        .rows()
        .iter()
        .filter_map(|row| binding_value(row, "value"))
        .map(str::to_string);
    if is_multi {
        values.collect()
    } else {
        values.take(1).collect()
    }
}

fn apply_property(metadata: &mut DatasetMetadata, property: FallbackProperty, values: Vec<String>) {
    let first = values.first().cloned();
    match property {
        FallbackProperty::Title => metadata.title = first,
        FallbackProperty::Description => metadata.description = first,
        FallbackProperty::PublisherName => metadata.publisher = first,
        FallbackProperty::Modified => metadata.modified = first,
        FallbackProperty::Issued => metadata.issued = first,
        FallbackProperty::Keywords => metadata.keywords = values,
        FallbackProperty::Themes => metadata.themes = values,
        FallbackProperty::Languages => metadata.languages = values,
        FallbackProperty::Licenses => metadata.licenses = values,
        FallbackProperty::PublisherUri => metadata.publisher_uri = first,
    }
}

fn collect_distributions(results: &SparqlResults) -> Vec<Distribution> {
    let distributions = results.rows().iter().filter_map(|row| {
        let uri = binding_value(row, "dist")?;
        Some(Distribution {
            uri: Some(uri.to_string()),
            download_url: binding_value(row, "downloadURL").map(str::to_string),
            access_url: binding_value(row, "accessURL").map(str::to_string),
            title: binding_value(row, "distTitle").map(str::to_string),
            format: binding_value(row, "format_str").map(str::to_string),
            media_type: binding_value(row, "mediaType").map(str::to_string),
            byte_size: binding_value(row, "byteSize").map(str::to_string),
            ..Distribution::default()
        })
    });
    retain_unique(distributions)
}
