use serde_json::Value;
use tracing::{error, info, warn};

use crate::domain::DatasetUuid;
use crate::error::EuDataError;
use crate::http::{HttpSession, HttpTransport};
use crate::jsonld::{DCAT_DATASET, DCAT_DISTRIBUTION, LinkedDataGraph, Node};
use crate::metadata::{DatasetMetadata, Distribution, retain_unique};

const PUBLISHER_NAME_PROPERTIES: &[&str] = &["foaf:name", "skos:prefLabel", "rdfs:label"];

/// Fetches `{base}{uuid}.jsonld` and normalizes its graph.
pub struct RestMetadataSource<'a, T: HttpTransport> {
    http: &'a HttpSession<T>,
    api_base: &'a str,
}

impl<'a, T: HttpTransport> RestMetadataSource<'a, T> {
    pub fn new(http: &'a HttpSession<T>, api_base: &'a str) -> Self {
        Self { http, api_base }
    }

    pub fn api_url(&self, uuid: &DatasetUuid) -> String {
        let base = if self.api_base.ends_with('/') {
            self.api_base.to_string()
        } else {
            format!("{}/", self.api_base)
        };
        format!("{base}{uuid}.jsonld")
    }

    pub fn fetch(&self, dataset_uri: &str, locale: &str) -> Result<DatasetMetadata, EuDataError> {
        let uuid = DatasetUuid::from_uri(dataset_uri).ok_or_else(|| {
            warn!(dataset_uri, "could not extract UUID from URI");
            EuDataError::UuidNotFound(dataset_uri.to_string())
        })?;
        let url = self.api_url(&uuid);
        info!(url = %url, "fetching dataset metadata from REST API");

        let response = self
            .http
            .get_json_ld(
                &url,
                vec![
                    ("useNormalizedId".to_string(), "true".to_string()),
                    ("locale".to_string(), locale.to_string()),
                ],
            )
            .inspect_err(|err| error!(url = %url, error = %err, "REST API request failed"))?;
        let document: Value = serde_json::from_slice(&response.body).map_err(|err| {
            EuDataError::Parse(format!("failed to parse REST API JSON-LD response: {err}"))
        })?;

        extract_metadata(&document, dataset_uri, &uuid, locale)
            .inspect_err(|err| error!(url = %url, error = %err, "REST API response unusable"))
    }
}

/// Builds the metadata record for `dataset_uri` out of a JSON-LD document.
pub fn extract_metadata(
    document: &Value,
    dataset_uri: &str,
    uuid: &DatasetUuid,
    locale: &str,
) -> Result<DatasetMetadata, EuDataError> {
    let graph = LinkedDataGraph::from_document(document)?;
    let dataset = find_dataset_node(&graph, dataset_uri, uuid)?;
    let locale = Some(locale);

    let mut metadata = DatasetMetadata::new(dataset.id().unwrap_or(dataset_uri));
    metadata.title = dataset.value("dct:title", locale);
    metadata.description = dataset.value("dct:description", locale);
    metadata.modified = dataset.value("dct:modified", None);
    metadata.issued = dataset
        .value("dct:issued", None)
        .or_else(|| dataset.value("dct:created", None));

    let (publisher, publisher_uri) = resolve_publisher(&graph, &dataset, locale);
    metadata.publisher = publisher;
    metadata.publisher_uri = publisher_uri;

    metadata.keywords = dataset.values("dcat:keyword");
    metadata.themes = dataset.values("dcat:theme");
    metadata.languages = dataset.values("dct:language");
    metadata.licenses = dataset.values("dct:license");

    let distributions = dataset
        .raw_values("dcat:distribution")
        .into_iter()
        .filter_map(|item| graph.resolve_typed(item, DCAT_DISTRIBUTION))
        .map(|node| extract_distribution(&graph, &node, locale));
    metadata.distributions = retain_unique(distributions);

    Ok(metadata)
}

fn find_dataset_node<'a>(
    graph: &LinkedDataGraph<'a>,
    dataset_uri: &str,
    uuid: &DatasetUuid,
) -> Result<Node<'a>, EuDataError> {
    let matched = graph.nodes().find(|node| {
        node.has_type(DCAT_DATASET)
            && node
                .id()
                .is_some_and(|id| id == dataset_uri || id.contains(uuid.as_str()))
    });
    if let Some(node) = matched {
        return Ok(node);
    }

    let fallback = graph.first_of_type(DCAT_DATASET).ok_or_else(|| {
        EuDataError::DatasetNodeNotFound(format!(
            "could not find dcat:Dataset node in @graph for UUID {uuid}"
        ))
    })?;
    warn!(
        node_id = fallback.id().unwrap_or(""),
        dataset_uri, "no dataset node matched URI or UUID, using first dcat:Dataset"
    );
    Ok(fallback)
}

/// Publisher name, plus the publisher URI when the name could not be resolved or the
/// publisher is an embedded node with an id.
fn resolve_publisher(
    graph: &LinkedDataGraph<'_>,
    dataset: &Node<'_>,
    locale: Option<&str>,
) -> (Option<String>, Option<String>) {
    let Some(item) = dataset.raw_values("dct:publisher").into_iter().next() else {
        return (None, None);
    };

    if let Value::Object(object) = item {
        let is_embedded_node =
            !object.contains_key("@value") && object.keys().any(|key| key != "@id");
        if is_embedded_node {
            let embedded = Node::new(object);
            let name = embedded.first_value(PUBLISHER_NAME_PROPERTIES, locale);
            return (name, embedded.id().map(str::to_string));
        }
    }

    match dataset.value("dct:publisher", locale) {
        Some(reference) if reference.starts_with("http") => {
            let name = graph
                .get(&reference)
                .and_then(|node| node.first_value(PUBLISHER_NAME_PROPERTIES, locale));
            match name {
                Some(name) => (Some(name), None),
                None => (None, Some(reference)),
            }
        }
        Some(name) => (Some(name), None),
        None => (None, None),
    }
}

fn extract_distribution(
    graph: &LinkedDataGraph<'_>,
    node: &Node<'_>,
    locale: Option<&str>,
) -> Distribution {
    let format = node.value("dct:format", None);
    let media_type = node.value("dcat:mediaType", None);
    Distribution {
        uri: node.id().map(str::to_string),
        title: node.value("dct:title", locale),
        download_url: node.value("dcat:downloadURL", None),
        access_url: node.value("dcat:accessURL", None),
        format_label: format
            .as_deref()
            .and_then(|uri| graph.label_of(uri, locale)),
        media_type_label: media_type
            .as_deref()
            .and_then(|uri| graph.label_of(uri, locale)),
        format,
        media_type,
        byte_size: node.value("dcat:byteSize", None),
        modified: node.value("dct:modified", None),
        issued: node.value("dct:issued", None),
        license: node.value("dct:license", None),
        description: node.value("dct:description", locale),
    }
}
