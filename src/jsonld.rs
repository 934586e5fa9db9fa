//! Minimal view over a compacted JSON-LD `@graph`: an id index plus one rule for turning a
//! property into locale-preferred literal values.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::EuDataError;

pub const DCAT_DATASET: &str = "dcat:Dataset";
pub const DCAT_DISTRIBUTION: &str = "dcat:Distribution";

#[derive(Debug, Clone, Copy)]
pub struct Node<'a> {
    raw: &'a Map<String, Value>,
}

impl<'a> Node<'a> {
    pub fn new(raw: &'a Map<String, Value>) -> Self {
        Self { raw }
    }

    pub fn id(&self) -> Option<&'a str> {
        self.raw.get("@id").and_then(Value::as_str)
    }

    pub fn has_type(&self, type_name: &str) -> bool {
        match self.raw.get("@type") {
            Some(Value::String(value)) => value == type_name,
            Some(Value::Array(values)) => values.iter().any(|v| v.as_str() == Some(type_name)),
            _ => false,
        }
    }

    /// Raw items of a property; a single value reads as a one-element list.
    pub fn raw_values(&self, property: &str) -> Vec<&'a Value> {
        match self.raw.get(property) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.iter().collect(),
            Some(value) => vec![value],
        }
    }

    /// Every literal or reference of a property, in document order.
    pub fn values(&self, property: &str) -> Vec<String> {
        self.raw_values(property)
            .into_iter()
            .filter_map(literal_of)
            .map(|(value, _)| value)
            .collect()
    }

    /// The first value tagged with `locale`, else the first value of any kind.
    pub fn value(&self, property: &str, locale: Option<&str>) -> Option<String> {
        let mut first = None;
        for (value, lang) in self.raw_values(property).into_iter().filter_map(literal_of) {
            if locale.is_some() && lang == locale {
                return Some(value);
            }
            if first.is_none() {
                first = Some(value);
            }
        }
        first
    }

    /// First of `properties` that yields a value.
    pub fn first_value(&self, properties: &[&str], locale: Option<&str>) -> Option<String> {
        properties
            .iter()
            .find_map(|property| self.value(property, locale))
    }
}

/// Literal value and language of one property item: `@value`, else `@id`, else a bare string.
pub fn literal_of(item: &Value) -> Option<(String, Option<&str>)> {
    match item {
        Value::String(value) => Some((value.clone(), None)),
        Value::Number(number) => Some((number.to_string(), None)),
        Value::Object(object) => {
            let lang = object.get("@language").and_then(Value::as_str);
            match object.get("@value") {
                Some(Value::String(value)) => Some((value.clone(), lang)),
                Some(Value::Number(number)) => Some((number.to_string(), lang)),
                Some(Value::Bool(flag)) => Some((flag.to_string(), lang)),
                _ => object
                    .get("@id")
                    .and_then(Value::as_str)
                    .map(|id| (id.to_string(), None)),
            }
        }
        _ => None,
    }
}

#[derive(Debug)]
pub struct LinkedDataGraph<'a> {
    nodes: Vec<Node<'a>>,
    index: HashMap<&'a str, Node<'a>>,
}

impl<'a> LinkedDataGraph<'a> {
    pub fn from_document(document: &'a Value) -> Result<Self, EuDataError> {
        let graph = document
            .get("@graph")
            .and_then(Value::as_array)
            .filter(|graph| !graph.is_empty())
            .ok_or_else(|| {
                EuDataError::Parse("JSON-LD response missing or invalid '@graph' array".to_string())
            })?;

        let nodes: Vec<Node<'a>> = graph.iter().filter_map(Value::as_object).map(Node::new).collect();
        let mut index = HashMap::new();
        for node in &nodes {
            if let Some(id) = node.id() {
                index.entry(id).or_insert(*node);
            }
        }
        Ok(Self { nodes, index })
    }

    pub fn get(&self, id: &str) -> Option<Node<'a>> {
        self.index.get(id).copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = Node<'a>> + '_ {
        self.nodes.iter().copied()
    }

    pub fn first_of_type(&self, type_name: &str) -> Option<Node<'a>> {
        self.nodes().find(|node| node.has_type(type_name))
    }

    /// Follows a reference into the index, or accepts an embedded node of `type_name`.
    pub fn resolve_typed(&self, item: &'a Value, type_name: &str) -> Option<Node<'a>> {
        let node = match item {
            Value::String(id) => self.get(id)?,
            Value::Object(object) => {
                let embedded = Node::new(object);
                if embedded.has_type(type_name) {
                    return Some(embedded);
                }
                self.get(embedded.id()?)?
            }
            _ => return None,
        };
        node.has_type(type_name).then_some(node)
    }

    /// Human label of a node referenced by `uri`, if the graph carries one.
    pub fn label_of(&self, uri: &str, locale: Option<&str>) -> Option<String> {
        if !uri.starts_with("http") {
            return None;
        }
        self.get(uri)?
            .first_value(&["skos:prefLabel", "rdfs:label"], locale)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn value_prefers_locale_then_first() {
        let doc = json!({"@graph": [{
            "@id": "ds",
            "@type": ["dcat:Dataset"],
            "dct:title": [
                {"@value": "Titel", "@language": "de"},
                {"@value": "Title", "@language": "en"}
            ],
            "dct:description": {"@value": "Nur Deutsch", "@language": "de"},
            "dcat:theme": [{"@id": "http://t/1"}, "http://t/2"]
        }]});
        let graph = LinkedDataGraph::from_document(&doc).unwrap();
        let node = graph.get("ds").unwrap();

        assert_eq!(node.value("dct:title", Some("en")).as_deref(), Some("Title"));
        assert_eq!(node.value("dct:title", Some("fr")).as_deref(), Some("Titel"));
        assert_eq!(node.value("dct:description", Some("en")).as_deref(), Some("Nur Deutsch"));
        assert_eq!(node.values("dcat:theme"), vec!["http://t/1", "http://t/2"]);
        assert!(node.value("dct:missing", Some("en")).is_none());
    }

    #[test]
    fn resolve_typed_follows_references_and_embedded_nodes() {
        let doc = json!({"@graph": [
            {"@id": "d1", "@type": "dcat:Distribution"},
            {"@id": "other", "@type": "foaf:Agent"}
        ]});
        let graph = LinkedDataGraph::from_document(&doc).unwrap();
        let by_ref = json!({"@id": "d1"});
        let embedded = json!({"@type": "dcat:Distribution", "dcat:downloadURL": "u"});
        let wrong = json!("other");

        assert!(graph.resolve_typed(&by_ref, DCAT_DISTRIBUTION).is_some());
        assert!(graph.resolve_typed(&embedded, DCAT_DISTRIBUTION).is_some());
        assert!(graph.resolve_typed(&wrong, DCAT_DISTRIBUTION).is_none());
    }

    #[test]
    fn missing_graph_is_a_parse_error() {
        assert!(LinkedDataGraph::from_document(&json!({"@id": "x"})).is_err());
        assert!(LinkedDataGraph::from_document(&json!({"@graph": {}})).is_err());
    }
}
