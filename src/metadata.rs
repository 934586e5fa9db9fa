use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Normalized dataset metadata. Absent values are omitted when serialized;
/// `distributions` is always present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparql_uri_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub themes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub licenses: Vec<String>,
    #[serde(default)]
    pub distributions: Vec<Distribution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_distributions: Option<String>,
    /// `error_<property>` markers left by failed fallback sub-queries.
    #[serde(flatten)]
    pub property_errors: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sparql_errors: Vec<String>,
}

impl DatasetMetadata {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    pub fn property_error(&self, property: &str) -> Option<&str> {
        self.property_errors
            .get(&format!("error_{property}"))
            .map(String::as_str)
    }

    pub fn set_property_error(&mut self, property: &str, message: String) {
        self.property_errors
            .insert(format!("error_{property}"), message);
    }

    /// True when any descriptive field beyond the URI was resolved.
    pub fn has_core_data(&self) -> bool {
        self.title.is_some()
            || self.description.is_some()
            || self.publisher.is_some()
            || self.publisher_uri.is_some()
            || self.modified.is_some()
            || self.issued.is_some()
            || !self.keywords.is_empty()
            || !self.themes.is_empty()
            || !self.languages.is_empty()
            || !self.licenses.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "downloadURL", default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(rename = "accessURL", default, skip_serializing_if = "Option::is_none")]
    pub access_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_label: Option<String>,
    #[serde(rename = "mediaType", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(rename = "mediaType_label", default, skip_serializing_if = "Option::is_none")]
    pub media_type_label: Option<String>,
    #[serde(rename = "byteSize", default, skip_serializing_if = "Option::is_none")]
    pub byte_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Distribution {
    /// Download URL, falling back to the access URL.
    pub fn target_url(&self) -> Option<&str> {
        self.download_url
            .as_deref()
            .or(self.access_url.as_deref())
    }

    pub fn is_addressable(&self) -> bool {
        self.uri.is_some() || self.download_url.is_some() || self.access_url.is_some()
    }
}

/// Keeps addressable distributions, dropping repeats of an already seen `uri`.
pub fn retain_unique(distributions: impl IntoIterator<Item = Distribution>) -> Vec<Distribution> {
    let mut seen = std::collections::HashSet::new();
    distributions
        .into_iter()
        .filter(|dist| dist.is_addressable())
        .filter(|dist| match &dist.uri {
            Some(uri) => seen.insert(uri.clone()),
            None => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_fields_are_omitted_but_distributions_kept() {
        let record = DatasetMetadata::new("http://example.org/ds");
        let json = serde_json::to_value(&record).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert!(object["distributions"].as_array().unwrap().is_empty());
    }

    #[test]
    fn property_errors_flatten_into_record() {
        let mut record = DatasetMetadata::new("http://example.org/ds");
        record.set_property_error("title", "boom".to_string());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["error_title"], "boom");

        let back: DatasetMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back.property_error("title"), Some("boom"));
    }

    #[test]
    fn unique_distributions_drop_duplicates_and_unaddressable() {
        let dist = |uri: Option<&str>, url: Option<&str>| Distribution {
            uri: uri.map(str::to_string),
            download_url: url.map(str::to_string),
            ..Distribution::default()
        };
        let kept = retain_unique(vec![
            dist(Some("d1"), None),
            dist(Some("d1"), Some("https://x/1.csv")),
            dist(None, None),
            dist(None, Some("https://x/2.csv")),
        ]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[1].download_url.as_deref(), Some("https://x/2.csv"));
    }
}
