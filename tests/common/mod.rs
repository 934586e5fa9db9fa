#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use camino::Utf8PathBuf;
use serde_json::{Value, json};

use eu_data_tool::app::EuDataClient;
use eu_data_tool::config::ClientConfig;
use eu_data_tool::error::EuDataError;
use eu_data_tool::http::{HttpRequest, HttpResponse, HttpTransport};

pub const UUID: &str = "54336a93-2478-44fc-bb78-696c77cff5c2";
pub const SPARQL_ENDPOINT: &str = "https://sparql.test/sparql";
pub const REST_BASE: &str = "https://rest.test/datasets/";

pub fn dataset_uri() -> String {
    format!("http://data.europa.eu/88u/dataset/{UUID}")
}

pub fn rest_url() -> String {
    format!("{REST_BASE}{UUID}.jsonld")
}

pub fn fixture() -> Value {
    serde_json::from_str(include_str!("../fixtures/dataset.jsonld")).unwrap()
}

struct Route {
    url: String,
    query_contains: Option<String>,
    response: Result<HttpResponse, u16>,
}

impl Route {
    fn matches(&self, request: &HttpRequest) -> bool {
        if request.url != self.url {
            return false;
        }
        match &self.query_contains {
            None => true,
            Some(needle) => request
                .query
                .iter()
                .any(|(name, value)| name == "query" && value.contains(needle.as_str())),
        }
    }
}

/// In-memory server. Later routes take priority over earlier ones; unmatched requests get 404.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, url: &str, content_type: &str, body: impl Into<Vec<u8>>) {
        self.push(
            url,
            None,
            Ok(HttpResponse {
                status: 200,
                content_type: Some(content_type.to_string()),
                body: body.into(),
            }),
        );
    }

    pub fn fail(&self, url: &str, status: u16) {
        self.push(url, None, Err(status));
    }

    pub fn respond_json_ld(&self, document: &Value) {
        self.respond(
            &rest_url(),
            "application/ld+json",
            serde_json::to_vec(document).unwrap(),
        );
    }

    /// Answers SPARQL queries containing `needle` with the given binding rows.
    pub fn sparql(&self, needle: &str, bindings: Value) {
        let body = json!({"head": {"vars": []}, "results": {"bindings": bindings}});
        self.push(
            SPARQL_ENDPOINT,
            Some(needle),
            Ok(HttpResponse {
                status: 200,
                content_type: Some("application/sparql-results+json".to_string()),
                body: serde_json::to_vec(&body).unwrap(),
            }),
        );
    }

    pub fn sparql_fails(&self, needle: &str, status: u16) {
        self.push(SPARQL_ENDPOINT, Some(needle), Err(status));
    }

    /// Every SPARQL query succeeds with no rows unless a later route says otherwise.
    pub fn sparql_empty_by_default(&self) {
        self.sparql("", json!([]));
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.url == url)
            .count()
    }

    pub fn sparql_calls_containing(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|request| {
                request.url == SPARQL_ENDPOINT
                    && request
                        .query
                        .iter()
                        .any(|(_, value)| value.contains(needle))
            })
            .count()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, url: &str, needle: Option<&str>, response: Result<HttpResponse, u16>) {
        self.routes.lock().unwrap().push(Route {
            url: url.to_string(),
            query_contains: needle.map(str::to_string),
            response,
        });
    }
}

impl HttpTransport for MockTransport {
    fn get(&self, request: &HttpRequest) -> Result<HttpResponse, EuDataError> {
        self.calls.lock().unwrap().push(request.clone());
        let routes = self.routes.lock().unwrap();
        match routes.iter().rev().find(|route| route.matches(request)) {
            Some(Route {
                response: Ok(response),
                ..
            }) => Ok(response.clone()),
            Some(Route {
                response: Err(status),
                ..
            }) => Err(EuDataError::HttpStatus {
                status: *status,
                body: "mock failure".to_string(),
            }),
            None => Err(EuDataError::HttpStatus {
                status: 404,
                body: format!("no route for {}", request.url),
            }),
        }
    }
}

pub fn test_config(cache_dir: Utf8PathBuf) -> ClientConfig {
    ClientConfig {
        cache_dir,
        request_delay_ms: 0,
        sparql_endpoint: SPARQL_ENDPOINT.to_string(),
        rest_api_base: REST_BASE.to_string(),
        ..ClientConfig::default()
    }
}

pub struct Harness {
    pub temp: tempfile::TempDir,
    pub cache_dir: Utf8PathBuf,
    pub transport: Arc<MockTransport>,
    pub client: EuDataClient<Arc<MockTransport>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut ClientConfig)) -> Self {
        let temp = tempfile::tempdir().unwrap();
        let cache_dir = Utf8PathBuf::from_path_buf(temp.path().join("cache")).unwrap();
        let mut config = test_config(cache_dir.clone());
        adjust(&mut config);
        let transport = MockTransport::new();
        let client = EuDataClient::new(config, Arc::clone(&transport)).unwrap();
        Self {
            temp,
            cache_dir,
            transport,
            client,
        }
    }

    pub fn cache_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.cache_dir.as_std_path())
            .map(|entries| {
                entries
                    .flatten()
                    .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

pub fn literal(value: &str) -> Value {
    json!({"type": "literal", "value": value})
}

pub fn uri(value: &str) -> Value {
    json!({"type": "uri", "value": value})
}
