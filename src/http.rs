use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{EuDataError, truncate_body};

pub const JSON_LD_ACCEPT: &str = "application/ld+json, application/json, */*";
pub const SPARQL_ACCEPT: &str = "application/sparql-results+json";
const ANY_ACCEPT: &str = "*/*";
const ERROR_BODY_LIMIT: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub accept: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Blocking GET capability. Implementations return `HttpStatus` for non-2xx responses.
pub trait HttpTransport: Send + Sync {
    fn get(&self, request: &HttpRequest) -> Result<HttpResponse, EuDataError>;
}

impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    fn get(&self, request: &HttpRequest) -> Result<HttpResponse, EuDataError> {
        (**self).get(request)
    }
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str) -> Result<Self, EuDataError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent).map_err(|err| EuDataError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|err| EuDataError::Http(err.to_string()))?;
        Ok(Self { client })
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, EuDataError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().unwrap_or_default();
        Err(EuDataError::HttpStatus {
            status,
            body: truncate_body(&body, ERROR_BODY_LIMIT),
        })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, request: &HttpRequest) -> Result<HttpResponse, EuDataError> {
        let response = self
            .client
            .get(&request.url)
            .query(&request.query)
            .header(ACCEPT, request.accept.as_str())
            .timeout(request.timeout)
            .send()
            .map_err(|err| EuDataError::Http(err.to_string()))?;
        let response = Self::handle_status(response)?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        let body = response
            .bytes()
            .map_err(|err| EuDataError::Http(err.to_string()))?;
        Ok(HttpResponse {
            status,
            content_type,
            body: body.to_vec(),
        })
    }
}

/// Minimum spacing between outbound requests, shared by everything using one session.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    pub fn wait(&self) {
        let mut last = match self.last_request.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                thread::sleep(self.min_interval - elapsed);
            }
        }
        *last = Some(Instant::now());
    }
}

/// Transport plus the per-client request policy (timeouts, rate limit).
pub struct HttpSession<T: HttpTransport> {
    transport: T,
    throttle: Throttle,
    request_timeout: Duration,
    download_timeout: Duration,
}

impl<T: HttpTransport> HttpSession<T> {
    pub fn new(transport: T, config: &ClientConfig) -> Self {
        Self {
            transport,
            throttle: Throttle::new(config.request_delay()),
            request_timeout: config.request_timeout(),
            download_timeout: config.download_timeout(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn get_json_ld(&self, url: &str, query: Vec<(String, String)>) -> Result<HttpResponse, EuDataError> {
        self.send(HttpRequest {
            url: url.to_string(),
            query,
            accept: JSON_LD_ACCEPT.to_string(),
            timeout: self.request_timeout,
        })
    }

    pub fn get_sparql(&self, endpoint: &str, query: &str) -> Result<HttpResponse, EuDataError> {
        self.send(HttpRequest {
            url: endpoint.to_string(),
            query: vec![("query".to_string(), query.to_string())],
            accept: SPARQL_ACCEPT.to_string(),
            timeout: self.request_timeout,
        })
    }

    pub fn download(&self, url: &str) -> Result<HttpResponse, EuDataError> {
        self.send(HttpRequest {
            url: url.to_string(),
            query: Vec::new(),
            accept: ANY_ACCEPT.to_string(),
            timeout: self.download_timeout,
        })
    }

    fn send(&self, request: HttpRequest) -> Result<HttpResponse, EuDataError> {
        self.throttle.wait();
        debug!(url = %request.url, "GET");
        self.transport.get(&request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_spaces_consecutive_requests() {
        let throttle = Throttle::new(Duration::from_millis(50));
        let start = Instant::now();
        throttle.wait();
        throttle.wait();
        throttle.wait();
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn zero_interval_never_sleeps() {
        let throttle = Throttle::new(Duration::ZERO);
        let start = Instant::now();
        for _ in 0..100 {
            throttle.wait();
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
