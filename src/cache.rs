//! File-backed response cache.
//!
//! One file per key under a single root directory. JSON entries wrap their payload in an
//! envelope carrying the write timestamp; content entries are a raw blob plus a JSON sidecar.
//! Entries older than the TTL read as absent but stay on disk until overwritten. Entries that
//! fail to parse are deleted on read and also read as absent.

use std::fs;
use std::io::{ErrorKind, Write};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::Builder;
use tracing::{debug, warn};

use crate::domain::sanitize_filename;
use crate::error::EuDataError;

const CONTENT_SUFFIX: &str = ".content";
const CONTENT_META_SUFFIX: &str = ".content.meta";

/// Stable name of a cache entry. Always a safe file name component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Raw SPARQL results; the suffix keeps queries issued for different purposes apart.
    pub fn sparql(query: &str, suffix: &str) -> Self {
        Self(format!(
            "sparql_{}_{}",
            sanitize_filename(suffix),
            query_hash(query)
        ))
    }

    pub fn metadata_rest(dataset_uri: &str, locale: &str) -> Self {
        Self(format!(
            "{}_rest_{}",
            metadata_key_base(dataset_uri),
            sanitize_filename(locale)
        ))
    }

    pub fn metadata_sparql(dataset_uri: &str) -> Self {
        Self(format!("{}_sparql", metadata_key_base(dataset_uri)))
    }

    /// Readable URL prefix plus a hash of the full URL; long URLs sharing a prefix stay apart.
    pub fn content(download_url: &str) -> Self {
        Self(format!(
            "content_{}_{}",
            sanitize_filename(download_url),
            query_hash(download_url)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub fn metadata_key_base(dataset_uri: &str) -> String {
    sanitize_filename(&format!("metadata_{dataset_uri}"))
}

/// First 16 hex characters of the SHA-256 of the query text.
pub fn query_hash(query: &str) -> String {
    let digest = Sha256::digest(query.as_bytes());
    hex::encode(&digest[..8])
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    #[serde(rename = "_cache_timestamp")]
    cached_at: f64,
    payload: T,
}

/// Sidecar record stored next to a content blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentMetadata {
    pub format: Option<String>,
    pub content_type: String,
    pub is_binary: bool,
    pub size: usize,
    pub source_url: String,
    pub dataset_modified: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ContentBody {
    Text(String),
    Binary(Vec<u8>),
}

impl ContentBody {
    pub fn is_binary(&self) -> bool {
        matches!(self, ContentBody::Binary(_))
    }

    /// Characters for text, bytes for binary.
    pub fn size(&self) -> usize {
        match self {
            ContentBody::Text(text) => text.chars().count(),
            ContentBody::Binary(bytes) => bytes.len(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ContentBody::Text(text) => text.as_bytes(),
            ContentBody::Binary(bytes) => bytes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CachedContent {
    pub metadata: ContentMetadata,
    pub body: ContentBody,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClearSummary {
    pub removed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    root: Utf8PathBuf,
    ttl: Duration,
    enabled: bool,
}

impl CacheStore {
    pub fn new(root: Utf8PathBuf, ttl: Duration, enabled: bool) -> Result<Self, EuDataError> {
        if enabled {
            fs::create_dir_all(root.as_std_path())
                .map_err(|err| EuDataError::Filesystem(format!("create {root}: {err}")))?;
            debug!(cache_dir = %root, "cache enabled");
        }
        Ok(Self { root, ttl, enabled })
    }

    pub fn disabled() -> Self {
        Self {
            root: Utf8PathBuf::new(),
            ttl: Duration::ZERO,
            enabled: false,
        }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn path_for(&self, key: &CacheKey) -> Utf8PathBuf {
        self.root.join(format!("{}.json", key.as_str()))
    }

    pub fn content_paths(&self, key: &CacheKey) -> (Utf8PathBuf, Utf8PathBuf) {
        (
            self.root.join(format!("{}{CONTENT_SUFFIX}", key.as_str())),
            self.root.join(format!("{}{CONTENT_META_SUFFIX}", key.as_str())),
        )
    }

    pub fn lookup<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        if !self.enabled {
            return None;
        }
        let path = self.path_for(key);
        let envelope: Envelope<T> = self.read_envelope(&path)?;
        if self.is_expired(envelope.cached_at) {
            debug!(key = key.as_str(), "cache entry expired");
            return None;
        }
        debug!(key = key.as_str(), "cache hit");
        Some(envelope.payload)
    }

    pub fn store<T: Serialize>(&self, key: &CacheKey, payload: &T) -> Result<(), EuDataError> {
        if !self.enabled {
            return Ok(());
        }
        let envelope = Envelope {
            cached_at: now_secs(),
            payload,
        };
        let content = serde_json::to_vec(&envelope)
            .map_err(|err| EuDataError::Filesystem(err.to_string()))?;
        self.write_atomic(&self.path_for(key), &content)?;
        debug!(key = key.as_str(), "cache entry written");
        Ok(())
    }

    pub fn invalidate(&self, key: &CacheKey) -> bool {
        remove_quietly(&self.path_for(key))
    }

    /// Removes every JSON entry whose file name starts with one of `prefixes`.
    pub fn invalidate_prefixes(&self, prefixes: &[String]) -> ClearSummary {
        self.remove_files(|name| {
            name.ends_with(".json") && prefixes.iter().any(|prefix| name.starts_with(prefix))
        })
    }

    pub fn invalidate_all(&self) -> ClearSummary {
        self.remove_files(|_| true)
    }

    /// Content entries are only valid when both the blob and its sidecar parse.
    pub fn lookup_content(&self, key: &CacheKey) -> Option<CachedContent> {
        if !self.enabled {
            return None;
        }
        let (blob_path, meta_path) = self.content_paths(key);
        if !blob_path.as_std_path().exists() {
            return None;
        }
        let envelope: Envelope<ContentMetadata> = match self.read_envelope(&meta_path) {
            Some(envelope) => envelope,
            None => {
                remove_quietly(&blob_path);
                return None;
            }
        };
        if self.is_expired(envelope.cached_at) {
            debug!(key = key.as_str(), "content cache expired");
            return None;
        }
        let bytes = match fs::read(blob_path.as_std_path()) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(path = %blob_path, error = %err, "content cache read error, discarding entry");
                remove_quietly(&blob_path);
                remove_quietly(&meta_path);
                return None;
            }
        };
        let body = if envelope.payload.is_binary {
            ContentBody::Binary(bytes)
        } else {
            match String::from_utf8(bytes) {
                Ok(text) => ContentBody::Text(text),
                Err(err) => {
                    warn!(path = %blob_path, error = %err, "cached text is not UTF-8, discarding entry");
                    remove_quietly(&blob_path);
                    remove_quietly(&meta_path);
                    return None;
                }
            }
        };
        Some(CachedContent {
            metadata: envelope.payload,
            body,
        })
    }

    /// Writes the blob first, then the sidecar. The previous sidecar is removed before the new
    /// blob lands, so a failed sidecar write leaves an entry that reads as absent.
    pub fn store_content(
        &self,
        key: &CacheKey,
        body: &ContentBody,
        metadata: &ContentMetadata,
    ) -> Result<(), EuDataError> {
        if !self.enabled {
            return Ok(());
        }
        let (_, meta_path) = self.content_paths(key);
        self.replace_blob(key, body)?;
        let envelope = Envelope {
            cached_at: now_secs(),
            payload: metadata,
        };
        let content = serde_json::to_vec(&envelope)
            .map_err(|err| EuDataError::Filesystem(err.to_string()))?;
        self.write_atomic(&meta_path, &content)
    }

    fn replace_blob(&self, key: &CacheKey, body: &ContentBody) -> Result<(), EuDataError> {
        let (blob_path, meta_path) = self.content_paths(key);
        if let Err(err) = fs::remove_file(meta_path.as_std_path()) {
            if err.kind() != ErrorKind::NotFound {
                return Err(EuDataError::Filesystem(format!("remove {meta_path}: {err}")));
            }
        }
        self.write_atomic(&blob_path, body.as_bytes())
    }

    fn read_envelope<T: DeserializeOwned>(&self, path: &Utf8Path) -> Option<Envelope<T>> {
        let content = match fs::read(path.as_std_path()) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(path = %path, error = %err, "cache read error, discarding entry");
                remove_quietly(path);
                return None;
            }
        };
        match serde_json::from_slice(&content) {
            Ok(envelope) => Some(envelope),
            Err(err) => {
                warn!(path = %path, error = %err, "corrupted cache entry, discarding");
                remove_quietly(path);
                None
            }
        }
    }

    fn is_expired(&self, cached_at: f64) -> bool {
        let age = now_secs() - cached_at;
        age >= self.ttl.as_secs_f64()
    }

    fn write_atomic(&self, path: &Utf8Path, content: &[u8]) -> Result<(), EuDataError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| EuDataError::Filesystem(err.to_string()))?;
        let mut file = Builder::new()
            .prefix(".tmp-")
            .tempfile_in(self.root.as_std_path())
            .map_err(|err| EuDataError::Filesystem(err.to_string()))?;
        file.write_all(content)
            .map_err(|err| EuDataError::Filesystem(err.to_string()))?;
        file.persist(path.as_std_path())
            .map_err(|err| EuDataError::Filesystem(format!("persist {path}: {}", err.error)))?;
        Ok(())
    }

    fn remove_files<F>(&self, select: F) -> ClearSummary
    where
        F: Fn(&str) -> bool,
    {
        let mut summary = ClearSummary::default();
        if !self.enabled {
            return summary;
        }
        let entries = match fs::read_dir(self.root.as_std_path()) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(cache_dir = %self.root, error = %err, "cannot list cache directory");
                return summary;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let is_file = entry
                .file_type()
                .map(|kind| kind.is_file() || kind.is_symlink())
                .unwrap_or(false);
            let selected = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(&select);
            if !is_file || !selected {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => summary.removed += 1,
                Err(err) => {
                    summary.failed += 1;
                    warn!(path = %path.display(), error = %err, "failed to delete cache file");
                }
            }
        }
        summary
    }
}

fn remove_quietly(path: &Utf8Path) -> bool {
    match fs::remove_file(path.as_std_path()) {
        Ok(()) => true,
        Err(err) if err.kind() == ErrorKind::NotFound => false,
        Err(err) => {
            warn!(path = %path, error = %err, "could not remove cache file");
            false
        }
    }
}

fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
