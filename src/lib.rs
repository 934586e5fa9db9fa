pub mod app;
pub mod cache;
pub mod config;
pub mod content;
pub mod domain;
pub mod error;
pub mod fallback;
pub mod http;
pub mod jsonld;
pub mod metadata;
pub mod output;
pub mod resolver;
pub mod rest;
pub mod search;
pub mod sparql;
