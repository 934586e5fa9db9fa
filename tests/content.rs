mod common;

use assert_matches::assert_matches;
use serde_json::json;

use common::{Harness, dataset_uri, fixture};
use eu_data_tool::cache::ContentBody;
use eu_data_tool::error::EuDataError;

const CSV_URL: &str = "https://files.test/ses/earnings.csv";
const JSON_URL: &str = "https://files.test/ses/earnings.json";

fn serve_dataset(harness: &Harness) {
    harness.transport.respond_json_ld(&fixture());
    harness
        .transport
        .respond(CSV_URL, "text/csv; charset=utf-8", "sex,age,earnings\nF,30,2100\n");
    harness
        .transport
        .respond(JSON_URL, "application/json", r#"{"rows": []}"#);
}

fn formats(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|token| token.to_string()).collect()
}

#[test]
fn downloads_first_preferred_format() {
    let harness = Harness::new();
    serve_dataset(&harness);

    let content = harness
        .client
        .get_dataset_content(&dataset_uri(), None, false)
        .unwrap();

    assert_eq!(content.source_url, CSV_URL);
    assert_eq!(content.format.as_deref(), Some("CSV"));
    assert!(!content.is_binary);
    assert_eq!(content.content_type, "text/csv; charset=utf-8");
    assert_eq!(content.content, ContentBody::Text("sex,age,earnings\nF,30,2100\n".to_string()));
    assert_eq!(content.size, 27);
}

#[test]
fn reversed_preference_selects_json() {
    let harness = Harness::new();
    serve_dataset(&harness);

    let preferred = formats(&["JSON", "CSV"]);
    let content = harness
        .client
        .get_dataset_content(&dataset_uri(), Some(&preferred), false)
        .unwrap();

    assert_eq!(content.source_url, JSON_URL);
    assert_eq!(content.format.as_deref(), Some("JSON"));
}

#[test]
fn second_fetch_uses_content_cache() {
    let harness = Harness::new();
    serve_dataset(&harness);

    let first = harness.client.get_dataset_content(&dataset_uri(), None, false).unwrap();
    let second = harness.client.get_dataset_content(&dataset_uri(), None, false).unwrap();

    assert_eq!(first, second);
    assert_eq!(harness.transport.calls_to(CSV_URL), 1);
    assert!(
        harness
            .cache_files()
            .iter()
            .any(|name| name.starts_with("content_") && name.ends_with(".content.meta"))
    );
}

#[test]
fn force_refresh_downloads_again() {
    let harness = Harness::new();
    serve_dataset(&harness);

    harness.client.get_dataset_content(&dataset_uri(), None, false).unwrap();
    harness.client.get_dataset_content(&dataset_uri(), None, true).unwrap();

    assert_eq!(harness.transport.calls_to(CSV_URL), 2);
}

#[test]
fn modified_dataset_invalidates_cached_content() {
    let harness = Harness::new();
    serve_dataset(&harness);
    harness.client.get_dataset_content(&dataset_uri(), None, false).unwrap();

    let mut updated = fixture();
    updated["@graph"][0]["dct:modified"] = json!("2024-06-30");
    harness.transport.respond_json_ld(&updated);
    harness
        .transport
        .respond(CSV_URL, "text/csv", "sex,age,earnings\nF,30,2200\n");
    // drops the metadata records but keeps the content entry
    harness.client.clear_cache(Some(&dataset_uri()));

    let content = harness
        .client
        .get_dataset_content(&dataset_uri(), None, false)
        .unwrap();

    assert_eq!(harness.transport.calls_to(CSV_URL), 2);
    assert_eq!(content.content, ContentBody::Text("sex,age,earnings\nF,30,2200\n".to_string()));
}

#[test]
fn unchanged_modified_date_keeps_cached_content() {
    let harness = Harness::new();
    serve_dataset(&harness);
    harness.client.get_dataset_content(&dataset_uri(), None, false).unwrap();

    harness.client.clear_cache(Some(&dataset_uri()));
    harness.client.get_dataset_content(&dataset_uri(), None, false).unwrap();

    assert_eq!(harness.transport.calls_to(CSV_URL), 1);
}

fn fixture_with_csv_url(url: &str) -> serde_json::Value {
    let mut document = fixture();
    document["@graph"][2]["dcat:downloadURL"] = json!({"@id": url});
    document
}

#[test]
fn long_urls_with_shared_prefix_do_not_share_cached_content() {
    let harness = Harness::new();
    let base = format!(
        "https://ec.europa.eu/eurostat/api/dissemination/sdmx/2.1/data/{}",
        "earn_ses_monthly_".repeat(8)
    );
    let germany = format!("{base}?geo=DE&format=csv");
    let france = format!("{base}?geo=FR&format=csv");
    harness.transport.respond_json_ld(&fixture_with_csv_url(&germany));
    harness.transport.respond(&germany, "text/csv", "germany\n");
    harness.transport.respond(&france, "text/csv", "france\n");
    harness.client.get_dataset_content(&dataset_uri(), None, false).unwrap();

    harness.transport.respond_json_ld(&fixture_with_csv_url(&france));
    harness.client.clear_cache(Some(&dataset_uri()));
    let content = harness
        .client
        .get_dataset_content(&dataset_uri(), None, false)
        .unwrap();

    assert_eq!(content.content, ContentBody::Text("france\n".to_string()));
    assert_eq!(content.source_url, france);
    assert_eq!(harness.transport.calls_to(&france), 1);
    let blobs = harness
        .cache_files()
        .into_iter()
        .filter(|name| name.ends_with(".content"))
        .count();
    assert_eq!(blobs, 2);
}

#[test]
fn binary_content_is_kept_as_bytes() {
    let harness = Harness::new();
    harness.transport.respond_json_ld(&fixture());
    harness
        .transport
        .respond(CSV_URL, "application/zip", vec![0x50, 0x4b, 0x03, 0x04, 0xff]);

    let content = harness.client.get_dataset_content(&dataset_uri(), None, false).unwrap();

    assert!(content.is_binary);
    assert_eq!(content.size, 5);
    assert_matches!(content.content, ContentBody::Binary(bytes) if bytes.len() == 5);

    let cached = harness.client.get_dataset_content(&dataset_uri(), None, false).unwrap();
    assert!(cached.is_binary);
    assert_eq!(harness.transport.calls_to(CSV_URL), 1);
}

#[test]
fn undecodable_text_is_demoted_to_binary() {
    let harness = Harness::new();
    harness.transport.respond_json_ld(&fixture());
    harness
        .transport
        .respond(CSV_URL, "text/csv; charset=utf-8", vec![0x61, 0xff, 0xfe, 0x62]);

    let content = harness.client.get_dataset_content(&dataset_uri(), None, false).unwrap();

    assert!(content.is_binary);
    assert_eq!(content.size, 4);
}

#[test]
fn latin1_text_is_decoded() {
    let harness = Harness::new();
    harness.transport.respond_json_ld(&fixture());
    harness
        .transport
        .respond(CSV_URL, "text/csv; charset=ISO-8859-1", vec![b'c', b'a', b'f', 0xe9]);

    let content = harness.client.get_dataset_content(&dataset_uri(), None, false).unwrap();

    assert_eq!(content.content, ContentBody::Text("café".to_string()));
    assert_eq!(content.size, 4);
}

#[test]
fn dataset_without_distributions_is_reported() {
    let harness = Harness::new();
    harness.transport.respond_json_ld(&json!({"@graph": [{
        "@id": dataset_uri(),
        "@type": "dcat:Dataset",
        "dct:title": "Empty"
    }]}));

    let err = harness
        .client
        .get_dataset_content(&dataset_uri(), None, false)
        .unwrap_err();
    assert_matches!(err, EuDataError::NoDistributions(message) if message.contains("retrieved metadata"));
    assert!(harness.client.get_distribution_formats(&dataset_uri(), false).is_empty());
}

#[test]
fn failed_download_is_an_error() {
    let harness = Harness::new();
    harness.transport.respond_json_ld(&fixture());
    harness.transport.fail(CSV_URL, 500);

    let err = harness
        .client
        .get_dataset_content(&dataset_uri(), None, false)
        .unwrap_err();
    assert_matches!(err, EuDataError::HttpStatus { status: 500, .. });
    assert!(harness.cache_files().iter().all(|name| !name.starts_with("content_")));
}

#[test]
fn unresolvable_metadata_blocks_content() {
    let harness = Harness::new();
    harness.transport.fail(&common::rest_url(), 500);
    harness.transport.sparql_fails("", 500);

    let err = harness
        .client
        .get_dataset_content(&dataset_uri(), None, false)
        .unwrap_err();
    assert_matches!(err, EuDataError::MetadataUnavailable(_));
}
