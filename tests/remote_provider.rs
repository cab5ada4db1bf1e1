// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;

use polidx::embedding::provider::{ApiKey, RemoteEmbedder, RemoteEmbedderConfig, TextEmbedder};
use polidx::errors::ProviderError;

const EMBED_PATH: &str = "/v1beta/models/gemini-embedding-001:batchEmbedContents";

fn embedder_for(server: &MockServer) -> RemoteEmbedder {
    RemoteEmbedder::new(
        RemoteEmbedderConfig {
            model: "gemini-embedding-001".to_string(),
            base_url: server.base_url(),
            timeout: Duration::from_secs(5),
        },
        ApiKey::new("test-key"),
    )
    .unwrap()
}

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn successful_batch_returns_vectors_in_order() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path(EMBED_PATH)
            .query_param("key", "test-key");
        then.status(200).json_body(json!({
            "embeddings": [
                { "values": [0.1, 0.2, 0.3] },
                { "values": [0.4, 0.5, 0.6] }
            ]
        }));
    });

    let embedder = embedder_for(&server);
    let vectors = embedder.embed(&texts(&["first", "second"])).unwrap();

    mock.assert();
    assert_eq!(vectors.len(), 2);
    assert_eq!(vectors[0], vec![0.1, 0.2, 0.3]);
    assert_eq!(vectors[1], vec![0.4, 0.5, 0.6]);
}

#[test]
fn empty_input_makes_no_request() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path(EMBED_PATH);
        then.status(200).json_body(json!({ "embeddings": [] }));
    });

    let embedder = embedder_for(&server);
    assert!(embedder.embed(&[]).unwrap().is_empty());
    mock.assert_hits(0);
}

#[test]
fn server_error_is_transient() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path(EMBED_PATH);
        then.status(503).body("upstream overloaded");
    });

    let embedder = embedder_for(&server);
    let err = embedder.embed(&texts(&["text"])).unwrap_err();
    assert!(matches!(err, ProviderError::Unavailable(_)));
}

#[test]
fn rate_limit_is_transient() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path(EMBED_PATH);
        then.status(429).body("quota exceeded");
    });

    let embedder = embedder_for(&server);
    let err = embedder.embed(&texts(&["text"])).unwrap_err();
    assert!(matches!(err, ProviderError::Unavailable(_)));
}

#[test]
fn credential_rejection_is_fatal() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path(EMBED_PATH);
        then.status(403).body("API key invalid");
    });

    let embedder = embedder_for(&server);
    let err = embedder.embed(&texts(&["text"])).unwrap_err();
    assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
}

#[test]
fn missing_embedding_count_is_malformed() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path(EMBED_PATH);
        then.status(200).json_body(json!({
            "embeddings": [ { "values": [0.1, 0.2] } ]
        }));
    });

    let embedder = embedder_for(&server);
    let err = embedder.embed(&texts(&["one", "two"])).unwrap_err();
    assert!(matches!(err, ProviderError::MalformedResponse(_)));
}

#[test]
fn unparseable_body_is_malformed() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path(EMBED_PATH);
        then.status(200).body("definitely not json");
    });

    let embedder = embedder_for(&server);
    let err = embedder.embed(&texts(&["text"])).unwrap_err();
    assert!(matches!(err, ProviderError::MalformedResponse(_)));
}

#[test]
fn client_error_is_malformed_not_retried() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path(EMBED_PATH);
        then.status(400).body("bad request payload");
    });

    let embedder = embedder_for(&server);
    let err = embedder.embed(&texts(&["text"])).unwrap_err();
    assert!(matches!(err, ProviderError::MalformedResponse(_)));
}
