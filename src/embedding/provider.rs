// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding provider interface and implementations.
//!
//! The provider is the one external collaborator of the build pipeline: a
//! remote model that maps chunk texts to fixed-dimension vectors. The
//! pipeline treats each batch call as slow, rate-limited and failable; retry
//! policy lives in the builder, classification of failures lives here.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ProviderError;

/// Default embedding dimension used for offline builds.
pub const DEFAULT_EMBEDDING_DIM: usize = 768;

/// Default remote endpoint host.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default embedding model identifier.
pub const DEFAULT_MODEL: &str = "gemini-embedding-001";

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// An opaque credential handle for the remote provider.
///
/// The wrapped value never appears in `Debug` output, logs or error
/// messages; it is only written into the request itself.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Trait for embedding providers.
///
/// `embed` must return one vector per input text, in input order, all of the
/// same length; an empty input yields an empty output without any remote
/// call. Implementations are shared across worker threads, so they take
/// `&self`.
pub trait TextEmbedder: Send + Sync {
    /// Returns the model identifier recorded in built indexes.
    fn model_id(&self) -> &str;

    /// Generates embeddings for the given texts.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

/// Configuration for the remote embedding provider.
#[derive(Debug, Clone)]
pub struct RemoteEmbedderConfig {
    /// Model identifier, e.g. "gemini-embedding-001".
    pub model: String,
    /// Endpoint host. Overridable for tests.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for RemoteEmbedderConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: String,
    content: RequestContent<'a>,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Deserialize)]
struct ResponseEmbedding {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<ResponseEmbedding>,
}

/// Remote provider speaking the Gemini `batchEmbedContents` protocol.
pub struct RemoteEmbedder {
    client: reqwest::blocking::Client,
    config: RemoteEmbedderConfig,
    api_key: ApiKey,
}

impl RemoteEmbedder {
    pub fn new(config: RemoteEmbedderConfig, api_key: ApiKey) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("failed to build client: {e}")))?;

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:batchEmbedContents",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    fn classify_status(status: reqwest::StatusCode, body: &str) -> ProviderError {
        let summary = format!("HTTP {}: {}", status.as_u16(), truncate(body, 200));
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            ProviderError::AuthenticationFailed(summary)
        } else if status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
        {
            ProviderError::Unavailable(summary)
        } else {
            ProviderError::MalformedResponse(summary)
        }
    }
}

impl TextEmbedder for RemoteEmbedder {
    fn model_id(&self) -> &str {
        &self.config.model
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let payload = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: format!("models/{}", self.config.model),
                    content: RequestContent {
                        parts: vec![RequestPart { text }],
                    },
                })
                .collect(),
        };

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.expose())])
            .json(&payload)
            .send()
            .map_err(|e| ProviderError::Unavailable(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| ProviderError::Unavailable(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(Self::classify_status(status, &body));
        }

        let parsed: BatchEmbedResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::MalformedResponse(format!("invalid response body: {e}"))
        })?;

        if parsed.embeddings.len() != texts.len() {
            return Err(ProviderError::MalformedResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }

        Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
    }
}

/// Deterministic content-hash provider for tests and offline builds.
///
/// Each text maps to an L2-normalized vector derived from its blake3 digest,
/// so identical texts always embed identically and distinct texts almost
/// always differ. Not semantically meaningful.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIM)
    }
}

impl TextEmbedder for HashEmbedder {
    fn model_id(&self) -> &str {
        "hash"
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let vectors = texts
            .iter()
            .map(|text| {
                let mut hasher = blake3::Hasher::new();
                hasher.update(text.as_bytes());
                let mut reader = hasher.finalize_xof();

                let mut bytes = vec![0u8; self.dimension * 4];
                reader.fill(&mut bytes);

                let mut vector: Vec<f32> = bytes
                    .chunks_exact(4)
                    .map(|b| {
                        let raw = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                        (raw as f64 / u32::MAX as f64 * 2.0 - 1.0) as f32
                    })
                    .collect();
                l2_normalize(&mut vector);
                vector
            })
            .collect();

        Ok(vectors)
    }
}

pub(crate) fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}

fn truncate(input: &str, max_chars: usize) -> &str {
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => &input[..idx],
        None => input,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_debug_is_redacted() {
        let key = ApiKey::new("super-secret-value");
        let rendered = format!("{:?}", key);
        assert!(!rendered.contains("super-secret-value"));
        assert!(rendered.contains("redacted"));
    }

    #[test]
    fn test_hash_embedder_dimension_and_norm() {
        let provider = HashEmbedder::new(64);
        let result = provider.embed(&["refund policy".to_string()]).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].len(), 64);

        let norm: f32 = result[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_hash_embedder_is_deterministic() {
        let provider = HashEmbedder::new(32);
        let texts = vec!["first".to_string(), "second".to_string()];
        let a = provider.embed(&texts).unwrap();
        let b = provider.embed(&texts).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_embedder_distinguishes_texts() {
        let provider = HashEmbedder::new(32);
        let result = provider
            .embed(&["alpha".to_string(), "beta".to_string()])
            .unwrap();
        assert_ne!(result[0], result[1]);
    }

    #[test]
    fn test_empty_embed() {
        let provider = HashEmbedder::new(32);
        assert!(provider.embed(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 2), "he");
        assert_eq!(truncate("hello", 10), "hello");
    }
}
