// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the chunk/embed/index pipeline.
//!
//! Build failures abort the whole build and leave previously persisted
//! artifacts untouched; query failures never mutate index state. Every
//! variant carries enough context (batch index, chunk id, path) to reproduce
//! the failure from the same input and configuration.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Failure signaled by an embedding provider for a single batch call.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transient failure (timeout, connection refused, HTTP 408/429/5xx).
    /// Callers may retry the whole batch.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// Credentials rejected (HTTP 401/403). Retrying cannot succeed.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The response violated the data contract: unparseable body, or a
    /// vector count/dimension that disagrees with the request.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Errors raised while building, persisting, loading or querying an index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Bad chunking or query parameters. Reported before any work starts.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    /// The provider stayed unavailable through every retry attempt.
    #[error("embedding provider unavailable for batch {batch} after {attempts} attempts: {detail}")]
    ProviderUnavailable {
        batch: usize,
        attempts: usize,
        detail: String,
    },

    /// The provider rejected the supplied credentials. Never retried.
    #[error("embedding provider rejected credentials: {detail}")]
    AuthenticationFailed { detail: String },

    /// The provider returned a response that violates the batch contract.
    #[error("malformed provider response for batch {batch}: {detail}")]
    MalformedResponse { batch: usize, detail: String },

    /// A vector's length disagrees with the index dimension. `site` names
    /// the offending location ("chunk 7", "query vector", "stored chunk 3").
    #[error("dimension mismatch at {site}: expected {expected}, got {actual}")]
    DimensionMismatch {
        site: String,
        expected: usize,
        actual: usize,
    },

    /// The persisted artifact declares a schema this build cannot read.
    #[error("unsupported index format version {found} (supported: {supported})")]
    UnsupportedFormatVersion { found: String, supported: u32 },

    /// A query was attempted against an index with zero entries.
    #[error("query attempted against an empty index")]
    EmptyIndex,

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IndexError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IndexError::Io {
            path: path.into(),
            source,
        }
    }
}
