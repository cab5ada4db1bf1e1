// SPDX-License-Identifier: MIT OR Apache-2.0

//! Build pipeline: chunk a document, embed the chunks in batches, assemble
//! and persist the vector index.
//!
//! Batches are embedded concurrently on the rayon pool and reassembled in
//! original chunk order before index construction; reordering across batches
//! would silently corrupt chunk/vector pairing, so order is restored by
//! construction (indexed collection), not by sorting afterwards.

use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use crate::embedding::chunker::{Chunk, ChunkConfig, Chunker};
use crate::embedding::provider::TextEmbedder;
use crate::errors::{IndexError, ProviderError, Result};
use crate::index::{IndexEntry, SimilarityMetric, VectorIndex};

/// Default number of chunks sent to the provider per batch.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Default retry budget for a transiently failing batch.
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Default backoff before the first retry; doubles per attempt.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Options for the build pipeline.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Chunking parameters.
    pub chunking: ChunkConfig,
    /// Number of chunks per provider batch.
    pub batch_size: usize,
    /// Attempts per batch before surfacing `ProviderUnavailable`.
    pub max_attempts: usize,
    /// Backoff before the first retry; doubles per subsequent attempt.
    pub initial_backoff: Duration,
    /// Render a progress bar while embedding.
    pub show_progress: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            chunking: ChunkConfig::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            show_progress: false,
        }
    }
}

impl BuildOptions {
    pub fn with_chunking(mut self, chunking: ChunkConfig) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }
}

/// What a completed build produced, for reporting.
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub chunks: usize,
    pub batches: usize,
    pub dimension: usize,
    pub destination: PathBuf,
}

/// Orchestrates Chunker -> Embedder -> VectorIndex -> persistence.
pub struct IndexBuilder<'a> {
    embedder: &'a dyn TextEmbedder,
    options: BuildOptions,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(embedder: &'a dyn TextEmbedder) -> Self {
        Self {
            embedder,
            options: BuildOptions::default(),
        }
    }

    pub fn with_options(embedder: &'a dyn TextEmbedder, options: BuildOptions) -> Result<Self> {
        if options.batch_size == 0 {
            return Err(IndexError::InvalidConfiguration {
                reason: "batch_size must be greater than 0".to_string(),
            });
        }
        if options.max_attempts == 0 {
            return Err(IndexError::InvalidConfiguration {
                reason: "max_attempts must be greater than 0".to_string(),
            });
        }
        Ok(Self { embedder, options })
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Runs the whole pipeline and atomically persists the result.
    ///
    /// Any stage failure aborts the build; a previously persisted artifact
    /// at `dest` is only replaced after the new one is fully written.
    pub fn build_and_persist(&self, text: &str, dest: &Path) -> Result<BuildSummary> {
        let index = self.build_index(text)?;
        index.save(dest)?;

        tracing::info!(
            entries = index.len(),
            dimension = index.dimension(),
            dest = %dest.display(),
            "index persisted"
        );

        Ok(BuildSummary {
            chunks: index.len(),
            batches: index.len().div_ceil(self.options.batch_size),
            dimension: index.dimension(),
            destination: dest.to_path_buf(),
        })
    }

    /// Runs chunking and embedding and returns the in-memory index.
    pub fn build_index(&self, text: &str) -> Result<VectorIndex> {
        let chunker = Chunker::new(self.options.chunking.clone());
        let chunks = chunker.split(text)?;
        let source_digest = blake3::hash(text.as_bytes()).to_hex().to_string();

        tracing::debug!(chunks = chunks.len(), "source text chunked");

        if chunks.is_empty() {
            return VectorIndex::build(
                Vec::new(),
                SimilarityMetric::Cosine,
                self.embedder.model_id(),
                source_digest,
            );
        }

        let vectors = self.embed_all(&chunks)?;

        let dimension = vectors[0].len();
        let mut entries = Vec::with_capacity(chunks.len());
        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    site: format!("chunk {}", chunk.id),
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            entries.push(IndexEntry { chunk, vector });
        }

        VectorIndex::build(
            entries,
            SimilarityMetric::Cosine,
            self.embedder.model_id(),
            source_digest,
        )
    }

    /// Embeds all chunks in fixed-size batches, concurrently, preserving
    /// chunk order in the returned vector list.
    fn embed_all(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let batches: Vec<&[Chunk]> = chunks.chunks(self.options.batch_size).collect();

        let pb = if self.options.show_progress {
            let pb = ProgressBar::new(batches.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{bar:40.cyan/blue}] {pos}/{len} batches | Embedding")
                    .expect("valid progress bar template")
                    .progress_chars("##."),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        // Indexed parallel map: collect() restores batch order regardless of
        // completion order, and the first failing batch (by index) wins.
        let results: Vec<Result<Vec<Vec<f32>>>> = batches
            .par_iter()
            .enumerate()
            .map(|(batch_idx, batch)| {
                let vectors = self.embed_batch(batch_idx, batch);
                pb.inc(1);
                vectors
            })
            .collect();
        pb.finish_and_clear();

        let mut vectors = Vec::with_capacity(chunks.len());
        for result in results {
            vectors.extend(result?);
        }
        Ok(vectors)
    }

    /// Embeds one batch, retrying transient failures with exponential
    /// backoff up to the configured attempt budget.
    fn embed_batch(&self, batch_idx: usize, batch: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.embedder.embed(&texts) {
                Ok(vectors) => {
                    if vectors.len() != texts.len() {
                        return Err(IndexError::MalformedResponse {
                            batch: batch_idx,
                            detail: format!(
                                "expected {} vectors, got {}",
                                texts.len(),
                                vectors.len()
                            ),
                        });
                    }
                    return Ok(vectors);
                }
                Err(ProviderError::Unavailable(detail)) => {
                    if attempt >= self.options.max_attempts {
                        return Err(IndexError::ProviderUnavailable {
                            batch: batch_idx,
                            attempts: attempt,
                            detail,
                        });
                    }
                    let backoff = self
                        .options
                        .initial_backoff
                        .saturating_mul(1u32 << (attempt - 1).min(16));
                    tracing::warn!(
                        batch = batch_idx,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "provider unavailable, retrying"
                    );
                    std::thread::sleep(backoff);
                }
                Err(ProviderError::AuthenticationFailed(detail)) => {
                    return Err(IndexError::AuthenticationFailed { detail });
                }
                Err(ProviderError::MalformedResponse(detail)) => {
                    return Err(IndexError::MalformedResponse {
                        batch: batch_idx,
                        detail,
                    });
                }
            }
        }
    }
}
