// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory vector index with SQLite persistence.
//!
//! The index is batch-built from a complete set of entries and read-only
//! afterwards: a contiguous entry array plus brute-force cosine scoring is
//! enough at policy-document scale, and the persisted artifact reconstructs
//! an index that answers queries identically to the one that was saved.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use rusqlite::{params, Connection, OptionalExtension};

use crate::embedding::chunker::Chunk;
use crate::errors::{IndexError, Result};

/// Version of the persisted artifact schema.
pub const SCHEMA_VERSION: u32 = 1;

/// Similarity metric used to rank entries against a query vector.
///
/// Fixed at build time and recorded in the artifact. Cosine is the only
/// metric of schema version 1; the identifier is persisted so a future
/// revision can add more without silently misreading old files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimilarityMetric {
    Cosine,
}

impl SimilarityMetric {
    fn as_str(&self) -> &'static str {
        match self {
            SimilarityMetric::Cosine => "cosine",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "cosine" => Some(SimilarityMetric::Cosine),
            _ => None,
        }
    }
}

impl std::fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A vector paired with the chunk it was computed from.
///
/// Entries are appended in chunk order at build time and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A query result: one index entry and its similarity score.
#[derive(Debug, Clone)]
pub struct SimilarityHit {
    pub entry: IndexEntry,
    pub score: f32,
}

/// Immutable similarity-search index over embedded chunks.
#[derive(Debug)]
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    dimension: usize,
    metric: SimilarityMetric,
    model_id: String,
    source_digest: String,
}

impl VectorIndex {
    /// Constructs the index once from a complete, fixed set of entries.
    ///
    /// The dimension is taken from the first entry; any entry that disagrees
    /// fails the build with `DimensionMismatch`. An empty entry set is
    /// accepted (dimension 0) — only querying it is an error.
    pub fn build(
        entries: Vec<IndexEntry>,
        metric: SimilarityMetric,
        model_id: impl Into<String>,
        source_digest: impl Into<String>,
    ) -> Result<Self> {
        let dimension = entries.first().map(|e| e.vector.len()).unwrap_or(0);

        for entry in &entries {
            if entry.vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    site: format!("chunk {}", entry.chunk.id),
                    expected: dimension,
                    actual: entry.vector.len(),
                });
            }
        }

        Ok(Self {
            entries,
            dimension,
            metric,
            model_id: model_id.into(),
            source_digest: source_digest.into(),
        })
    }

    /// Number of entries in the index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Embedding dimension D; 0 for an empty index.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    /// Identifier of the model that produced the vectors.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// blake3 digest of the source text the index was built from.
    pub fn source_digest(&self) -> &str {
        &self.source_digest
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Returns the `min(k, len)` entries most similar to the query vector,
    /// ordered by descending similarity, ties broken by ascending chunk id.
    ///
    /// Scoring runs in parallel across entries; ordering happens after
    /// collection, so results are identical to a single-threaded pass.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<SimilarityHit>> {
        if k == 0 {
            return Err(IndexError::InvalidConfiguration {
                reason: "query k must be greater than 0".to_string(),
            });
        }
        if self.entries.is_empty() {
            return Err(IndexError::EmptyIndex);
        }
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                site: "query vector".to_string(),
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let mut hits: Vec<SimilarityHit> = self
            .entries
            .par_iter()
            .map(|entry| SimilarityHit {
                entry: entry.clone(),
                score: cosine_similarity(vector, &entry.vector),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.entry.chunk.id.cmp(&b.entry.chunk.id))
        });
        hits.truncate(k);

        Ok(hits)
    }

    /// Serializes the full index to `dest`.
    ///
    /// The artifact is written to a sibling temporary path and renamed into
    /// place, so an interrupted or failed save leaves any previous artifact
    /// at `dest` untouched.
    pub fn save(&self, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| IndexError::io(parent, e))?;
            }
        }

        let tmp = temp_sibling(dest);
        if tmp.exists() {
            std::fs::remove_file(&tmp).map_err(|e| IndexError::io(&tmp, e))?;
        }

        let mut conn = Connection::open(&tmp)?;
        self.write_artifact(&mut conn)?;
        conn.close().map_err(|(_, e)| IndexError::Sqlite(e))?;

        std::fs::rename(&tmp, dest).map_err(|e| IndexError::io(dest, e))?;
        Ok(())
    }

    fn write_artifact(&self, conn: &mut Connection) -> Result<()> {
        let tx = conn.transaction()?;

        tx.execute_batch(
            r#"
            CREATE TABLE meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE chunks (
                id INTEGER PRIMARY KEY,
                text TEXT NOT NULL,
                start_offset INTEGER NOT NULL,
                end_offset INTEGER NOT NULL,
                embedding BLOB NOT NULL
            );
            "#,
        )?;

        {
            let mut stmt = tx.prepare("INSERT INTO meta (key, value) VALUES (?1, ?2)")?;
            stmt.execute(params!["schema_version", SCHEMA_VERSION.to_string()])?;
            stmt.execute(params!["dimension", self.dimension.to_string()])?;
            stmt.execute(params!["metric", self.metric.as_str()])?;
            stmt.execute(params!["model_id", self.model_id])?;
            stmt.execute(params!["source_digest", self.source_digest])?;
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks (id, text, start_offset, end_offset, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for entry in &self.entries {
                stmt.execute(params![
                    entry.chunk.id,
                    entry.chunk.text,
                    entry.chunk.start_offset as i64,
                    entry.chunk.end_offset as i64,
                    embedding_to_blob(&entry.vector),
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Reconstructs an index from a persisted artifact.
    ///
    /// Fails with `UnsupportedFormatVersion` rather than misinterpreting
    /// bytes written by an unknown schema.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(IndexError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "index artifact not found"),
            ));
        }

        let conn = Connection::open(path)?;

        let has_meta: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'meta'",
            [],
            |row| row.get(0),
        )?;
        if has_meta == 0 {
            return Err(IndexError::UnsupportedFormatVersion {
                found: "missing".to_string(),
                supported: SCHEMA_VERSION,
            });
        }

        let version = read_meta(&conn, "schema_version")?.unwrap_or_else(|| "missing".to_string());
        if version.parse::<u32>().ok() != Some(SCHEMA_VERSION) {
            return Err(IndexError::UnsupportedFormatVersion {
                found: version,
                supported: SCHEMA_VERSION,
            });
        }

        let metric_id = read_meta(&conn, "metric")?.unwrap_or_default();
        let metric = SimilarityMetric::parse(&metric_id).ok_or_else(|| {
            IndexError::UnsupportedFormatVersion {
                found: format!("metric '{metric_id}'"),
                supported: SCHEMA_VERSION,
            }
        })?;

        let dimension: usize = read_meta(&conn, "dimension")?
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| IndexError::UnsupportedFormatVersion {
                found: "missing dimension".to_string(),
                supported: SCHEMA_VERSION,
            })?;

        let model_id = read_meta(&conn, "model_id")?.unwrap_or_default();
        let source_digest = read_meta(&conn, "source_digest")?.unwrap_or_default();

        let mut stmt = conn.prepare(
            "SELECT id, text, start_offset, end_offset, embedding FROM chunks ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            let blob: Vec<u8> = row.get(4)?;
            Ok(IndexEntry {
                chunk: Chunk {
                    id: row.get(0)?,
                    text: row.get(1)?,
                    start_offset: row.get::<_, i64>(2)? as usize,
                    end_offset: row.get::<_, i64>(3)? as usize,
                },
                vector: blob_to_embedding(&blob),
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let entry = row?;
            if entry.vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    site: format!("stored chunk {}", entry.chunk.id),
                    expected: dimension,
                    actual: entry.vector.len(),
                });
            }
            entries.push(entry);
        }
        drop(stmt);

        Ok(Self {
            entries,
            dimension,
            metric,
            model_id,
            source_digest,
        })
    }
}

fn read_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM meta WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

fn temp_sibling(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "index".into());
    name.push(".tmp");
    dest.with_file_name(name)
}

/// Converts an embedding vector to a compact little-endian blob.
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Converts a blob back to an embedding vector.
fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Computes cosine similarity between two vectors of equal length.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}
