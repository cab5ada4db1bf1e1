// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text chunker for embedding generation.
//!
//! This module splits a policy document into overlapping chunks suitable for
//! embedding generation. Chunks are cut at separator occurrences near a
//! target size, so boundaries land between paragraphs rather than inside
//! them.

use crate::errors::{IndexError, Result};

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default overlap between consecutive chunks, in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Default separator to snap chunk boundaries to.
pub const DEFAULT_SEPARATOR: &str = "\n\n";

/// Default distance past the target size within which a separator is
/// accepted as the cut point.
pub const DEFAULT_SNAP_LIMIT: usize = 100;

/// Configuration for the text chunker.
///
/// All sizes are measured in characters, not bytes. A cut is placed at the
/// first separator occurrence at or after `chunk_size` characters from the
/// chunk start; if the nearest separator lies more than `snap_limit`
/// characters past that target, the chunk is hard-cut at exactly
/// `chunk_size` instead. When no separator occurs at all after the target,
/// the remainder of the text becomes the final chunk.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Target number of characters per chunk.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub overlap: usize,
    /// Boundary separator; carried at the head of the following chunk.
    pub separator: String,
    /// Maximum distance past `chunk_size` to search for a separator.
    pub snap_limit: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
            separator: DEFAULT_SEPARATOR.to_string(),
            snap_limit: DEFAULT_SNAP_LIMIT,
        }
    }
}

impl ChunkConfig {
    /// Creates a new ChunkConfig, rejecting degenerate size parameters.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        let config = Self {
            chunk_size,
            overlap,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Sets the boundary separator.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Sets the snap limit.
    pub fn with_snap_limit(mut self, snap_limit: usize) -> Self {
        self.snap_limit = snap_limit;
        self
    }

    /// Checks the size invariants. Overlap must stay strictly below the
    /// chunk size; clamping it silently would change chunk identity.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(IndexError::InvalidConfiguration {
                reason: "chunk_size must be greater than 0".to_string(),
            });
        }
        if self.overlap >= self.chunk_size {
            return Err(IndexError::InvalidConfiguration {
                reason: format!(
                    "chunk_overlap ({}) must be less than chunk_size ({})",
                    self.overlap, self.chunk_size
                ),
            });
        }
        if self.separator.is_empty() {
            return Err(IndexError::InvalidConfiguration {
                reason: "separator must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// A contiguous slice of the source text with its position information.
///
/// Offsets are character offsets into the source; `text` is exactly the
/// slice those offsets denote. Immutable once created: chunk ids are
/// sequence positions, so downstream vector ids depend on this sequence
/// being reproducible.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Zero-based sequence position.
    pub id: u32,
    /// The chunk text content.
    pub text: String,
    /// Starting character offset (inclusive).
    pub start_offset: usize,
    /// Ending character offset (exclusive).
    pub end_offset: usize,
}

/// Splits text into overlapping chunks for embedding generation.
pub struct Chunker {
    config: ChunkConfig,
}

impl Chunker {
    /// Creates a new chunker with the given configuration.
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// Creates a chunker with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    /// Returns the current configuration.
    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Splits text into overlapping chunks.
    ///
    /// Pure and deterministic: identical input and configuration always
    /// produce an identical chunk sequence. Empty input produces no chunks.
    pub fn split(&self, text: &str) -> Result<Vec<Chunk>> {
        self.config.validate()?;

        if text.is_empty() {
            return Ok(Vec::new());
        }

        // Character-boundary byte offsets; boundaries[i] is the byte offset
        // of character i, with a trailing sentinel at text.len().
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(b, _)| b)
            .chain(std::iter::once(text.len()))
            .collect();
        let total_chars = boundaries.len() - 1;

        let mut chunks = Vec::new();
        let mut cursor = 0usize;

        loop {
            let target = cursor + self.config.chunk_size;
            let cut = if target >= total_chars {
                total_chars
            } else {
                match find_from(text, &boundaries, target, &self.config.separator) {
                    Some(pos) if pos <= target + self.config.snap_limit => pos,
                    Some(_) => target,
                    None => total_chars,
                }
            };

            chunks.push(Chunk {
                id: chunks.len() as u32,
                text: text[boundaries[cursor]..boundaries[cut]].to_string(),
                start_offset: cursor,
                end_offset: cut,
            });

            if cut >= total_chars {
                break;
            }

            // Step back by the overlap, but always advance past the previous
            // chunk start.
            cursor = cut.saturating_sub(self.config.overlap).max(cursor + 1);
        }

        Ok(chunks)
    }
}

/// Finds the first separator occurrence at or after character position
/// `from`, returning its character position.
fn find_from(text: &str, boundaries: &[usize], from: usize, separator: &str) -> Option<usize> {
    let start_byte = boundaries[from];
    text[start_byte..].find(separator).map(|offset| {
        let byte_pos = start_byte + offset;
        // A match always starts on a char boundary, so byte_pos is in
        // `boundaries` and its index is the character position.
        boundaries.partition_point(|&b| b < byte_pos)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk_size: usize, overlap: usize, separator: &str) -> ChunkConfig {
        ChunkConfig::new(chunk_size, overlap)
            .unwrap()
            .with_separator(separator)
    }

    #[test]
    fn test_default_config() {
        let config = ChunkConfig::default();
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.overlap, 50);
        assert_eq!(config.separator, "\n\n");
    }

    #[test]
    fn test_config_validation() {
        assert!(ChunkConfig::new(500, 50).is_ok());

        // Invalid: overlap >= chunk_size, never silently clamped.
        assert!(matches!(
            ChunkConfig::new(20, 20),
            Err(IndexError::InvalidConfiguration { .. })
        ));
        assert!(matches!(
            ChunkConfig::new(20, 30),
            Err(IndexError::InvalidConfiguration { .. })
        ));

        // Invalid: zero chunk size.
        assert!(ChunkConfig::new(0, 0).is_err());
    }

    #[test]
    fn test_empty_input() {
        let chunker = Chunker::with_defaults();
        assert!(chunker.split("").unwrap().is_empty());
    }

    #[test]
    fn test_no_separator_yields_single_chunk() {
        let chunker = Chunker::new(config(4, 1, "\n\n"));
        let text = "abcdefghij";
        let chunks = chunker.split(text).unwrap();
        // No separator anywhere after the target: the whole text becomes a
        // single chunk even though it exceeds chunk_size.
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks[0].end_offset, 10);
    }

    #[test]
    fn test_short_input_single_chunk() {
        let chunker = Chunker::new(config(100, 10, "\n\n"));
        let chunks = chunker.split("short text").unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, 0);
        assert_eq!(chunks[0].text, "short text");
    }

    #[test]
    fn test_snap_to_separator() {
        // Separator lands 2 characters past the target of 4: within the
        // snap limit, so the cut lands on it.
        let text = "abcdef\n\nghijkl";
        let chunker = Chunker::new(config(4, 1, "\n\n").with_snap_limit(10));
        let chunks = chunker.split(text).unwrap();

        assert_eq!(chunks[0].text, "abcdef");
        assert_eq!(chunks[0].end_offset, 6);
        // Next chunk starts overlap characters before the cut and carries
        // the separator at its head.
        assert_eq!(chunks[1].start_offset, 5);
        assert!(chunks[1].text.starts_with("f\n\n"));
    }

    #[test]
    fn test_hard_cut_when_separator_too_far() {
        // Only separator is 9 characters past the target; with snap_limit 2
        // the chunk is hard-cut at exactly chunk_size.
        let text = "abcdefghijklm\n\nnop";
        let chunker = Chunker::new(config(4, 1, "\n\n").with_snap_limit(2));
        let chunks = chunker.split(text).unwrap();

        assert_eq!(chunks[0].text, "abcd");
        assert_eq!(chunks[0].end_offset, 4);
    }

    #[test]
    fn test_consecutive_overlap_is_exact() {
        let text = "para one.\n\npara two.\n\npara three.\n\npara four.";
        let chunker = Chunker::new(config(8, 3, "\n\n").with_snap_limit(20));
        let chunks = chunker.split(text).unwrap();
        assert!(chunks.len() > 1);

        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end_offset - pair[1].start_offset, 3);
        }
    }

    #[test]
    fn test_reconstruction_from_offsets() {
        // Concatenating chunk texts minus the overlaps reproduces the
        // original text exactly; no characters are dropped or invented.
        let text = "Refund policy.\n\nReturns accepted within 30 days.\n\n\
                    Items must be unused.\n\nContact support for exceptions.";
        let chunker = Chunker::new(config(20, 5, "\n\n"));
        let chunks = chunker.split(text).unwrap();

        let mut rebuilt = String::new();
        let mut prev_end = 0usize;
        for chunk in &chunks {
            let skip = prev_end - chunk.start_offset;
            rebuilt.extend(chunk.text.chars().skip(skip));
            prev_end = chunk.end_offset;
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_deterministic_across_runs() {
        let text = "alpha.\n\nbeta.\n\ngamma.\n\ndelta.\n\nepsilon.";
        let chunker = Chunker::new(config(10, 2, "\n\n"));
        let first = chunker.split(text).unwrap();
        let second = chunker.split(text).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_ids_are_sequence_positions() {
        let text = "a".repeat(30) + "\n\n" + &"b".repeat(30) + "\n\n" + &"c".repeat(30);
        let chunker = Chunker::new(config(10, 2, "\n\n").with_snap_limit(50));
        let chunks = chunker.split(&text).unwrap();
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.id, i as u32);
        }
    }

    #[test]
    fn test_multibyte_boundaries() {
        // Character-based sizes must not split inside multi-byte sequences.
        let text = "héllo wörld\n\nsecond pärt here\n\nthird pärt";
        let chunker = Chunker::new(config(6, 2, "\n\n").with_snap_limit(30));
        let chunks = chunker.split(text).unwrap();

        let total: Vec<char> = text.chars().collect();
        for chunk in &chunks {
            let expected: String = total[chunk.start_offset..chunk.end_offset].iter().collect();
            assert_eq!(chunk.text, expected);
        }
    }

    #[test]
    fn test_paragraph_scenario() {
        // "A.\n\nB.\n\nC." with chunk_size=3, overlap=1: the first target
        // lands at position 3, the next separator at position 6 is within
        // the snap limit, so the first cut is at 6. The second target (8)
        // sees no further separator and the remainder closes the sequence.
        let text = "A.\n\nB.\n\nC.";
        let chunker = Chunker::new(config(3, 1, "\n\n").with_snap_limit(100));
        let chunks = chunker.split(text).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "A.\n\nB.");
        assert_eq!(chunks[1].start_offset, 5);
        assert_eq!(chunks[1].text, ".\n\nC.");
        // Exactly one character of overlap between the two.
        assert_eq!(chunks[0].end_offset - chunks[1].start_offset, 1);
    }
}
