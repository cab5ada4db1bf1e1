// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding module - turns source text into fixed-dimension vectors
//!
//! This module provides the chunking strategy that bounds what gets embedded
//! and the provider contract for the external embedding model.

pub mod chunker;
pub mod provider;

pub use chunker::{Chunk, ChunkConfig, Chunker};
pub use provider::{
    ApiKey, HashEmbedder, RemoteEmbedder, RemoteEmbedderConfig, TextEmbedder,
    DEFAULT_EMBEDDING_DIM,
};
