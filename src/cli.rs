// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// polidx - Semantic similarity index builder for policy documents
///
/// Splits a policy text into overlapping chunks, embeds them through a
/// remote provider, and builds a persistent similarity-search index.
#[derive(Parser, Debug)]
#[command(name = "polidx")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a similarity index from a policy text file
    Build {
        /// Path to the source text file
        input: PathBuf,

        /// Destination path for the index artifact
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Target characters per chunk
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Overlap characters between consecutive chunks
        #[arg(long)]
        chunk_overlap: Option<usize>,

        /// Boundary separator to snap chunk cuts to
        #[arg(long)]
        separator: Option<String>,

        /// Embedding model identifier
        #[arg(long)]
        model: Option<String>,

        /// Chunks per provider batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Use the deterministic offline embedder instead of the remote API
        #[arg(long)]
        offline: bool,

        /// Embedding dimension for the offline embedder
        #[arg(long)]
        dimension: Option<usize>,

        /// Suppress the progress bar
        #[arg(short, long)]
        quiet: bool,
    },

    /// Query an index for the chunks most similar to a question
    Query {
        /// The question to search for
        question: String,

        /// Path to the index artifact
        #[arg(short, long)]
        index: Option<PathBuf>,

        /// Number of results to return
        #[arg(short = 'k', long, default_value_t = 3)]
        top_k: usize,

        /// Use the deterministic offline embedder instead of the remote API
        #[arg(long)]
        offline: bool,

        /// Embedding model identifier
        #[arg(long)]
        model: Option<String>,
    },

    /// Print metadata for a persisted index
    Info {
        /// Path to the index artifact
        #[arg(short, long)]
        index: Option<PathBuf>,
    },
}
