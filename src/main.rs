// SPDX-License-Identifier: MIT OR Apache-2.0

//! polidx - Semantic similarity index builder for policy documents
//!
//! Chunks a policy text, embeds each chunk through an external provider,
//! and builds a persistent cosine-similarity index for later retrieval.

mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use polidx::builder::IndexBuilder;
use polidx::config::Config;
use polidx::embedding::provider::{
    ApiKey, HashEmbedder, RemoteEmbedder, TextEmbedder, DEFAULT_EMBEDDING_DIM,
};
use polidx::index::VectorIndex;

fn main() -> Result<()> {
    // Initialize tracing with POLIDX_LOG env var (e.g., POLIDX_LOG=debug polidx build ...)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("POLIDX_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load();

    match cli.command {
        Commands::Build {
            input,
            output,
            chunk_size,
            chunk_overlap,
            separator,
            model,
            batch_size,
            offline,
            dimension,
            quiet,
        } => {
            let text = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read input file: {}", input.display()))?;

            let mut options = config.build_options();
            if let Some(size) = chunk_size {
                options.chunking.chunk_size = size;
            }
            if let Some(overlap) = chunk_overlap {
                options.chunking.overlap = overlap;
            }
            if let Some(sep) = separator {
                options.chunking.separator = sep;
            }
            if let Some(batch) = batch_size {
                options.batch_size = batch;
            }
            options.show_progress = !quiet;

            let embedder = make_embedder(
                &config,
                model.as_deref(),
                offline,
                dimension.unwrap_or(DEFAULT_EMBEDDING_DIM),
            )?;

            let dest = output.unwrap_or_else(|| config.index.destination());
            let builder = IndexBuilder::with_options(embedder.as_ref(), options)?;
            let summary = builder.build_and_persist(&text, &dest)?;

            println!(
                "{} {} chunks ({} batches, dimension {}) -> {}",
                "Indexed".green().bold(),
                summary.chunks,
                summary.batches,
                summary.dimension,
                summary.destination.display()
            );
        }

        Commands::Query {
            question,
            index,
            top_k,
            offline,
            model,
        } => {
            let path = index.unwrap_or_else(|| config.index.destination());
            let loaded = VectorIndex::load(&path)
                .with_context(|| format!("Failed to load index: {}", path.display()))?;

            let embedder = make_embedder(&config, model.as_deref(), offline, loaded.dimension())?;
            let vectors = embedder
                .embed(&[question.clone()])
                .context("Failed to embed the question")?;
            let query_vector = vectors
                .into_iter()
                .next()
                .context("Provider returned no vector for the question")?;

            let hits = loaded.query(&query_vector, top_k)?;

            for (rank, hit) in hits.iter().enumerate() {
                println!(
                    "{} {} {}",
                    format!("{}.", rank + 1).bold(),
                    format!("score {:.4}", hit.score).cyan(),
                    format!(
                        "chunk {} [{}..{}]",
                        hit.entry.chunk.id, hit.entry.chunk.start_offset, hit.entry.chunk.end_offset
                    )
                    .yellow()
                );
                println!("   {}", snippet(&hit.entry.chunk.text, 200));
            }
        }

        Commands::Info { index } => {
            let path = index.unwrap_or_else(|| config.index.destination());
            let loaded = VectorIndex::load(&path)
                .with_context(|| format!("Failed to load index: {}", path.display()))?;

            println!("{}: {}", "path".bold(), path.display());
            println!("{}: {}", "entries".bold(), loaded.len());
            println!("{}: {}", "dimension".bold(), loaded.dimension());
            println!("{}: {}", "metric".bold(), loaded.metric());
            println!("{}: {}", "model".bold(), loaded.model_id());
            println!("{}: {}", "source digest".bold(), loaded.source_digest());
        }
    }

    Ok(())
}

/// Selects the embedding provider. The API key is resolved here, at the
/// process edge, and handed to the provider as an explicit value.
fn make_embedder(
    config: &Config,
    model: Option<&str>,
    offline: bool,
    offline_dimension: usize,
) -> Result<Box<dyn TextEmbedder>> {
    if offline {
        return Ok(Box::new(HashEmbedder::new(offline_dimension)));
    }

    let key = match config.embeddings.api_key.clone() {
        Some(key) => key,
        None => match std::env::var("GEMINI_API_KEY") {
            Ok(key) if !key.trim().is_empty() => key,
            _ => bail!(
                "No API key configured. Set GEMINI_API_KEY or add api_key to the \
                 [embeddings] section of .polidx.toml, or pass --offline."
            ),
        },
    };

    let mut remote_config = config.embeddings.to_remote_config();
    if let Some(model) = model {
        remote_config.model = model.to_string();
    }

    let embedder = RemoteEmbedder::new(remote_config, ApiKey::new(key))
        .context("Failed to initialize the remote embedding provider")?;
    Ok(Box::new(embedder))
}

/// First `max_chars` characters of a chunk, flattened to one line.
fn snippet(text: &str, max_chars: usize) -> String {
    let mut line: String = text
        .chars()
        .take(max_chars)
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect();
    if text.chars().count() > max_chars {
        line.push('…');
    }
    line
}
