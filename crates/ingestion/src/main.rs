//! TaxLex Indexer
//!
//! Builds an index generation from the statute corpus and persists it:
//! 1. Loads passages from the corpus directory (or a JSON export)
//! 2. Skips the build when the persisted generation is current
//! 3. Builds lexical and semantic indexes
//! 4. Saves the generation and removes stale ones
//!
//! Usage: `indexer [--force] [CORPUS_PATH]`

use anyhow::Context;
use std::path::PathBuf;
use taxlex_common::embeddings::create_embedder;
use taxlex_common::telemetry::init_tracing;
use taxlex_common::{AppConfig, VERSION};
use taxlex_ingestion::open_corpus;
use taxlex_search::{IndexBuilder, IndexPersistence};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("failed to load configuration")?;
    config.validate_all()?;
    init_tracing(&config.observability)?;

    info!("Starting TaxLex indexer v{}", VERSION);

    let mut force = false;
    let mut corpus_path = config.index.corpus_dir.clone();
    for arg in std::env::args().skip(1) {
        if arg == "--force" {
            force = true;
        } else {
            corpus_path = PathBuf::from(arg);
        }
    }

    let source = open_corpus(&corpus_path, config.index.max_section_chars)?;
    let passages = source.load().map_err(|e| {
        error!(error = %e, corpus = %corpus_path.display(), "Failed to load corpus");
        e
    })?;

    let embedder = create_embedder(&config.embedding)?;
    let persistence = IndexPersistence::new(&config.index.artifact_dir);

    if !force && !persistence.needs_rebuild(&passages, embedder.as_ref()) {
        info!(
            dir = %persistence.root().display(),
            "Persisted index is current; pass --force to rebuild"
        );
        return Ok(());
    }

    let builder = IndexBuilder::new(embedder, &config.index, config.embedding.batch_size);
    let generation = builder.build(passages).await?;

    let dir = persistence.save(&generation)?;
    let removed = persistence.remove_stale_generations()?;
    info!(
        dir = %dir.display(),
        removed_generations = removed,
        statistics = ?generation.statistics(),
        "Index generation saved"
    );

    Ok(())
}
