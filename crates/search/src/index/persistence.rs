//! Disk persistence for index generations.
//!
//! Each generation lives in its own `gen-<id>/` directory holding
//! `passages.json`, `lexical.json`, `semantic.json` and `metadata.json`.
//! A `CURRENT` file names the published generation. Every file is written to a
//! temp path and renamed into place, and `CURRENT` is replaced last, so a crash
//! mid-save leaves the previous generation current.

use super::{corpus_fingerprint, IndexGeneration, IndexMetadata};
use crate::retrieval::{LexicalIndex, SemanticIndex};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use taxlex_common::errors::{AppError, Result};
use taxlex_common::{Embedder, Passage};
use tracing::{debug, info, warn};
use uuid::Uuid;

const CURRENT_FILE: &str = "CURRENT";
const PASSAGES_FILE: &str = "passages.json";
const LEXICAL_FILE: &str = "lexical.json";
const SEMANTIC_FILE: &str = "semantic.json";
const METADATA_FILE: &str = "metadata.json";
const GENERATION_PREFIX: &str = "gen-";

/// Artifact payload tagged with the generation it belongs to
#[derive(Serialize, Deserialize)]
struct Artifact<T> {
    generation_id: Uuid,
    data: T,
}

/// Vector array plus the passage id of each row
#[derive(Serialize, Deserialize)]
struct SemanticArtifact<I> {
    ids: Vec<String>,
    index: I,
}

fn artifact_error(path: &Path, message: impl std::fmt::Display) -> AppError {
    AppError::Artifact {
        path: path.display().to_string(),
        message: message.to_string(),
    }
}

/// Write via temp file + rename
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, bytes).map_err(|e| artifact_error(&tmp_path, e))?;
    fs::rename(&tmp_path, path).map_err(|e| artifact_error(path, e))?;
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    write_atomic(path, &bytes)?;
    debug!(path = %path.display(), bytes = bytes.len(), "Artifact written");
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).map_err(|e| artifact_error(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| artifact_error(path, e))
}

fn check_generation(path: &Path, expected: Uuid, actual: Uuid) -> Result<()> {
    if expected != actual {
        return Err(AppError::IndexUnavailable {
            message: format!(
                "{} belongs to generation {}, expected {}",
                path.display(),
                actual,
                expected
            ),
        });
    }
    Ok(())
}

/// Index artifact directory
#[derive(Debug, Clone)]
pub struct IndexPersistence {
    root: PathBuf,
}

impl IndexPersistence {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn generation_dir(&self, id: Uuid) -> PathBuf {
        self.root.join(format!("{}{}", GENERATION_PREFIX, id))
    }

    /// Persist a generation and make it current
    pub fn save(&self, generation: &IndexGeneration) -> Result<PathBuf> {
        let id = generation.id();
        let dir = self.generation_dir(id);
        fs::create_dir_all(&dir).map_err(|e| artifact_error(&dir, e))?;

        write_json(
            &dir.join(PASSAGES_FILE),
            &Artifact {
                generation_id: id,
                data: generation.passages(),
            },
        )?;
        write_json(
            &dir.join(LEXICAL_FILE),
            &Artifact {
                generation_id: id,
                data: generation.lexical(),
            },
        )?;
        write_json(
            &dir.join(SEMANTIC_FILE),
            &Artifact {
                generation_id: id,
                data: SemanticArtifact {
                    ids: generation.passages().iter().map(|p| p.id.clone()).collect(),
                    index: generation.semantic(),
                },
            },
        )?;
        write_json(&dir.join(METADATA_FILE), generation.metadata())?;

        // Publish last
        let dir_name = format!("{}{}", GENERATION_PREFIX, id);
        write_atomic(&self.root.join(CURRENT_FILE), dir_name.as_bytes())?;

        info!(
            generation = %id,
            path = %dir.display(),
            passages = generation.passages().len(),
            "Index generation saved"
        );
        Ok(dir)
    }

    /// Directory of the current generation, if any has been saved
    fn current_dir(&self) -> Result<Option<PathBuf>> {
        let pointer = self.root.join(CURRENT_FILE);
        if !pointer.exists() {
            return Ok(None);
        }
        let name = fs::read_to_string(&pointer).map_err(|e| artifact_error(&pointer, e))?;
        let name = name.trim();
        if !name.starts_with(GENERATION_PREFIX) || name.contains(['/', '\\']) {
            return Err(artifact_error(&pointer, format!("invalid generation name {:?}", name)));
        }
        Ok(Some(self.root.join(name)))
    }

    /// Metadata of the current generation
    pub fn current_metadata(&self) -> Result<Option<IndexMetadata>> {
        match self.current_dir()? {
            Some(dir) => Ok(Some(read_json(&dir.join(METADATA_FILE))?)),
            None => Ok(None),
        }
    }

    /// Load the current generation, verifying that its artifacts belong together
    pub fn load_current(&self) -> Result<IndexGeneration> {
        let dir = self.current_dir()?.ok_or_else(|| AppError::IndexUnavailable {
            message: format!("no index has been built in {}", self.root.display()),
        })?;
        self.load_generation(&dir)
    }

    fn load_generation(&self, dir: &Path) -> Result<IndexGeneration> {
        let metadata_path = dir.join(METADATA_FILE);
        let metadata: IndexMetadata = read_json(&metadata_path)?;
        let id = metadata.generation_id;

        let passages_path = dir.join(PASSAGES_FILE);
        let passages: Artifact<Vec<Passage>> = read_json(&passages_path)?;
        check_generation(&passages_path, id, passages.generation_id)?;

        let lexical_path = dir.join(LEXICAL_FILE);
        let lexical: Artifact<LexicalIndex> = read_json(&lexical_path)?;
        check_generation(&lexical_path, id, lexical.generation_id)?;

        let semantic_path = dir.join(SEMANTIC_FILE);
        let semantic: Artifact<SemanticArtifact<SemanticIndex>> = read_json(&semantic_path)?;
        check_generation(&semantic_path, id, semantic.generation_id)?;

        let ids_match = semantic.data.ids.len() == passages.data.len()
            && semantic
                .data
                .ids
                .iter()
                .zip(&passages.data)
                .all(|(id, passage)| *id == passage.id);
        if !ids_match {
            return Err(AppError::IndexUnavailable {
                message: format!("{} does not match the passage order", semantic_path.display()),
            });
        }

        // Vector dimensions are checked on reassembly
        let (dimension, model, vectors) = semantic.data.index.into_parts();
        let semantic_index = SemanticIndex::from_parts(dimension, model, vectors)?;

        let generation = IndexGeneration::new(metadata, passages.data, lexical.data, semantic_index)?;
        info!(
            generation = %generation.id(),
            passages = generation.passages().len(),
            "Index generation loaded"
        );
        Ok(generation)
    }

    /// Whether the persisted generation is missing, unreadable, or built from
    /// different passages or with a different embedding model
    pub fn needs_rebuild(&self, passages: &[Passage], embedder: &dyn Embedder) -> bool {
        let metadata = match self.current_metadata() {
            Ok(Some(metadata)) => metadata,
            Ok(None) => return true,
            Err(e) => {
                warn!(error = %e, "Persisted index metadata unreadable");
                return true;
            }
        };

        let stale = metadata.corpus_fingerprint != corpus_fingerprint(passages)
            || metadata.embedding_model != embedder.model_name()
            || metadata.embedding_dimension != embedder.dimension();
        debug!(generation = %metadata.generation_id, stale = stale, "Checked persisted index");
        stale
    }

    /// Delete generation directories other than the current one
    pub fn remove_stale_generations(&self) -> Result<usize> {
        let Some(current) = self.current_dir()? else {
            return Ok(0);
        };

        let mut removed = 0;
        let entries = fs::read_dir(&self.root).map_err(|e| artifact_error(&self.root, e))?;
        for entry in entries {
            let path = entry.map_err(|e| artifact_error(&self.root, e))?.path();
            let is_generation = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(GENERATION_PREFIX));

            if path.is_dir() && is_generation && path != current {
                fs::remove_dir_all(&path).map_err(|e| artifact_error(&path, e))?;
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed = removed, "Stale index generations removed");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexBuilder;
    use crate::test_support::fixture_passages;
    use std::sync::Arc;
    use taxlex_common::config::IndexConfig;
    use taxlex_common::embeddings::HashingEmbedder;

    async fn build(embedder: &Arc<HashingEmbedder>) -> IndexGeneration {
        IndexBuilder::new(embedder.clone(), &IndexConfig::default(), 4)
            .build(fixture_passages())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = IndexPersistence::new(dir.path());
        let embedder = Arc::new(HashingEmbedder::new(96));
        let generation = build(&embedder).await;

        let saved = persistence.save(&generation).unwrap();
        assert!(saved.join(METADATA_FILE).exists());

        let loaded = persistence.load_current().unwrap();
        assert_eq!(loaded.id(), generation.id());
        assert_eq!(loaded.metadata(), generation.metadata());
        assert_eq!(loaded.passages(), generation.passages());
        assert_eq!(loaded.lexical(), generation.lexical());
        assert_eq!(loaded.semantic(), generation.semantic());
    }

    #[tokio::test]
    async fn test_missing_index_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = IndexPersistence::new(dir.path());

        let err = persistence.load_current().unwrap_err();
        assert!(err.needs_rebuild());
        assert!(persistence.current_metadata().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mixed_generations_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = IndexPersistence::new(dir.path());
        let embedder = Arc::new(HashingEmbedder::new(32));

        let old = build(&embedder).await;
        let new = build(&embedder).await;
        let old_dir = persistence.save(&old).unwrap();
        let new_dir = persistence.save(&new).unwrap();

        // A lexical index from another build must not be paired with these vectors
        fs::copy(old_dir.join(LEXICAL_FILE), new_dir.join(LEXICAL_FILE)).unwrap();
        assert!(matches!(
            persistence.load_current(),
            Err(AppError::IndexUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_corrupt_artifact_reported() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = IndexPersistence::new(dir.path());
        let generation = build(&Arc::new(HashingEmbedder::new(32))).await;
        let gen_dir = persistence.save(&generation).unwrap();

        fs::write(gen_dir.join(SEMANTIC_FILE), b"{not json").unwrap();
        let err = persistence.load_current().unwrap_err();
        assert!(matches!(err, AppError::Artifact { .. }));
        assert!(err.needs_rebuild());
    }

    #[tokio::test]
    async fn test_needs_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = IndexPersistence::new(dir.path());
        let embedder = Arc::new(HashingEmbedder::new(48));
        let passages = fixture_passages();

        assert!(persistence.needs_rebuild(&passages, embedder.as_ref()));

        persistence.save(&build(&embedder).await).unwrap();
        assert!(!persistence.needs_rebuild(&passages, embedder.as_ref()));

        let mut edited = passages.clone();
        edited.pop();
        assert!(persistence.needs_rebuild(&edited, embedder.as_ref()));
        assert!(persistence.needs_rebuild(&passages, &HashingEmbedder::new(64)));
    }

    #[tokio::test]
    async fn test_current_points_at_latest_and_stale_removed() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = IndexPersistence::new(dir.path());
        let embedder = Arc::new(HashingEmbedder::new(32));

        persistence.save(&build(&embedder).await).unwrap();
        let latest = build(&embedder).await;
        persistence.save(&latest).unwrap();

        assert_eq!(persistence.load_current().unwrap().id(), latest.id());
        assert_eq!(persistence.remove_stale_generations().unwrap(), 1);
        assert_eq!(persistence.load_current().unwrap().id(), latest.id());
    }
}
