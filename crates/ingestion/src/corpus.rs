//! Passage sources backed by files on disk

use crate::errors::IngestionError;
use crate::sections::SectionSplitter;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use taxlex_common::errors::Result;
use taxlex_common::passage::FileMetadata;
use taxlex_common::{Category, Passage, PassageSource};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const CORPUS_EXTENSIONS: &[&str] = &["md", "txt"];

/// Directory of statute documents, one act per file
#[derive(Debug)]
pub struct MarkdownCorpus {
    root: PathBuf,
    splitter: SectionSplitter,
}

impl MarkdownCorpus {
    pub fn new(root: impl Into<PathBuf>, max_section_chars: usize) -> Result<Self> {
        Ok(Self {
            root: root.into(),
            splitter: SectionSplitter::new(max_section_chars)?,
        })
    }

    /// Corpus files in sorted order
    fn files(&self) -> Vec<PathBuf> {
        WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable corpus entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| CORPUS_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            })
            .collect()
    }

    fn load_file(&self, path: &Path) -> std::result::Result<Vec<Passage>, IngestionError> {
        let text = std::fs::read_to_string(path).map_err(|source| IngestionError::ReadError {
            path: path.display().to_string(),
            source,
        })?;
        let file_size = std::fs::metadata(path).ok().map(|m| m.len());

        let relative = path
            .strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().replace(['_', '-'], " "))
            .unwrap_or_else(|| relative.clone());
        let act = self.splitter.act_name(&text).unwrap_or(stem);
        let category = Category::infer_from_name(&relative);

        let mut passages = Vec::new();
        for section in self.splitter.split(&text) {
            let passage = Passage::new(
                format!("{}#{}", relative, section.index),
                section.text,
                act.clone(),
                section.section_number,
                category,
            )?
            .with_file_metadata(FileMetadata {
                file_path: Some(relative.clone()),
                section_title: section.heading,
                section_index: section.index,
                file_size,
            });
            passages.push(passage);
        }

        debug!(file = %relative, act = %act, passages = passages.len(), "Corpus file loaded");
        Ok(passages)
    }
}

impl PassageSource for MarkdownCorpus {
    fn load(&self) -> Result<Vec<Passage>> {
        if !self.root.is_dir() {
            return Err(IngestionError::CorpusNotFound(self.root.display().to_string()).into());
        }

        let files = self.files();
        let mut passages = Vec::new();
        let mut failed = 0usize;
        for path in &files {
            match self.load_file(path) {
                Ok(mut loaded) => passages.append(&mut loaded),
                Err(e) => {
                    failed += 1;
                    warn!(file = %path.display(), error = %e, "Skipping corpus file");
                }
            }
        }

        info!(
            root = %self.root.display(),
            files = files.len(),
            failed,
            passages = passages.len(),
            "Markdown corpus loaded"
        );
        Ok(passages)
    }
}

/// One passage in a JSON corpus export
#[derive(Debug, Deserialize)]
struct PassageRecord {
    id: String,
    text: String,
    act_name: String,
    #[serde(default)]
    section_number: Option<String>,
    #[serde(default)]
    category: Option<Category>,
    #[serde(default)]
    file_metadata: FileMetadata,
}

/// JSON array of pre-split passages
#[derive(Debug, Clone)]
pub struct JsonCorpus {
    path: PathBuf,
}

impl JsonCorpus {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PassageSource for JsonCorpus {
    fn load(&self) -> Result<Vec<Passage>> {
        let path = self.path.display().to_string();
        let raw = std::fs::read_to_string(&self.path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                IngestionError::CorpusNotFound(path.clone())
            } else {
                IngestionError::ReadError {
                    path: path.clone(),
                    source,
                }
            }
        })?;
        let records: Vec<PassageRecord> =
            serde_json::from_str(&raw).map_err(|e| IngestionError::ParseError {
                path: path.clone(),
                message: e.to_string(),
            })?;

        let total = records.len();
        let passages: Vec<Passage> = records
            .into_iter()
            .filter_map(|record| {
                let category = record
                    .category
                    .unwrap_or_else(|| Category::infer_from_name(&record.act_name));
                match Passage::new(
                    record.id,
                    record.text,
                    record.act_name,
                    record.section_number,
                    category,
                ) {
                    Ok(passage) => Some(passage.with_file_metadata(record.file_metadata)),
                    Err(e) => {
                        warn!(error = %e, "Skipping corpus record");
                        None
                    }
                }
            })
            .collect();

        info!(path = %path, records = total, passages = passages.len(), "JSON corpus loaded");
        Ok(passages)
    }
}

/// Source for a corpus path: a `.json` file or a document directory
pub fn open_corpus(path: &Path, max_section_chars: usize) -> Result<Box<dyn PassageSource>> {
    if path.extension().is_some_and(|ext| ext == "json") {
        Ok(Box::new(JsonCorpus::new(path)))
    } else {
        Ok(Box::new(MarkdownCorpus::new(path, max_section_chars)?))
    }
}
