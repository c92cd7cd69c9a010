//! Passage model: the immutable unit of retrieval

use crate::category::Category;
use crate::errors::{AppError, Result};
use crate::text::word_count;
use serde::{Deserialize, Serialize};

/// Tokens estimated per whitespace-separated word
pub const DEFAULT_TOKENS_PER_WORD: f32 = 1.3;

/// Approximate token count of a text
pub fn estimate_tokens(text: &str, tokens_per_word: f32) -> usize {
    (word_count(text) as f32 * tokens_per_word).ceil() as usize
}

/// Where a passage came from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_title: Option<String>,

    /// Position of the section within its file
    #[serde(default)]
    pub section_index: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

/// A chunk of statute text with its structural metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub id: String,
    pub text: String,
    /// Owning document (the act)
    pub act_name: String,
    pub section_number: Option<String>,
    pub category: Category,
    pub token_count: usize,
    #[serde(default)]
    pub file_metadata: FileMetadata,
}

impl Passage {
    /// Create a passage; text must contain something other than whitespace
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        act_name: impl Into<String>,
        section_number: Option<String>,
        category: Category,
    ) -> Result<Self> {
        let id = id.into();
        let text = text.into();
        if text.trim().is_empty() {
            return Err(AppError::Validation {
                message: format!("passage {} has empty text", id),
                field: Some("text".to_string()),
            });
        }

        let token_count = estimate_tokens(&text, DEFAULT_TOKENS_PER_WORD);
        Ok(Self {
            id,
            text,
            act_name: act_name.into(),
            section_number,
            category,
            token_count,
            file_metadata: FileMetadata::default(),
        })
    }

    pub fn with_file_metadata(mut self, file_metadata: FileMetadata) -> Self {
        self.file_metadata = file_metadata;
        self
    }

    /// Context header, e.g. `[Payroll Tax Act 2007, Section 15]`
    pub fn header(&self) -> String {
        match &self.section_number {
            Some(section) => format!("[{}, Section {}]", self.act_name, section),
            None => format!("[{}]", self.act_name),
        }
    }

    pub fn word_count(&self) -> usize {
        word_count(&self.text)
    }
}

/// Read-only enumerable of passages (markdown corpus, JSON export, fixtures)
pub trait PassageSource {
    fn load(&self) -> Result<Vec<Passage>>;
}

impl PassageSource for Vec<Passage> {
    fn load(&self) -> Result<Vec<Passage>> {
        Ok(self.clone())
    }
}
