//! Lexical index: BM25 over tokenized passage text
//!
//! Postings and IDF values are held in ordered maps so a serialized index is
//! byte-stable for an unchanged passage set.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use taxlex_common::errors::{AppError, Result};
use taxlex_common::text::tokenize;
use taxlex_common::Passage;
use tracing::debug;

/// One occurrence list entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// Position of the passage in the generation's passage list
    pub doc: u32,
    pub term_frequency: u32,
}

/// Inverted index with BM25 scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexicalIndex {
    k1: f32,
    b: f32,
    postings: BTreeMap<String, Vec<Posting>>,
    idf: BTreeMap<String, f32>,
    doc_lengths: Vec<u32>,
    avg_doc_length: f32,
}

impl LexicalIndex {
    /// Build the index from all passages
    pub fn build(passages: &[Passage], k1: f32, b: f32) -> Self {
        let mut postings: BTreeMap<String, Vec<Posting>> = BTreeMap::new();
        let mut doc_lengths = Vec::with_capacity(passages.len());

        for (doc, passage) in passages.iter().enumerate() {
            let tokens = tokenize(&passage.text);
            doc_lengths.push(tokens.len() as u32);

            let mut frequencies: BTreeMap<String, u32> = BTreeMap::new();
            for token in tokens {
                *frequencies.entry(token).or_insert(0) += 1;
            }
            for (term, term_frequency) in frequencies {
                postings.entry(term).or_default().push(Posting {
                    doc: doc as u32,
                    term_frequency,
                });
            }
        }

        let n = passages.len() as f32;
        // IDF: ln((N - df + 0.5) / (df + 0.5) + 1), always positive
        let idf = postings
            .iter()
            .map(|(term, list)| {
                let df = list.len() as f32;
                (term.clone(), ((n - df + 0.5) / (df + 0.5) + 1.0).ln())
            })
            .collect();

        let total: u64 = doc_lengths.iter().map(|&l| l as u64).sum();
        let avg_doc_length = if doc_lengths.is_empty() {
            0.0
        } else {
            total as f32 / doc_lengths.len() as f32
        };

        debug!(
            documents = doc_lengths.len(),
            terms = postings.len(),
            avg_doc_length = avg_doc_length,
            "Lexical index built"
        );

        Self {
            k1,
            b,
            postings,
            idf,
            doc_lengths,
            avg_doc_length,
        }
    }

    pub fn doc_count(&self) -> usize {
        self.doc_lengths.len()
    }

    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    /// BM25 score per passage for a list of query terms.
    /// Only passages containing at least one term appear in the map.
    pub fn score(&self, terms: &[String]) -> HashMap<usize, f32> {
        let mut scores: HashMap<usize, f32> = HashMap::new();
        if self.doc_lengths.is_empty() {
            return scores;
        }
        let avgdl = if self.avg_doc_length > 0.0 { self.avg_doc_length } else { 1.0 };

        for term in terms {
            let (Some(list), Some(&idf)) = (self.postings.get(term), self.idf.get(term)) else {
                continue;
            };
            for posting in list {
                let dl = self.doc_lengths.get(posting.doc as usize).copied().unwrap_or(0) as f32;
                let tf = posting.term_frequency as f32;
                let tf_norm =
                    (tf * (self.k1 + 1.0)) / (tf + self.k1 * (1.0 - self.b + self.b * dl / avgdl));
                *scores.entry(posting.doc as usize).or_insert(0.0) += idf * tf_norm;
            }
        }

        scores
    }

    /// Top-k passages for raw query text, restricted by `allow`
    pub fn search<F>(&self, query: &str, k: usize, allow: F) -> Vec<(usize, f32)>
    where
        F: Fn(usize) -> bool,
    {
        self.search_terms(&tokenize(query), k, allow)
    }

    /// Top-k passages for pre-tokenized terms; ties broken by passage position
    pub fn search_terms<F>(&self, terms: &[String], k: usize, allow: F) -> Vec<(usize, f32)>
    where
        F: Fn(usize) -> bool,
    {
        if terms.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut results: Vec<(usize, f32)> = self
            .score(terms)
            .into_iter()
            .filter(|(doc, score)| *score > 0.0 && allow(*doc))
            .collect();
        results.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        results.truncate(k);
        results
    }

    /// Check that every posting references a live passage
    pub fn validate(&self, passage_count: usize) -> Result<()> {
        if self.doc_lengths.len() != passage_count {
            return Err(AppError::IndexUnavailable {
                message: format!(
                    "lexical index covers {} passages, generation has {}",
                    self.doc_lengths.len(),
                    passage_count
                ),
            });
        }
        let dangling = self
            .postings
            .values()
            .flatten()
            .any(|p| p.doc as usize >= passage_count);
        if dangling {
            return Err(AppError::IndexUnavailable {
                message: "lexical posting references a missing passage".to_string(),
            });
        }
        Ok(())
    }
}
