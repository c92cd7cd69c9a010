//! Statute citation extraction
//!
//! Finds references such as "Payroll Tax Act 2007 section 11",
//! "s 31(2)(a) of the Duties Act 1997" or a bare "section 12(1)" in retrieved
//! passages and generated answers, and checks each cited act against the
//! known-acts table.

pub mod acts;
pub mod relationships;

use crate::retrieval::RetrievalContext;
use regex_lite::{Captures, Regex};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use taxlex_common::errors::{AppError, Result};
use tracing::debug;

/// Citations returned per extraction
pub const MAX_CITATIONS: usize = 5;

/// Words swept into an act name match at the start of a sentence
const LEADING_WORDS: &[&str] = &["The", "In", "Under", "See", "By", "And", "Of", "Per"];

const ACT: &str = r"(?P<act>(?:\(?[A-Z][A-Za-z]*\)?\s+)+Act\b)";
const SECTION: &str = r"(?P<section>\d+[A-Z]*)(?P<sub>(?:\([a-z0-9]+\))*)";

/// How a citation names its section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    /// Spelled out as "section"
    Direct,
    /// Abbreviated ("s", "s.")
    Indirect,
}

/// A reference to a provision of an act
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    /// Act name including its year when known
    pub act_name: String,
    pub year: Option<i32>,
    pub section: Option<String>,

    /// Parenthesised subdivisions, e.g. `(2)(a)`
    pub subsection: Option<String>,

    pub confidence: f32,
    pub is_current: bool,

    /// Found in the known-acts table
    pub recognized: bool,

    pub revenue_related: bool,
    pub reference_type: ReferenceType,
}

impl Citation {
    /// Resolve a cited act; `None` when it is neither known nor plausible
    fn resolve(
        act_name: String,
        year: Option<i32>,
        section: Option<String>,
        subsection: Option<String>,
        reference_type: ReferenceType,
    ) -> Option<Self> {
        let known = acts::lookup(&act_name);
        if known.is_none() && !acts::is_plausible(&act_name, year) {
            debug!(act = %act_name, "Dropping implausible act citation");
            return None;
        }

        let mut confidence: f32 = 0.5;
        if known.is_some() {
            confidence += 0.3;
        }
        if section.is_some() {
            confidence += 0.2;
        }
        if reference_type == ReferenceType::Direct {
            confidence += 0.1;
        }

        Some(Self {
            act_name,
            year,
            section,
            subsection,
            confidence: confidence.min(1.0),
            is_current: known.map_or(true, |k| k.current),
            recognized: known.is_some(),
            revenue_related: known.is_some_and(|k| k.revenue),
            reference_type,
        })
    }

    fn key(&self) -> (String, Option<String>, Option<String>) {
        (
            self.act_name.to_lowercase(),
            self.section.clone(),
            self.subsection.clone(),
        )
    }
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.act_name)?;
        if let Some(section) = &self.section {
            write!(f, " s {}", section)?;
        }
        if let Some(subsection) = &self.subsection {
            write!(f, "{}", subsection)?;
        }
        Ok(())
    }
}

struct CitationPattern {
    regex: Regex,
    /// Pattern names no act; the caller's default act applies
    needs_default_act: bool,
}

/// Citation extractor; patterns are tried in priority order
pub struct CitationExtractor {
    patterns: Vec<CitationPattern>,
}

impl CitationExtractor {
    pub fn new() -> Result<Self> {
        let sources = [
            // Payroll Tax Act 2007 (NSW) section 11(1)
            (
                format!(r"{ACT}\s+(?P<year>\d{{4}})(?:\s+\(NSW\))?\s+(?i:section|s\.?)\s*{SECTION}"),
                false,
            ),
            // section 31 of the Duties Act 1997
            (
                format!(r"\b(?i:section|s\.?)\s*{SECTION}\s+of\s+the\s+{ACT}(?:\s+(?P<year>\d{{4}}))?"),
                false,
            ),
            // Duties Act s 31
            (format!(r"{ACT}\s+(?i:section|s\.?)\s*{SECTION}"), false),
            // section 12(1)
            (format!(r"\b(?i:section|s\.)\s*{SECTION}"), true),
        ];

        let patterns = sources
            .into_iter()
            .map(|(source, needs_default_act)| {
                Regex::new(&source)
                    .map(|regex| CitationPattern {
                        regex,
                        needs_default_act,
                    })
                    .map_err(|e| AppError::Internal {
                        message: format!("invalid citation pattern: {}", e),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { patterns })
    }

    /// Citations in free text, in order of appearance, deduplicated, at most five
    pub fn extract(&self, text: &str) -> Vec<Citation> {
        finalize(self.scan(text, None))
    }

    /// Like [`extract`](Self::extract), attributing bare section references to `default_act`
    pub fn extract_with_default_act(&self, text: &str, default_act: &str) -> Vec<Citation> {
        finalize(self.scan(text, Some(default_act)))
    }

    /// Citations for a retrieval: kept passages' own act and section first,
    /// then references inside the context text
    pub fn extract_from_context(&self, context: &RetrievalContext) -> Vec<Citation> {
        let from_metadata = context.passages().filter_map(|passage| {
            let section = passage.section_number.clone()?;
            Citation::resolve(
                passage.act_name.clone(),
                acts::trailing_year(&passage.act_name),
                Some(section),
                None,
                ReferenceType::Direct,
            )
        });

        let from_text = context
            .passages()
            .flat_map(|passage| self.scan(&passage.text, Some(&passage.act_name)));

        finalize(from_metadata.chain(from_text).collect())
    }

    fn scan(&self, text: &str, default_act: Option<&str>) -> Vec<Citation> {
        let mut claimed: Vec<(usize, usize)> = Vec::new();
        let mut found: Vec<(usize, Citation)> = Vec::new();

        for pattern in &self.patterns {
            for caps in pattern.regex.captures_iter(text) {
                let Some(whole) = caps.get(0) else {
                    continue;
                };
                let (start, end) = (whole.start(), whole.end());
                if claimed.iter().any(|&(s, e)| start < e && s < end) {
                    continue;
                }
                // A rejected match still claims its span
                claimed.push((start, end));

                if let Some(citation) = citation_from(&caps, pattern.needs_default_act, default_act) {
                    found.push((start, citation));
                }
            }
        }

        found.sort_by_key(|(start, _)| *start);
        found.into_iter().map(|(_, citation)| citation).collect()
    }
}

fn citation_from(caps: &Captures<'_>, needs_default_act: bool, default_act: Option<&str>) -> Option<Citation> {
    let section = caps.name("section").map(|m| m.as_str().to_string());
    let subsection = caps
        .name("sub")
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let reference_type = if caps[0].to_lowercase().contains("section") {
        ReferenceType::Direct
    } else {
        ReferenceType::Indirect
    };

    let (act_name, year) = if needs_default_act {
        let act = default_act?;
        (act.to_string(), acts::trailing_year(act))
    } else {
        let name = clean_act_name(caps.name("act")?.as_str());
        let year: Option<i32> = caps.name("year").and_then(|y| y.as_str().parse().ok());
        match year {
            Some(year) => (format!("{} {}", name, year), Some(year)),
            None => (name, None),
        }
    };

    Citation::resolve(act_name, year, section, subsection, reference_type)
}

/// Collapse whitespace and drop sentence words caught before the act name
fn clean_act_name(raw: &str) -> String {
    let mut words: Vec<&str> = raw.split_whitespace().collect();
    while words.len() > 2 && LEADING_WORDS.contains(&words[0]) {
        words.remove(0);
    }
    words.join(" ")
}

fn finalize(citations: Vec<Citation>) -> Vec<Citation> {
    let mut seen = HashSet::new();
    citations
        .into_iter()
        .filter(|c| seen.insert(c.key()))
        .take(MAX_CITATIONS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{Evidence, RetrievedPassage};
    use taxlex_common::{Category, Passage};
    use uuid::Uuid;

    fn extractor() -> CitationExtractor {
        CitationExtractor::new().unwrap()
    }

    #[test]
    fn test_full_citation() {
        let citations = extractor().extract("Under the Payroll Tax Act 2007 section 11 the rate is 5.45%.");
        assert_eq!(citations.len(), 1);

        let c = &citations[0];
        assert_eq!(c.act_name, "Payroll Tax Act 2007");
        assert_eq!(c.year, Some(2007));
        assert_eq!(c.section.as_deref(), Some("11"));
        assert_eq!(c.reference_type, ReferenceType::Direct);
        assert!(c.recognized && c.is_current && c.revenue_related);
        assert_eq!(c.confidence, 1.0);
    }

    #[test]
    fn test_section_of_the_act() {
        let citations = extractor().extract("Liability arises under section 9 of the Land Tax Management Act 1956.");
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].act_name, "Land Tax Management Act 1956");
        assert_eq!(citations[0].section.as_deref(), Some("9"));
    }

    #[test]
    fn test_unknown_act_confidence() {
        let citations = extractor().extract("See Conveyancing Act 2019 s. 23A(2)(b).");
        assert_eq!(citations.len(), 1);

        let c = &citations[0];
        assert_eq!(c.act_name, "Conveyancing Act 2019");
        assert_eq!(c.section.as_deref(), Some("23A"));
        assert_eq!(c.subsection.as_deref(), Some("(2)(b)"));
        assert_eq!(c.reference_type, ReferenceType::Indirect);
        assert!(!c.recognized);
        assert!(c.is_current);
        assert!((c.confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_superseded_act_flagged() {
        let citations = extractor().extract("Stamp Duties Act 1920 s 5 imposed duty on instruments.");
        assert_eq!(citations.len(), 1);
        assert!(!citations[0].is_current);
        assert!(citations[0].recognized);
    }

    #[test]
    fn test_implausible_act_dropped() {
        assert!(extractor().extract("Conveyancing Act 1919 section 5").is_empty());
    }

    #[test]
    fn test_leading_article_stripped() {
        let citations = extractor().extract("The Duties Act 1997 section 31 applies.");
        assert_eq!(citations[0].act_name, "Duties Act 1997");
    }

    #[test]
    fn test_deduplicated_and_capped() {
        let text = "Duties Act 1997 section 31. Duties Act 1997 section 31. \
                    Payroll Tax Act 2007 section 11, Payroll Tax Act 2007 section 12, \
                    Fines Act 1996 section 14, Fines Act 1996 section 15, \
                    Land Tax Act 1956 section 3, Land Tax Act 1956 section 4.";
        let citations = extractor().extract(text);

        assert_eq!(citations.len(), MAX_CITATIONS);
        assert_eq!(citations[0].section.as_deref(), Some("31"));
        assert_eq!(citations[1].section.as_deref(), Some("11"));
    }

    #[test]
    fn test_bare_section_needs_default_act() {
        let text = "Refer to section 12(1) for exemptions.";
        assert!(extractor().extract(text).is_empty());

        let citations = extractor().extract_with_default_act(text, "Duties Act 1997");
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].act_name, "Duties Act 1997");
        assert_eq!(citations[0].subsection.as_deref(), Some("(1)"));
        assert_eq!(citations[0].year, Some(1997));
    }

    #[test]
    fn test_higher_priority_pattern_consumes_overlap() {
        // The bare "section 9" inside the full reference must not yield a second citation
        let citations = extractor().extract_with_default_act(
            "section 9 of the Land Tax Management Act 1956",
            "Duties Act 1997",
        );
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].act_name, "Land Tax Management Act 1956");
    }

    #[test]
    fn test_extract_from_context() {
        let passage = Passage::new(
            "pt-11",
            "The rate is 5.45%. Wages are grouped as set out in section 70 of the Payroll Tax Act 2007.",
            "Payroll Tax Act 2007",
            Some("11".to_string()),
            Category::PayrollTax,
        )
        .unwrap();
        let context = RetrievalContext {
            query: "payroll tax rate".to_string(),
            category: Category::PayrollTax,
            classification_confidence: 0.9,
            classification_degraded: false,
            retrieved_chunks: vec![RetrievedPassage {
                passage,
                lexical_score: 1.0,
                semantic_score: 0.8,
                fused_score: 0.016,
                final_score: 0.366,
            }],
            total_search_time_ms: 3,
            context_text: String::new(),
            estimated_tokens: 0,
            relevance_score: 0.7,
            fallback_used: false,
            evidence: Evidence::Sufficient,
            generation_id: Uuid::nil(),
        };

        let citations = extractor().extract_from_context(&context);
        let sections: Vec<&str> = citations.iter().filter_map(|c| c.section.as_deref()).collect();
        assert_eq!(sections, vec!["11", "70"]);
        assert_eq!(citations[0].to_string(), "Payroll Tax Act 2007 s 11");
    }
}
