//! Statute section splitting
//!
//! Splits a statute document into sections at structural boundaries and
//! breaks oversized sections into smaller passages.

use crate::errors::IngestionError;
use regex_lite::Regex;
use text_splitter::{Characters, ChunkConfig, MarkdownSplitter};
use tracing::debug;

const HEADING: &str = r"^#{1,3}\s+(?P<title>.+)$";
const STRUCTURAL: &str = r"^(?:Section\s+\d+|PART\s+[IVX]+\b|Chapter\s+\d+)";
const SECTION_NUMBER: &str = r"Section\s+(?P<number>\d+[A-Z]*)";
const ACT_WORD: &str = r"\bAct\b";

/// A section of statute text
#[derive(Debug, Clone, PartialEq)]
pub struct StatuteSection {
    /// Boundary line that opened the section, without markdown markers
    pub heading: Option<String>,
    pub section_number: Option<String>,
    pub text: String,
    /// Position within the document, counting split parts separately
    pub index: usize,
}

struct RawSection<'a> {
    heading: Option<&'a str>,
    lines: Vec<&'a str>,
    has_body: bool,
}

fn compile(pattern: &str) -> Result<Regex, IngestionError> {
    Regex::new(pattern).map_err(|e| {
        IngestionError::SplittingError(format!("invalid pattern {}: {}", pattern, e))
    })
}

/// Splits documents at headings, `Section N` lines and PART/Chapter lines
pub struct SectionSplitter {
    heading: Regex,
    structural: Regex,
    section_number: Regex,
    act_word: Regex,
    splitter: MarkdownSplitter<Characters>,
    max_section_chars: usize,
}

impl std::fmt::Debug for SectionSplitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectionSplitter")
            .field("max_section_chars", &self.max_section_chars)
            .finish_non_exhaustive()
    }
}

impl SectionSplitter {
    /// Splitter producing sections of at most `max_section_chars` characters
    pub fn new(max_section_chars: usize) -> Result<Self, IngestionError> {
        if max_section_chars == 0 {
            return Err(IngestionError::SplittingError(
                "maximum section size must be positive".to_string(),
            ));
        }

        Ok(Self {
            heading: compile(HEADING)?,
            structural: compile(STRUCTURAL)?,
            section_number: compile(SECTION_NUMBER)?,
            act_word: compile(ACT_WORD)?,
            splitter: MarkdownSplitter::new(ChunkConfig::new(max_section_chars)),
            max_section_chars,
        })
    }

    /// Section title when a line starts a new section
    fn boundary_title<'a>(&self, line: &'a str) -> Option<&'a str> {
        if let Some(caps) = self.heading.captures(line) {
            return caps.name("title").map(|m| m.as_str().trim());
        }
        self.structural.is_match(line).then_some(line)
    }

    /// Section number cited in a heading, e.g. `11` or `3A`
    pub fn section_number(&self, heading: &str) -> Option<String> {
        self.section_number
            .captures(heading)
            .and_then(|caps| caps.name("number"))
            .map(|m| m.as_str().to_string())
    }

    /// Act name from the first markdown heading naming an act
    pub fn act_name(&self, text: &str) -> Option<String> {
        text.lines()
            .filter_map(|line| self.heading.captures(line.trim()))
            .filter_map(|caps| caps.name("title").map(|m| m.as_str().trim().to_string()))
            .find(|title| self.act_word.is_match(title))
    }

    /// Split a document into sections.
    ///
    /// Sections holding nothing but their heading are dropped.
    pub fn split(&self, text: &str) -> Vec<StatuteSection> {
        let mut raw = vec![RawSection {
            heading: None,
            lines: Vec::new(),
            has_body: false,
        }];
        for line in text.lines() {
            let trimmed = line.trim();
            if let Some(title) = self.boundary_title(trimmed) {
                raw.push(RawSection {
                    heading: Some(title),
                    lines: vec![trimmed],
                    has_body: false,
                });
            } else if let Some(current) = raw.last_mut() {
                if !trimmed.is_empty() {
                    current.has_body = true;
                }
                current.lines.push(line.trim_end());
            }
        }

        let mut sections = Vec::new();
        for section in raw.into_iter().filter(|s| s.has_body) {
            let body = section.lines.join("\n");
            let body = body.trim();
            let number = section.heading.and_then(|h| self.section_number(h));
            let heading = section.heading.map(str::to_string);

            if body.chars().count() <= self.max_section_chars {
                sections.push(StatuteSection {
                    heading,
                    section_number: number,
                    text: body.to_string(),
                    index: sections.len(),
                });
                continue;
            }

            let parts: Vec<&str> = self.splitter.chunks(body).collect();
            debug!(
                heading = heading.as_deref().unwrap_or(""),
                chars = body.len(),
                parts = parts.len(),
                "Oversized section split"
            );
            for part in parts {
                sections.push(StatuteSection {
                    heading: heading.clone(),
                    section_number: number.clone(),
                    text: part.to_string(),
                    index: sections.len(),
                });
            }
        }

        sections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(max: usize) -> SectionSplitter {
        SectionSplitter::new(max).unwrap()
    }

    const DOCUMENT: &str = "\
# Payroll Tax Act 2007

An Act to impose payroll tax.

## Section 6 Wages liable to payroll tax

Payroll tax is imposed on taxable wages.

## Section 11 Rate of payroll tax

The rate of payroll tax is 5.45%.

Section 11A Concessional rate

A concessional rate applies to apprentices.

PART II ADMINISTRATION
";

    #[test]
    fn test_splits_on_headings_and_section_lines() {
        let sections = splitter(2000).split(DOCUMENT);
        let numbers: Vec<Option<&str>> =
            sections.iter().map(|s| s.section_number.as_deref()).collect();

        assert_eq!(numbers, vec![None, Some("6"), Some("11"), Some("11A")]);
        assert_eq!(sections[0].heading.as_deref(), Some("Payroll Tax Act 2007"));
        assert!(sections[2].text.starts_with("## Section 11 Rate of payroll tax"));
        assert!(sections[2].text.contains("5.45%"));
        assert_eq!(sections[3].index, 3);
    }

    #[test]
    fn test_heading_only_sections_dropped() {
        let sections = splitter(500)
            .split("# Fines Act 1996\n## Section 1\n\n## Section 2\nText.");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].section_number.as_deref(), Some("2"));
    }

    #[test]
    fn test_preamble_kept_without_heading() {
        let sections = splitter(500)
            .split("Introductory notes.\n\nSection 3 Definitions\nIn this Act...");
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].heading, None);
        assert_eq!(sections[0].text, "Introductory notes.");
    }

    #[test]
    fn test_oversized_section_split() {
        let body = "The Chief Commissioner may assess the liability of a taxpayer. ".repeat(40);
        let text = format!("## Section 9 Assessments\n\n{}", body);
        let sections = splitter(300).split(&text);

        assert!(sections.len() > 1);
        for (i, section) in sections.iter().enumerate() {
            assert!(section.text.chars().count() <= 300);
            assert_eq!(section.section_number.as_deref(), Some("9"));
            assert_eq!(section.index, i);
        }
    }

    #[test]
    fn test_zero_limit_rejected() {
        assert!(matches!(
            SectionSplitter::new(0),
            Err(IngestionError::SplittingError(_))
        ));
    }

    #[test]
    fn test_act_name() {
        let splitter = splitter(2000);
        assert_eq!(splitter.act_name(DOCUMENT).as_deref(), Some("Payroll Tax Act 2007"));
        assert_eq!(splitter.act_name("## Part 1 Preliminary\nNo title here"), None);
        assert_eq!(
            splitter.section_number("Section 31 Imposition of duty"),
            Some("31".to_string())
        );
        assert_eq!(splitter.section_number("Schedule 1"), None);
    }
}
