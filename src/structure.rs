//! Static document structure analysis.
//!
//! A cheap, pattern-based scan used by orchestrators to decide whether a
//! document warrants full chunked processing before any model is invoked.
//! Pure and read-only; no LLM involvement.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::boundary::BoundaryDetector;
use crate::tokens::TokenEstimator;

static HEADING_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,6})[ \t]+(.+)$").unwrap());
static TABLE_ROW: Lazy<Regex> = Lazy::new(|| Regex::new(r"\|.+\|.+\|").unwrap());
static LIST_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*[-*][ \t]+").unwrap());
static MARKDOWN_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]+\]\([^)]+\)").unwrap());

/// Fixed vocabulary probed case-insensitively for keyword hints.
const KEYWORD_VOCABULARY: &[&str] = &[
    "API", "REST", "HTTP", "JSON", "XML", "Docker", "Container", "Kubernetes", "Python",
    "JavaScript", "TypeScript", "Rust", "LLM", "AI", "ML", "GPT", "Claude", "RAG", "Database",
    "SQL", "PostgreSQL", "MongoDB", "Frontend", "Backend", "Server", "Client", "Memory", "Cache",
    "Storage", "Workspace", "Stream", "Async", "Layer", "Bridge",
];

const MAX_KEYWORDS: usize = 15;
const INTRO_SCAN_LINES: usize = 50;
const INTRO_MAX_CHARS: usize = 500;

/// Result of the static document scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentStructure {
    pub total_chars: usize,
    /// Fast ratio-based estimate
    pub total_tokens: usize,
    pub total_lines: usize,

    /// Titles of headings up to level 3, in document order
    pub headings: Vec<String>,
    pub heading_count: usize,
    pub code_blocks: usize,
    /// Distinct languages declared on code fences, sorted
    pub code_languages: Vec<String>,

    /// Leading non-heading, non-code prose (up to 500 chars)
    pub intro: String,
    pub keywords: Vec<String>,

    pub has_tables: bool,
    pub has_lists: bool,
    pub has_links: bool,
    /// 1 (trivial) to 10 (dense, long, code-heavy)
    pub estimated_complexity: u8,
}

impl DocumentStructure {
    /// Scan a document. Empty input yields the zeroed default.
    pub fn analyze(text: &str) -> Self {
        if text.is_empty() {
            return Self::default();
        }

        let estimator = TokenEstimator::default();
        let mut result = Self {
            total_chars: text.chars().count(),
            total_tokens: estimator.estimate_fast(text),
            total_lines: text.matches('\n').count() + 1,
            ..Self::default()
        };

        for line in text.lines() {
            if let Some(cap) = HEADING_LINE.captures(line.trim()) {
                let level = cap.get(1).map(|m| m.as_str().len()).unwrap_or(0);
                if level <= 3 {
                    if let Some(title) = cap.get(2) {
                        result.headings.push(title.as_str().trim().to_string());
                    }
                }
            }
        }
        result.heading_count = result.headings.len();

        result.code_blocks = text.matches("```").count() / 2;
        let mut languages: Vec<String> = BoundaryDetector::find_code_blocks(text)
            .into_iter()
            .filter_map(|b| b.language)
            .collect();
        languages.sort();
        languages.dedup();
        result.code_languages = languages;

        result.intro = extract_intro(text);
        result.keywords = probe_keywords(text);

        result.has_tables = text.contains('|') && TABLE_ROW.is_match(text);
        result.has_lists = LIST_LINE.is_match(text);
        result.has_links = MARKDOWN_LINK.is_match(text);

        result.estimated_complexity = estimate_complexity(&result);
        result
    }

    /// Render a deterministic digest suitable as model context.
    pub fn to_compact_summary(&self) -> String {
        let mut parts = vec![format!(
            "Document: {} chars, ~{} tokens, {} lines",
            self.total_chars, self.total_tokens, self.total_lines
        )];

        if !self.headings.is_empty() {
            parts.push(format!("Structure: {} headings", self.heading_count));
            let top: Vec<&str> = self.headings.iter().take(5).map(String::as_str).collect();
            parts.push(format!("Main topics: {}", top.join(", ")));
        }

        if self.code_blocks > 0 {
            let langs = if self.code_languages.is_empty() {
                "various".to_string()
            } else {
                self.code_languages
                    .iter()
                    .take(3)
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            parts.push(format!("Code: {} blocks ({})", self.code_blocks, langs));
        }

        if !self.keywords.is_empty() {
            let kws: Vec<&str> = self.keywords.iter().take(10).map(String::as_str).collect();
            parts.push(format!("Keywords: {}", kws.join(", ")));
        }

        if !self.intro.is_empty() {
            let preview: String = self.intro.chars().take(300).collect();
            parts.push(format!("Intro: {preview}..."));
        }

        parts.push(format!(
            "Estimated complexity: {}/10",
            self.estimated_complexity
        ));

        parts.join("\n")
    }
}

/// One-call digest of a document.
pub fn quick_summary(text: &str) -> String {
    DocumentStructure::analyze(text).to_compact_summary()
}

/// First stretch of contiguous non-heading, non-code prose.
fn extract_intro(text: &str) -> String {
    let mut intro_lines: Vec<&str> = Vec::new();
    let mut found_content = false;

    for line in text.lines().take(INTRO_SCAN_LINES) {
        let stripped = line.trim();
        if stripped.is_empty() {
            if found_content && !intro_lines.is_empty() {
                break;
            }
            continue;
        }
        if stripped.starts_with('#') {
            continue;
        }
        if stripped.contains("```") {
            break;
        }
        found_content = true;
        intro_lines.push(stripped);
        if intro_lines.iter().map(|l| l.len() + 1).sum::<usize>() > INTRO_MAX_CHARS {
            break;
        }
    }

    intro_lines
        .join(" ")
        .chars()
        .take(INTRO_MAX_CHARS)
        .collect()
}

fn probe_keywords(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut found: Vec<String> = KEYWORD_VOCABULARY
        .iter()
        .filter(|kw| lowered.contains(&kw.to_lowercase()))
        .map(|kw| kw.to_string())
        .collect();
    found.sort();
    found.truncate(MAX_KEYWORDS);
    found
}

fn estimate_complexity(s: &DocumentStructure) -> u8 {
    let mut complexity: u8 = 1;

    if s.total_tokens > 2000 {
        complexity += 1;
    }
    if s.total_tokens > 5000 {
        complexity += 1;
    }
    if s.total_tokens > 10000 {
        complexity += 2;
    }

    if s.heading_count > 5 {
        complexity += 1;
    }
    if s.heading_count > 15 {
        complexity += 1;
    }
    if s.code_blocks > 3 {
        complexity += 1;
    }
    if s.code_blocks > 10 {
        complexity += 1;
    }

    if s.has_tables {
        complexity += 1;
    }

    complexity.min(10)
}
