//! Semantic boundary detection for markdown-ish text.
//!
//! Boundaries are candidate split points for the chunker: paragraph breaks,
//! headings and sentence ends, each with a priority so the chunker can
//! prefer the strongest boundary that still fits the token budget.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::chunker::ChunkType;

static PARAGRAPH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{2,}").unwrap());
static HEADING_MD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#{1,6}[ \t]+\S.*$").unwrap());
static HEADING_UNDERLINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^.+\n[=-]{3,}[ \t]*$").unwrap());
// Terminal punctuation, whitespace, then an uppercase letter (any script,
// accented included); the boundary sits on the uppercase letter.
static SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?][ \t\r\n]+(\p{Lu})").unwrap());
static CODE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```([A-Za-z0-9_+#.-]*)[ \t]*\r?\n(?s:.*?)```").unwrap());
static LIST_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*[-*•][ \t]+").unwrap());
static NUMBERED_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*\d+[.)][ \t]+").unwrap());

pub const PRIORITY_PARAGRAPH: u8 = 10;
pub const PRIORITY_HEADING: u8 = 9;
pub const PRIORITY_SENTENCE: u8 = 5;

/// Kind of semantic boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryKind {
    Paragraph,
    Heading,
    SentenceEnd,
}

/// A candidate split point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    /// Byte offset into the scanned text
    pub position: usize,
    pub kind: BoundaryKind,
    pub priority: u8,
}

/// A fenced code block span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSpan {
    pub start: usize,
    pub end: usize,
    /// Language declared after the opening fence, if any
    pub language: Option<String>,
}

/// Detects semantic boundaries in text.
pub struct BoundaryDetector;

impl BoundaryDetector {
    /// Find all semantic boundaries, sorted by position.
    pub fn find_boundaries(text: &str) -> Vec<Boundary> {
        let mut boundaries = Vec::new();

        for m in PARAGRAPH.find_iter(text) {
            boundaries.push(Boundary {
                position: m.start(),
                kind: BoundaryKind::Paragraph,
                priority: PRIORITY_PARAGRAPH,
            });
        }

        for m in HEADING_MD.find_iter(text) {
            boundaries.push(Boundary {
                position: m.start(),
                kind: BoundaryKind::Heading,
                priority: PRIORITY_HEADING,
            });
        }
        for m in HEADING_UNDERLINE.find_iter(text) {
            boundaries.push(Boundary {
                position: m.start(),
                kind: BoundaryKind::Heading,
                priority: PRIORITY_HEADING,
            });
        }

        for cap in SENTENCE_END.captures_iter(text) {
            if let Some(upper) = cap.get(1) {
                boundaries.push(Boundary {
                    position: upper.start(),
                    kind: BoundaryKind::SentenceEnd,
                    priority: PRIORITY_SENTENCE,
                });
            }
        }

        boundaries.sort_by_key(|b| b.position);
        boundaries
    }

    /// Locate fenced code blocks with their declared languages.
    pub fn find_code_blocks(text: &str) -> Vec<CodeSpan> {
        CODE_BLOCK
            .captures_iter(text)
            .filter_map(|cap| {
                let whole = cap.get(0)?;
                let language = cap
                    .get(1)
                    .map(|l| l.as_str())
                    .filter(|l| !l.is_empty())
                    .map(str::to_string);
                Some(CodeSpan {
                    start: whole.start(),
                    end: whole.end(),
                    language,
                })
            })
            .collect()
    }

    /// Classify a span of text by its dominant content.
    pub fn detect_chunk_type(text: &str) -> ChunkType {
        let code_chars: usize = Self::find_code_blocks(text)
            .iter()
            .map(|b| b.end - b.start)
            .sum();
        let code_ratio = code_chars as f64 / text.len().max(1) as f64;

        if code_ratio > 0.5 {
            return ChunkType::Code;
        }

        let list_lines = LIST_ITEM.find_iter(text).count() + NUMBERED_ITEM.find_iter(text).count();
        if list_lines > 3 {
            return ChunkType::List;
        }

        if HEADING_MD.is_match(text) {
            return ChunkType::Heading;
        }

        if code_ratio > 0.1 {
            return ChunkType::Mixed;
        }

        ChunkType::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_has_no_boundaries() {
        assert!(BoundaryDetector::find_boundaries("").is_empty());
    }

    #[test]
    fn paragraph_breaks_found_at_run_start() {
        let text = "First paragraph.\n\nSecond paragraph.";
        let boundaries = BoundaryDetector::find_boundaries(text);
        let para: Vec<_> = boundaries
            .iter()
            .filter(|b| b.kind == BoundaryKind::Paragraph)
            .collect();
        assert_eq!(para.len(), 1);
        assert_eq!(para[0].position, 16);
        assert_eq!(para[0].priority, PRIORITY_PARAGRAPH);
    }

    #[test]
    fn markdown_headings_found() {
        let text = "intro\n## Section Two\nbody";
        let boundaries = BoundaryDetector::find_boundaries(text);
        assert!(boundaries
            .iter()
            .any(|b| b.kind == BoundaryKind::Heading && b.position == 6));
    }

    #[test]
    fn underlined_headings_found() {
        let text = "intro\n\nTitle Line\n=====\nbody";
        let boundaries = BoundaryDetector::find_boundaries(text);
        assert!(boundaries.iter().any(|b| b.kind == BoundaryKind::Heading));

        let dashed = "intro\n\nOther Title\n---\nbody";
        let boundaries = BoundaryDetector::find_boundaries(dashed);
        assert!(boundaries.iter().any(|b| b.kind == BoundaryKind::Heading));
    }

    #[test]
    fn short_underline_is_not_a_heading() {
        let text = "Title\n--\nbody";
        let boundaries = BoundaryDetector::find_boundaries(text);
        assert!(!boundaries.iter().any(|b| b.kind == BoundaryKind::Heading));
    }

    #[test]
    fn sentence_end_sits_on_following_uppercase() {
        let text = "One sentence. Another one.";
        let boundaries = BoundaryDetector::find_boundaries(text);
        let sentence: Vec<_> = boundaries
            .iter()
            .filter(|b| b.kind == BoundaryKind::SentenceEnd)
            .collect();
        assert_eq!(sentence.len(), 1);
        // Position of the 'A' in "Another"
        assert_eq!(sentence[0].position, 14);
    }

    #[test]
    fn sentence_end_accepts_accented_uppercase() {
        let text = "Erster Satz. Über den zweiten.";
        let boundaries = BoundaryDetector::find_boundaries(text);
        assert!(boundaries
            .iter()
            .any(|b| b.kind == BoundaryKind::SentenceEnd));
    }

    #[test]
    fn lowercase_continuation_is_not_a_sentence_end() {
        let text = "See e.g. the appendix for details.";
        let boundaries = BoundaryDetector::find_boundaries(text);
        assert!(!boundaries
            .iter()
            .any(|b| b.kind == BoundaryKind::SentenceEnd));
    }

    #[test]
    fn boundaries_sorted_by_position() {
        let text = "# Head\n\nSentence one. Two here.\n\n## More\ntext";
        let boundaries = BoundaryDetector::find_boundaries(text);
        assert!(boundaries.windows(2).all(|w| w[0].position <= w[1].position));
    }

    #[test]
    fn code_blocks_located_with_language() {
        let text = "before\n```rust\nfn main() {}\n```\nafter";
        let blocks = BoundaryDetector::find_code_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].language.as_deref(), Some("rust"));
        assert_eq!(&text[blocks[0].start..blocks[0].end], "```rust\nfn main() {}\n```");
    }

    #[test]
    fn bare_fence_has_no_language() {
        let text = "```\nplain\n```";
        let blocks = BoundaryDetector::find_code_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].language.is_none());
    }

    #[test]
    fn unclosed_fence_is_ignored() {
        let text = "```rust\nfn main() {}\n";
        assert!(BoundaryDetector::find_code_blocks(text).is_empty());
    }

    #[test]
    fn detect_type_code_dominated() {
        let text = "```rust\nfn a() {}\nfn b() {}\nfn c() {}\n```\nok";
        assert_eq!(BoundaryDetector::detect_chunk_type(text), ChunkType::Code);
    }

    #[test]
    fn detect_type_list() {
        let text = "- one\n- two\n- three\n- four\n- five\n";
        assert_eq!(BoundaryDetector::detect_chunk_type(text), ChunkType::List);
    }

    #[test]
    fn detect_type_few_bullets_is_text() {
        let text = "- one\n- two\nplain prose follows here\n";
        assert_eq!(BoundaryDetector::detect_chunk_type(text), ChunkType::Text);
    }

    #[test]
    fn detect_type_heading() {
        let text = "# Title\nSome prose under the title goes here.";
        assert_eq!(
            BoundaryDetector::detect_chunk_type(text),
            ChunkType::Heading
        );
    }

    #[test]
    fn detect_type_mixed() {
        let prose = "word ".repeat(10);
        let text = format!("{prose}\n```\nlet x = 1;\n```\n{prose}");
        assert_eq!(
            BoundaryDetector::detect_chunk_type(&text),
            ChunkType::Mixed
        );
    }

    #[test]
    fn detect_type_plain_text() {
        let text = "Nothing but ordinary prose in this span.";
        assert_eq!(BoundaryDetector::detect_chunk_type(text), ChunkType::Text);
    }
}
