//! Semantic chunking engine.
//!
//! Splits long documents into token-bounded chunks along semantic
//! boundaries, with configurable overlap between consecutive chunks and
//! protection for fenced code blocks.
//!
//! # Design
//!
//! - Documents under the token budget pass through as a single chunk
//! - Fenced code blocks are atomic up to 1.5x the budget, then split by
//!   whole lines
//! - Text between code blocks is walked boundary-to-boundary, preferring
//!   the strongest boundary (paragraph > heading > sentence) that still
//!   fits the budget
//! - The next chunk starts inside the previous one's tail so context
//!   carries over
//!
//! Chunking never fails: empty input yields no chunks and pattern misses
//! degrade to hard character cuts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::boundary::{Boundary, BoundaryDetector};
use crate::config::ChunkingConfig;
use crate::tokens::TokenEstimator;

/// Chunks whose cursor lands this close to the segment end absorb the tail
/// instead of spawning a micro-chunk.
const TAIL_MIN_BYTES: usize = 10;

/// Classification of chunk content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Text,
    Code,
    Heading,
    List,
    Mixed,
}

impl ChunkType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Code => "code",
            Self::Heading => "heading",
            Self::List => "list",
            Self::Mixed => "mixed",
        }
    }
}

/// A bounded contiguous span of the source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    /// 1-based, contiguous across the whole document
    pub index: usize,
    pub content: String,
    /// Token count/estimate for `content`
    pub tokens: usize,
    /// Byte offsets into the source document
    pub start: usize,
    pub end: usize,
    pub kind: ChunkType,
    pub has_overlap_before: bool,
    pub has_overlap_after: bool,
}

/// Aggregate statistics over a chunk list.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChunkStats {
    pub chunk_count: usize,
    pub total_tokens: usize,
    pub avg_tokens: usize,
    pub min_tokens: usize,
    pub max_tokens: usize,
    pub total_chars: usize,
    pub types: BTreeMap<&'static str, usize>,
}

impl ChunkStats {
    pub fn from_chunks(chunks: &[TextChunk]) -> Self {
        if chunks.is_empty() {
            return Self::default();
        }
        let total_tokens: usize = chunks.iter().map(|c| c.tokens).sum();
        let mut types = BTreeMap::new();
        for chunk in chunks {
            *types.entry(chunk.kind.as_str()).or_insert(0) += 1;
        }
        Self {
            chunk_count: chunks.len(),
            total_tokens,
            avg_tokens: total_tokens / chunks.len(),
            min_tokens: chunks.iter().map(|c| c.tokens).min().unwrap_or(0),
            max_tokens: chunks.iter().map(|c| c.tokens).max().unwrap_or(0),
            total_chars: chunks.iter().map(|c| c.content.len()).sum(),
            types,
        }
    }
}

/// Semantic text chunker.
pub struct Chunker {
    max_tokens: usize,
    overlap_tokens: usize,
    estimator: TokenEstimator,
}

impl Chunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            overlap_tokens: config.overlap_tokens,
            estimator: TokenEstimator::new(config),
        }
    }

    /// Chunker with explicit limits and the default approximation ratio.
    pub fn with_limits(max_tokens: usize, overlap_tokens: usize) -> Self {
        Self {
            max_tokens,
            overlap_tokens,
            estimator: TokenEstimator::approximate(3.5),
        }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Count tokens with the configured estimator.
    pub fn count(&self, text: &str) -> usize {
        self.estimator.count(text)
    }

    /// Split a document into chunks.
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        if text.is_empty() {
            return Vec::new();
        }

        let total_tokens = self.count(text);
        if total_tokens <= self.max_tokens {
            return vec![TextChunk {
                index: 1,
                content: text.to_string(),
                tokens: total_tokens,
                start: 0,
                end: text.len(),
                kind: BoundaryDetector::detect_chunk_type(text),
                has_overlap_before: false,
                has_overlap_after: false,
            }];
        }

        debug!(
            total_tokens,
            approx_chunks = total_tokens / self.max_tokens + 1,
            "chunking document"
        );

        let code_blocks = BoundaryDetector::find_code_blocks(text);
        let mut chunks = Vec::new();
        let mut last_end = 0;

        for block in &code_blocks {
            if block.start > last_end {
                chunks.extend(self.walk_segment(&text[last_end..block.start], last_end));
            }
            chunks.extend(self.chunk_code(&text[block.start..block.end], block.start));
            last_end = block.end;
        }
        if last_end < text.len() {
            chunks.extend(self.walk_segment(&text[last_end..], last_end));
        }

        for (i, chunk) in chunks.iter_mut().enumerate() {
            chunk.index = i + 1;
        }

        debug!(chunks = chunks.len(), "chunking complete");
        chunks
    }

    /// Threshold check plus chunking in one call. Returns whether the text
    /// was actually split; below the threshold the whole text comes back as
    /// a single chunk.
    pub fn chunk_for_processing(&self, text: &str, threshold: usize) -> (bool, Vec<TextChunk>) {
        if text.is_empty() {
            return (false, Vec::new());
        }
        if !self.estimator.needs_chunking(text, threshold) {
            return (
                false,
                vec![TextChunk {
                    index: 1,
                    content: text.to_string(),
                    tokens: self.count(text),
                    start: 0,
                    end: text.len(),
                    kind: BoundaryDetector::detect_chunk_type(text),
                    has_overlap_before: false,
                    has_overlap_after: false,
                }],
            );
        }
        (true, self.chunk(text))
    }

    /// Walk a text segment boundary-to-boundary. `offset` translates
    /// segment-local positions into document offsets.
    fn walk_segment(&self, segment: &str, offset: usize) -> Vec<TextChunk> {
        if segment.is_empty() {
            return Vec::new();
        }

        let boundaries = BoundaryDetector::find_boundaries(segment);
        let seg_len = segment.len();
        let mut chunks = Vec::new();
        let mut cursor = 0usize;

        while cursor < seg_len {
            let remaining = &segment[cursor..];
            if self.count(remaining) <= self.max_tokens || seg_len - cursor <= TAIL_MIN_BYTES {
                chunks.push(self.make_chunk(segment, cursor, seg_len, offset));
                break;
            }

            let end = self.find_chunk_end(segment, cursor, &boundaries);
            if end <= cursor {
                // Cannot make progress; emit the rest as one chunk.
                chunks.push(self.make_chunk(segment, cursor, seg_len, offset));
                break;
            }
            chunks.push(self.make_chunk(segment, cursor, end, offset));

            let next = self.find_overlap_start(segment, end);
            cursor = if next > cursor && next < end { next } else { end };
        }

        // Overlap flags are pairwise facts, set once the spans are known.
        for i in 1..chunks.len() {
            if chunks[i].start < chunks[i - 1].end {
                chunks[i - 1].has_overlap_after = true;
                chunks[i].has_overlap_before = true;
            }
        }

        chunks
    }

    fn make_chunk(&self, segment: &str, start: usize, end: usize, offset: usize) -> TextChunk {
        let content = segment[start..end].to_string();
        let tokens = self.count(&content);
        TextChunk {
            index: 0,
            tokens,
            start: offset + start,
            end: offset + end,
            kind: BoundaryDetector::detect_chunk_type(&content),
            has_overlap_before: false,
            has_overlap_after: false,
            content,
        }
    }

    /// Find the best end for a chunk starting at `start`: the strongest
    /// boundary within the character budget whose span still fits the token
    /// budget, else the weakest boundary in range, else a hard cut backed
    /// off to whitespace.
    fn find_chunk_end(&self, segment: &str, start: usize, boundaries: &[Boundary]) -> usize {
        let max_chars = (self.max_tokens as f64 * self.estimator.chars_per_token()) as usize;
        let hard_end = floor_char_boundary(segment, (start + max_chars).min(segment.len()));

        let mut relevant: Vec<&Boundary> = boundaries
            .iter()
            .filter(|b| b.position > start && b.position < hard_end)
            .collect();

        if relevant.is_empty() {
            // Hard cut: back off to whitespace, but never more than halfway
            // toward the cursor.
            let floor = start + max_chars / 2;
            let bytes = segment.as_bytes();
            let mut cut = hard_end;
            while cut > floor {
                if cut < segment.len() && bytes[cut].is_ascii_whitespace() {
                    break;
                }
                cut -= 1;
            }
            let cut = floor_char_boundary(segment, cut);
            return if cut > start { cut } else { hard_end };
        }

        // Strongest first; ties toward the larger position.
        relevant.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.position.cmp(&a.position))
        });

        for boundary in &relevant {
            if self.count(&segment[start..boundary.position]) <= self.max_tokens {
                return boundary.position;
            }
        }

        // Nothing fits: take the weakest boundary rather than a mid-word cut.
        relevant.last().map(|b| b.position).unwrap_or(hard_end)
    }

    /// Start position for the next chunk: step back by the overlap budget
    /// from `end`, then snap forward to the first boundary in the window,
    /// or the first whitespace if the window has no boundary.
    fn find_overlap_start(&self, segment: &str, end: usize) -> usize {
        if self.overlap_tokens == 0 || end >= segment.len() {
            return end;
        }

        let overlap_chars =
            (self.overlap_tokens as f64 * self.estimator.chars_per_token()) as usize;
        let window_start = floor_char_boundary(segment, end.saturating_sub(overlap_chars));

        let window = &segment[window_start..end];
        if let Some(first) = BoundaryDetector::find_boundaries(window).first() {
            return window_start + first.position;
        }

        let bytes = segment.as_bytes();
        for i in window_start..end {
            if bytes[i].is_ascii_whitespace() {
                return i + 1;
            }
        }

        end
    }

    /// Emit a code block as one chunk when it fits the tolerance, else
    /// split it greedily by whole lines.
    fn chunk_code(&self, code: &str, offset: usize) -> Vec<TextChunk> {
        let tokens = self.count(code);
        let tolerance = self.max_tokens + self.max_tokens / 2;
        if tokens <= tolerance {
            return vec![TextChunk {
                index: 0,
                content: code.to_string(),
                tokens,
                start: offset,
                end: offset + code.len(),
                kind: ChunkType::Code,
                has_overlap_before: false,
                has_overlap_after: false,
            }];
        }

        let mut chunks = Vec::new();
        let mut piece_start = 0usize;
        let mut cursor = 0usize;
        let mut piece_tokens = 0usize;

        for line in code.split_inclusive('\n') {
            let line_tokens = self.count(line);
            if piece_tokens + line_tokens > self.max_tokens && cursor > piece_start {
                chunks.push(TextChunk {
                    index: 0,
                    content: code[piece_start..cursor].to_string(),
                    tokens: piece_tokens,
                    start: offset + piece_start,
                    end: offset + cursor,
                    kind: ChunkType::Code,
                    has_overlap_before: false,
                    has_overlap_after: false,
                });
                piece_start = cursor;
                piece_tokens = 0;
            }
            cursor += line.len();
            piece_tokens += line_tokens;
        }

        if cursor > piece_start {
            chunks.push(TextChunk {
                index: 0,
                content: code[piece_start..cursor].to_string(),
                tokens: piece_tokens,
                start: offset + piece_start,
                end: offset + cursor,
                kind: ChunkType::Code,
                has_overlap_before: false,
                has_overlap_after: false,
            });
        }

        chunks
    }
}

/// Snap a byte index down to the nearest UTF-8 character boundary.
fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    if idx >= text.len() {
        return text.len();
    }
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
