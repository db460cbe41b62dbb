//! Paragraph/sentence-boundary text chunker with overlap.
//!
//! Splits a [`Document`] into [`Chunk`]s no larger than a configurable
//! `max_tokens` body, preferring natural boundaries so facts are not cut in
//! half, and prefixing each chunk after the first with the tail of its
//! predecessor so a fact that straddles a boundary is still retrievable.
//!
//! # Algorithm
//!
//! 1. Convert `max_tokens` / `overlap_tokens` to characters (4 chars/token).
//! 2. Split text on `\n\n` paragraph boundaries.
//! 3. A paragraph longer than `max_chars` is split into sentences; a sentence
//!    still longer than `max_chars` is hard-split at the nearest newline or
//!    space before the limit.
//! 4. Accumulate segments into a body until adding the next would exceed
//!    `max_chars`, then flush.
//! 5. Prefix every body after the first with up to `overlap_chars` from the
//!    end of the previous body, starting on a word boundary.
//!
//! Empty or whitespace-only documents produce no chunks. Output is a pure
//! function of the input, so chunk IDs are reproducible across runs.
//!
//! # Example
//!
//! ```rust
//! use lore_core::chunk::{split, ChunkerConfig};
//! use lore_core::models::Document;
//!
//! let doc = Document::new("dragons.md", "A dragon guards the keep.\n\nIt sleeps by day.");
//! let chunks = split(&doc, &ChunkerConfig::default());
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].ordinal, 0);
//! ```

use crate::models::{Chunk, Document};

/// Approximate characters-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// Maximum body size per chunk, in tokens.
    pub max_tokens: usize,
    /// Tokens carried over from the previous chunk.
    pub overlap_tokens: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_tokens: 200,
            overlap_tokens: 20,
        }
    }
}

impl ChunkerConfig {
    pub fn max_chars(&self) -> usize {
        self.max_tokens.saturating_mul(CHARS_PER_TOKEN).max(1)
    }

    pub fn overlap_chars(&self) -> usize {
        self.overlap_tokens.saturating_mul(CHARS_PER_TOKEN)
    }
}

/// A piece of text no longer than `max_chars`.
struct Segment<'a> {
    text: &'a str,
    /// First segment of its paragraph.
    opens_paragraph: bool,
}

/// Split a document into ordered chunks with contiguous ordinals from 0.
pub fn split(document: &Document, config: &ChunkerConfig) -> Vec<Chunk> {
    let max_chars = config.max_chars();
    let overlap_chars = config.overlap_chars();

    let bodies = pack(segments(&document.content, max_chars), max_chars);

    let mut chunks = Vec::with_capacity(bodies.len());
    let mut previous: Option<&str> = None;
    for (ordinal, body) in bodies.iter().enumerate() {
        let text = match previous.map(|p| overlap_tail(p, overlap_chars)) {
            Some(tail) if !tail.is_empty() => format!("{} {}", tail, body),
            _ => body.clone(),
        };
        chunks.push(Chunk::new(&document.source_id, ordinal as u32, text));
        previous = Some(body.as_str());
    }
    chunks
}

fn segments(text: &str, max_chars: usize) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.len() <= max_chars {
            out.push(Segment {
                text: trimmed,
                opens_paragraph: true,
            });
            continue;
        }
        let mut first = true;
        for sentence in sentences(trimmed) {
            let pieces = if sentence.len() <= max_chars {
                vec![sentence]
            } else {
                hard_split(sentence, max_chars)
            };
            for piece in pieces {
                out.push(Segment {
                    text: piece,
                    opens_paragraph: first,
                });
                first = false;
            }
        }
    }
    out
}

fn pack(segments: Vec<Segment<'_>>, max_chars: usize) -> Vec<String> {
    let mut bodies = Vec::new();
    let mut buf = String::new();

    for seg in segments {
        let sep = if seg.opens_paragraph { "\n\n" } else { " " };
        let would_be = if buf.is_empty() {
            seg.text.len()
        } else {
            buf.len() + sep.len() + seg.text.len()
        };
        if would_be > max_chars && !buf.is_empty() {
            bodies.push(std::mem::take(&mut buf));
        }
        if !buf.is_empty() {
            buf.push_str(sep);
        }
        buf.push_str(seg.text);
    }
    if !buf.is_empty() {
        bodies.push(buf);
    }
    bodies
}

/// Split a paragraph after `.`, `!` or `?` followed by whitespace.
fn sentences(paragraph: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = paragraph.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(_, next)) = chars.peek() {
                if next.is_whitespace() {
                    let end = i + c.len_utf8();
                    let s = paragraph[start..end].trim();
                    if !s.is_empty() {
                        out.push(s);
                    }
                    start = end;
                }
            }
        }
    }
    let rest = paragraph[start..].trim();
    if !rest.is_empty() {
        out.push(rest);
    }
    out
}

/// Fixed-width windows, cut at the last newline or space before the limit.
fn hard_split(text: &str, max_chars: usize) -> Vec<&str> {
    let mut out = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        let limit = snap_to_char_boundary(remaining, remaining.len().min(max_chars));
        let cut = if limit < remaining.len() {
            remaining[..limit]
                .rfind('\n')
                .or_else(|| remaining[..limit].rfind(' '))
                .map(|pos| pos + 1)
                .unwrap_or(limit)
        } else {
            limit
        };
        // Always make progress, even when the first char is wider than the window.
        let cut = if cut == 0 {
            remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len())
        } else {
            cut
        };
        let piece = remaining[..cut].trim();
        if !piece.is_empty() {
            out.push(piece);
        }
        remaining = &remaining[cut..];
    }
    out
}

/// The last `overlap_chars` bytes of `body`, starting on a word boundary.
fn overlap_tail(body: &str, overlap_chars: usize) -> &str {
    if overlap_chars == 0 || body.is_empty() {
        return "";
    }
    if body.len() <= overlap_chars {
        return body;
    }
    let start = snap_forward(body, body.len() - overlap_chars);
    let tail = &body[start..];
    let preceded_by_space = body[..start].ends_with(char::is_whitespace);
    if preceded_by_space {
        return tail.trim();
    }
    match tail.find(char::is_whitespace) {
        Some(pos) => tail[pos..].trim(),
        None => "",
    }
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn snap_forward(s: &str, index: usize) -> usize {
    let mut i = index;
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(max_tokens: usize, overlap_tokens: usize) -> ChunkerConfig {
        ChunkerConfig {
            max_tokens,
            overlap_tokens,
        }
    }

    fn doc(text: &str) -> Document {
        Document::new("lore/test.md", text)
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = split(&doc("Hello, world!"), &cfg(200, 20));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].ordinal, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].source_id, "lore/test.md");
        assert!(!chunks[0].is_embedded());
    }

    #[test]
    fn test_empty_and_whitespace_produce_no_chunks() {
        assert!(split(&doc(""), &cfg(200, 20)).is_empty());
        assert!(split(&doc("  \n\n \t \n\n"), &cfg(200, 20)).is_empty());
    }

    #[test]
    fn test_paragraphs_packed_under_limit() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = split(&doc(text), &cfg(200, 0));
        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].text,
            "First paragraph.\n\nSecond paragraph.\n\nThird paragraph."
        );
    }

    #[test]
    fn test_paragraphs_exceed_limit() {
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        let chunks = split(&doc(text), &cfg(6, 0));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].text, "This is paragraph two.");
    }

    #[test]
    fn test_long_paragraph_splits_on_sentences() {
        let text = "The first king was crowned in winter. The second king burned the keep. \
                    The third king made peace with the dragons.";
        let chunks = split(&doc(text), &cfg(11, 0));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "The first king was crowned in winter.");
        assert_eq!(chunks[1].text, "The second king burned the keep.");
        assert_eq!(chunks[2].text, "The third king made peace with the dragons.");
    }

    #[test]
    fn test_oversized_sentence_hard_split_on_spaces() {
        let text = "word ".repeat(40);
        let chunks = split(&doc(&text), &cfg(5, 0));
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.len() <= 20, "chunk too long: {:?}", c.text);
            assert!(!c.text.starts_with(' ') && !c.text.ends_with(' '));
        }
    }

    #[test]
    fn test_overlap_carries_previous_tail() {
        let text = "Alpha knights ride north.\n\nBravo archers hold the wall.";
        let chunks = split(&doc(text), &cfg(7, 3));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "Alpha knights ride north.");
        assert!(chunks[1].text.ends_with("Bravo archers hold the wall."));
        assert!(
            chunks[1].text.starts_with("ride north."),
            "unexpected overlap: {:?}",
            chunks[1].text
        );
    }

    #[test]
    fn test_ordinals_contiguous() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = split(&doc(&text), &cfg(10, 2));
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.ordinal, i as u32, "Ordinal mismatch at position {}", i);
        }
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────────────┐\n│ Hello world      │\n└──────────────────┘";
        let chunks = split(&doc(text), &cfg(3, 1));
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(!c.text.is_empty());
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta. Gamma! Delta?\n\nEpsilon";
        let c1 = split(&doc(text), &cfg(2, 1));
        let c2 = split(&doc(text), &cfg(2, 1));
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_huge_token_budget_saturates() {
        let config = cfg(usize::MAX, usize::MAX - 1);
        assert_eq!(config.max_chars(), usize::MAX);
        assert_eq!(config.overlap_chars(), usize::MAX);
        let chunks = split(&doc("One paragraph.\n\nAnother one."), &config);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "One paragraph.\n\nAnother one.");
    }
}
