//! Greedy windowed chunking with boundary snapping
//!
//! Splits a document into overlapping windows of at most `max_size`
//! characters. The window start advances by `max_size - overlap` each step;
//! a window's cut point prefers natural boundaries, searched in order:
//! paragraph break, sentence end, line break, word boundary, raw character.
//! The snap search is bounded by `overlap` characters, which keeps coverage
//! gap-free, and with `overlap = 0` windows are exact.
//!
//! All sizes and offsets are in characters, not bytes; slicing is always
//! UTF-8 safe.

use askdoc_core::{Chunk, Document, RagError, Result};

/// Sentence-level break patterns, tried after paragraph breaks
const SENTENCE_BREAKS: [&str; 5] = [". ", "。", "! ", "? ", "\n"];

/// A window over the source text, in both character and byte offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    char_start: usize,
    char_end: usize,
    byte_start: usize,
    byte_end: usize,
}

/// Windowed text splitter
#[derive(Debug, Clone)]
pub struct Chunker {
    max_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a chunker, validating the window parameters
    pub fn new(max_size: usize, overlap: usize) -> Result<Self> {
        if max_size == 0 {
            return Err(RagError::InvalidConfiguration(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if overlap >= max_size {
            return Err(RagError::InvalidConfiguration(format!(
                "chunk overlap ({overlap}) must be smaller than chunk size ({max_size})"
            )));
        }
        Ok(Self { max_size, overlap })
    }

    /// Maximum chunk size in characters
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Overlap between consecutive chunks in characters
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split a document into chunks
    ///
    /// Every character of the input appears in at least one chunk; an empty
    /// document yields no chunks.
    pub fn split(&self, document: &Document) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = self
            .spans(&document.content)
            .into_iter()
            .enumerate()
            .map(|(i, span)| {
                Chunk::new(
                    document.id,
                    i as u32,
                    document.content[span.byte_start..span.byte_end].to_string(),
                    span.char_start,
                    span.char_end,
                )
            })
            .collect();

        tracing::debug!(
            source = %document.source,
            chunks = chunks.len(),
            max_size = self.max_size,
            overlap = self.overlap,
            "document split"
        );

        chunks
    }

    /// Compute the window spans for a text
    fn spans(&self, text: &str) -> Vec<Span> {
        if text.is_empty() {
            return Vec::new();
        }

        // bounds[i] = byte offset of the i-th character, bounds[m] = len
        let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        bounds.push(text.len());
        let total_chars = bounds.len() - 1;

        let stride = self.max_size - self.overlap;
        let mut spans = Vec::new();
        let mut start = 0usize;
        loop {
            let hard_end = (start + self.max_size).min(total_chars);
            let end = if hard_end == total_chars {
                total_chars
            } else {
                self.snap(text, &bounds, start, hard_end)
            };

            spans.push(Span {
                char_start: start,
                char_end: end,
                byte_start: bounds[start],
                byte_end: bounds[end],
            });

            if hard_end == total_chars {
                break;
            }

            // The snap search never reaches back past `start + stride`, so
            // the next window always begins inside the current chunk.
            start += stride;
        }

        spans
    }

    /// Pick a cut point at or before `hard_end`, preferring natural
    /// boundaries. Returns a character index in `(start, hard_end]`.
    fn snap(&self, text: &str, bounds: &[usize], start: usize, hard_end: usize) -> usize {
        let window = self.overlap.min(hard_end - start - 1);
        if window == 0 {
            return hard_end;
        }

        let lo = bounds[hard_end - window];
        let hi = bounds[hard_end];
        let tail = &text[lo..hi];

        if let Some(pos) = tail.rfind("\n\n") {
            return char_index(bounds, lo + pos + 2);
        }

        for pattern in SENTENCE_BREAKS {
            if let Some(pos) = tail.rfind(pattern) {
                return char_index(bounds, lo + pos + pattern.len());
            }
        }

        if let Some(pos) = tail.rfind(' ') {
            return char_index(bounds, lo + pos + 1);
        }

        hard_end
    }
}

/// Map a byte offset (always a character boundary here) back to its
/// character index.
fn char_index(bounds: &[usize], byte_offset: usize) -> usize {
    bounds
        .binary_search(&byte_offset)
        .unwrap_or_else(|insertion| insertion)
}
