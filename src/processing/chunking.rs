//! Word-bounded chunking of merged page text.
//!
//! Text is first normalized into a word sequence (whitespace collapsed, characters outside
//! the allow-list stripped). Chunks are contiguous spans of that sequence, so every chunk
//! records its word offsets and how many leading words it repeats from its predecessor.
//!
//! - Paragraph-aware mode packs whole paragraphs (separated by blank lines or form feeds)
//!   into chunks of at most `max_chunk_size` words, carrying the tail of the last paragraph
//!   forward as overlap. Paragraphs that exceed the bound are windowed on their own.
//! - Fixed-window mode slides a `max_chunk_size` window forward by
//!   `max_chunk_size - overlap` words until a window reaches the end of the text.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::similarity::normalized_words;
use super::types::{ConfigurationError, MergedResult, TextChunk};

const FORM_FEED: char = '\u{000C}';

/// Chunk sizing; all sizes are in words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Upper bound on words per chunk.
    pub max_chunk_size: usize,
    /// Trailing fixed-window chunks shorter than this are dropped.
    pub min_chunk_size: usize,
    /// Words repeated between adjacent chunks.
    pub overlap: usize,
    /// Pack whole paragraphs instead of sliding a fixed window.
    pub respect_paragraphs: bool,
}

impl ChunkerConfig {
    /// Derive the minimum (a quarter) and overlap (a tenth) from `max_chunk_size`.
    pub fn with_max_chunk_size(max_chunk_size: usize) -> Self {
        Self {
            max_chunk_size,
            min_chunk_size: max_chunk_size / 4,
            overlap: max_chunk_size / 10,
            respect_paragraphs: true,
        }
    }

    /// Reject sizes that cannot produce progress or contradict each other.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_chunk_size == 0 {
            return Err(ConfigurationError::InvalidChunkSize);
        }
        if self.overlap >= self.max_chunk_size {
            return Err(ConfigurationError::OverlapTooLarge {
                overlap: self.overlap,
                max_chunk_size: self.max_chunk_size,
            });
        }
        if self.min_chunk_size > self.max_chunk_size {
            return Err(ConfigurationError::MinChunkExceedsMax {
                min_chunk_size: self.min_chunk_size,
                max_chunk_size: self.max_chunk_size,
            });
        }
        Ok(())
    }
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self::with_max_chunk_size(1000)
    }
}

/// Splits page text into bounded, overlapping chunks.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
    overlap: usize,
}

impl Span {
    fn len(&self) -> usize {
        self.end - self.start
    }
}

impl Chunker {
    /// Build a chunker after validating its configuration.
    pub fn new(config: ChunkerConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Active configuration.
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunk the text of a merged page.
    pub fn chunk_merged(&self, merged: &MergedResult) -> Vec<TextChunk> {
        self.chunk(&merged.text_content, merged.page_number)
    }

    /// Chunk `text` belonging to `page_number`. Empty text yields no chunks.
    pub fn chunk(&self, text: &str, page_number: u32) -> Vec<TextChunk> {
        let paragraphs = split_paragraphs(text);
        let mut words: Vec<String> = Vec::new();
        let mut ranges = Vec::with_capacity(paragraphs.len());
        for paragraph in paragraphs {
            let start = words.len();
            words.extend(paragraph);
            ranges.push((start, words.len()));
        }
        if words.is_empty() {
            return Vec::new();
        }

        let spans = if self.config.respect_paragraphs {
            self.paragraph_spans(&ranges)
        } else {
            self.fixed_spans(words.len())
        };

        tracing::trace!(
            page = page_number,
            words = words.len(),
            chunks = spans.len(),
            "Chunked page text"
        );

        spans
            .into_iter()
            .enumerate()
            .map(|(chunk_index, span)| build_chunk(&words, span, page_number, chunk_index))
            .collect()
    }

    fn fixed_spans(&self, word_count: usize) -> Vec<Span> {
        let mut spans = windows(
            0,
            word_count,
            self.config.max_chunk_size,
            self.config.overlap,
        );
        if spans.len() > 1
            && spans
                .last()
                .is_some_and(|span| span.len() < self.config.min_chunk_size)
        {
            spans.pop();
        }
        spans
    }

    fn paragraph_spans(&self, paragraphs: &[(usize, usize)]) -> Vec<Span> {
        let max = self.config.max_chunk_size;
        let overlap = self.config.overlap;
        let mut spans: Vec<Span> = Vec::new();
        let mut current: Option<Span> = None;
        // Tail words of the most recent paragraph that may be repeated as overlap.
        let mut carry = 0usize;

        for &(start, end) in paragraphs {
            let len = end - start;
            if let Some(span) = current.as_mut()
                && span.len() + len <= max
            {
                span.end = end;
                carry = len.min(overlap);
                continue;
            }
            if let Some(span) = current.take() {
                spans.push(span);
            }

            if len > max {
                spans.extend(windows(start, end, max, overlap));
                carry = len.min(overlap);
                continue;
            }

            let lead = if spans.is_empty() || carry + len > max {
                0
            } else {
                carry
            };
            current = Some(Span {
                start: start - lead,
                end,
                overlap: lead,
            });
            carry = len.min(overlap);
        }

        if let Some(span) = current {
            spans.push(span);
        }
        spans
    }
}

/// Windows of at most `size` words over `[start, end)`, each repeating `overlap` words.
fn windows(start: usize, end: usize, size: usize, overlap: usize) -> Vec<Span> {
    let step = size - overlap;
    let mut spans = Vec::new();
    let mut cursor = start;
    let mut previous_end = start;
    while cursor < end {
        let window_end = (cursor + size).min(end);
        spans.push(Span {
            start: cursor,
            end: window_end,
            overlap: previous_end.saturating_sub(cursor),
        });
        if window_end == end {
            break;
        }
        previous_end = window_end;
        cursor += step;
    }
    spans
}

fn split_paragraphs(text: &str) -> Vec<Vec<String>> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<String> = Vec::new();
    for page in text.split(FORM_FEED) {
        for line in page.lines() {
            if line.trim().is_empty() {
                flush_paragraph(&mut current, &mut paragraphs);
            } else {
                current.extend(normalized_words(line));
            }
        }
        flush_paragraph(&mut current, &mut paragraphs);
    }
    paragraphs
}

fn flush_paragraph(current: &mut Vec<String>, paragraphs: &mut Vec<Vec<String>>) {
    if !current.is_empty() {
        paragraphs.push(std::mem::take(current));
    }
}

fn build_chunk(words: &[String], span: Span, page_number: u32, chunk_index: usize) -> TextChunk {
    let content = words[span.start..span.end].join(" ");
    TextChunk {
        character_count: content.chars().count(),
        chunk_hash: chunk_hash(&content),
        content,
        page_number,
        chunk_index,
        word_count: span.len(),
        has_overlap: span.overlap > 0,
        overlap_words: span.overlap,
        start_offset: span.start,
        end_offset: span.end,
    }
}

/// Hex-encoded SHA-256 of the chunk content.
pub fn chunk_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
