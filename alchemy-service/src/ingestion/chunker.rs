//! Semantic chunking of markdown and plain text.
//!
//! Sections are cut at headings. A section that fits the budget becomes one
//! chunk; a larger one is windowed over its paragraphs, carrying whole
//! trailing paragraphs into the next window as overlap.

use super::sections::split_by_headings;
use crate::config::ChunkingConfig;
use crate::schemas::DocumentChunk;

/// Coarse token estimate: one token per four characters, at least one.
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() / 4).max(1)
}

/// Split `text` into ordered chunks of at most `chunk_size` estimated tokens.
///
/// A single paragraph larger than `chunk_size` is emitted whole. Empty or
/// whitespace-only input yields no chunks.
pub fn chunk(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<DocumentChunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut push = |body: &str, section: Option<&str>, tokens: usize| {
        chunks.push(DocumentChunk {
            index: chunks.len(),
            text: body.trim().to_string(),
            section: section.map(str::to_string),
            tokens,
        });
    };

    for section in split_by_headings(text) {
        let tokens = estimate_tokens(section.body);
        if tokens <= chunk_size {
            push(section.body, section.heading, tokens);
            continue;
        }

        for window in sliding_window(section.body, chunk_size, chunk_overlap) {
            push(&window, section.heading, estimate_tokens(&window));
        }
    }

    chunks
}

/// Greedy paragraph windows with whole-paragraph overlap.
fn sliding_window(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let paragraphs = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty());

    let mut windows = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_tokens = 0;

    for paragraph in paragraphs {
        let tokens = estimate_tokens(paragraph);

        if current_tokens + tokens > chunk_size && !current.is_empty() {
            windows.push(current.join("\n\n"));

            let mut carried = 0;
            let mut keep = 0;
            for previous in current.iter().rev() {
                let previous_tokens = estimate_tokens(previous);
                if carried + previous_tokens > chunk_overlap {
                    break;
                }
                carried += previous_tokens;
                keep += 1;
            }
            current.drain(..current.len() - keep);
            current_tokens = carried;
        }

        current.push(paragraph);
        current_tokens += tokens;
    }

    if !current.is_empty() {
        windows.push(current.join("\n\n"));
    }

    windows
}

/// Chunker bound to a fixed size and overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemanticChunker {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl SemanticChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    pub fn chunk(&self, text: &str) -> Vec<DocumentChunk> {
        chunk(text, self.chunk_size, self.chunk_overlap)
    }
}

impl Default for SemanticChunker {
    fn default() -> Self {
        Self::from(&ChunkingConfig::default())
    }
}

impl From<&ChunkingConfig> for SemanticChunker {
    fn from(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }
}
