//! Separator-preferring, overlapping text chunker.
//!
//! Text is split on a separator (default `\n\n`), any piece longer than
//! `chunk_size` is hard-split at the last newline or space that fits, and
//! the pieces are then greedily merged back into segments of at most
//! `chunk_size` characters. Consecutive segments share up to
//! `chunk_overlap` characters of trailing pieces.
//!
//! Lengths are counted in characters, not bytes. Splitting is a pure
//! function of its input: identical text and parameters always produce the
//! same segments.
//!
//! [`build_chunks`] turns segments into [`RuleChunk`]s with a header line,
//! a random UUID, and a SHA-256 hash of the final text.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::models::{ChunkMetadata, RuleChunk, SourceFile};

#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separator: String,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize, separator: &str) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
            separator: separator.to_string(),
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap, &config.separator)
    }

    /// Split `text` into ordered segments. Empty or whitespace-only text
    /// yields no segments.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let pieces: Vec<&str> = if self.separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(self.separator.as_str()).collect()
        };

        let mut bounded = Vec::new();
        for piece in pieces.into_iter().filter(|p| !p.is_empty()) {
            if char_len(piece) > self.chunk_size {
                bounded.extend(hard_split(piece, self.chunk_size));
            } else {
                bounded.push(piece);
            }
        }

        self.merge(&bounded)
    }

    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let sep_len = char_len(&self.separator);
        let mut segments = Vec::new();
        let mut window: Vec<&str> = Vec::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            let joiner = if window.is_empty() { 0 } else { sep_len };

            if total + len + joiner > self.chunk_size && !window.is_empty() {
                if let Some(segment) = self.join(&window) {
                    segments.push(segment);
                }
                // Drop leading pieces until the remainder fits the overlap
                // and leaves room for the incoming piece.
                while total > self.chunk_overlap
                    || (total > 0
                        && total + len + if window.is_empty() { 0 } else { sep_len }
                            > self.chunk_size)
                {
                    let dropped = char_len(window[0]) + if window.len() > 1 { sep_len } else { 0 };
                    total -= dropped;
                    window.remove(0);
                }
            }

            window.push(piece);
            total += len + if window.len() > 1 { sep_len } else { 0 };
        }

        if let Some(segment) = self.join(&window) {
            segments.push(segment);
        }
        segments
    }

    fn join(&self, window: &[&str]) -> Option<String> {
        let joined = window.join(&self.separator);
        let trimmed = joined.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Break `text` into pieces of at most `max_chars`, preferring to cut just
/// after the last newline, then the last space, inside each window.
fn hard_split(text: &str, max_chars: usize) -> Vec<&str> {
    let mut out = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        let limit = remaining
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(remaining.len());
        let cut = if limit < remaining.len() {
            remaining[..limit]
                .rfind('\n')
                .or_else(|| remaining[..limit].rfind(' '))
                .map(|pos| pos + 1)
                .unwrap_or(limit)
        } else {
            limit
        };
        out.push(&remaining[..cut]);
        remaining = &remaining[cut..];
    }
    out
}

/// Header line prefixed to every persisted chunk. `chunk_index` is 0-based;
/// the header shows it 1-based.
pub fn chunk_header(filename: &str, category: &str, chunk_index: usize, total_chunks: usize) -> String {
    format!(
        "[File: {} | Type: {} | Chunk: {}/{}]\n",
        filename,
        category,
        chunk_index + 1,
        total_chunks
    )
}

/// File name component of a source path.
pub fn filename_of(file: &SourceFile) -> String {
    file.path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file.source.clone())
}

/// Extension with its leading dot (`.py`), or empty when there is none.
pub fn filetype_of(file: &SourceFile) -> String {
    file.path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default()
}

/// Wrap the segments of one file-pass into chunks. Every chunk of the pass
/// shares `total_chunks` and `timestamp`; indices run `0..total_chunks`.
pub fn build_chunks(file: &SourceFile, segments: Vec<String>, timestamp: &str) -> Vec<RuleChunk> {
    let filename = filename_of(file);
    let filetype = filetype_of(file);
    let total = segments.len();

    segments
        .into_iter()
        .enumerate()
        .map(|(i, segment)| {
            let text = format!(
                "{}{}",
                chunk_header(&filename, file.category.as_str(), i, total),
                segment
            );
            let content_hash = sha256_hex(&text);
            RuleChunk {
                id: Uuid::new_v4().to_string(),
                text,
                metadata: ChunkMetadata {
                    source: file.source.clone(),
                    filename: filename.clone(),
                    category: file.category,
                    filetype: filetype.clone(),
                    chunk_index: i,
                    total_chunks: total,
                    timestamp: timestamp.to_string(),
                },
                content_hash,
            }
        })
        .collect()
}

fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
