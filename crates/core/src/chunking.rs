use crate::error::ChunkingError;
use crate::extractor::PageText;
use crate::models::{Chunk, PipelineOptions};

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            chunk_overlap: 200,
        }
    }
}

impl From<&PipelineOptions> for ChunkingConfig {
    fn from(options: &PipelineOptions) -> Self {
        Self {
            chunk_size: options.chunk_size,
            chunk_overlap: options.chunk_overlap,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), ChunkingError> {
        if self.chunk_size == 0 {
            return Err(ChunkingError::InvalidConfig(
                "chunk_size must be positive".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ChunkingError::InvalidConfig(format!(
                "chunk_overlap {} must be smaller than chunk_size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    fn stride(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }
}

const SENTENCE_ENDS: [char; 3] = ['.', '!', '?'];

fn after_paragraph_break(chars: &[char], end: usize) -> bool {
    end >= 2 && chars[end - 1] == '\n' && chars[end - 2] == '\n'
}

fn after_line_break(chars: &[char], end: usize) -> bool {
    chars[end - 1] == '\n'
}

fn after_sentence_end(chars: &[char], end: usize) -> bool {
    SENTENCE_ENDS.contains(&chars[end - 1])
}

fn after_comma(chars: &[char], end: usize) -> bool {
    chars[end - 1] == ','
}

fn after_space(chars: &[char], end: usize) -> bool {
    chars[end - 1].is_whitespace()
}

/// Picks the window end: the nearest preferred boundary at or before
/// `edge`, trying separator classes in priority order. The search
/// never goes below `floor` (the next window's start), so no text can
/// fall between a snapped end and the following window.
fn snap_end(chars: &[char], floor: usize, edge: usize) -> usize {
    type Boundary = fn(&[char], usize) -> bool;
    const CLASSES: [Boundary; 5] = [
        after_paragraph_break,
        after_line_break,
        after_sentence_end,
        after_comma,
        after_space,
    ];

    for class in CLASSES {
        let mut end = edge;
        while end > floor {
            if class(chars, end) {
                return end;
            }
            end -= 1;
        }
    }

    edge
}

/// Splits text into windows of at most `chunk_size` characters.
/// Consecutive windows start `chunk_size - chunk_overlap` characters
/// apart, so neighbours share up to `chunk_overlap` characters of
/// context. A text shorter than `chunk_size` yields exactly one
/// chunk; empty input yields none; the final short window is kept.
pub fn split_text(text: &str, config: ChunkingConfig) -> Result<Vec<String>, ChunkingError> {
    config.validate()?;

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() <= config.chunk_size {
        return Ok(vec![trimmed.to_string()]);
    }

    let stride = config.stride();
    let mut windows = Vec::new();
    let mut start = 0usize;

    loop {
        if start + config.chunk_size >= chars.len() {
            windows.push(chars[start..].iter().collect());
            break;
        }

        let edge = start + config.chunk_size;
        let end = snap_end(&chars, start + stride, edge);
        windows.push(chars[start..end].iter().collect());
        start += stride;
    }

    Ok(windows)
}

/// Concatenates page texts and windows the result into sequenced
/// chunks for one document.
pub fn split_document(
    key: &str,
    pages: &[PageText],
    config: ChunkingConfig,
) -> Result<Vec<Chunk>, ChunkingError> {
    let full_text = pages
        .iter()
        .map(|page| page.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let windows = split_text(&full_text, config)?;

    Ok(windows
        .into_iter()
        .enumerate()
        .map(|(seq, text)| Chunk {
            text,
            source_key: key.to_string(),
            page: approximate_page(seq as u64),
            seq: seq as u64,
        })
        .collect())
}

/// Best-effort page attribution: roughly two default-size windows fit
/// on a page, so the sequence index maps to `seq / 2 + 1`. Metadata
/// only; nothing downstream may treat this as exact.
pub fn approximate_page(seq: u64) -> u32 {
    (seq / 2 + 1) as u32
}
