//! Fixed-window chunker: the deterministic, dependency-free fallback.
//!
//! Accumulates document blocks into chunks under a character budget
//! (chars ≈ tokens × 4), flushing on overflow. A block larger than the
//! budget is hard-split into overlapping windows snapped to whitespace
//! and UTF-8 boundaries. Each draft carries the page/heading annotations
//! of the first block it contains.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ChunkDraft, DocBlock, NormalizedDocument};

use super::ChunkStrategy;

pub struct FixedWindowChunker {
    max_chars: usize,
    overlap_chars: usize,
}

impl FixedWindowChunker {
    pub fn new(max_chars: usize, overlap_chars: usize) -> Self {
        Self {
            max_chars,
            overlap_chars,
        }
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

/// Byte spans of overlapping windows over `text`, each at most
/// `max_chars` bytes, stepping `max_chars - overlap`. Window ends prefer
/// the last newline or space inside the window.
pub(crate) fn window_spans(text: &str, max_chars: usize, overlap: usize) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let step_back = overlap.min(max_chars.saturating_sub(1));
    let mut start = 0usize;

    while start < text.len() {
        let mut end = snap_to_char_boundary(text, (start + max_chars).min(text.len()));
        if end < text.len() {
            let window = &text[start..end];
            if let Some(pos) = window.rfind('\n').or_else(|| window.rfind(' ')) {
                if pos > 0 {
                    end = start + pos + 1;
                }
            }
        }
        if end <= start {
            // Pathological input (single token wider than the budget with
            // no break): advance one char to guarantee progress.
            end = text[start..]
                .char_indices()
                .nth(1)
                .map(|(i, _)| start + i)
                .unwrap_or(text.len());
        }
        spans.push((start, end));
        if end >= text.len() {
            break;
        }
        let next = end.saturating_sub(step_back).max(start + 1);
        start = snap_to_char_boundary(text, next);
    }

    spans
}

/// Split oversized text into overlapping window strings.
pub(crate) fn window_split(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    window_spans(text, max_chars, overlap)
        .into_iter()
        .map(|(s, e)| text[s..e].trim().to_string())
        .filter(|piece| !piece.is_empty())
        .collect()
}

fn draft_from(text: String, meta: &DocBlock) -> ChunkDraft {
    let mut draft = ChunkDraft::new(text);
    draft.page_number = meta.page_number;
    draft.section_heading = meta.section_heading.clone();
    draft.structural_type = meta.structural_type.clone();
    draft
}

#[async_trait]
impl ChunkStrategy for FixedWindowChunker {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn split(&self, doc: &NormalizedDocument) -> Result<Vec<ChunkDraft>> {
        let mut drafts: Vec<ChunkDraft> = Vec::new();
        let mut buffer = String::new();
        let mut buffer_meta: Option<DocBlock> = None;

        for block in &doc.blocks {
            let text = block.text.trim();
            if text.is_empty() {
                continue;
            }

            if text.len() > self.max_chars {
                if !buffer.is_empty() {
                    let meta = buffer_meta.take().unwrap_or_default();
                    drafts.push(draft_from(std::mem::take(&mut buffer), &meta));
                }
                for piece in window_split(text, self.max_chars, self.overlap_chars) {
                    drafts.push(draft_from(piece, block));
                }
                continue;
            }

            let would_be = if buffer.is_empty() {
                text.len()
            } else {
                buffer.len() + 2 + text.len()
            };
            if would_be > self.max_chars && !buffer.is_empty() {
                let meta = buffer_meta.take().unwrap_or_default();
                drafts.push(draft_from(std::mem::take(&mut buffer), &meta));
            }

            if buffer.is_empty() {
                buffer_meta = Some(block.clone());
            } else {
                buffer.push_str("\n\n");
            }
            buffer.push_str(text);
        }

        if !buffer.is_empty() {
            let meta = buffer_meta.take().unwrap_or_default();
            drafts.push(draft_from(buffer, &meta));
        }

        Ok(drafts)
    }
}
