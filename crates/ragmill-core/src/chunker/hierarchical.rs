//! Hierarchical chunker: large parents for context, small children for
//! matching.
//!
//! Output layout: all parents first (unsearchable, never embedded), then
//! every child with `parent_index` pointing at its parent's position.
//! Only children enter the vector/lexical/fuzzy indexes; the query engine
//! resolves a matching child back to its parent's text at result
//! assembly. The back-reference is a weak link by position, not a copy of
//! the parent text.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ChunkDraft, NormalizedDocument};

use super::fixed::{window_split, FixedWindowChunker};
use super::ChunkStrategy;

pub struct HierarchicalChunker {
    parent_max_chars: usize,
    child_max_chars: usize,
}

impl HierarchicalChunker {
    pub fn new(parent_max_chars: usize, child_max_chars: usize) -> Self {
        Self {
            parent_max_chars,
            child_max_chars,
        }
    }
}

#[async_trait]
impl ChunkStrategy for HierarchicalChunker {
    fn name(&self) -> &'static str {
        "hierarchical"
    }

    async fn split(&self, doc: &NormalizedDocument) -> Result<Vec<ChunkDraft>> {
        let parent_splitter = FixedWindowChunker::new(self.parent_max_chars, 0);
        let mut parents = parent_splitter.split(doc).await?;

        for parent in &mut parents {
            parent.searchable = false;
            parent.structural_type = Some("parent".to_string());
        }

        let mut drafts = Vec::with_capacity(parents.len() * 2);
        let mut children = Vec::new();
        for (parent_pos, parent) in parents.iter().enumerate() {
            for piece in window_split(&parent.text, self.child_max_chars, 0) {
                let mut child = ChunkDraft::new(piece);
                child.parent_index = Some(parent_pos as i64);
                child.page_number = parent.page_number;
                child.section_heading = parent.section_heading.clone();
                child.structural_type = Some("child".to_string());
                children.push(child);
            }
        }

        drafts.extend(parents);
        drafts.extend(children);
        Ok(drafts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parents_precede_children_and_links_resolve() {
        let text = "Alpha sentence one. ".repeat(60); // ~1200 chars
        let chunker = HierarchicalChunker::new(600, 150);
        let drafts = chunker
            .split(&NormalizedDocument::from_text(&text))
            .await
            .unwrap();

        let parent_count = drafts.iter().filter(|d| !d.searchable).count();
        assert!(parent_count >= 2);
        // Layout: parents occupy positions 0..parent_count.
        for (i, d) in drafts.iter().enumerate() {
            if i < parent_count {
                assert!(!d.searchable);
                assert!(d.parent_index.is_none());
            } else {
                assert!(d.searchable);
                let parent_pos = d.parent_index.unwrap() as usize;
                assert!(parent_pos < parent_count);
                // Child text is carved out of its parent's text.
                assert!(drafts[parent_pos].text.contains(d.text.trim()));
            }
        }
    }

    #[tokio::test]
    async fn children_are_smaller_than_parents() {
        let text = "word ".repeat(400);
        let chunker = HierarchicalChunker::new(1000, 200);
        let drafts = chunker
            .split(&NormalizedDocument::from_text(&text))
            .await
            .unwrap();
        for d in drafts.iter().filter(|d| d.searchable) {
            assert!(d.text.len() <= 200);
        }
    }
}
