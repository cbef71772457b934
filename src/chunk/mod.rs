//! Hierarchical Markdown chunk splitting.
//!
//! Parses a document's heading structure into a tree, then splits it
//! three ways depending on node shape:
//! - non-leaf nodes (have sub-headings): kept whole if their rendered
//!   subtree is small, else replaced by a generated summary chunk
//! - leaf nodes (heading, no sub-headings): kept whole if small, else
//!   split on sentence boundaries with a trailing overlap
//! - no-heading nodes (document has no headings at all): split the same
//!   way as an oversized leaf

use regex::Regex;

use crate::core::config::Config;
use crate::core::types::{Chunk, ChunkMetadata, NodeType};
use crate::text::estimate_tokens;

struct HeadingNode {
    level: usize,
    title: String,
    content: String,
    children: Vec<HeadingNode>,
}

impl HeadingNode {
    fn new(level: usize, title: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            content: String::new(),
            children: Vec::new(),
        }
    }
}

pub struct HierarchicalChunkSplitter {
    leaf_min: usize,
    leaf_max: usize,
    overlap_ratio: f64,
    nonleaf_threshold: usize,
    heading_re: Regex,
}

impl HierarchicalChunkSplitter {
    pub fn new(config: &Config) -> Self {
        Self {
            leaf_min: config.chunk_leaf_min_tokens,
            leaf_max: config.chunk_leaf_max_tokens,
            overlap_ratio: config.chunk_overlap_ratio,
            nonleaf_threshold: config.chunk_nonleaf_threshold,
            heading_re: Regex::new(r"(?m)^(#{1,6})\s+(.+)$").unwrap(),
        }
    }

    /// Split `markdown_text` into chunks for `doc_id`.
    ///
    /// `chunk_id`s are deterministic — `{doc_id}_chunk_{position:05}` in
    /// document order — so re-splitting identical content for the same
    /// `doc_id` reproduces the same ids, which is what lets re-ingestion
    /// overwrite rather than duplicate (spec's idempotent-ingest contract).
    pub fn split(&self, markdown_text: &str, doc_id: &str, doc_name: &str) -> Vec<Chunk> {
        let tree = self.parse_heading_tree(markdown_text);
        let mut chunks = Vec::new();
        let mut counter = 0usize;
        self.recursive_split(&tree, doc_id, doc_name, "", &mut counter, &mut chunks);
        chunks
    }

    fn parse_heading_tree(&self, text: &str) -> HeadingNode {
        let mut root = HeadingNode::new(0, "ROOT");
        // Stack of indices into a flat arena would avoid the borrow-checker
        // fight with nested `&mut`; walk it via a path of child indices instead.
        let mut stack: Vec<usize> = vec![]; // path from root, each entry an index into .children
        let mut last_end = 0usize;

        for cap in self.heading_re.captures_iter(text) {
            let whole = cap.get(0).unwrap();
            let level = cap.get(1).unwrap().as_str().len();
            let title = cap.get(2).unwrap().as_str().trim().to_string();

            let between = text[last_end..whole.start()].trim();
            if !between.is_empty() {
                let node = node_at_path_mut(&mut root, &stack);
                if node.content.is_empty() {
                    node.content = between.to_string();
                } else {
                    node.content.push('\n');
                    node.content.push_str(between);
                }
            }
            last_end = whole.end();

            while stack.len() > 0 && node_at_path(&root, &stack).level >= level {
                stack.pop();
            }

            let parent = node_at_path_mut(&mut root, &stack);
            parent.children.push(HeadingNode::new(level, title));
            stack.push(parent.children.len() - 1);
        }

        let remaining = text[last_end..].trim();
        if !remaining.is_empty() {
            let node = node_at_path_mut(&mut root, &stack);
            if node.content.is_empty() {
                node.content = remaining.to_string();
            } else {
                node.content.push('\n');
                node.content.push_str(remaining);
            }
        }

        root
    }

    fn recursive_split(
        &self,
        node: &HeadingNode,
        doc_id: &str,
        doc_name: &str,
        heading_path: &str,
        counter: &mut usize,
        chunks: &mut Vec<Chunk>,
    ) {
        // The synthetic root (level 0) contributes no segment of its own to
        // the heading path — a no-heading document's sole chunk gets an
        // empty `heading_path`, and a real top-level heading's path starts
        // at its own title rather than a leading "ROOT/".
        let current_path = if node.level == 0 {
            String::new()
        } else if heading_path.is_empty() {
            node.title.clone()
        } else {
            format!("{}/{}", heading_path, node.title)
        };

        if !node.children.is_empty() {
            let full_text = collect_text(node);
            let token_count = estimate_tokens(&full_text);

            if !full_text.trim().is_empty() {
                if token_count <= self.nonleaf_threshold {
                    chunks.push(self.make_chunk(
                        full_text,
                        doc_id,
                        doc_name,
                        &current_path,
                        NodeType::NonLeaf,
                        false,
                        None,
                        counter,
                    ));
                } else {
                    let summary = self.generate_summary(&full_text, &current_path);
                    chunks.push(self.make_chunk(
                        summary.clone(),
                        doc_id,
                        doc_name,
                        &current_path,
                        NodeType::NonLeaf,
                        false,
                        Some(summary),
                        counter,
                    ));
                }
            }

            for child in &node.children {
                self.recursive_split(child, doc_id, doc_name, &current_path, counter, chunks);
            }
        } else {
            let text = node.content.trim().to_string();
            if text.is_empty() {
                return;
            }

            let node_type = if node.level > 0 { NodeType::Leaf } else { NodeType::NoHeading };
            let token_count = estimate_tokens(&text);

            if token_count <= self.leaf_max {
                let body = if node.level > 0 {
                    format!("{}\n\n{}", current_path, text)
                } else {
                    text
                };
                chunks.push(self.make_chunk(
                    body,
                    doc_id,
                    doc_name,
                    &current_path,
                    node_type,
                    false,
                    None,
                    counter,
                ));
            } else {
                let sub_chunks = self.split_leaf_content(&text);
                for (i, sub_text) in sub_chunks.into_iter().enumerate() {
                    let body = format!("{}\n\n{}", current_path, sub_text);
                    chunks.push(self.make_chunk(
                        body,
                        doc_id,
                        doc_name,
                        &current_path,
                        node_type,
                        i > 0,
                        None,
                        counter,
                    ));
                }
            }
        }
    }

    /// Fixed-window sentence-boundary split with a trailing overlap carried
    /// into the next chunk.
    fn split_leaf_content(&self, text: &str) -> Vec<String> {
        let target_tokens = (self.leaf_min + self.leaf_max) / 2;
        let overlap_tokens = (target_tokens as f64 * self.overlap_ratio) as usize;

        let sentences = split_on_sentence_boundaries(text);

        let mut chunks = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_tokens = 0usize;

        for sent in sentences {
            let sent_tokens = estimate_tokens(&sent);
            if current_tokens + sent_tokens > self.leaf_max && !current.is_empty() {
                chunks.push(current.concat());

                let mut overlap_acc = 0usize;
                let mut overlap_start = current.len();
                for j in (0..current.len()).rev() {
                    overlap_acc += estimate_tokens(&current[j]);
                    if overlap_acc >= overlap_tokens {
                        overlap_start = j;
                        break;
                    }
                }
                current = current.split_off(overlap_start);
                current_tokens = current.iter().map(|s| estimate_tokens(s)).sum();
            }

            current_tokens += sent_tokens;
            current.push(sent);
        }

        if !current.is_empty() {
            chunks.push(current.concat());
        }

        chunks
    }

    /// Placeholder for an LLM-generated subtree summary: takes the first
    /// handful of non-blank lines, capped at 500 characters.
    fn generate_summary(&self, text: &str, heading_path: &str) -> String {
        let summary_lines: Vec<&str> = text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .take(10)
            .collect();
        let mut summary = summary_lines.join(" ");
        if summary.chars().count() > 500 {
            summary = summary.chars().take(500).collect::<String>() + "...";
        }
        format!("[SUMMARY] {}: {}", heading_path, summary)
    }

    fn make_chunk(
        &self,
        text: String,
        doc_id: &str,
        doc_name: &str,
        heading_path: &str,
        node_type: NodeType,
        is_continuation: bool,
        parent_summary: Option<String>,
        counter: &mut usize,
    ) -> Chunk {
        let chunk_id = format!("{}_chunk_{:05}", doc_id, *counter);
        *counter += 1;
        Chunk {
            chunk_id,
            text,
            metadata: ChunkMetadata {
                doc_id: doc_id.to_string(),
                doc_name: doc_name.to_string(),
                heading_path: heading_path.to_string(),
                node_type,
                is_continuation,
                parent_summary,
            },
            vector_light: None,
            vector_dense: None,
            lex_tokens: None,
        }
    }
}

fn node_at_path<'a>(root: &'a HeadingNode, path: &[usize]) -> &'a HeadingNode {
    let mut node = root;
    for &idx in path {
        node = &node.children[idx];
    }
    node
}

fn node_at_path_mut<'a>(root: &'a mut HeadingNode, path: &[usize]) -> &'a mut HeadingNode {
    let mut node = root;
    for &idx in path {
        node = &mut node.children[idx];
    }
    node
}

fn collect_text(node: &HeadingNode) -> String {
    let mut parts = Vec::new();
    if node.level > 0 {
        parts.push(format!("{} {}", "#".repeat(node.level), node.title));
    }
    if !node.content.is_empty() {
        parts.push(node.content.clone());
    }
    for child in &node.children {
        parts.push(collect_text(child));
    }
    parts.join("\n\n")
}

/// Split on Chinese/Latin sentence terminators and newlines, keeping the
/// terminator attached to the preceding sentence.
fn split_on_sentence_boundaries(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if matches!(c, '。' | '！' | '？' | '\n') {
            sentences.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        sentences.push(current);
    }
    sentences.into_iter().filter(|s| !s.trim().is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter() -> HierarchicalChunkSplitter {
        HierarchicalChunkSplitter::new(&Config::default())
    }

    #[test]
    fn no_heading_document_becomes_a_single_no_heading_chunk() {
        let chunks = splitter().split("just plain text, no headings here.", "doc_x", "Doc X");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.node_type, NodeType::NoHeading);
        assert!(chunks[0].metadata.heading_path.is_empty());
    }

    #[test]
    fn small_subtree_is_kept_as_one_non_leaf_chunk() {
        let md = "# Title\n\n## Section A\n\nshort body\n\n## Section B\n\nalso short\n";
        let chunks = splitter().split(md, "doc_y", "Doc Y");
        let non_leaf = chunks.iter().find(|c| c.metadata.node_type == NodeType::NonLeaf);
        assert!(non_leaf.is_some());
        assert!(non_leaf.unwrap().metadata.parent_summary.is_none());
    }

    #[test]
    fn oversized_leaf_splits_with_overlap_and_marks_continuations() {
        let long_para = "这是一句很长的句子。".repeat(200);
        let md = format!("# 标题\n\n{}", long_para);
        let chunks = splitter().split(&md, "doc_z", "Doc Z");
        assert!(chunks.len() > 1);
        assert!(chunks.iter().skip(1).all(|c| c.metadata.is_continuation));
    }

    #[test]
    fn chunk_ids_are_unique_and_namespaced_by_doc_id() {
        let md = "# A\n\nfoo\n\n# B\n\nbar\n";
        let chunks = splitter().split(md, "doc_w", "Doc W");
        let ids: std::collections::HashSet<_> = chunks.iter().map(|c| c.chunk_id.clone()).collect();
        assert_eq!(ids.len(), chunks.len());
        assert!(chunks.iter().all(|c| c.chunk_id.starts_with("doc_w_chunk_")));
    }

    /// Re-splitting identical content for the same `doc_id` must reproduce
    /// the same `chunk_id` sequence — ingestion idempotency relies on it.
    #[test]
    fn splitting_same_document_twice_yields_identical_chunk_ids() {
        let md = "# A\n\nfoo\n\n## A1\n\nbar\n\n# B\n\nbaz\n";
        let first = splitter().split(md, "doc_v", "Doc V");
        let second = splitter().split(md, "doc_v", "Doc V");
        let first_ids: Vec<_> = first.iter().map(|c| c.chunk_id.clone()).collect();
        let second_ids: Vec<_> = second.iter().map(|c| c.chunk_id.clone()).collect();
        assert_eq!(first_ids, second_ids);
    }

    /// Every leaf's `heading_path` is a segment-prefix of at most one
    /// non-leaf's path in the same document: a leaf under `A/A1` only ever
    /// prefix-matches the non-leaf chunk for `A` (or `A/A1` itself, if that
    /// subtree was small enough to stay whole), never a sibling subtree.
    #[test]
    fn leaf_heading_paths_prefix_at_most_one_non_leaf_path() {
        let md = "# A\n\n## A1\n\nfirst body\n\n## A2\n\nsecond body\n\n# B\n\n## B1\n\nthird body\n";
        let chunks = splitter().split(md, "doc_u", "Doc U");

        let non_leaf_paths: Vec<&str> = chunks
            .iter()
            .filter(|c| c.metadata.node_type == NodeType::NonLeaf)
            .map(|c| c.metadata.heading_path.as_str())
            .collect();

        for leaf in chunks.iter().filter(|c| c.metadata.node_type == NodeType::Leaf) {
            let leaf_segments: Vec<&str> = leaf.metadata.heading_path.split('/').collect();
            let matches = non_leaf_paths
                .iter()
                .filter(|path| {
                    let segments: Vec<&str> = path.split('/').collect();
                    segments.len() <= leaf_segments.len() && leaf_segments[..segments.len()] == segments[..]
                })
                .count();
            assert!(matches <= 1, "leaf path {} prefixes {matches} non-leaf paths", leaf.metadata.heading_path);
        }
    }
}
