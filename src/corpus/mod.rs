//! Keyword search over the classical-text knowledge base.
//!
//! The knowledge base is a single JSON document of nested sections. It is
//! read at most once, flattened in pre-order into the sections that carry
//! text, and then searched by raw keyword frequency.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Phrase removed from every query before it is split into keywords.
pub const NOISE_PHRASE: &str = "紫微斗数";

/// A section of the knowledge base as stored on disk.
///
/// Every field is optional; a `null` reads the same as a missing key.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CorpusNode {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub node_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub summary: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub nodes: Vec<CorpusNode>,
}

#[derive(Debug, Deserialize)]
struct CorpusDocument {
    #[serde(default, deserialize_with = "null_as_default")]
    structure: Vec<CorpusNode>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A searchable section with its lowercased search text.
#[derive(Debug, Clone)]
pub struct CorpusEntry {
    pub title: String,
    pub node_id: String,
    pub text: String,
    haystack: String,
}

impl CorpusEntry {
    fn from_node(node: &CorpusNode) -> Self {
        // text, title and summary are searched as one run, with no separator
        let haystack = format!("{}{}{}", node.text, node.title, node.summary).to_lowercase();
        Self {
            title: node.title.clone(),
            node_id: node.node_id.clone(),
            text: node.text.clone(),
            haystack,
        }
    }

    /// Sum of raw substring occurrences of every keyword.
    ///
    /// Matching is plain substring counting, so a short keyword also counts
    /// inside longer words.
    fn score(&self, keywords: &[String]) -> usize {
        keywords
            .iter()
            .map(|k| self.haystack.matches(k.as_str()).count())
            .sum()
    }
}

/// Load state of the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    /// Not yet read.
    Unloaded,
    /// Read successfully.
    Ready,
    /// The file was missing or malformed; every search returns nothing.
    Empty,
}

/// A ranked search hit.
#[derive(Debug, Clone)]
pub struct ScoredEntry<'a> {
    pub score: usize,
    pub entry: &'a CorpusEntry,
}

#[derive(Debug)]
enum Loaded {
    Ready(Vec<CorpusEntry>),
    Empty,
}

/// Keyword index over the knowledge base.
///
/// Loading happens lazily on first use and at most once; concurrent first
/// callers wait for the same load.
#[derive(Debug)]
pub struct TextIndex {
    path: Option<PathBuf>,
    loaded: OnceCell<Loaded>,
}

impl TextIndex {
    /// Create an index backed by a JSON file. Nothing is read yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            loaded: OnceCell::new(),
        }
    }

    /// Create an already-loaded index from in-memory sections.
    #[allow(dead_code)] // Used by tests and embedders without a corpus file
    pub fn from_nodes(nodes: &[CorpusNode]) -> Self {
        let loaded = OnceCell::new();
        let _ = loaded.set(Loaded::Ready(flatten(nodes)));
        Self { path: None, loaded }
    }

    /// Current load state.
    pub fn state(&self) -> IndexState {
        match self.loaded.get() {
            None => IndexState::Unloaded,
            Some(Loaded::Ready(_)) => IndexState::Ready,
            Some(Loaded::Empty) => IndexState::Empty,
        }
    }

    /// Load the knowledge base if that has not happened yet.
    ///
    /// Failures are logged and leave the index Empty; later calls are no-ops.
    pub fn load(&self) -> IndexState {
        self.loaded.get_or_init(|| match self.path.as_deref() {
            Some(path) => read_corpus(path),
            None => Loaded::Empty,
        });
        self.state()
    }

    /// Number of searchable sections.
    pub fn section_count(&self) -> usize {
        self.entries().len()
    }

    fn entries(&self) -> &[CorpusEntry] {
        match self.loaded.get() {
            Some(Loaded::Ready(entries)) => entries,
            _ => &[],
        }
    }

    /// Rank sections against a query.
    ///
    /// Sections with no match are dropped; the rest are ordered by
    /// descending score, ties keeping corpus order.
    pub fn rank(&self, query: &str, max_results: usize) -> Vec<ScoredEntry<'_>> {
        self.load();

        let keywords = keywords(query);
        if keywords.is_empty() {
            return Vec::new();
        }
        debug!("Knowledge base searching for keywords: {:?}", keywords);

        let mut scored: Vec<ScoredEntry<'_>> = self
            .entries()
            .iter()
            .filter_map(|entry| {
                let score = entry.score(&keywords);
                (score > 0).then_some(ScoredEntry { score, entry })
            })
            .collect();

        // sort_by is stable: equal scores stay in corpus order
        scored.sort_by(|a, b| b.score.cmp(&a.score));
        debug!(
            "Knowledge base matched {} sections, keeping top {}",
            scored.len(),
            max_results.min(scored.len())
        );
        scored.truncate(max_results);

        scored
    }

    /// Search and render the top sections as `### title` blocks.
    ///
    /// Returns an empty string when nothing matches or the index is Empty.
    pub fn search(&self, query: &str, max_results: usize) -> String {
        let hits = self.rank(query, max_results);

        for (i, hit) in hits.iter().enumerate() {
            debug!(
                "Hit {} [score: {}, id: {}, title: {}]",
                i + 1,
                hit.score,
                hit.entry.node_id,
                hit.entry.title
            );
        }

        let result = hits
            .iter()
            .map(|hit| format!("### {}\n{}", hit.entry.title, hit.entry.text))
            .collect::<Vec<_>>()
            .join("\n\n");

        if !result.is_empty() {
            debug!("Retrieved context length: {} characters", result.chars().count());
        }

        result
    }
}

/// Split a query into lowercased keywords, dropping the noise phrase.
fn keywords(query: &str) -> Vec<String> {
    query
        .replace(NOISE_PHRASE, "")
        .split_whitespace()
        .map(str::to_lowercase)
        .collect()
}

/// Pre-order flatten, keeping only sections with text.
fn flatten(nodes: &[CorpusNode]) -> Vec<CorpusEntry> {
    fn walk(nodes: &[CorpusNode], out: &mut Vec<CorpusEntry>) {
        for node in nodes {
            if !node.text.is_empty() {
                out.push(CorpusEntry::from_node(node));
            }
            walk(&node.nodes, out);
        }
    }

    let mut out = Vec::new();
    walk(nodes, &mut out);
    out
}

fn read_corpus(path: &Path) -> Loaded {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Knowledge base not available at {}: {}", path.display(), e);
            return Loaded::Empty;
        }
    };

    match serde_json::from_str::<CorpusDocument>(&content) {
        Ok(doc) => {
            let entries = flatten(&doc.structure);
            info!(
                "Loaded knowledge base with {} sections from {}",
                entries.len(),
                path.display()
            );
            Loaded::Ready(entries)
        }
        Err(e) => {
            error!("Failed to parse knowledge base {}: {}", path.display(), e);
            Loaded::Empty
        }
    }
}
