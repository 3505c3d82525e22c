use crate::features::Features;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub type DocId = String;

/// Per-document term frequencies, keyed by query term.
pub type TermFrequencies = HashMap<String, u32>;

/// A single posting as returned by the index service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentIndexEntry {
    #[serde(rename = "docID")]
    pub doc_id: DocId,
    pub frequency: u32,
    /// Not required to have `frequency` elements.
    #[serde(default)]
    pub positions: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvertedIndex {
    pub postings: HashMap<String, Vec<DocumentIndexEntry>>,
}

impl InvertedIndex {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, term: impl Into<String>, entries: Vec<DocumentIndexEntry>) {
        self.postings.insert(term.into(), entries);
    }

    /// Number of postings for `term`, duplicates included.
    pub fn document_frequency(&self, term: &str) -> Option<usize> {
        self.postings.get(term).map(Vec::len)
    }

    pub fn is_empty(&self) -> bool { self.postings.is_empty() }

    /// Folds every posting into `doc_id -> {term -> tf}`, summing repeated
    /// (doc, term) entries. Iteration order is ascending doc id.
    pub fn candidates(&self) -> BTreeMap<DocId, TermFrequencies> {
        let mut out: BTreeMap<DocId, TermFrequencies> = BTreeMap::new();
        for (term, entries) in &self.postings {
            for entry in entries {
                *out.entry(entry.doc_id.clone())
                    .or_default()
                    .entry(term.clone())
                    .or_insert(0) += entry.frequency;
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusStats {
    pub avg_doc_length: f64,
    pub doc_count: u64,
}

/// Missing fields decode to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentMetadata {
    pub doc_length: i64,
    pub time_last_updated: String,
    #[serde(rename = "docType")]
    pub file_type: String,
    pub image_count: u32,
    pub doc_title: String,
    #[serde(rename = "URL")]
    pub url: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRankInfo {
    pub page_rank: f64,
    pub in_link_count: u64,
    pub out_link_count: u64,
}

/// A ranked document. Only `docID`, `rank` and `metadata` go over the wire.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    #[serde(rename = "docID")]
    pub doc_id: DocId,
    pub rank: usize,
    pub metadata: DocumentMetadata,
    #[serde(skip)]
    pub term_frequencies: TermFrequencies,
    #[serde(skip)]
    pub features: Features,
}
