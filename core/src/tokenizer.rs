use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Split text on whitespace runs. Punctuation is kept and duplicates are preserved.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub id: String,
    pub text: String,
    pub terms: Vec<String>,
}

impl Query {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let terms = tokenize(&text);
        Self { id: id.into(), text, terms }
    }

    /// Terms in first-seen order with duplicates dropped.
    pub fn unique_terms(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.terms
            .iter()
            .map(String::as_str)
            .filter(|t| seen.insert(*t))
            .collect()
    }
}
