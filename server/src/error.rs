use ranking_core::DocId;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request to {url} failed: {source}")]
    Request { url: String, source: reqwest::Error },

    #[error("{url} returned {status}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("failed to decode response from {url}: {source}")]
    Decode { url: String, source: reqwest::Error },

    #[error("corpus statistics unusable: avgDocLength={avg_doc_length}, docCount={doc_count}")]
    InvalidStats { avg_doc_length: f64, doc_count: u64 },
}

#[derive(Debug, Error)]
pub enum RankError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("ranking did not finish within {0:?}")]
    Timeout(Duration),

    #[error("{failed} of {total} documents could not be enriched")]
    PartialFailure { failed: usize, total: usize },
}

/// A candidate dropped during enrichment.
#[derive(Debug)]
pub struct DocumentFailure {
    pub doc_id: DocId,
    pub error: UpstreamError,
}
