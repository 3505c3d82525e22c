use std::time::Duration;

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base for the postings, metadata and statistics endpoints.
    pub index_base_url: String,
    /// Prefix the document URL is appended to.
    pub pagerank_base_url: String,
    /// Per-call timeout.
    pub timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            index_base_url: "http://localhost:8080".into(),
            pagerank_base_url: "http://localhost:1234/ranking/".into(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RankerConfig {
    pub max_documents: usize,
    /// Upstream calls in flight per request.
    pub concurrency: usize,
    pub request_deadline: Duration,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self { max_documents: 100, concurrency: 8, request_deadline: Duration::from_secs(30) }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub upstream: UpstreamConfig,
    pub ranker: RankerConfig,
}
