//! Query → candidates → enriched, scored and ranked documents.

use crate::config::RankerConfig;
use crate::error::{DocumentFailure, RankError, UpstreamError};
use crate::upstream::Upstream;
use futures::stream::{self, StreamExt, TryStreamExt};
use ranking_core::features::{compute_features, idf};
use ranking_core::{
    CorpusStats, DocId, Document, DocumentMetadata, InvertedIndex, PageRankInfo, Query, TermFrequencies,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-query processing record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryReport {
    pub query_id: String,
    pub num_documents_parsed: usize,
    pub num_ranked_documents: usize,
    pub process_time: Duration,
}

#[derive(Debug, Default)]
pub struct RankOutcome {
    /// Survivors in rank order.
    pub documents: Vec<Document>,
    pub failures: Vec<DocumentFailure>,
    /// Size of the candidate set before enrichment.
    pub candidates: usize,
    pub report: QueryReport,
}

impl RankOutcome {
    /// Aggregate non-fatal error when any candidate was dropped.
    pub fn partial_error(&self) -> Option<RankError> {
        if self.failures.is_empty() {
            None
        } else {
            Some(RankError::PartialFailure { failed: self.failures.len(), total: self.candidates })
        }
    }
}

pub struct Ranker {
    upstream: Arc<dyn Upstream>,
    config: RankerConfig,
}

impl Ranker {
    pub fn new(upstream: Arc<dyn Upstream>, config: RankerConfig) -> Self {
        Self { upstream, config }
    }

    pub fn config(&self) -> &RankerConfig { &self.config }

    /// Postings and corpus statistics failures are fatal; per-document
    /// enrichment failures drop that document only.
    pub async fn rank(&self, query: &Query) -> Result<RankOutcome, RankError> {
        if query.id.trim().is_empty() {
            return Err(RankError::InvalidQuery("query id cannot be empty".into()));
        }
        if query.terms.is_empty() {
            return Err(RankError::InvalidQuery("query text cannot be empty".into()));
        }
        let start = Instant::now();
        let deadline = self.config.request_deadline;
        let mut outcome = match tokio::time::timeout(deadline, self.rank_within_deadline(query)).await {
            Ok(result) => result?,
            Err(_) => return Err(RankError::Timeout(deadline)),
        };
        outcome.report = QueryReport {
            query_id: query.id.clone(),
            num_documents_parsed: outcome.candidates,
            num_ranked_documents: outcome.documents.len(),
            process_time: start.elapsed(),
        };
        Ok(outcome)
    }

    async fn rank_within_deadline(&self, query: &Query) -> Result<RankOutcome, RankError> {
        let limit = self.config.concurrency.max(1);

        let terms: Vec<String> = query.unique_terms().into_iter().map(str::to_owned).collect();
        let postings: Vec<(String, _)> = stream::iter(terms)
            .map(|term| async move { self.upstream.postings(&term).await.map(|p| (term, p)) })
            .buffered(limit)
            .try_collect()
            .await?;
        let mut index = InvertedIndex::new();
        for (term, entries) in postings {
            index.insert(term, entries);
        }

        let candidates = index.candidates();
        if candidates.is_empty() {
            tracing::debug!(query_id = %query.id, "no candidates");
            return Ok(RankOutcome::default());
        }
        let total = candidates.len();

        let stats = checked(self.upstream.corpus_stats().await?)?;
        let idf = idf(&index, stats.doc_count);

        let enriched: Vec<(DocId, TermFrequencies, Result<(DocumentMetadata, PageRankInfo), UpstreamError>)> =
            stream::iter(candidates)
                .map(|(doc_id, tf)| async move {
                    let result = self.enrich(&doc_id).await;
                    (doc_id, tf, result)
                })
                .buffered(limit)
                .collect()
                .await;

        let mut documents = Vec::with_capacity(enriched.len());
        let mut failures = Vec::new();
        for (doc_id, term_frequencies, result) in enriched {
            match result {
                Ok((metadata, page_rank)) => {
                    let features = compute_features(
                        &query.terms,
                        &term_frequencies,
                        &idf,
                        stats.avg_doc_length,
                        &metadata,
                        &page_rank,
                    );
                    documents.push(Document { doc_id, rank: 0, metadata, term_frequencies, features });
                }
                Err(error) => {
                    tracing::warn!(%doc_id, %error, "dropping document");
                    failures.push(DocumentFailure { doc_id, error });
                }
            }
        }

        // Stable, so equal scores keep doc id order.
        documents.sort_by(|a, b| b.features.bm25.total_cmp(&a.features.bm25));
        documents.truncate(self.config.max_documents);
        for (i, doc) in documents.iter_mut().enumerate() {
            doc.rank = i + 1;
        }

        Ok(RankOutcome { documents, failures, candidates: total, report: QueryReport::default() })
    }

    async fn enrich(&self, doc_id: &str) -> Result<(DocumentMetadata, PageRankInfo), UpstreamError> {
        let metadata = self.upstream.metadata(doc_id).await?;
        let page_rank = self.upstream.page_rank(&metadata.url).await?;
        Ok((metadata, page_rank))
    }
}

/// Zero or non-finite statistics would turn BM25 into NaN.
fn checked(stats: CorpusStats) -> Result<CorpusStats, UpstreamError> {
    if stats.doc_count == 0 || !(stats.avg_doc_length.is_finite() && stats.avg_doc_length > 0.0) {
        return Err(UpstreamError::InvalidStats {
            avg_doc_length: stats.avg_doc_length,
            doc_count: stats.doc_count,
        });
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ranking_core::features::{B, K1};
    use ranking_core::DocumentIndexEntry;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeUpstream {
        postings: HashMap<String, Vec<DocumentIndexEntry>>,
        failing_terms: Vec<String>,
        metadata: HashMap<String, DocumentMetadata>,
        page_rank: HashMap<String, PageRankInfo>,
        stats: Option<CorpusStats>,
        delay: Option<Duration>,
    }

    fn status(url: &str, code: u16) -> UpstreamError {
        UpstreamError::Status { url: url.into(), status: code, body: String::new() }
    }

    #[async_trait]
    impl Upstream for FakeUpstream {
        async fn postings(&self, term: &str) -> Result<Vec<DocumentIndexEntry>, UpstreamError> {
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            if self.failing_terms.iter().any(|t| t == term) {
                return Err(status(term, 503));
            }
            Ok(self.postings.get(term).cloned().unwrap_or_default())
        }

        async fn metadata(&self, doc_id: &str) -> Result<DocumentMetadata, UpstreamError> {
            self.metadata.get(doc_id).cloned().ok_or_else(|| status(doc_id, 404))
        }

        async fn corpus_stats(&self) -> Result<CorpusStats, UpstreamError> {
            self.stats.ok_or_else(|| status("stats", 500))
        }

        async fn page_rank(&self, url: &str) -> Result<PageRankInfo, UpstreamError> {
            self.page_rank.get(url).copied().ok_or_else(|| status(url, 404))
        }
    }

    fn entry(doc: &str, frequency: u32) -> DocumentIndexEntry {
        DocumentIndexEntry { doc_id: doc.into(), frequency, positions: vec![] }
    }

    fn meta(url: &str, doc_length: i64) -> DocumentMetadata {
        DocumentMetadata { doc_length, url: url.into(), ..Default::default() }
    }

    fn pr() -> PageRankInfo {
        PageRankInfo { page_rank: 0.85, in_link_count: 123, out_link_count: 45 }
    }

    /// Documents `d1..dn` with `frequency[i]` occurrences of `term1` each.
    fn fake(frequencies: &[u32]) -> FakeUpstream {
        let mut up = FakeUpstream {
            stats: Some(CorpusStats { avg_doc_length: 120.0, doc_count: 10 }),
            ..Default::default()
        };
        let mut entries = Vec::new();
        for (i, &f) in frequencies.iter().enumerate() {
            let id = format!("d{}", i + 1);
            let url = format!("site.org/{id}");
            entries.push(entry(&id, f));
            up.metadata.insert(id, meta(&url, 100));
            up.page_rank.insert(url, pr());
        }
        up.postings.insert("term1".into(), entries);
        up
    }

    fn ranker(up: FakeUpstream) -> Ranker {
        Ranker::new(Arc::new(up), RankerConfig::default())
    }

    fn expected_bm25(idf: f64, tf: f64, dl: f64, avgdl: f64) -> f64 {
        idf * (tf * (K1 + 1.0)) / (tf + K1 * (1.0 - B + B * dl / avgdl))
    }

    #[tokio::test]
    async fn single_term_single_document() {
        let outcome = ranker(fake(&[1])).rank(&Query::new("q1", "term1")).await.unwrap();
        assert_eq!(outcome.documents.len(), 1);
        let doc = &outcome.documents[0];
        assert_eq!(doc.rank, 1);
        assert_eq!(doc.doc_id, "d1");
        let want = (10.0f64 / 2.0).ln() * 2.5 / (1.0 + 1.5 * (0.25 + 0.75 * 100.0 / 120.0));
        assert!((doc.features.bm25 - want).abs() < 1e-9);
        assert_eq!(doc.features.stream_length, 100);
        assert_eq!(doc.features.inlink_count, 123);
        assert_eq!(doc.features.page_rank, 0.85);
        assert!(outcome.partial_error().is_none());
    }

    #[tokio::test]
    async fn higher_term_frequency_ranks_first() {
        let outcome = ranker(fake(&[1, 2])).rank(&Query::new("q", "term1")).await.unwrap();
        let ids: Vec<_> = outcome.documents.iter().map(|d| (d.doc_id.as_str(), d.rank)).collect();
        assert_eq!(ids, vec![("d2", 1), ("d1", 2)]);
    }

    #[tokio::test]
    async fn unknown_term_adds_nothing() {
        let with_unknown = ranker(fake(&[1])).rank(&Query::new("q", "term1 nothere")).await.unwrap();
        let alone = ranker(fake(&[1])).rank(&Query::new("q", "term1")).await.unwrap();
        let (a, b) = (&with_unknown.documents[0].features, &alone.documents[0].features);
        assert_eq!(a.bm25, b.bm25);
        assert_eq!(a.sum_tfidf, b.sum_tfidf);
        assert_eq!(a.mean_tfidf, b.mean_tfidf);
        assert_eq!(a.covered_query_term_number, 1);
        assert_eq!(a.covered_query_term_ratio, 0.5);
    }

    #[tokio::test]
    async fn duplicate_terms_double_bm25() {
        let single = ranker(fake(&[10])).rank(&Query::new("q", "term1")).await.unwrap();
        let double = ranker(fake(&[10])).rank(&Query::new("q", "term1 term1")).await.unwrap();
        let (s, d) = (single.documents[0].features.bm25, double.documents[0].features.bm25);
        assert!((d - 2.0 * s).abs() < 1e-9);
        assert!((s - expected_bm25(5f64.ln(), 10.0, 100.0, 120.0)).abs() < 1e-9);
        assert_eq!(double.documents[0].features.covered_query_term_number, 2);
    }

    #[tokio::test]
    async fn empty_candidate_set_is_success() {
        let outcome = ranker(fake(&[])).rank(&Query::new("q", "nothing")).await.unwrap();
        assert!(outcome.documents.is_empty());
        assert_eq!(outcome.candidates, 0);
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let r = ranker(fake(&[1]));
        assert!(matches!(r.rank(&Query::new("q", "   ")).await, Err(RankError::InvalidQuery(_))));
        assert!(matches!(r.rank(&Query::new("", "term1")).await, Err(RankError::InvalidQuery(_))));
    }

    #[tokio::test]
    async fn failed_documents_are_dropped() {
        let mut up = fake(&[3, 1, 2]);
        up.metadata.remove("d2");
        up.page_rank.remove("site.org/d3");
        let outcome = ranker(up).rank(&Query::new("q", "term1")).await.unwrap();

        assert_eq!(outcome.documents.len(), 1);
        assert_eq!(outcome.documents[0].doc_id, "d1");
        assert_eq!(outcome.documents[0].rank, 1);
        let failed: Vec<_> = outcome.failures.iter().map(|f| f.doc_id.as_str()).collect();
        assert_eq!(failed, vec!["d2", "d3"]);
        match outcome.partial_error() {
            Some(RankError::PartialFailure { failed, total }) => assert_eq!((failed, total), (2, 3)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn truncates_and_ranks_in_order() {
        let freqs: Vec<u32> = (1..=12).collect();
        let mut up = fake(&freqs);
        // Twelve postings need a corpus large enough to keep the idf positive.
        up.stats = Some(CorpusStats { avg_doc_length: 120.0, doc_count: 100 });
        let config = RankerConfig { max_documents: 5, concurrency: 3, ..Default::default() };
        let outcome = Ranker::new(Arc::new(up), config).rank(&Query::new("q", "term1")).await.unwrap();

        assert_eq!(outcome.documents.len(), 5);
        assert_eq!(outcome.candidates, 12);
        for (i, doc) in outcome.documents.iter().enumerate() {
            assert_eq!(doc.rank, i + 1);
            if i > 0 {
                assert!(outcome.documents[i - 1].features.bm25 >= doc.features.bm25);
            }
        }
        assert_eq!(outcome.documents[0].doc_id, "d12");
        assert_eq!(outcome.report.num_documents_parsed, 12);
        assert_eq!(outcome.report.num_ranked_documents, 5);
        assert_eq!(outcome.report.query_id, "q");
    }

    #[tokio::test]
    async fn equal_scores_keep_doc_id_order() {
        let outcome = ranker(fake(&[2, 2, 2])).rank(&Query::new("q", "term1")).await.unwrap();
        let ids: Vec<_> = outcome.documents.iter().map(|d| d.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d2", "d3"]);
    }

    #[tokio::test]
    async fn postings_failure_is_fatal() {
        let mut up = fake(&[1]);
        up.failing_terms.push("term2".into());
        let err = ranker(up).rank(&Query::new("q", "term1 term2")).await.unwrap_err();
        assert!(matches!(err, RankError::Upstream(UpstreamError::Status { status: 503, .. })));
    }

    #[tokio::test]
    async fn stats_failure_is_fatal() {
        let mut up = fake(&[1]);
        up.stats = None;
        assert!(matches!(ranker(up).rank(&Query::new("q", "term1")).await, Err(RankError::Upstream(_))));
    }

    #[tokio::test]
    async fn deadline_aborts_the_request() {
        let mut up = fake(&[1]);
        up.delay = Some(Duration::from_millis(500));
        let config = RankerConfig { request_deadline: Duration::from_millis(50), ..Default::default() };
        let err = Ranker::new(Arc::new(up), config).rank(&Query::new("q", "term1")).await.unwrap_err();
        assert!(matches!(err, RankError::Timeout(_)));
    }

    #[tokio::test]
    async fn degenerate_stats_are_fatal() {
        for stats in [
            CorpusStats { avg_doc_length: 0.0, doc_count: 10 },
            CorpusStats { avg_doc_length: f64::NAN, doc_count: 10 },
            CorpusStats { avg_doc_length: 120.0, doc_count: 0 },
        ] {
            let mut up = fake(&[1, 2]);
            up.stats = Some(stats);
            let err = ranker(up).rank(&Query::new("q", "term1")).await.unwrap_err();
            assert!(matches!(err, RankError::Upstream(UpstreamError::InvalidStats { .. })), "{err:?}");
        }
    }

    #[tokio::test]
    async fn report_counts_survivors() {
        let mut up = fake(&[3, 1, 2]);
        up.metadata.remove("d2");
        let outcome = ranker(up).rank(&Query::new("q9", "term1")).await.unwrap();
        assert_eq!(outcome.report.query_id, "q9");
        assert_eq!(outcome.report.num_documents_parsed, 3);
        assert_eq!(outcome.report.num_ranked_documents, 2);
    }

    #[tokio::test]
    async fn rank_runs_on_a_spawned_task() {
        let r = Arc::new(ranker(fake(&[1, 2])));
        let handle = tokio::spawn(async move {
            let query = Query::new("q", "term1");
            r.rank(&query).await.map(|o| o.documents.len())
        });
        assert_eq!(handle.await.unwrap().unwrap(), 2);
    }
}
