//! Typed access to the index and PageRank services.

use crate::config::UpstreamConfig;
use crate::error::UpstreamError;
use async_trait::async_trait;
use ranking_core::{CorpusStats, DocumentIndexEntry, DocumentMetadata, PageRankInfo};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Longest PageRank error body kept in an error.
pub const MAX_ERROR_BODY: usize = 512;

#[async_trait]
pub trait Upstream: Send + Sync {
    async fn postings(&self, term: &str) -> Result<Vec<DocumentIndexEntry>, UpstreamError>;
    async fn metadata(&self, doc_id: &str) -> Result<DocumentMetadata, UpstreamError>;
    async fn corpus_stats(&self) -> Result<CorpusStats, UpstreamError>;
    async fn page_rank(&self, url: &str) -> Result<PageRankInfo, UpstreamError>;
}

#[derive(Deserialize)]
struct PostingsResponse {
    #[serde(default)]
    index: Vec<DocumentIndexEntry>,
}

#[derive(Deserialize)]
struct MetadataResponse {
    metadata: DocumentMetadata,
}

pub struct HttpUpstream {
    client: Client,
    config: UpstreamConfig,
}

impl HttpUpstream {
    pub fn new(config: UpstreamConfig) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn index_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.config.index_base_url.trim_end_matches('/'), endpoint)
    }

    /// The document URL is appended as-is.
    fn page_rank_url(&self, url: &str) -> String {
        let base = &self.config.pagerank_base_url;
        if base.ends_with('/') { format!("{base}{url}") } else { format!("{base}/{url}") }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: String,
        query: &[(&str, &str)],
        keep_body: bool,
    ) -> Result<T, UpstreamError> {
        let resp = match self.client.get(&url).query(query).send().await {
            Ok(resp) => resp,
            Err(source) => return Err(UpstreamError::Request { url, source }),
        };
        let status = resp.status();
        if status != StatusCode::OK {
            let body = if keep_body {
                resp.text().await.unwrap_or_default().chars().take(MAX_ERROR_BODY).collect()
            } else {
                String::new()
            };
            return Err(UpstreamError::Status { url, status: status.as_u16(), body });
        }
        match resp.json::<T>().await {
            Ok(value) => Ok(value),
            Err(source) => Err(UpstreamError::Decode { url, source }),
        }
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn postings(&self, term: &str) -> Result<Vec<DocumentIndexEntry>, UpstreamError> {
        let resp: PostingsResponse =
            self.get_json(self.index_url("getInvertibleIndex"), &[("term", term)], false).await?;
        Ok(resp.index)
    }

    async fn metadata(&self, doc_id: &str) -> Result<DocumentMetadata, UpstreamError> {
        let resp: MetadataResponse =
            self.get_json(self.index_url("getDocumentMetadata"), &[("docID", doc_id)], false).await?;
        Ok(resp.metadata)
    }

    async fn corpus_stats(&self) -> Result<CorpusStats, UpstreamError> {
        self.get_json(self.index_url("getTotalDocStatistics"), &[], false).await
    }

    async fn page_rank(&self, url: &str) -> Result<PageRankInfo, UpstreamError> {
        self.get_json(self.page_rank_url(url), &[], true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn upstream(server: &MockServer) -> HttpUpstream {
        HttpUpstream::new(UpstreamConfig {
            index_base_url: server.uri(),
            pagerank_base_url: format!("{}/ranking/", server.uri()),
            timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn decodes_postings_and_encodes_the_term() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/getInvertibleIndex"))
            .and(query_param("term", "c++ & rust"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"term":"c++ & rust","index":[{"docID":"d1","frequency":2,"positions":[1,5]},{"docID":"d2","frequency":1}]}"#,
            ))
            .mount(&server)
            .await;

        let postings = upstream(&server).postings("c++ & rust").await.unwrap();
        assert_eq!(postings.len(), 2);
        assert_eq!(postings[0].positions, vec![1, 5]);
        assert!(postings[1].positions.is_empty());
    }

    #[tokio::test]
    async fn metadata_maps_wire_names() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/getDocumentMetadata"))
            .and(query_param("docID", "d1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"docID":"d1","metadata":{"docLength":120,"timeLastUpdated":"2024-01-01","docType":"html","imageCount":3,"docTitle":"T","URL":"site.org/a"}}"#,
            ))
            .mount(&server)
            .await;

        let meta = upstream(&server).metadata("d1").await.unwrap();
        assert_eq!(meta.doc_length, 120);
        assert_eq!(meta.file_type, "html");
        assert_eq!(meta.url, "site.org/a");
    }

    #[tokio::test]
    async fn non_200_is_a_status_error() {
        let server = MockServer::start().await;
        Mock::given(path("/getTotalDocStatistics"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        match upstream(&server).corpus_stats().await {
            Err(UpstreamError::Status { status, url, .. }) => {
                assert_eq!(status, 204);
                assert!(url.ends_with("/getTotalDocStatistics"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn bad_json_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(path("/getTotalDocStatistics"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{invalid json}"))
            .mount(&server)
            .await;

        assert!(matches!(upstream(&server).corpus_stats().await, Err(UpstreamError::Decode { .. })));
    }

    #[tokio::test]
    async fn page_rank_error_keeps_truncated_body() {
        let server = MockServer::start().await;
        Mock::given(path("/ranking/site.org/a"))
            .respond_with(ResponseTemplate::new(500).set_body_string("x".repeat(2000)))
            .mount(&server)
            .await;

        match upstream(&server).page_rank("site.org/a").await {
            Err(UpstreamError::Status { status, body, .. }) => {
                assert_eq!(status, 500);
                assert_eq!(body.len(), MAX_ERROR_BODY);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn page_rank_decodes() {
        let server = MockServer::start().await;
        Mock::given(path("/ranking/site.org/a"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"pageRank":0.25,"inLinkCount":4,"outLinkCount":9}"#),
            )
            .mount(&server)
            .await;

        let pr = upstream(&server).page_rank("site.org/a").await.unwrap();
        assert_eq!(pr, PageRankInfo { page_rank: 0.25, in_link_count: 4, out_link_count: 9 });
    }

    #[tokio::test]
    async fn unreachable_host_is_a_request_error() {
        let up = HttpUpstream::new(UpstreamConfig {
            index_base_url: "http://127.0.0.1:1".into(),
            pagerank_base_url: "http://127.0.0.1:1/".into(),
            timeout: Duration::from_secs(1),
        })
        .unwrap();
        assert!(matches!(up.corpus_stats().await, Err(UpstreamError::Request { .. })));
    }
}
