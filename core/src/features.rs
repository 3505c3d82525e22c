//! Per (query, document) feature vector and the pure numeric kernels behind it.
//!
//! Field order of [`Features`] is shared by ranking, the libsvm loader and every
//! persisted dataset or model. Reordering fields invalidates all of them.

use crate::index::{DocumentMetadata, InvertedIndex, PageRankInfo, TermFrequencies};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// BM25 term-frequency saturation.
pub const K1: f64 = 1.5;
/// BM25 length normalization.
pub const B: f64 = 0.75;

pub const FEATURE_COUNT: usize = 24;

macro_rules! feature_vector {
    ($( $field:ident : $ty:ty => $name:literal ),* $(,)?) => {
        #[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
        pub struct Features {
            $( pub $field: $ty, )*
        }

        /// Column names, in field order.
        pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [$( $name ),*];

        impl Features {
            pub fn to_vector(&self) -> [f64; FEATURE_COUNT] {
                [$( self.$field as f64 ),*]
            }

            /// Set the field at `index`. Integer fields truncate. Returns false
            /// when `index` is out of range.
            #[allow(unused_assignments)]
            pub fn set(&mut self, index: usize, value: f64) -> bool {
                let mut i = 0usize;
                $(
                    if i == index {
                        self.$field = value as $ty;
                        return true;
                    }
                    i += 1;
                )*
                false
            }

            /// Whether the field at `index` holds an integer count.
            #[allow(unused_assignments)]
            pub fn is_integer(index: usize) -> bool {
                let mut i = 0usize;
                $(
                    if i == index {
                        return stringify!($ty) == "i64";
                    }
                    i += 1;
                )*
                false
            }
        }

        impl std::ops::Sub for Features {
            type Output = Features;

            fn sub(self, rhs: Features) -> Features {
                Features { $( $field: self.$field - rhs.$field, )* }
            }
        }
    };
}

feature_vector! {
    covered_query_term_number: i64 => "CoveredQueryTermNumber",
    covered_query_term_ratio: f64 => "CoveredQueryTermRatio",
    sum_term_frequency: i64 => "SumTermFrequency",
    min_term_frequency: i64 => "MinTermFrequency",
    max_term_frequency: i64 => "MaxTermFrequency",
    mean_term_frequency: f64 => "MeanTermFrequency",
    variance_term_frequency: f64 => "VarianceTermFrequency",
    stream_length: i64 => "StreamLength",
    sum_stream_length_normalized_tf: f64 => "SumStreamLengthNormalizedTF",
    min_stream_length_normalized_tf: f64 => "MinStreamLengthNormalizedTF",
    max_stream_length_normalized_tf: f64 => "MaxStreamLengthNormalizedTF",
    mean_stream_length_normalized_tf: f64 => "MeanStreamLengthNormalizedTF",
    variance_stream_length_normalized_tf: f64 => "VarianceStreamLengthNormalizedTF",
    sum_tfidf: f64 => "SumTFIDF",
    min_tfidf: f64 => "MinTFIDF",
    max_tfidf: f64 => "MaxTFIDF",
    mean_tfidf: f64 => "MeanTFIDF",
    variance_tfidf: f64 => "VarianceTFIDF",
    bm25: f64 => "BM25",
    num_slashes_in_url: i64 => "NumSlashesInURL",
    length_of_url: i64 => "LengthOfURL",
    inlink_count: i64 => "InlinkCount",
    outlink_count: i64 => "OutlinkCount",
    page_rank: f64 => "PageRank",
}

/// Sum, min, max, mean and population variance of a sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Summary {
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub variance: f64,
}

impl Summary {
    /// All zeros for an empty sample.
    pub fn of(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let n = values.len() as f64;
        let sum: f64 = values.iter().sum();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = sum / n;
        let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        Self { sum, min, max, mean, variance }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TermFrequencyStats {
    pub sum: i64,
    pub min: i64,
    pub max: i64,
    pub mean: f64,
    pub variance: f64,
}

fn tf_of(tf: &TermFrequencies, term: &str) -> u32 {
    tf.get(term).copied().unwrap_or(0)
}

/// `idf[t] = ln(N / (df + 1))` with `df` the posting count of `t`. Terms
/// with no postings get no entry.
pub fn idf(index: &InvertedIndex, doc_count: u64) -> HashMap<String, f64> {
    let n = doc_count as f64;
    index
        .postings
        .iter()
        .filter(|(_, entries)| !entries.is_empty())
        .map(|(term, entries)| (term.clone(), (n / (entries.len() as f64 + 1.0)).ln()))
        .collect()
}

/// Okapi IDF, `ln((N - df + 0.5) / (df + 0.5) + 1)`. Not used for ranking.
pub fn classical_idf(doc_count: u64, df: usize) -> f64 {
    let n = doc_count as f64;
    let df = df as f64;
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

/// Stats over `terms` with duplicates kept; a term absent from `tf` counts as 0.
pub fn term_frequency_stats(terms: &[String], tf: &TermFrequencies) -> TermFrequencyStats {
    if terms.is_empty() {
        return TermFrequencyStats::default();
    }
    let values: Vec<i64> = terms.iter().map(|t| tf_of(tf, t) as i64).collect();
    let as_f64: Vec<f64> = values.iter().map(|&v| v as f64).collect();
    let summary = Summary::of(&as_f64);
    TermFrequencyStats {
        sum: values.iter().sum(),
        min: values.iter().copied().min().unwrap_or(0),
        max: values.iter().copied().max().unwrap_or(0),
        mean: summary.mean,
        variance: summary.variance,
    }
}

pub fn normalized_tf_stats(terms: &[String], tf: &TermFrequencies, doc_length: i64) -> Summary {
    if doc_length <= 0 {
        return Summary::default();
    }
    let len = doc_length as f64;
    let values: Vec<f64> = terms.iter().map(|t| tf_of(tf, t) as f64 / len).collect();
    Summary::of(&values)
}

/// Stats of `tf * idf` over the query terms that have an IDF entry.
pub fn tfidf_stats(terms: &[String], tf: &TermFrequencies, idf: &HashMap<String, f64>) -> Summary {
    let values: Vec<f64> = terms
        .iter()
        .filter_map(|t| idf.get(t).map(|w| tf_of(tf, t) as f64 * w))
        .collect();
    Summary::of(&values)
}

pub fn bm25(
    terms: &[String],
    tf: &TermFrequencies,
    idf: &HashMap<String, f64>,
    doc_length: i64,
    avg_doc_length: f64,
) -> f64 {
    let length_norm = 1.0 - B + B * (doc_length as f64 / avg_doc_length);
    terms
        .iter()
        .filter_map(|t| {
            let f = tf_of(tf, t);
            if f == 0 {
                return None;
            }
            let w = idf.get(t)?;
            let f = f as f64;
            Some(w * (f * (K1 + 1.0)) / (f + K1 * length_norm))
        })
        .sum()
}

/// `(number of '/', length in chars)`.
pub fn analyze_url(url: &str) -> (i64, i64) {
    let slashes = url.chars().filter(|&c| c == '/').count();
    (slashes as i64, url.chars().count() as i64)
}

/// Covered count (duplicates counted) and ratio to the query length.
pub fn covered_query_terms(terms: &[String], tf: &TermFrequencies) -> (i64, f64) {
    let covered = terms.iter().filter(|t| tf.contains_key(t.as_str())).count();
    let ratio = if terms.is_empty() { 0.0 } else { covered as f64 / terms.len() as f64 };
    (covered as i64, ratio)
}

pub fn compute_features(
    terms: &[String],
    tf: &TermFrequencies,
    idf: &HashMap<String, f64>,
    avg_doc_length: f64,
    metadata: &DocumentMetadata,
    page_rank: &PageRankInfo,
) -> Features {
    let (covered, covered_ratio) = covered_query_terms(terms, tf);
    let tf_stats = term_frequency_stats(terms, tf);
    let norm = normalized_tf_stats(terms, tf, metadata.doc_length);
    let tfidf = tfidf_stats(terms, tf, idf);
    let (slashes, url_len) = analyze_url(&metadata.url);

    Features {
        covered_query_term_number: covered,
        covered_query_term_ratio: covered_ratio,
        sum_term_frequency: tf_stats.sum,
        min_term_frequency: tf_stats.min,
        max_term_frequency: tf_stats.max,
        mean_term_frequency: tf_stats.mean,
        variance_term_frequency: tf_stats.variance,
        stream_length: metadata.doc_length,
        sum_stream_length_normalized_tf: norm.sum,
        min_stream_length_normalized_tf: norm.min,
        max_stream_length_normalized_tf: norm.max,
        mean_stream_length_normalized_tf: norm.mean,
        variance_stream_length_normalized_tf: norm.variance,
        sum_tfidf: tfidf.sum,
        min_tfidf: tfidf.min,
        max_tfidf: tfidf.max,
        mean_tfidf: tfidf.mean,
        variance_tfidf: tfidf.variance,
        bm25: bm25(terms, tf, idf, metadata.doc_length, avg_doc_length),
        num_slashes_in_url: slashes,
        length_of_url: url_len,
        inlink_count: page_rank.in_link_count as i64,
        outlink_count: page_rank.out_link_count as i64,
        page_rank: page_rank.page_rank,
    }
}
