//! Pairwise training examples from a relevance-judged libsvm corpus.
//!
//! Every ordered pair of documents under the same qid whose relevance differs
//! by at least `min_diff` yields `(features[i] - features[j], ±1)`. Pairs are
//! streamed through a fixed-size reservoir so memory stays bounded by
//! `max_examples` regardless of corpus size.

use crate::error::{Error, Result};
use crate::features::{Features, FEATURE_COUNT};
use lazy_static::lazy_static;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// libsvm feature ids, in `Features` field order.
const LIBSVM_FEATURE_IDS: [u32; FEATURE_COUNT] = [
    5, 10, 25, 30, 35, 40, 45, 15, 50, 55, 60, 65, 70, 75, 80, 85, 90, 95, 110, 126, 127, 128, 129, 130,
];

lazy_static! {
    static ref FEATURE_SLOT: HashMap<u32, usize> = LIBSVM_FEATURE_IDS
        .iter()
        .enumerate()
        .map(|(slot, &id)| (id, slot))
        .collect();
}

pub const MIN_DIFF_RANGE: std::ops::RangeInclusive<i32> = 1..=4;

#[derive(Debug, Clone, PartialEq)]
pub struct JudgedDocument {
    pub relevance: i32,
    pub qid: u64,
    pub features: Features,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairwiseExample {
    pub delta: Features,
    pub label: i32,
}

/// Feature rows with their ±1 labels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub features: Vec<Features>,
    pub labels: Vec<i32>,
}

impl Dataset {
    pub fn new(features: Vec<Features>, labels: Vec<i32>) -> Result<Self> {
        if features.len() != labels.len() {
            return Err(Error::Training(format!(
                "number of features ({}) does not match number of labels ({})",
                features.len(),
                labels.len()
            )));
        }
        if let Some(row) = labels.iter().position(|&l| l != 1 && l != -1) {
            return Err(Error::Training(format!("label {} at row {row} is not 1 or -1", labels[row])));
        }
        Ok(Self { features, labels })
    }

    pub fn len(&self) -> usize { self.labels.len() }

    pub fn is_empty(&self) -> bool { self.labels.is_empty() }

    /// Fisher-Yates over rows, keeping each row paired with its label.
    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        for i in (1..self.len()).rev() {
            let j = rng.gen_range(0..=i);
            self.features.swap(i, j);
            self.labels.swap(i, j);
        }
    }

    /// First `ratio` of the rows, then the rest.
    pub fn split(mut self, ratio: f64) -> (Dataset, Dataset) {
        let at = ((self.len() as f64) * ratio.clamp(0.0, 1.0)) as usize;
        let rest_features = self.features.split_off(at);
        let rest_labels = self.labels.split_off(at);
        (self, Dataset { features: rest_features, labels: rest_labels })
    }
}

/// Parse one `<relevance> qid:<q> <id>:<value> ...` line. Blank lines yield `None`.
pub fn parse_line(line: &str, line_no: usize) -> Result<Option<JudgedDocument>> {
    let err = |message: String| Error::Parse { line: line_no, message };
    let mut parts = line.split_whitespace().take_while(|p| !p.starts_with('#'));

    let Some(relevance) = parts.next() else { return Ok(None) };
    let relevance: i32 = relevance
        .parse()
        .ok()
        .filter(|r| (0..=4).contains(r))
        .ok_or_else(|| err(format!("invalid relevance label: {relevance}")))?;

    let qid_part = parts.next().ok_or_else(|| err("missing query id".into()))?;
    let qid = qid_part
        .strip_prefix("qid:")
        .and_then(|q| q.parse::<u64>().ok())
        .ok_or_else(|| err(format!("invalid query ID format: {qid_part}")))?;

    let mut features = Features::default();
    for part in parts {
        let (id, value) = part
            .split_once(':')
            .ok_or_else(|| err(format!("invalid feature format: {part}")))?;
        let id: u32 = id.parse().map_err(|_| err(format!("invalid feature id: {part}")))?;
        let value: f64 = value
            .parse()
            .map_err(|_| err(format!("failed to parse feature value as float: {part}")))?;
        if let Some(&slot) = FEATURE_SLOT.get(&id) {
            features.set(slot, value);
        }
    }

    Ok(Some(JudgedDocument { relevance, qid, features }))
}

pub fn load_judged_documents<P: AsRef<Path>>(path: P) -> Result<Vec<JudgedDocument>> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    let mut docs = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        if let Some(doc) = parse_line(&line?, i + 1)? {
            docs.push(doc);
        }
    }
    tracing::info!(documents = docs.len(), path = %path.as_ref().display(), "loaded judged documents");
    Ok(docs)
}

/// Uniform fixed-size sample over a stream of unknown length.
#[derive(Debug, Clone)]
pub struct Reservoir<T> {
    capacity: usize,
    seen: usize,
    items: Vec<T>,
}

impl<T> Reservoir<T> {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, seen: 0, items: Vec::with_capacity(capacity) }
    }

    pub fn offer<R: Rng>(&mut self, item: T, rng: &mut R) {
        self.seen += 1;
        if self.items.len() < self.capacity {
            self.items.push(item);
            return;
        }
        let r = rng.gen_range(0..self.seen);
        if r < self.capacity {
            self.items[r] = item;
        }
    }

    /// Items offered so far, including those not kept.
    pub fn seen(&self) -> usize { self.seen }

    pub fn into_items(self) -> Vec<T> { self.items }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairwiseConfig {
    pub max_examples: usize,
    pub min_diff: i32,
    pub seed: u64,
}

impl Default for PairwiseConfig {
    fn default() -> Self {
        Self { max_examples: 1_000_000, min_diff: 3, seed: 0 }
    }
}

impl PairwiseConfig {
    pub fn validate(&self) -> Result<()> {
        if !MIN_DIFF_RANGE.contains(&self.min_diff) {
            return Err(Error::InvalidConfig(format!(
                "minimum relevance difference must be between {} and {}, got {}",
                MIN_DIFF_RANGE.start(),
                MIN_DIFF_RANGE.end(),
                self.min_diff
            )));
        }
        if self.max_examples == 0 {
            return Err(Error::InvalidConfig("max_examples must be positive".into()));
        }
        Ok(())
    }
}

pub struct PairwiseBuilder {
    config: PairwiseConfig,
    rng: StdRng,
}

impl PairwiseBuilder {
    pub fn new(config: PairwiseConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, rng: StdRng::seed_from_u64(config.seed) })
    }

    /// Reservoir-sample every eligible pair. Groups are visited in ascending qid order.
    pub fn sample(&mut self, docs: &[JudgedDocument]) -> Reservoir<PairwiseExample> {
        let mut groups: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
        for (i, doc) in docs.iter().enumerate() {
            groups.entry(doc.qid).or_default().push(i);
        }

        let mut reservoir = Reservoir::new(self.config.max_examples);
        for indices in groups.values() {
            for &i in indices {
                for &j in indices {
                    let (left, right) = (&docs[i], &docs[j]);
                    if i == j || (left.relevance - right.relevance).abs() < self.config.min_diff {
                        continue;
                    }
                    let label = if left.relevance > right.relevance { 1 } else { -1 };
                    let example = PairwiseExample { delta: left.features - right.features, label };
                    reservoir.offer(example, &mut self.rng);
                }
            }
        }
        reservoir
    }

    /// Sample, check there were enough eligible pairs, then shuffle.
    pub fn build(&mut self, docs: &[JudgedDocument]) -> Result<Dataset> {
        let reservoir = self.sample(docs);
        let seen = reservoir.seen();
        if seen < self.config.max_examples {
            return Err(Error::InsufficientPairs { found: seen, expected: self.config.max_examples });
        }
        let mut examples = reservoir.into_items();
        examples.shuffle(&mut self.rng);
        tracing::info!(eligible_pairs = seen, kept = examples.len(), "built pairwise examples");

        let (features, labels) = examples.into_iter().map(|e| (e.delta, e.label)).unzip();
        Ok(Dataset { features, labels })
    }
}
