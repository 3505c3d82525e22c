//! L2-regularized logistic regression over pairwise feature differences.

use crate::error::{Error, Result};
use crate::features::{Features, FEATURE_COUNT};
use crate::standardize::{feature_matrix, Standardizer};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Added inside the log-loss to keep `ln` finite.
const LOG_EPSILON: f64 = 1e-15;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainConfig {
    pub learning_rate: f64,
    pub max_epochs: usize,
    /// Consecutive non-improving epochs before stopping.
    pub patience: usize,
    pub seed: u64,
    /// Apply the L2 penalty to the bias gradient too.
    pub regularize_bias: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self { learning_rate: 0.02, max_epochs: 1000, patience: 5, seed: 0, regularize_bias: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainReport {
    pub epochs: usize,
    pub final_loss: f64,
    pub stopped_early: bool,
}

/// Fitted weights plus the standardization they were trained under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainedModel {
    pub weights: Vec<f64>,
    pub bias: f64,
    pub feature_mean: Vec<f64>,
    pub feature_std: Vec<f64>,
    pub lambda: f64,
}

impl TrainedModel {
    pub fn predict_probability(&self, features: &Features) -> f64 {
        let z: f64 = self
            .weights
            .iter()
            .zip(&self.feature_mean)
            .zip(&self.feature_std)
            .zip(features.to_vector())
            .map(|(((w, mean), std), x)| w * (x - mean) / std)
            .sum();
        sigmoid(self.bias + z)
    }

    pub fn validate(&self) -> Result<()> {
        let lens = [self.weights.len(), self.feature_mean.len(), self.feature_std.len()];
        if lens.iter().any(|&l| l != FEATURE_COUNT) {
            return Err(Error::Training(format!("model dimensions {lens:?} do not match {FEATURE_COUNT} features")));
        }
        if self.feature_std.iter().any(|&s| s == 0.0) {
            return Err(Error::Training("model has a zero feature deviation".into()));
        }
        Ok(())
    }
}

pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

#[derive(Debug, Clone)]
pub struct LogisticRegression {
    lambda: f64,
    model: Option<TrainedModel>,
}

impl LogisticRegression {
    pub fn new(lambda: f64) -> Self {
        Self { lambda, model: None }
    }

    pub fn from_model(model: TrainedModel) -> Result<Self> {
        model.validate()?;
        Ok(Self { lambda: model.lambda, model: Some(model) })
    }

    pub fn lambda(&self) -> f64 { self.lambda }

    pub fn model(&self) -> Option<&TrainedModel> { self.model.as_ref() }

    pub fn into_model(self) -> Option<TrainedModel> { self.model }

    /// Batch gradient descent with early stopping. `labels` are ±1; anything
    /// other than 1 is treated as the negative class. Lambda must be positive.
    pub fn fit(&mut self, features: &[Features], labels: &[i32], config: &TrainConfig) -> Result<TrainReport> {
        if features.len() != labels.len() {
            return Err(Error::Training(format!(
                "number of features ({}) does not match number of labels ({})",
                features.len(),
                labels.len()
            )));
        }
        if features.is_empty() {
            return Err(Error::Training("empty training data".into()));
        }
        if !(self.lambda.is_finite() && self.lambda > 0.0) {
            return Err(Error::Training(format!("invalid regularization strength {}", self.lambda)));
        }

        let raw = feature_matrix(features)?;
        let scaler = Standardizer::fit(&raw)?;
        let x = scaler.transform(&raw);
        let y: Array1<f64> = labels.iter().map(|&l| if l == 1 { 1.0 } else { 0.0 }).collect();
        let n = x.nrows() as f64;
        let lambda = self.lambda;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let limit = (6.0 / FEATURE_COUNT as f64).sqrt();
        let mut w: Array1<f64> = (0..FEATURE_COUNT).map(|_| rng.gen_range(-limit..limit)).collect();
        let mut bias = 0.0;

        let mut prev_loss = f64::INFINITY;
        let mut no_improvement = 0;
        let mut report = TrainReport { epochs: 0, final_loss: f64::NAN, stopped_early: false };

        for epoch in 0..config.max_epochs {
            let p = (x.dot(&w) + bias).mapv(sigmoid);

            let log_loss = p
                .iter()
                .zip(&y)
                .map(|(pi, yi)| yi * (pi + LOG_EPSILON).ln() + (1.0 - yi) * (1.0 - pi + LOG_EPSILON).ln())
                .sum::<f64>();
            let loss = -log_loss / n + 0.5 * lambda * w.dot(&w);
            report.epochs = epoch + 1;
            report.final_loss = loss;

            if loss >= prev_loss {
                no_improvement += 1;
                if no_improvement >= config.patience {
                    tracing::debug!(epoch, loss, "early stopping");
                    report.stopped_early = true;
                    break;
                }
            } else {
                no_improvement = 0;
            }
            prev_loss = loss;

            if epoch % 10 == 0 {
                tracing::debug!(epoch, loss, "training");
            }

            let err = &p - &y;
            let grad_w = x.t().dot(&err) / n + &w * lambda;
            let mut grad_b = err.sum() / n;
            if config.regularize_bias {
                grad_b += lambda * bias;
            }

            w.scaled_add(-config.learning_rate, &grad_w);
            bias -= config.learning_rate * grad_b;
        }

        self.model = Some(TrainedModel {
            weights: w.to_vec(),
            bias,
            feature_mean: scaler.mean.to_vec(),
            feature_std: scaler.std.to_vec(),
            lambda,
        });
        Ok(report)
    }

    /// Probability that the left document of the pair is the more relevant
    /// one. An untrained model returns 0.
    pub fn predict_probability(&self, features: &Features) -> f64 {
        self.model.as_ref().map_or(0.0, |m| m.predict_probability(features))
    }

    pub fn predict_class(&self, features: &Features) -> i32 {
        if self.predict_probability(features) >= 0.5 { 1 } else { -1 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub true_positive: usize,
    pub false_positive: usize,
    pub true_negative: usize,
    pub false_negative: usize,
}

impl ConfusionMatrix {
    pub fn record(&mut self, predicted: i32, actual: i32) {
        // Any label other than 1 is the negative class, as in `fit`.
        match (predicted == 1, actual == 1) {
            (true, true) => self.true_positive += 1,
            (true, false) => self.false_positive += 1,
            (false, false) => self.true_negative += 1,
            (false, true) => self.false_negative += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }

    /// Percentage of correct predictions, 0 when nothing was recorded.
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.true_positive + self.true_negative) as f64 / total as f64 * 100.0
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Confusion Matrix:")?;
        writeln!(f, "              Predicted")?;
        writeln!(f, "              1     -1")?;
        writeln!(f, "Actual  1    {}    {}", self.true_positive, self.false_negative)?;
        write!(f, "        -1   {}    {}", self.false_positive, self.true_negative)
    }
}

pub fn evaluate(model: &LogisticRegression, features: &[Features], labels: &[i32]) -> ConfusionMatrix {
    let mut cm = ConfusionMatrix::default();
    for (f, &actual) in features.iter().zip(labels) {
        cm.record(model.predict_class(f), actual);
    }
    cm
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridSearchResult {
    pub best_lambda: f64,
    pub best_accuracy: f64,
    /// Mean cross-validation accuracy for each candidate, in input order.
    pub scores: Vec<(f64, f64)>,
}

/// k-fold cross-validation over `lambdas`. Folds are contiguous and equal
/// sized; the last one takes the remainder. Ties keep the earlier lambda.
pub fn grid_search_cv(
    features: &[Features],
    labels: &[i32],
    lambdas: &[f64],
    folds: usize,
    config: &TrainConfig,
) -> Result<GridSearchResult> {
    if features.len() != labels.len() {
        return Err(Error::Training(format!(
            "number of features ({}) does not match number of labels ({})",
            features.len(),
            labels.len()
        )));
    }
    if lambdas.is_empty() {
        return Err(Error::Training("no regularization values to search".into()));
    }
    if folds < 2 || features.len() < folds {
        return Err(Error::Training(format!("cannot split {} samples into {folds} folds", features.len())));
    }

    let n = features.len();
    let fold_size = n / folds;
    let mut scores = Vec::with_capacity(lambdas.len());
    let mut best: Option<(f64, f64)> = None;

    for &lambda in lambdas {
        let mut total = 0.0;
        for fold in 0..folds {
            let start = fold * fold_size;
            let end = if fold == folds - 1 { n } else { start + fold_size };

            let train_x: Vec<Features> = features[..start].iter().chain(&features[end..]).copied().collect();
            let train_y: Vec<i32> = labels[..start].iter().chain(&labels[end..]).copied().collect();

            let mut model = LogisticRegression::new(lambda);
            model.fit(&train_x, &train_y, config)?;
            total += evaluate(&model, &features[start..end], &labels[start..end]).accuracy();
        }
        let mean = total / folds as f64;
        tracing::info!(lambda, accuracy = mean, "cross-validation");
        scores.push((lambda, mean));

        if best.map_or(true, |(_, acc)| mean > acc) {
            best = Some((lambda, mean));
        }
    }

    let (best_lambda, best_accuracy) = best.unwrap_or((lambdas[0], 0.0));
    Ok(GridSearchResult { best_lambda, best_accuracy, scores })
}
