use crate::error::{Error, Result};
use crate::features::{Features, FEATURE_COUNT};
use ndarray::{Array1, Array2, Axis};

/// Stacks feature vectors into an `n x FEATURE_COUNT` matrix.
pub fn feature_matrix(features: &[Features]) -> Result<Array2<f64>> {
    let flat: Vec<f64> = features.iter().flat_map(|f| f.to_vector()).collect();
    Array2::from_shape_vec((features.len(), FEATURE_COUNT), flat)
        .map_err(|e| Error::Training(format!("failed to build feature matrix: {e}")))
}

/// Per-column z-score scaling fitted on training rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Standardizer {
    pub mean: Array1<f64>,
    pub std: Array1<f64>,
}

impl Standardizer {
    /// Population mean and standard deviation per column. Constant columns get σ = 1.
    pub fn fit(x: &Array2<f64>) -> Result<Self> {
        let mean = x.mean_axis(Axis(0)).ok_or_else(|| Error::Training("empty feature set".into()))?;
        let mut std = x.std_axis(Axis(0), 0.0);
        std.mapv_inplace(|s| if s == 0.0 { 1.0 } else { s });
        Ok(Self { mean, std })
    }

    pub fn fit_features(features: &[Features]) -> Result<Self> {
        Self::fit(&feature_matrix(features)?)
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.mean) / &self.std
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Array2<f64> {
        Array2::from_shape_fn((40, FEATURE_COUNT), |(i, j)| {
            if j == 5 {
                7.0 // constant column
            } else {
                ((i * 7 + j * 3) % 13) as f64 * (j as f64 + 0.5) - 4.0
            }
        })
    }

    #[test]
    fn standardized_columns_have_zero_mean_unit_variance() {
        let x = rows();
        let z = Standardizer::fit(&x).unwrap().transform(&x);
        let mean = z.mean_axis(Axis(0)).unwrap();
        let var = z.var_axis(Axis(0), 0.0);
        for j in 0..FEATURE_COUNT {
            assert!(mean[j].abs() < 1e-9, "column {j} mean {}", mean[j]);
            if j != 5 {
                assert!((var[j] - 1.0).abs() < 1e-9, "column {j} variance {}", var[j]);
            }
        }
    }

    #[test]
    fn constant_column_is_clamped() {
        let x = rows();
        let s = Standardizer::fit(&x).unwrap();
        assert_eq!(s.std[5], 1.0);
        assert_eq!(s.mean[5], 7.0);
        assert_eq!(s.transform(&x)[[0, 5]], 0.0);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(Standardizer::fit(&Array2::zeros((0, FEATURE_COUNT))).is_err());
        assert!(Standardizer::fit_features(&[]).is_err());
    }

    #[test]
    fn feature_matrix_follows_feature_order() {
        let f = Features { bm25: 2.0, page_rank: 0.25, ..Default::default() };
        let x = feature_matrix(&[Features::default(), f]).unwrap();
        assert_eq!(x.dim(), (2, FEATURE_COUNT));
        assert_eq!(x.row(1).to_vec(), f.to_vector().to_vec());
    }
}
