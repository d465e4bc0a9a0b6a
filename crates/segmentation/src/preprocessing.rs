//! Standardization and PCA projection of the training matrix, fitted with
//! linfa and persisted inside the model snapshot.

use linfa::prelude::*;
use linfa_preprocessing::linear_scaling::LinearScaler;
use linfa_reduction::Pca;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use shopper_core::{AnalyticsError, AnalyticsResult};
use tracing::{debug, warn};

/// Total variance below this is treated as constant data.
const MIN_TOTAL_VARIANCE: f64 = 1e-12;

pub(crate) fn model_error(e: impl std::fmt::Display) -> AnalyticsError {
    AnalyticsError::Model(e.to_string())
}

/// Zero variance columns and single-row fits produce non-finite values;
/// those collapse to the column mean, which is zero after scaling.
fn sanitize(mut data: Array2<f64>) -> Array2<f64> {
    data.mapv_inplace(|v| if v.is_finite() { v } else { 0.0 });
    data
}

/// Zero-mean, unit-variance scaling fitted on one training batch.
#[derive(Serialize, Deserialize)]
pub struct Standardizer {
    width: usize,
    scaler: LinearScaler<f64>,
}

impl Standardizer {
    pub fn fit(data: &Array2<f64>) -> AnalyticsResult<Self> {
        if data.nrows() == 0 {
            return Err(AnalyticsError::InsufficientData(
                "cannot fit scaler on zero rows".into(),
            ));
        }
        let dataset = DatasetBase::from(data.clone());
        let scaler = LinearScaler::standard()
            .fit(&dataset)
            .map_err(model_error)?;
        Ok(Self {
            width: data.ncols(),
            scaler,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn transform(&self, data: &Array2<f64>) -> AnalyticsResult<Array2<f64>> {
        if data.ncols() != self.width {
            return Err(AnalyticsError::InvalidInput(format!(
                "expected {} columns, got {}",
                self.width,
                data.ncols()
            )));
        }
        let scaled: Array2<f64> = self.scaler.transform(data.clone());
        Ok(sanitize(scaled))
    }
}

/// PCA keeping the fewest components whose share of the total variance
/// reaches the configured target.
#[derive(Serialize, Deserialize)]
pub struct Projection {
    pca: Pca<f64>,
    n_components: usize,
    explained_variance: f64,
}

impl Projection {
    /// `None` when the data has no variance or PCA cannot be fitted; the
    /// caller then clusters the scaled matrix directly.
    pub fn fit(data: &Array2<f64>, variance_target: f64) -> Option<Self> {
        if data.nrows() < 2 {
            return None;
        }
        let total: f64 = data.var_axis(Axis(0), 1.0).sum();
        if !total.is_finite() || total < MIN_TOTAL_VARIANCE {
            debug!("Skipping PCA on constant data");
            return None;
        }

        let dataset = DatasetBase::from(data.clone());
        let max_components = data.ncols().min(data.nrows() - 1);
        let mut best: Option<Self> = None;
        for k in 1..=max_components {
            let pca = match Pca::params(k).fit(&dataset) {
                Ok(pca) => pca,
                Err(e) => {
                    // Rank-deficient data cannot yield more components.
                    if best.is_none() {
                        warn!(error = %e, "PCA fit failed, clustering without projection");
                    } else {
                        debug!(components = k, error = %e, "Stopping PCA at rank limit");
                    }
                    break;
                }
            };
            let explained = (pca.explained_variance().sum() / total).min(1.0);
            best = Some(Self {
                pca,
                n_components: k,
                explained_variance: explained,
            });
            if explained >= variance_target {
                break;
            }
        }
        best
    }

    pub fn n_components(&self) -> usize {
        self.n_components
    }

    /// Share of the training variance kept by the projection.
    pub fn explained_variance(&self) -> f64 {
        self.explained_variance
    }

    pub fn transform(&self, data: &Array2<f64>) -> Array2<f64> {
        let projected: Array2<f64> = self.pca.predict(data);
        sanitize(projected)
    }
}
