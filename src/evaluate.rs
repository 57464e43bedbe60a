//! Model evaluation over a spatial split: fit on the training side,
//! predict the held-out circle, score the result.

use crate::model::{ModelError, Regressor};
use crate::partition::{SplitError, SplitResult};
use ndarray::ArrayView1;
use thiserror::Error;

/// Errors surfaced by evaluation and the sweep loops built on top of it.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Split(#[from] SplitError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(
        "no candidate center with at least {min_test_points} rows within {radius_km} km found in {attempts} attempts"
    )]
    CenterSamplingExhausted {
        radius_km: f64,
        min_test_points: usize,
        attempts: usize,
    },

    #[error("no rows available to sample centers from")]
    NoCandidateCenters,

    #[error("no successful evaluation for test_fraction={test_fraction}, radius={radius_km} km")]
    EmptyCell { test_fraction: f64, radius_km: f64 },

    #[error("no successful evaluation for noise amplitude {noise_amplitude}")]
    EmptyNoiseCell { noise_amplitude: f64 },

    #[error("invalid sweep configuration: {0}")]
    InvalidSweep(String),
}

/// Per-configuration evaluation aggregate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorSummary {
    /// Coefficient of determination; may be negative.
    pub r2: f64,
    /// Root-mean-squared error, >= 0.
    pub rmse: f64,
    /// RMSE divided by a reference mean; only set by the sensitivity
    /// workflow.
    pub normalized_rmse: Option<f64>,
}

impl ErrorSummary {
    /// Score a prediction against a reference prediction rather than
    /// observed targets. This is the sensitivity view: the reference is
    /// the zero-noise prediction and the normalized RMSE is the quantity
    /// of interest.
    pub fn against_reference(
        reference: ArrayView1<'_, f64>,
        prediction: ArrayView1<'_, f64>,
    ) -> Self {
        Self {
            r2: r2_score(reference, prediction),
            rmse: rmse_score(reference, prediction),
            normalized_rmse: Some(normalized_rmse(reference, prediction)),
        }
    }
}

pub fn rmse_score(y: ArrayView1<'_, f64>, mu: ArrayView1<'_, f64>) -> f64 {
    let n = y.len().max(1) as f64;
    let mse = y
        .iter()
        .copied()
        .zip(mu.iter().copied())
        .map(|(yy, pp)| {
            let d = yy - pp;
            d * d
        })
        .sum::<f64>()
        / n;
    mse.sqrt()
}

pub fn r2_score(y: ArrayView1<'_, f64>, mu: ArrayView1<'_, f64>) -> f64 {
    let n = y.len().max(1) as f64;
    let mean_y = y.iter().copied().sum::<f64>() / n;
    let sst = y
        .iter()
        .copied()
        .map(|yy| {
            let d = yy - mean_y;
            d * d
        })
        .sum::<f64>();
    if sst <= 0.0 {
        return 0.0;
    }
    let sse = y
        .iter()
        .copied()
        .zip(mu.iter().copied())
        .map(|(yy, pp)| {
            let d = yy - pp;
            d * d
        })
        .sum::<f64>();
    1.0 - sse / sst
}

/// RMSE between a prediction and a reference, as a fraction of the
/// reference mean.
pub fn normalized_rmse(reference: ArrayView1<'_, f64>, prediction: ArrayView1<'_, f64>) -> f64 {
    let mean_ref = reference.iter().copied().sum::<f64>() / reference.len().max(1) as f64;
    rmse_score(reference, prediction) / mean_ref
}

/// Fit `model` on the training side of `split`, predict the held-out test
/// rows, and summarize the error.
///
/// When the model exposes feature importances they are logged, sorted
/// ascending by weight.
pub fn evaluate<M: Regressor>(
    model: &mut M,
    split: &SplitResult,
) -> Result<ErrorSummary, AnalysisError> {
    model.fit(split.x_train.view(), split.y_train.view())?;
    let y_pred = model.predict(split.x_test.view())?;
    if let Some(weights) = model.feature_importances() {
        log_feature_importances(&split.feature_names, weights.view());
    }
    Ok(ErrorSummary {
        r2: r2_score(split.y_test.view(), y_pred.view()),
        rmse: rmse_score(split.y_test.view(), y_pred.view()),
        normalized_rmse: None,
    })
}

fn log_feature_importances(names: &[String], weights: ArrayView1<'_, f64>) {
    if names.len() != weights.len() {
        log::warn!(
            "feature importance length {} does not match {} feature names; skipping report",
            weights.len(),
            names.len()
        );
        return;
    }
    let mut ranked: Vec<(&String, f64)> = names.iter().zip(weights.iter().copied()).collect();
    ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    for (name, weight) in ranked {
        log::debug!("feature importance: {name} = {weight:.6}");
    }
}
