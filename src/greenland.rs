//! The Greenland prediction workflow: ice-core anchor configuration, the
//! upstream data-product presets, and the train/predict pipeline for the
//! ice sheet's unmeasured interior.

use crate::dataset::{ColumnRecode, Dataset, LoadConfig};
use crate::evaluate::{AnalysisError, ErrorSummary, evaluate};
use crate::impute::{ImputeOptions, fill_anchor_gaps};
use crate::model::Regressor;
use crate::partition::{SplitOptions, SplitResult, split};
use crate::types::{Anchor, GeoPoint};
use ndarray::Array1;
use std::path::PathBuf;

/// The only direct GHF measurements under the Greenland ice sheet: four
/// deep ice cores. NGRIP's tight decay radius reflects how local that
/// reading is known to be.
pub fn ice_core_anchors() -> Vec<Anchor> {
    vec![
        Anchor::new("GRIP", GeoPoint::new(72.58, -37.64), 51.3, 1000.0),
        Anchor::new("GISP2", GeoPoint::new(72.60, -38.50), 60.0, 1000.0),
        Anchor::new("DYE3", GeoPoint::new(65.18, -43.82), 20.0, 1000.0),
        Anchor::new("NGRIP", GeoPoint::new(75.10, -42.32), 135.0, 150.0),
    ]
}

/// The GRIP core site, used as the center of the Greenland test circle.
pub fn grip_center() -> GeoPoint {
    GeoPoint::new(72.58, -37.64)
}

/// Reclassification of the regional 10-class lithology coding onto the
/// global scheme (volcanic = 1, metamorphic = 2, sedimentary = 3).
pub fn lithology_recode() -> ColumnRecode {
    ColumnRecode {
        column: "lthlgy_mod".to_string(),
        map: vec![
            (1.0, 2.0),
            (2.0, 3.0),
            (3.0, 3.0),
            (4.0, 3.0),
            (5.0, 1.0),
            (6.0, 2.0),
            (7.0, 1.0),
            (8.0, 3.0),
            (9.0, 2.0),
            (10.0, 2.0),
        ],
    }
}

/// Covariate columns that are categorical codes and must be one-hot
/// expanded before modeling.
pub fn categorical_covariates() -> Vec<String> {
    vec![
        "G_u_m_vel_".to_string(),
        "lthlgy_mod".to_string(),
        "G_ther_age".to_string(),
    ]
}

/// Upper bound on credible GHF readings; rows at or above it are treated
/// as data errors and dropped at load time.
pub const MAX_GHF: f64 = 150.0;

fn base_load_config(path: PathBuf) -> LoadConfig {
    let mut cfg = LoadConfig::new(path);
    cfg.max_target = Some(MAX_GHF);
    cfg.invalid_codes = vec![
        ("lthlgy_mod".to_string(), 0.0),
        ("lthlgy_mod".to_string(), -9999.0),
    ];
    cfg.ignored_columns = [
        "OBJECTID_1",
        "continent",
        "lthlgy_all",
        "num_in_cel",
        "num_in_con",
        "WGM2012_Ai",
        "depthmoho",
        "moho_Pasya",
        "lithk_cona",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    cfg
}

/// Loader preset for the global 1-degree resampled data product.
pub fn global_load_config(path: impl Into<PathBuf>) -> LoadConfig {
    base_load_config(path.into())
}

/// Loader preset for the Greenland (GrIS) regional file: the global preset
/// plus the lithology reclassification, with a zero target meaning "no
/// measurement exists here".
pub fn gris_load_config(path: impl Into<PathBuf>) -> LoadConfig {
    let mut cfg = base_load_config(path.into());
    cfg.recodes = vec![lithology_recode()];
    cfg.target_unknown_code = Some(0.0);
    cfg
}

/// Everything the export layer needs from one Greenland run.
#[derive(Debug, Clone)]
pub struct GreenlandRun {
    /// Scores on the held-out circle around GRIP.
    pub summary: ErrorSummary,
    pub test_points: Vec<GeoPoint>,
    pub test_actual: Array1<f64>,
    pub test_predicted: Array1<f64>,
    /// Predictions for the records with no measurement at all.
    pub unknown_points: Vec<GeoPoint>,
    pub unknown_predicted: Array1<f64>,
}

/// Impute anchored GHF values, then split the labeled records around the
/// GRIP core.
///
/// Returns the spatial split plus the still-unmeasured records awaiting
/// prediction. The split center is resolved from the GRIP anchor before
/// any partitioning happens.
pub fn greenland_train_test_sets(
    data: &Dataset,
    split_opts: &SplitOptions,
    impute_opts: &ImputeOptions,
) -> Result<(SplitResult, Dataset), AnalysisError> {
    let (known, unknown) = fill_anchor_gaps(data, &ice_core_anchors(), impute_opts);
    let split_result = split(&known, grip_center(), split_opts)?;
    Ok((split_result, unknown))
}

/// Full Greenland pipeline: impute, split around GRIP, train, score the
/// held-out circle, and predict the unmeasured records.
pub fn run_greenland<M: Regressor>(
    data: &Dataset,
    model: &mut M,
    split_opts: &SplitOptions,
    impute_opts: &ImputeOptions,
) -> Result<GreenlandRun, AnalysisError> {
    let (split_result, unknown) = greenland_train_test_sets(data, split_opts, impute_opts)?;
    log::info!(
        "greenland split: {} train rows, {} test rows, {} to predict",
        split_result.n_train(),
        split_result.n_test(),
        unknown.len()
    );

    let summary = evaluate(model, &split_result)?;
    let test_predicted = model.predict(split_result.x_test.view())?;
    let unknown_predicted = if unknown.is_empty() {
        Array1::zeros(0)
    } else {
        model.predict(unknown.covariates())?
    };

    Ok(GreenlandRun {
        summary,
        test_points: split_result.test_points,
        test_actual: split_result.y_test,
        test_predicted,
        unknown_points: unknown.points().to_vec(),
        unknown_predicted,
    })
}
