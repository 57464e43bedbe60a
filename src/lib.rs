#![deny(dead_code)]
#![deny(unused_imports)]

pub mod dataset;
pub mod evaluate;
pub mod export;
pub mod geo;
pub mod greenland;
pub mod impute;
pub mod model;
pub mod partition;
pub mod sweep;
pub mod types;

pub use dataset::{ColumnRecode, Dataset, DatasetError, LoadConfig, load_dataset};
pub use evaluate::{
    AnalysisError, ErrorSummary, evaluate, normalized_rmse, r2_score, rmse_score,
};
pub use export::{
    ExportError, write_performance_table, write_prediction_triples, write_sensitivity_table,
};
pub use geo::{EARTH_RADIUS_KM, haversine_distances, haversine_km};
pub use greenland::{
    GreenlandRun, categorical_covariates, global_load_config, greenland_train_test_sets,
    grip_center, gris_load_config, ice_core_anchors, run_greenland,
};
pub use impute::{ImputeOptions, fill_anchor_gaps, gaussian_estimate};
pub use model::{BoostConfig, GradientBoostedTrees, ModelError, Regressor};
pub use partition::{SplitError, SplitOptions, SplitResult, split, split_by_distance};
pub use sweep::{
    CenterSampling, PerformanceCell, PerformanceSweepConfig, SensitivityCell,
    SensitivitySweepConfig, run_performance_sweep, run_sensitivity_sweep,
    sample_prediction_centers,
};
pub use types::{Anchor, GeoPoint, LatLonBounds};
