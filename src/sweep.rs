//! Parameter-grid evaluation loops averaged over randomly sampled
//! prediction circles.
//!
//! Two sweeps are built from the partition/evaluate layers: a performance
//! sweep over (test fraction x radius) and a noise-sensitivity sweep at a
//! fixed split geometry. Both draw `ncenters` random valid centers and
//! average per-configuration statistics across them; a degenerate center is
//! a recoverable condition, logged and skipped, never an abort.

use crate::dataset::Dataset;
use crate::evaluate::{AnalysisError, ErrorSummary, evaluate};
use crate::geo::haversine_distances;
use crate::model::Regressor;
use crate::partition::{SplitError, SplitOptions, split};
use crate::types::{GeoPoint, LatLonBounds};
use ndarray::Array1;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// How random prediction centers are drawn from the dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CenterSampling {
    /// A candidate center is accepted only when at least this many rows lie
    /// strictly inside the reference radius.
    pub min_test_points: usize,
    /// Optional box restricting which record positions may serve as
    /// centers.
    pub region: Option<LatLonBounds>,
    /// Hard cap on rejected draws per center before giving up.
    pub max_attempts: usize,
}

impl CenterSampling {
    /// The data-dense band from North America to western Europe that the
    /// analysis has always sampled its prediction circles from.
    pub fn data_dense_region() -> LatLonBounds {
        LatLonBounds {
            min_lat: 45.0,
            max_lat: 90.0,
            min_lon: -100.0,
            max_lon: 50.0,
        }
    }
}

impl Default for CenterSampling {
    fn default() -> Self {
        Self {
            min_test_points: 100,
            region: Some(Self::data_dense_region()),
            max_attempts: 2000,
        }
    }
}

/// Draw `ncenters` record positions usable as prediction-circle centers.
///
/// Candidates come from the dataset itself (optionally restricted to a
/// region), are rounded to two decimals, and are rejected and resampled
/// until the circle of `radius_km` around them holds at least
/// `min_test_points` rows.
pub fn sample_prediction_centers(
    data: &Dataset,
    radius_km: f64,
    ncenters: usize,
    sampling: &CenterSampling,
    rng: &mut StdRng,
) -> Result<Vec<GeoPoint>, AnalysisError> {
    let candidates: Vec<usize> = (0..data.len())
        .filter(|&i| {
            sampling
                .region
                .map_or(true, |region| region.contains(data.points()[i]))
        })
        .collect();
    if candidates.is_empty() {
        return Err(AnalysisError::NoCandidateCenters);
    }

    let mut centers = Vec::with_capacity(ncenters);
    for _ in 0..ncenters {
        let mut accepted = None;
        for _ in 0..sampling.max_attempts {
            let pick = candidates[rng.random_range(0..candidates.len())];
            let center = data.points()[pick].rounded();
            let inside = haversine_distances(center, data.points())
                .iter()
                .filter(|&&d| d < radius_km)
                .count();
            if inside >= sampling.min_test_points {
                accepted = Some(center);
                break;
            }
        }
        match accepted {
            Some(center) => centers.push(center),
            None => {
                return Err(AnalysisError::CenterSamplingExhausted {
                    radius_km,
                    min_test_points: sampling.min_test_points,
                    attempts: sampling.max_attempts,
                });
            }
        }
    }
    Ok(centers)
}

/// Configuration for the (test fraction x radius) performance sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSweepConfig {
    pub test_fractions: Vec<f64>,
    pub radii_km: Vec<f64>,
    /// Number of random centers each cell is averaged over.
    pub ncenters: usize,
    pub sampling: CenterSampling,
    pub seed: u64,
}

impl Default for PerformanceSweepConfig {
    fn default() -> Self {
        Self {
            test_fractions: (2..20).map(|i| 0.05 * i as f64).collect(),
            radii_km: vec![1200.0, 1700.0, 2200.0, 2700.0],
            ncenters: 10,
            sampling: CenterSampling::default(),
            seed: 0,
        }
    }
}

/// One aggregate row of the performance sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceCell {
    pub test_fraction: f64,
    pub radius_km: f64,
    pub mean_r2: f64,
    pub mean_rmse: f64,
    /// How many of the sampled centers contributed to the means.
    pub centers_used: usize,
}

/// Run the performance sweep: one `split` + `evaluate` per
/// (radius, test fraction, center) triple, averaged across centers.
///
/// Centers are sampled once, against the smallest radius in the grid, and
/// reused for every cell so cells are comparable.
pub fn run_performance_sweep<M, F>(
    data: &Dataset,
    cfg: &PerformanceSweepConfig,
    mut make_model: F,
) -> Result<Vec<PerformanceCell>, AnalysisError>
where
    M: Regressor,
    F: FnMut() -> M,
{
    if cfg.ncenters == 0 {
        return Err(AnalysisError::InvalidSweep("ncenters must be > 0".to_string()));
    }
    if cfg.test_fractions.is_empty() || cfg.radii_km.is_empty() {
        return Err(AnalysisError::InvalidSweep(
            "test_fractions and radii_km must be non-empty".to_string(),
        ));
    }

    let min_radius = cfg.radii_km.iter().copied().fold(f64::INFINITY, f64::min);
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let centers =
        sample_prediction_centers(data, min_radius, cfg.ncenters, &cfg.sampling, &mut rng)?;

    let mut cells = Vec::with_capacity(cfg.radii_km.len() * cfg.test_fractions.len());
    for &radius_km in &cfg.radii_km {
        for &test_fraction in &cfg.test_fractions {
            let mut sum_r2 = 0.0;
            let mut sum_rmse = 0.0;
            let mut used = 0usize;
            for &center in &centers {
                log::debug!(
                    "evaluating t={test_fraction:.2}, radius={radius_km} km, center=({}, {})",
                    center.lat,
                    center.lon
                );
                let opts = SplitOptions {
                    test_fraction,
                    max_dist_km: radius_km,
                    seed: cfg.seed,
                };
                let split_result = match split(data, center, &opts) {
                    Ok(s) => s,
                    Err(SplitError::EmptyTestRegion { .. }) => {
                        log::warn!(
                            "no test points for center ({}, {}) at {radius_km} km; skipping",
                            center.lat,
                            center.lon
                        );
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                };
                let mut model = make_model();
                match evaluate(&mut model, &split_result) {
                    Ok(summary) => {
                        sum_r2 += summary.r2;
                        sum_rmse += summary.rmse;
                        used += 1;
                    }
                    Err(AnalysisError::Model(e)) => {
                        log::warn!(
                            "model failed for center ({}, {}) at {radius_km} km: {e}; skipping",
                            center.lat,
                            center.lon
                        );
                    }
                    Err(e) => return Err(e),
                }
            }
            if used == 0 {
                return Err(AnalysisError::EmptyCell {
                    test_fraction,
                    radius_km,
                });
            }
            cells.push(PerformanceCell {
                test_fraction,
                radius_km,
                mean_r2: sum_r2 / used as f64,
                mean_rmse: sum_rmse / used as f64,
                centers_used: used,
            });
        }
    }
    Ok(cells)
}

/// Configuration for the noise-sensitivity sweep at a fixed split geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivitySweepConfig {
    pub test_fraction: f64,
    pub radius_km: f64,
    /// Relative noise magnitudes: each amplitude `a` injects Gaussian noise
    /// whose mean absolute value is `a` times the mean training target.
    pub noise_amplitudes: Vec<f64>,
    pub ncenters: usize,
    pub sampling: CenterSampling,
    pub seed: u64,
}

impl Default for SensitivitySweepConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.9,
            radius_km: 1700.0,
            noise_amplitudes: (1..13).map(|i| 0.02 * i as f64).collect(),
            ncenters: 10,
            sampling: CenterSampling::default(),
            seed: 0,
        }
    }
}

/// One aggregate row of the sensitivity sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensitivityCell {
    pub noise_amplitude: f64,
    /// Mean over centers of RMSE(noisy prediction, zero-noise prediction)
    /// divided by the zero-noise prediction mean.
    pub mean_normalized_rmse: f64,
    pub centers_used: usize,
}

/// Run the sensitivity sweep: per center, a zero-noise baseline prediction,
/// then one retrain per noise amplitude scored against that baseline.
///
/// Noise with amplitude `a` is drawn as N(0, s^2) with
/// `s = mean(y_train) * a * sqrt(pi/2)`, so its mean absolute value is `a`
/// times the mean training target (half-normal identity). Amplitude zero
/// injects nothing and reproduces the baseline exactly.
pub fn run_sensitivity_sweep<M, F>(
    data: &Dataset,
    cfg: &SensitivitySweepConfig,
    mut make_model: F,
) -> Result<Vec<SensitivityCell>, AnalysisError>
where
    M: Regressor,
    F: FnMut() -> M,
{
    if cfg.ncenters == 0 {
        return Err(AnalysisError::InvalidSweep("ncenters must be > 0".to_string()));
    }
    if cfg.noise_amplitudes.is_empty() {
        return Err(AnalysisError::InvalidSweep(
            "noise_amplitudes must be non-empty".to_string(),
        ));
    }
    if cfg
        .noise_amplitudes
        .iter()
        .any(|a| !a.is_finite() || *a < 0.0)
    {
        return Err(AnalysisError::InvalidSweep(
            "noise amplitudes must be finite and non-negative".to_string(),
        ));
    }

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let centers =
        sample_prediction_centers(data, cfg.radius_km, cfg.ncenters, &cfg.sampling, &mut rng)?;
    let mut noise_rng = StdRng::seed_from_u64(cfg.seed.wrapping_add(1));

    let n_amps = cfg.noise_amplitudes.len();
    let mut sums = vec![0.0; n_amps];
    let mut used = vec![0usize; n_amps];

    for &center in &centers {
        let opts = SplitOptions {
            test_fraction: cfg.test_fraction,
            max_dist_km: cfg.radius_km,
            seed: cfg.seed,
        };
        let split_result = match split(data, center, &opts) {
            Ok(s) => s,
            Err(SplitError::EmptyTestRegion { .. }) => {
                log::warn!(
                    "no test points for center ({}, {}); skipping",
                    center.lat,
                    center.lon
                );
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let mut baseline = make_model();
        let y0 = match baseline
            .fit(split_result.x_train.view(), split_result.y_train.view())
            .and_then(|_| baseline.predict(split_result.x_test.view()))
        {
            Ok(y0) => y0,
            Err(e) => {
                log::warn!(
                    "baseline model failed for center ({}, {}): {e}; skipping",
                    center.lat,
                    center.lon
                );
                continue;
            }
        };
        let mean_y0 = y0.sum() / y0.len().max(1) as f64;
        if mean_y0 == 0.0 || !mean_y0.is_finite() {
            log::warn!(
                "degenerate baseline mean {mean_y0} for center ({}, {}); skipping",
                center.lat,
                center.lon
            );
            continue;
        }

        let n_train = split_result.y_train.len();
        let mean_y_train = split_result.y_train.sum() / n_train.max(1) as f64;

        for (j, &amp) in cfg.noise_amplitudes.iter().enumerate() {
            log::debug!(
                "noise_amp={amp:.2}, center=({}, {})",
                center.lat,
                center.lon
            );
            let sd = (mean_y_train * amp * (std::f64::consts::PI / 2.0).sqrt()).abs();
            let y_noisy: Array1<f64> = if sd == 0.0 {
                split_result.y_train.clone()
            } else {
                let normal = Normal::new(0.0, sd)
                    .map_err(|e| AnalysisError::InvalidSweep(format!("noise scale: {e}")))?;
                split_result
                    .y_train
                    .mapv(|v| v + normal.sample(&mut noise_rng))
            };

            let mut model = make_model();
            match model
                .fit(split_result.x_train.view(), y_noisy.view())
                .and_then(|_| model.predict(split_result.x_test.view()))
            {
                Ok(y_pred) => {
                    let summary = ErrorSummary::against_reference(y0.view(), y_pred.view());
                    if let Some(nrmse) = summary.normalized_rmse {
                        sums[j] += nrmse;
                        used[j] += 1;
                    }
                }
                Err(e) => {
                    log::warn!("model failed at noise_amp={amp}: {e}; skipping");
                }
            }
        }
    }

    let mut cells = Vec::with_capacity(n_amps);
    for (j, &noise_amplitude) in cfg.noise_amplitudes.iter().enumerate() {
        if used[j] == 0 {
            return Err(AnalysisError::EmptyNoiseCell { noise_amplitude });
        }
        cells.push(SensitivityCell {
            noise_amplitude,
            mean_normalized_rmse: sums[j] / used[j] as f64,
            centers_used: used[j],
        });
    }
    Ok(cells)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelError;
    use ndarray::{Array2, ArrayView1, ArrayView2};

    /// Cheap linear stand-in model for sweep plumbing tests.
    struct MeanModel {
        mean: Option<f64>,
    }

    impl MeanModel {
        fn new() -> Self {
            Self { mean: None }
        }
    }

    impl Regressor for MeanModel {
        fn fit(
            &mut self,
            _features: ArrayView2<'_, f64>,
            target: ArrayView1<'_, f64>,
        ) -> Result<(), ModelError> {
            self.mean = Some(target.sum() / target.len().max(1) as f64);
            Ok(())
        }

        fn predict(&self, features: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError> {
            let mean = self.mean.ok_or(ModelError::NotFitted)?;
            Ok(Array1::from_elem(features.nrows(), mean))
        }
    }

    fn grid_dataset(side: usize) -> Dataset {
        let n = side * side;
        let points: Vec<GeoPoint> = (0..n)
            .map(|i| {
                GeoPoint::new(
                    50.0 + (i / side) as f64 * 0.5,
                    -20.0 + (i % side) as f64 * 0.5,
                )
            })
            .collect();
        let covariates = Array2::from_shape_fn((n, 2), |(i, j)| {
            let p = &points[i];
            if j == 0 { p.lat } else { p.lon }
        });
        let target = points.iter().map(|p| Some(p.lat + p.lon)).collect();
        Dataset::new(
            vec!["lat_cov".to_string(), "lon_cov".to_string()],
            points.clone(),
            covariates,
            target,
        )
        .expect("grid dataset is well formed")
    }

    #[test]
    fn sampled_centers_respect_region_and_density() {
        let data = grid_dataset(12);
        let sampling = CenterSampling {
            min_test_points: 20,
            region: Some(LatLonBounds {
                min_lat: 51.0,
                max_lat: 54.0,
                min_lon: -19.0,
                max_lon: -16.0,
            }),
            max_attempts: 500,
        };
        let mut rng = StdRng::seed_from_u64(3);
        let centers =
            sample_prediction_centers(&data, 300.0, 5, &sampling, &mut rng).expect("centers");
        assert_eq!(centers.len(), 5);
        for c in centers {
            assert!(sampling.region.expect("region set").contains(c));
            let inside = haversine_distances(c, data.points())
                .iter()
                .filter(|&&d| d < 300.0)
                .count();
            assert!(inside >= 20);
        }
    }

    #[test]
    fn center_sampling_exhaustion_is_an_error() {
        let data = grid_dataset(4);
        let sampling = CenterSampling {
            min_test_points: 1000,
            region: None,
            max_attempts: 10,
        };
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            sample_prediction_centers(&data, 100.0, 1, &sampling, &mut rng),
            Err(AnalysisError::CenterSamplingExhausted { .. })
        ));
    }

    #[test]
    fn performance_sweep_emits_one_cell_per_configuration() {
        let data = grid_dataset(12);
        let cfg = PerformanceSweepConfig {
            test_fractions: vec![0.2, 0.5],
            radii_km: vec![150.0, 250.0],
            ncenters: 3,
            sampling: CenterSampling {
                min_test_points: 5,
                region: None,
                max_attempts: 500,
            },
            seed: 11,
        };
        let cells = run_performance_sweep(&data, &cfg, MeanModel::new).expect("sweep");
        assert_eq!(cells.len(), 4);
        for cell in &cells {
            assert!(cell.mean_rmse.is_finite() && cell.mean_r2.is_finite());
            assert!(cell.centers_used > 0 && cell.centers_used <= 3);
        }
    }

    #[test]
    fn sensitivity_sweep_zero_amplitude_is_exactly_zero() {
        let data = grid_dataset(10);
        let cfg = SensitivitySweepConfig {
            test_fraction: 0.5,
            radius_km: 200.0,
            noise_amplitudes: vec![0.0, 0.1],
            ncenters: 2,
            sampling: CenterSampling {
                min_test_points: 5,
                region: None,
                max_attempts: 500,
            },
            seed: 5,
        };
        let cells = run_sensitivity_sweep(&data, &cfg, MeanModel::new).expect("sweep");
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].mean_normalized_rmse, 0.0);
        assert!(cells[1].mean_normalized_rmse > 0.0);
    }

    #[test]
    fn sweeps_reject_empty_grids() {
        let data = grid_dataset(6);
        let cfg = PerformanceSweepConfig {
            test_fractions: vec![],
            ..PerformanceSweepConfig::default()
        };
        assert!(matches!(
            run_performance_sweep(&data, &cfg, MeanModel::new),
            Err(AnalysisError::InvalidSweep(_))
        ));
    }
}
