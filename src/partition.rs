//! Radius-based spatial partitioning of a labeled dataset.
//!
//! Test sets are geographic: all candidate test rows lie inside a circle of
//! `max_dist_km` around a center, and the training set is everything beyond
//! the circle plus the within-circle rows not chosen for testing.

use crate::dataset::Dataset;
use crate::geo::haversine_distances;
use crate::types::GeoPoint;
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SplitError {
    #[error("test fraction must be in (0, 1], got {0}")]
    InvalidTestFraction(f64),

    #[error("split radius must be positive and finite, got {0} km")]
    InvalidRadius(f64),

    #[error("no points within {radius_km} km of ({lat}, {lon}); cannot form a test set")]
    EmptyTestRegion { radius_km: f64, lat: f64, lon: f64 },

    #[error("{0} rows have no target value; split requires a fully labeled dataset")]
    UnlabeledRows(usize),
}

/// Options for `split`. The seed fixes the within-circle test selection, so
/// repeated calls with identical inputs produce identical splits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitOptions {
    /// Fraction of within-circle rows kept for testing, in (0, 1].
    pub test_fraction: f64,
    /// Radius of the test circle in kilometers.
    pub max_dist_km: f64,
    pub seed: u64,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            test_fraction: 0.3,
            max_dist_km: 3500.0,
            seed: 0,
        }
    }
}

/// A train/test design with the target column separated from covariates.
/// Row positions ride alongside for the export layer; they are not
/// features.
#[derive(Debug, Clone)]
pub struct SplitResult {
    pub feature_names: Vec<String>,
    pub x_train: Array2<f64>,
    pub y_train: Array1<f64>,
    pub train_points: Vec<GeoPoint>,
    pub x_test: Array2<f64>,
    pub y_test: Array1<f64>,
    pub test_points: Vec<GeoPoint>,
}

impl SplitResult {
    pub fn n_train(&self) -> usize {
        self.y_train.len()
    }

    pub fn n_test(&self) -> usize {
        self.y_test.len()
    }
}

fn partition_indices(
    data: &Dataset,
    center: GeoPoint,
    radius_km: f64,
) -> Result<(Vec<usize>, Vec<usize>), SplitError> {
    if !(radius_km > 0.0) || !radius_km.is_finite() {
        return Err(SplitError::InvalidRadius(radius_km));
    }
    let distances = haversine_distances(center, data.points());
    let mut within = Vec::new();
    let mut beyond = Vec::new();
    for (i, &d) in distances.iter().enumerate() {
        if d < radius_km {
            within.push(i);
        } else if d > radius_km {
            beyond.push(i);
        }
    }
    Ok((within, beyond))
}

/// Partition rows strictly by distance to `center`: closer than `radius_km`
/// versus farther than `radius_km`. Rows exactly at the radius are dropped
/// from both sides; callers relying on exact reconstruction must account
/// for boundary rows.
pub fn split_by_distance(
    data: &Dataset,
    center: GeoPoint,
    radius_km: f64,
) -> Result<(Dataset, Dataset), SplitError> {
    let (within, beyond) = partition_indices(data, center, radius_km)?;
    Ok((data.select(&within), data.select(&beyond)))
}

/// Split a labeled dataset into a spatially held-out test set and the
/// complementary training set.
///
/// The test set is a seeded random `test_fraction` of the rows within
/// `max_dist_km` of `center`; the remaining within-circle rows join the
/// beyond-circle rows as training data. Fails when the circle holds no
/// rows at all.
pub fn split(
    data: &Dataset,
    center: GeoPoint,
    opts: &SplitOptions,
) -> Result<SplitResult, SplitError> {
    if !(opts.test_fraction > 0.0 && opts.test_fraction <= 1.0) {
        return Err(SplitError::InvalidTestFraction(opts.test_fraction));
    }
    let unlabeled = data.len() - data.labeled_rows().len();
    if unlabeled > 0 {
        return Err(SplitError::UnlabeledRows(unlabeled));
    }

    let (mut within, beyond) = partition_indices(data, center, opts.max_dist_km)?;
    if within.is_empty() {
        return Err(SplitError::EmptyTestRegion {
            radius_km: opts.max_dist_km,
            lat: center.lat,
            lon: center.lon,
        });
    }

    let mut rng = StdRng::seed_from_u64(opts.seed);
    within.shuffle(&mut rng);

    // At least one test row whenever the circle is non-empty, matching the
    // rounding of sklearn's train_test_split.
    let n_test = ((opts.test_fraction * within.len() as f64).ceil() as usize).min(within.len());
    let test = data.select(&within[..n_test]);
    let mut train_rows = beyond;
    train_rows.extend_from_slice(&within[n_test..]);
    let train = data.select(&train_rows);

    Ok(SplitResult {
        feature_names: data.covariate_names().to_vec(),
        x_train: train.covariates().to_owned(),
        y_train: train.target().iter().map(|t| t.unwrap_or(f64::NAN)).collect(),
        train_points: train.points().to_vec(),
        x_test: test.covariates().to_owned(),
        y_test: test.target().iter().map(|t| t.unwrap_or(f64::NAN)).collect(),
        test_points: test.points().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::haversine_km;
    use ndarray::Array2;

    /// A line of points marching north from (0, 0), one every half degree.
    fn line_dataset(n: usize) -> Dataset {
        let points: Vec<GeoPoint> = (0..n).map(|i| GeoPoint::new(i as f64 * 0.5, 0.0)).collect();
        let covariates =
            Array2::from_shape_fn((n, 2), |(i, j)| i as f64 + 10.0 * j as f64);
        let target = (0..n).map(|i| Some(i as f64)).collect();
        Dataset::new(
            vec!["c0".to_string(), "c1".to_string()],
            points,
            covariates,
            target,
        )
        .expect("line dataset is well formed")
    }

    #[test]
    fn split_by_distance_partitions_all_rows() {
        let data = line_dataset(40);
        let center = GeoPoint::new(0.0, 0.0);
        let (within, beyond) = split_by_distance(&data, center, 700.0).expect("split");
        assert_eq!(within.len() + beyond.len(), data.len());
        assert!(!within.is_empty() && !beyond.is_empty());
    }

    #[test]
    fn boundary_rows_are_dropped_from_both_sides() {
        let data = line_dataset(10);
        let center = GeoPoint::new(0.0, 0.0);
        // Use the exact distance of the third point as the radius.
        let radius = haversine_km(center, data.points()[3]);
        let (within, beyond) = split_by_distance(&data, center, radius).expect("split");
        assert_eq!(within.len() + beyond.len(), data.len() - 1);
        assert!(within.points().iter().all(|p| p.lat != data.points()[3].lat));
        assert!(beyond.points().iter().all(|p| p.lat != data.points()[3].lat));
    }

    #[test]
    fn split_row_counts_add_up() {
        let data = line_dataset(60);
        let center = GeoPoint::new(0.0, 0.0);
        let radius = 1500.0;
        let (within, beyond) = split_by_distance(&data, center, radius).expect("split");
        let opts = SplitOptions {
            test_fraction: 0.4,
            max_dist_km: radius,
            seed: 7,
        };
        let result = split(&data, center, &opts).expect("split");
        assert_eq!(
            result.n_train() + result.n_test(),
            within.len() + beyond.len()
        );
        let expected_test = (0.4f64 * within.len() as f64).ceil() as usize;
        assert_eq!(result.n_test(), expected_test);
    }

    #[test]
    fn split_is_deterministic_for_a_fixed_seed() {
        let data = line_dataset(30);
        let center = GeoPoint::new(0.0, 0.0);
        let opts = SplitOptions {
            test_fraction: 0.5,
            max_dist_km: 800.0,
            seed: 42,
        };
        let a = split(&data, center, &opts).expect("split");
        let b = split(&data, center, &opts).expect("split");
        assert_eq!(a.y_test, b.y_test);
        assert_eq!(a.test_points, b.test_points);
    }

    #[test]
    fn split_fails_when_circle_is_empty() {
        let data = line_dataset(10);
        let center = GeoPoint::new(-60.0, 100.0);
        let opts = SplitOptions {
            test_fraction: 0.3,
            max_dist_km: 100.0,
            seed: 0,
        };
        assert!(matches!(
            split(&data, center, &opts),
            Err(SplitError::EmptyTestRegion { .. })
        ));
    }

    #[test]
    fn split_rejects_bad_parameters() {
        let data = line_dataset(10);
        let center = GeoPoint::new(0.0, 0.0);
        let mut opts = SplitOptions::default();
        opts.test_fraction = 0.0;
        assert!(matches!(
            split(&data, center, &opts),
            Err(SplitError::InvalidTestFraction(_))
        ));
        opts.test_fraction = 0.3;
        opts.max_dist_km = -5.0;
        assert!(matches!(
            split(&data, center, &opts),
            Err(SplitError::InvalidRadius(_))
        ));
    }

    #[test]
    fn split_rejects_unlabeled_rows() {
        let mut target: Vec<Option<f64>> = (0..10).map(|i| Some(i as f64)).collect();
        target[4] = None;
        let points: Vec<GeoPoint> = (0..10).map(|i| GeoPoint::new(i as f64, 0.0)).collect();
        let data = Dataset::new(
            vec!["c0".to_string()],
            points,
            Array2::zeros((10, 1)),
            target,
        )
        .expect("well formed");
        assert!(matches!(
            split(&data, GeoPoint::new(0.0, 0.0), &SplitOptions::default()),
            Err(SplitError::UnlabeledRows(1))
        ));
    }
}
