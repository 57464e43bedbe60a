//! Tabular geophysical data: an ordered record collection plus the CSV
//! loader that produces it.
//!
//! Missing values exist only at the CSV boundary. Inside a `Dataset` the
//! covariate matrix is dense and fully populated; only the target may be
//! absent (`None`), which marks a record as "known to be unmeasured" and
//! therefore a candidate for prediction.

use crate::types::GeoPoint;
use csv::ReaderBuilder;
use ndarray::{Array2, ArrayView2, Axis, concatenate};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read '{path}': {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("missing required column '{column}' in '{path}'")]
    MissingColumn { column: String, path: String },

    #[error("row {row} in '{path}' has {got} fields, expected {expected}")]
    RowWidth {
        path: String,
        row: usize,
        got: usize,
        expected: usize,
    },

    #[error("could not parse '{value}' at row {row}, column '{column}' of '{path}'")]
    ParseField {
        path: String,
        row: usize,
        column: String,
        value: String,
    },

    #[error("coordinate out of range at row {row}: lat={lat}, lon={lon}")]
    InvalidCoordinate { row: usize, lat: f64, lon: f64 },

    #[error("covariate schemas disagree between '{left}' and '{right}'")]
    SchemaMismatch { left: String, right: String },

    #[error("invalid load configuration: {0}")]
    InvalidConfig(String),

    #[error("dataset dimensions disagree: {0}")]
    Shape(String),

    #[error("no rows left after filtering")]
    Empty,
}

/// An ordered collection of georeferenced records sharing one covariate
/// schema. All transforms produce new datasets; nothing mutates in place.
#[derive(Debug, Clone)]
pub struct Dataset {
    names: Vec<String>,
    points: Vec<GeoPoint>,
    covariates: Array2<f64>,
    target: Vec<Option<f64>>,
}

impl Dataset {
    pub fn new(
        names: Vec<String>,
        points: Vec<GeoPoint>,
        covariates: Array2<f64>,
        target: Vec<Option<f64>>,
    ) -> Result<Self, DatasetError> {
        if covariates.ncols() != names.len() {
            return Err(DatasetError::Shape(format!(
                "{} covariate columns but {} names",
                covariates.ncols(),
                names.len()
            )));
        }
        if points.len() != covariates.nrows() || target.len() != covariates.nrows() {
            return Err(DatasetError::Shape(format!(
                "{} positions, {} targets, {} covariate rows",
                points.len(),
                target.len(),
                covariates.nrows()
            )));
        }
        for (row, p) in points.iter().enumerate() {
            if !p.is_valid() {
                return Err(DatasetError::InvalidCoordinate {
                    row,
                    lat: p.lat,
                    lon: p.lon,
                });
            }
        }
        Ok(Self {
            names,
            points,
            covariates,
            target,
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Covariate column names, in matrix column order.
    pub fn covariate_names(&self) -> &[String] {
        &self.names
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    pub fn covariates(&self) -> ArrayView2<'_, f64> {
        self.covariates.view()
    }

    pub fn target(&self) -> &[Option<f64>] {
        &self.target
    }

    /// A new dataset holding the given rows, in the given order.
    pub fn select(&self, rows: &[usize]) -> Dataset {
        Dataset {
            names: self.names.clone(),
            points: rows.iter().map(|&i| self.points[i]).collect(),
            covariates: self.covariates.select(Axis(0), rows),
            target: rows.iter().map(|&i| self.target[i]).collect(),
        }
    }

    /// Row-wise concatenation. Both datasets must share the same covariate
    /// schema.
    pub fn concat(&self, other: &Dataset) -> Result<Dataset, DatasetError> {
        if self.names != other.names {
            return Err(DatasetError::SchemaMismatch {
                left: self.names.join(","),
                right: other.names.join(","),
            });
        }
        let covariates = concatenate(
            Axis(0),
            &[self.covariates.view(), other.covariates.view()],
        )
        .map_err(|e| DatasetError::Shape(e.to_string()))?;
        let mut points = self.points.clone();
        points.extend_from_slice(&other.points);
        let mut target = self.target.clone();
        target.extend_from_slice(&other.target);
        Ok(Dataset {
            names: self.names.clone(),
            points,
            covariates,
            target,
        })
    }

    /// Replace the target column; lengths must match.
    pub(crate) fn set_target(&mut self, target: Vec<Option<f64>>) {
        debug_assert_eq!(target.len(), self.len());
        self.target = target;
    }

    /// Indices of rows whose target is present.
    pub fn labeled_rows(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.target[i].is_some()).collect()
    }

    /// The subset of rows with a present target.
    pub fn drop_unlabeled(&self) -> Dataset {
        self.select(&self.labeled_rows())
    }
}

/// One value-to-value rewrite applied to a named column at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnRecode {
    pub column: String,
    pub map: Vec<(f64, f64)>,
}

/// Loader configuration for one CSV file.
///
/// Defaults are deliberately minimal; the Greenland workflow supplies
/// presets matching its upstream data product (see `greenland`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub path: PathBuf,
    pub target_column: String,
    pub lat_column: String,
    pub lon_column: String,
    /// Numeric value encoding "missing" in the source file.
    pub na_sentinel: f64,
    /// Rows with a target at or above this bound are dropped.
    pub max_target: Option<f64>,
    /// Columns removed entirely after row filtering.
    pub ignored_columns: Vec<String>,
    /// (column, code) pairs; a row matching any pair is dropped whole.
    pub invalid_codes: Vec<(String, f64)>,
    /// Value rewrites applied before any row filtering.
    pub recodes: Vec<ColumnRecode>,
    /// Target value meaning "known to be unmeasured"; mapped to a missing
    /// target instead of being treated as a reading.
    pub target_unknown_code: Option<f64>,
    /// Standard deviation of a single half-normal shift added to every
    /// target, undoing integer rounding in the source. Off by default.
    pub target_jitter_sd: Option<f64>,
    pub jitter_seed: u64,
}

impl LoadConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            target_column: "GHF".to_string(),
            lat_column: "Latitude_1".to_string(),
            lon_column: "Longitude_1".to_string(),
            na_sentinel: -999999.0,
            max_target: None,
            ignored_columns: Vec::new(),
            invalid_codes: Vec::new(),
            recodes: Vec::new(),
            target_unknown_code: None,
            target_jitter_sd: None,
            jitter_seed: 0,
        }
    }
}

struct RawFrame {
    path: String,
    names: Vec<String>,
    rows: Vec<Vec<Option<f64>>>,
}

/// Load one or more CSV files into a single dataset.
///
/// Per-file filtering follows the upstream conventions: the NA sentinel and
/// empty fields parse as missing, rows matching an invalid code or holding
/// any missing field are dropped, the target range filter is applied, and
/// ignored columns are removed last. Files are then concatenated and the
/// configured categorical columns are one-hot expanded over the union of
/// their values.
pub fn load_dataset(cfgs: &[LoadConfig], categorical: &[String]) -> Result<Dataset, DatasetError> {
    let first = cfgs
        .first()
        .ok_or_else(|| DatasetError::InvalidConfig("no input files given".to_string()))?;
    for cfg in cfgs {
        if cfg.target_column != first.target_column
            || cfg.lat_column != first.lat_column
            || cfg.lon_column != first.lon_column
        {
            return Err(DatasetError::InvalidConfig(
                "all input files must use the same coordinate and target columns".to_string(),
            ));
        }
    }

    let mut frames = Vec::with_capacity(cfgs.len());
    for cfg in cfgs {
        frames.push(read_frame(cfg)?);
    }

    let names = frames[0].names.clone();
    for frame in &frames[1..] {
        if frame.names != names {
            return Err(DatasetError::SchemaMismatch {
                left: frames[0].path.clone(),
                right: frame.path.clone(),
            });
        }
    }

    let rows: Vec<Vec<Option<f64>>> = frames.into_iter().flat_map(|f| f.rows).collect();
    if rows.is_empty() {
        return Err(DatasetError::Empty);
    }

    assemble(
        names,
        rows,
        &first.lat_column,
        &first.lon_column,
        &first.target_column,
        categorical,
    )
}

fn read_frame(cfg: &LoadConfig) -> Result<RawFrame, DatasetError> {
    let path = cfg.path.display().to_string();
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .from_path(&cfg.path)
        .map_err(|source| DatasetError::Csv {
            path: path.clone(),
            source,
        })?;

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|source| DatasetError::Csv {
            path: path.clone(),
            source,
        })?
        .iter()
        .map(|s| s.trim().to_string())
        .collect();

    for required in [&cfg.lat_column, &cfg.lon_column, &cfg.target_column] {
        if !headers.contains(required) {
            return Err(DatasetError::MissingColumn {
                column: required.clone(),
                path: path.clone(),
            });
        }
    }
    let target_idx = headers
        .iter()
        .position(|h| *h == cfg.target_column)
        .unwrap_or_default();

    let mut rows = Vec::<Vec<Option<f64>>>::new();
    for (row_no, record) in rdr.records().enumerate() {
        let record = record.map_err(|source| DatasetError::Csv {
            path: path.clone(),
            source,
        })?;
        if record.len() != headers.len() {
            return Err(DatasetError::RowWidth {
                path: path.clone(),
                row: row_no + 1,
                got: record.len(),
                expected: headers.len(),
            });
        }
        let mut row = Vec::with_capacity(headers.len());
        for (col, raw) in record.iter().enumerate() {
            let raw = raw.trim();
            if raw.is_empty() {
                row.push(None);
                continue;
            }
            let value: f64 = raw.parse().map_err(|_| DatasetError::ParseField {
                path: path.clone(),
                row: row_no + 1,
                column: headers[col].clone(),
                value: raw.to_string(),
            })?;
            row.push(if value == cfg.na_sentinel { None } else { Some(value) });
        }
        rows.push(row);
    }

    for recode in &cfg.recodes {
        let Some(col) = headers.iter().position(|h| *h == recode.column) else {
            return Err(DatasetError::MissingColumn {
                column: recode.column.clone(),
                path: path.clone(),
            });
        };
        for row in &mut rows {
            if let Some(v) = row[col] {
                if let Some(&(_, to)) = recode.map.iter().find(|&&(from, _)| from == v) {
                    row[col] = Some(to);
                }
            }
        }
    }

    let before = rows.len();
    for (column, code) in &cfg.invalid_codes {
        let Some(col) = headers.iter().position(|h| h == column) else {
            return Err(DatasetError::MissingColumn {
                column: column.clone(),
                path: path.clone(),
            });
        };
        rows.retain(|row| row[col] != Some(*code));
    }
    let n_invalid = before - rows.len();

    let before = rows.len();
    rows.retain(|row| row.iter().all(|v| v.is_some()));
    let n_missing = before - rows.len();

    let before = rows.len();
    if let Some(max_target) = cfg.max_target {
        rows.retain(|row| match row[target_idx] {
            Some(v) => v < max_target,
            None => true,
        });
    }
    let n_range = before - rows.len();

    log::info!(
        "{path}: kept {} rows ({n_invalid} invalid-code, {n_missing} missing-field, {n_range} out-of-range dropped)",
        rows.len()
    );

    if let Some(code) = cfg.target_unknown_code {
        for row in &mut rows {
            if row[target_idx] == Some(code) {
                row[target_idx] = None;
            }
        }
    }

    if let Some(sd) = cfg.target_jitter_sd {
        let normal = Normal::new(0.0, sd)
            .map_err(|e| DatasetError::InvalidConfig(format!("target_jitter_sd: {e}")))?;
        let mut rng = StdRng::seed_from_u64(cfg.jitter_seed);
        let shift = normal.sample(&mut rng).abs();
        for row in &mut rows {
            if let Some(v) = row[target_idx] {
                row[target_idx] = Some(v + shift);
            }
        }
    }

    let keep: Vec<usize> = (0..headers.len())
        .filter(|&j| !cfg.ignored_columns.contains(&headers[j]))
        .collect();
    let names: Vec<String> = keep.iter().map(|&j| headers[j].clone()).collect();
    let rows = rows
        .into_iter()
        .map(|row| keep.iter().map(|&j| row[j]).collect())
        .collect();

    Ok(RawFrame { path, names, rows })
}

fn category_label(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn assemble(
    names: Vec<String>,
    rows: Vec<Vec<Option<f64>>>,
    lat_column: &str,
    lon_column: &str,
    target_column: &str,
    categorical: &[String],
) -> Result<Dataset, DatasetError> {
    let find = |name: &str| names.iter().position(|h| h == name);
    let lat_idx = find(lat_column).ok_or_else(|| DatasetError::MissingColumn {
        column: lat_column.to_string(),
        path: "<assembled>".to_string(),
    })?;
    let lon_idx = find(lon_column).ok_or_else(|| DatasetError::MissingColumn {
        column: lon_column.to_string(),
        path: "<assembled>".to_string(),
    })?;
    let target_idx = find(target_column).ok_or_else(|| DatasetError::MissingColumn {
        column: target_column.to_string(),
        path: "<assembled>".to_string(),
    })?;

    let mut cat_indices = Vec::with_capacity(categorical.len());
    for cat in categorical {
        let idx = find(cat).ok_or_else(|| DatasetError::MissingColumn {
            column: cat.clone(),
            path: "<assembled>".to_string(),
        })?;
        if idx == lat_idx || idx == lon_idx || idx == target_idx {
            return Err(DatasetError::InvalidConfig(format!(
                "column '{cat}' cannot be both categorical and coordinate/target"
            )));
        }
        cat_indices.push(idx);
    }

    // Plain covariates keep their source order; one-hot groups follow, one
    // group per categorical column, categories ascending.
    let plain: Vec<usize> = (0..names.len())
        .filter(|&j| j != lat_idx && j != lon_idx && j != target_idx && !cat_indices.contains(&j))
        .collect();

    let mut levels: Vec<Vec<f64>> = Vec::with_capacity(cat_indices.len());
    for &ci in &cat_indices {
        let mut values: Vec<f64> = rows.iter().filter_map(|row| row[ci]).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        values.dedup();
        levels.push(values);
    }

    let mut out_names: Vec<String> = plain.iter().map(|&j| names[j].clone()).collect();
    for (k, &ci) in cat_indices.iter().enumerate() {
        for &level in &levels[k] {
            out_names.push(format!("{}_{}", names[ci], category_label(level)));
        }
    }

    let n = rows.len();
    let p = out_names.len();
    let mut covariates = Array2::<f64>::zeros((n, p));
    let mut points = Vec::with_capacity(n);
    let mut target = Vec::with_capacity(n);

    for (i, row) in rows.iter().enumerate() {
        let lat = row[lat_idx].ok_or(DatasetError::InvalidCoordinate {
            row: i,
            lat: f64::NAN,
            lon: f64::NAN,
        })?;
        let lon = row[lon_idx].ok_or(DatasetError::InvalidCoordinate {
            row: i,
            lat,
            lon: f64::NAN,
        })?;
        points.push(GeoPoint::new(lat, lon));
        target.push(row[target_idx]);

        let mut j = 0;
        for &src in &plain {
            // Rows with missing covariates were dropped at read time.
            covariates[[i, j]] = row[src].unwrap_or(f64::NAN);
            j += 1;
        }
        for (k, &ci) in cat_indices.iter().enumerate() {
            let value = row[ci].unwrap_or(f64::NAN);
            for &level in &levels[k] {
                covariates[[i, j]] = if value == level { 1.0 } else { 0.0 };
                j += 1;
            }
        }
    }

    Dataset::new(out_names, points, covariates, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn toy() -> Dataset {
        Dataset::new(
            vec!["a".to_string(), "b".to_string()],
            vec![
                GeoPoint::new(0.0, 0.0),
                GeoPoint::new(1.0, 1.0),
                GeoPoint::new(2.0, 2.0),
            ],
            array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]],
            vec![Some(5.0), None, Some(7.0)],
        )
        .expect("toy dataset is well formed")
    }

    #[test]
    fn select_preserves_order_and_schema() {
        let d = toy();
        let s = d.select(&[2, 0]);
        assert_eq!(s.len(), 2);
        assert_eq!(s.points()[0].lat, 2.0);
        assert_eq!(s.covariates()[[1, 1]], 10.0);
        assert_eq!(s.target(), &[Some(7.0), Some(5.0)]);
    }

    #[test]
    fn concat_requires_matching_schema() {
        let d = toy();
        let other = Dataset::new(
            vec!["a".to_string()],
            vec![GeoPoint::new(0.0, 0.0)],
            array![[1.0]],
            vec![Some(1.0)],
        )
        .expect("well formed");
        assert!(matches!(
            d.concat(&other),
            Err(DatasetError::SchemaMismatch { .. })
        ));
        let joined = d.concat(&d).expect("self concat");
        assert_eq!(joined.len(), 6);
    }

    #[test]
    fn drop_unlabeled_removes_missing_targets() {
        let d = toy().drop_unlabeled();
        assert_eq!(d.len(), 2);
        assert!(d.target().iter().all(|t| t.is_some()));
    }

    #[test]
    fn new_rejects_out_of_range_coordinates() {
        let err = Dataset::new(
            vec!["a".to_string()],
            vec![GeoPoint::new(95.0, 0.0)],
            array![[1.0]],
            vec![Some(1.0)],
        );
        assert!(matches!(err, Err(DatasetError::InvalidCoordinate { .. })));
    }

    #[test]
    fn loader_filters_and_one_hot_encodes() {
        let path = std::env::temp_dir().join(format!(
            "ghf_loader_test_{}_{}.csv",
            std::process::id(),
            line!()
        ));
        let csv = "\
Latitude_1,Longitude_1,GHF,depth,litho
10.0,20.0,55.0,3.5,1
11.0,21.0,60.0,-999999,2
12.0,22.0,200.0,4.0,1
13.0,23.0,0.0,4.5,2
14.0,24.0,42.0,5.0,0
";
        std::fs::write(&path, csv).expect("write temp csv");

        let mut cfg = LoadConfig::new(&path);
        cfg.max_target = Some(150.0);
        cfg.invalid_codes = vec![("litho".to_string(), 0.0)];
        cfg.target_unknown_code = Some(0.0);

        let data = load_dataset(&[cfg], &["litho".to_string()]).expect("load");
        std::fs::remove_file(&path).ok();

        // Row 2 (missing depth), row 3 (GHF >= 150), row 5 (litho code 0)
        // are gone; row 4 survives with an unmeasured target.
        assert_eq!(data.len(), 2);
        assert_eq!(
            data.covariate_names(),
            &["depth".to_string(), "litho_1".to_string(), "litho_2".to_string()]
        );
        assert_eq!(data.target(), &[Some(55.0), None]);
        assert_eq!(data.covariates()[[0, 1]], 1.0);
        assert_eq!(data.covariates()[[1, 2]], 1.0);
        assert_eq!(data.points()[1].lat, 13.0);
    }

    #[test]
    fn loader_requires_coordinate_columns() {
        let path = std::env::temp_dir().join(format!(
            "ghf_loader_test_{}_{}.csv",
            std::process::id(),
            line!()
        ));
        std::fs::write(&path, "x,y,GHF\n1,2,3\n").expect("write temp csv");
        let cfg = LoadConfig::new(&path);
        let err = load_dataset(&[cfg], &[]);
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, Err(DatasetError::MissingColumn { .. })));
    }
}
