//! Delimited-text exports consumed by the external plotting and GIS
//! tooling. Floats are written fixed-width so the files diff cleanly
//! across runs.

use crate::sweep::{PerformanceCell, SensitivityCell};
use crate::types::GeoPoint;
use csv::WriterBuilder;
use ndarray::ArrayView1;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write '{path}': {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("failed to flush '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{points} positions but {values} values")]
    LengthMismatch { points: usize, values: usize },
}

fn field(value: f64) -> String {
    format!("{value:10.5}")
}

/// Write the performance-sweep table: one row per (test fraction, radius)
/// cell with the across-center mean scores.
pub fn write_performance_table(
    path: &Path,
    cells: &[PerformanceCell],
) -> Result<(), ExportError> {
    let display = path.display().to_string();
    let mut wtr = WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|source| ExportError::Csv {
            path: display.clone(),
            source,
        })?;
    wtr.write_record(["t", "radius", "r2", "rmse"])
        .map_err(|source| ExportError::Csv {
            path: display.clone(),
            source,
        })?;
    for cell in cells {
        wtr.write_record([
            field(cell.test_fraction),
            field(cell.radius_km),
            field(cell.mean_r2),
            field(cell.mean_rmse),
        ])
        .map_err(|source| ExportError::Csv {
            path: display.clone(),
            source,
        })?;
    }
    wtr.flush().map_err(|source| ExportError::Io {
        path: display,
        source,
    })
}

/// Write the sensitivity-sweep table: one row per noise amplitude.
pub fn write_sensitivity_table(
    path: &Path,
    cells: &[SensitivityCell],
) -> Result<(), ExportError> {
    let display = path.display().to_string();
    let mut wtr = WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|source| ExportError::Csv {
            path: display.clone(),
            source,
        })?;
    wtr.write_record(["noise", "rmse"])
        .map_err(|source| ExportError::Csv {
            path: display.clone(),
            source,
        })?;
    for cell in cells {
        wtr.write_record([field(cell.noise_amplitude), field(cell.mean_normalized_rmse)])
            .map_err(|source| ExportError::Csv {
                path: display.clone(),
                source,
            })?;
    }
    wtr.flush().map_err(|source| ExportError::Io {
        path: display,
        source,
    })
}

/// Write per-record (lat, lon, ghf) triples for mapping.
pub fn write_prediction_triples(
    path: &Path,
    points: &[GeoPoint],
    values: ArrayView1<'_, f64>,
) -> Result<(), ExportError> {
    if points.len() != values.len() {
        return Err(ExportError::LengthMismatch {
            points: points.len(),
            values: values.len(),
        });
    }
    let display = path.display().to_string();
    let mut wtr = WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|source| ExportError::Csv {
            path: display.clone(),
            source,
        })?;
    wtr.write_record(["lat", "lon", "ghf"])
        .map_err(|source| ExportError::Csv {
            path: display.clone(),
            source,
        })?;
    for (point, value) in points.iter().zip(values.iter()) {
        wtr.write_record([field(point.lat), field(point.lon), field(*value)])
            .map_err(|source| ExportError::Csv {
                path: display.clone(),
                source,
            })?;
    }
    wtr.flush().map_err(|source| ExportError::Io {
        path: display,
        source,
    })
}
