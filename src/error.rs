use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open dataset {path:?}")]
    Unreachable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse dataset {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("dataset {path:?} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },
    #[error("dataset {path:?} contains no usable points")]
    Empty { path: PathBuf },
    #[error("unsupported dataset format {extension:?} for {path:?}")]
    UnsupportedFormat { path: PathBuf, extension: String },
}

#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("need at least 3 distinct points, got {0}")]
    TooFewPoints(usize),
    #[error("all points are collinear")]
    Collinear,
    #[error("triangulation rejected point {index}: {cause:?}")]
    Triangulation {
        index: usize,
        cause: spade::InsertionError,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum QueryError {
    #[error("airport data not loaded yet")]
    NotLoaded,
    #[error("invalid query coordinate ({lon}, {lat})")]
    InvalidCoordinate { lon: f64, lat: f64 },
    #[error("no nearest airport found")]
    NoResult,
}
