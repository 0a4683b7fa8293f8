use crate::config::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarmonizeError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Configuration error: {0}")]
    Config(ConfigError),

    #[error("Failed to write JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Grid mismatch: {0}")]
    GridMismatch(String),

    #[error("Invalid interpolation method: {0} (expected one of: near, nearest, bilinear)")]
    InvalidInterpolationMethod(String),

    #[error("Missing source raster '{name}' at {path}: {reason}")]
    MissingSource {
        name: String,
        path: String,
        reason: String,
    },

    #[error("Priority list is empty")]
    EmptyPriorityList,

    #[error("Failed to allocate a raster of {0} cells")]
    Allocation(usize),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),
}

impl From<ConfigError> for HarmonizeError {
    fn from(err: ConfigError) -> HarmonizeError {
        match err {
            ConfigError::InterpolationMethod { method, .. } => {
                HarmonizeError::InvalidInterpolationMethod(method)
            }
            other => HarmonizeError::Config(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, HarmonizeError>;
