use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Json(serde_json::Error),
    EmptyPath(String),
    DuplicateName(String),
    InterpolationMethod { source: String, method: String },
    Coefficient { source: String, value: f64 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "I/O error: {}", e),
            ConfigError::Json(e) => write!(f, "Failed to parse JSON: {}", e),
            ConfigError::EmptyPath(name) => write!(f, "raster '{}' has an empty path", name),
            ConfigError::DuplicateName(name) => {
                write!(f, "raster name '{}' is used more than once", name)
            }
            ConfigError::InterpolationMethod { source, method } => write!(
                f,
                "candidate '{}' requests unsupported interpolation method '{}'",
                source, method
            ),
            ConfigError::Coefficient { source, value } => write!(
                f,
                "candidate '{}' has a non-finite coefficient {}",
                source, value
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> ConfigError {
        ConfigError::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> ConfigError {
        ConfigError::Json(err)
    }
}
