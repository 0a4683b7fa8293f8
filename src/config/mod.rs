use serde::de::Error;
use serde::{Deserialize, Deserializer, Serialize};

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::align::ResampleMethod;
use crate::constants::DEFAULT_NODATA;
use crate::readers::{Compression, PixelType};
use crate::scale::ScalarCoefficient;

pub mod error;
pub use error::ConfigError;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RasterFile {
    pub name: String,
    pub path: String,
    /// NetCDF variable to read; ignored for GeoTIFF.
    #[serde(default)]
    pub variable: Option<String>,
}

/// A candidate dataset, how to bring it onto the reference grid, and the factor
/// converting it into the reference's units.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateSource {
    #[serde(flatten)]
    pub file: RasterFile,
    pub method: ResampleMethod,
    pub coefficient: ScalarCoefficient,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputSettings {
    pub path: PathBuf,
    pub nodata: f32,
    pub compression: Compression,
    pub pixel_type: PixelType,
    pub quantity_path: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Config {
    reference: RasterFile,
    candidates: Vec<CandidateSource>,
    area_per_cell: RasterFile,
    output: OutputSettings,
    cache_directory: Option<PathBuf>,
}

#[derive(Deserialize)]
struct ConfigHelper {
    reference: RasterFile,
    #[serde(default)]
    candidates: Vec<CandidateHelper>,
    area_per_cell: RasterFile,
    output: OutputHelper,
    cache_directory: Option<PathBuf>,
}

#[derive(Deserialize)]
struct CandidateHelper {
    #[serde(flatten)]
    file: RasterFile,
    method: String,
    #[serde(default = "ScalarCoefficient::identity")]
    coefficient: ScalarCoefficient,
}

#[derive(Deserialize)]
struct OutputHelper {
    path: PathBuf,
    nodata: Option<f32>,
    #[serde(default)]
    compression: Compression,
    #[serde(default)]
    pixel_type: PixelType,
    quantity_path: Option<PathBuf>,
    report_path: Option<PathBuf>,
}

impl ConfigHelper {
    // Checks names, paths, methods and coefficients, and converts into a Config.
    fn validate(self) -> Result<Config, ConfigError> {
        let mut names = HashSet::new();
        let files = std::iter::once(&self.reference)
            .chain(self.candidates.iter().map(|c| &c.file))
            .chain(std::iter::once(&self.area_per_cell));

        for file in files {
            if file.path.trim().is_empty() {
                return Err(ConfigError::EmptyPath(file.name.clone()));
            }
            if !names.insert(file.name.as_str()) {
                return Err(ConfigError::DuplicateName(file.name.clone()));
            }
        }

        let candidates = self
            .candidates
            .into_iter()
            .map(|candidate| {
                let method = candidate.method.parse::<ResampleMethod>().map_err(|_| {
                    ConfigError::InterpolationMethod {
                        source: candidate.file.name.clone(),
                        method: candidate.method.clone(),
                    }
                })?;

                if !candidate.coefficient.value.is_finite() {
                    return Err(ConfigError::Coefficient {
                        source: candidate.file.name.clone(),
                        value: candidate.coefficient.value,
                    });
                }

                Ok(CandidateSource {
                    file: candidate.file,
                    method,
                    coefficient: candidate.coefficient,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let output = OutputSettings {
            path: self.output.path,
            nodata: self.output.nodata.unwrap_or(DEFAULT_NODATA),
            compression: self.output.compression,
            pixel_type: self.output.pixel_type,
            quantity_path: self.output.quantity_path,
            report_path: self.output.report_path,
        };

        Ok(Config {
            reference: self.reference,
            candidates,
            area_per_cell: self.area_per_cell,
            output,
            cache_directory: self.cache_directory,
        })
    }
}

impl<'de> Deserialize<'de> for Config {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let helper = ConfigHelper::deserialize(deserializer)?;
        helper.validate().map_err(D::Error::custom)
    }
}

impl Config {
    pub fn new(
        reference: RasterFile,
        candidates: Vec<CandidateSource>,
        area_per_cell: RasterFile,
        output: OutputSettings,
    ) -> Self {
        Self {
            reference,
            candidates,
            area_per_cell,
            output,
            cache_directory: None,
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let helper: ConfigHelper = serde_json::from_reader(reader)?;
        helper.validate()
    }

    pub fn reference(&self) -> &RasterFile {
        &self.reference
    }

    pub fn candidates(&self) -> &[CandidateSource] {
        &self.candidates
    }

    pub fn area_per_cell(&self) -> &RasterFile {
        &self.area_per_cell
    }

    pub fn output(&self) -> &OutputSettings {
        &self.output
    }

    pub fn cache_directory(&self) -> Option<&Path> {
        self.cache_directory.as_deref()
    }

    pub fn with_output_path(mut self, path: PathBuf) -> Self {
        self.output.path = path;
        self
    }

    pub fn with_cache_directory(mut self, directory: PathBuf) -> Self {
        self.cache_directory = Some(directory);
        self
    }
}
