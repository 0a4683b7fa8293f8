use super::cache::Fingerprint;
use crate::align::ResampleMethod;
use crate::config::{Config, RasterFile};
use crate::error::{HarmonizeError, Result};
use crate::raster::Raster;
use crate::readers;
use crate::scale::ScalarCoefficient;
use log::info;
use std::path::Path;

/// A raster together with the fingerprint identifying where it came from.
#[derive(Debug, Clone)]
pub struct SourceRaster {
    pub raster: Raster,
    pub fingerprint: Fingerprint,
}

impl SourceRaster {
    /// Wraps an in-memory raster, fingerprinting its contents.
    pub fn from_raster(raster: Raster) -> Self {
        let fingerprint = Fingerprint::of_raster(&raster);
        Self {
            raster,
            fingerprint,
        }
    }

    /// Loads a configured raster, fingerprinting the file rather than its samples.
    pub fn load(file: &RasterFile) -> Result<Self> {
        info!("Loading {} from {}", file.name, file.path);

        let missing = |reason: String| HarmonizeError::MissingSource {
            name: file.name.clone(),
            path: file.path.clone(),
            reason,
        };

        let raster = readers::create_reader(file.path.clone(), file.variable.clone())
            .and_then(|reader| reader.read_raster())
            .map_err(|e| missing(e.to_string()))?;
        let fingerprint = Fingerprint::of_file(Path::new(&file.path), file.variable.as_deref())
            .map_err(|e| missing(e.to_string()))?;

        Ok(Self {
            raster,
            fingerprint,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub name: String,
    pub source: SourceRaster,
    pub method: ResampleMethod,
    pub coefficient: ScalarCoefficient,
}

#[derive(Debug, Clone)]
pub struct PipelineInputs {
    pub reference: SourceRaster,
    /// Ordered from most to least trusted.
    pub candidates: Vec<Candidate>,
    pub area_per_cell: SourceRaster,
}

impl PipelineInputs {
    /// Loads every raster named in `config`.
    ///
    /// All paths are checked before anything is read, so a missing file fails the run
    /// before any computation starts.
    pub fn load(config: &Config) -> Result<Self> {
        ensure_sources_exist(config)?;

        let reference = SourceRaster::load(config.reference())?;
        let candidates = config
            .candidates()
            .iter()
            .map(|candidate| {
                Ok(Candidate {
                    name: candidate.file.name.clone(),
                    source: SourceRaster::load(&candidate.file)?,
                    method: candidate.method,
                    coefficient: candidate.coefficient.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let area_per_cell = SourceRaster::load(config.area_per_cell())?;

        Ok(Self {
            reference,
            candidates,
            area_per_cell,
        })
    }
}

pub fn ensure_sources_exist(config: &Config) -> Result<()> {
    let files = std::iter::once(config.reference())
        .chain(config.candidates().iter().map(|c| &c.file))
        .chain(std::iter::once(config.area_per_cell()));

    for file in files {
        if !Path::new(&file.path).is_file() {
            return Err(HarmonizeError::MissingSource {
                name: file.name.clone(),
                path: file.path.clone(),
                reason: "file not found".to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CandidateSource, OutputSettings};
    use crate::readers::{Compression, PixelType};
    use std::fs;

    fn file(name: &str, path: &Path) -> RasterFile {
        RasterFile {
            name: name.to_string(),
            path: path.to_string_lossy().to_string(),
            variable: None,
        }
    }

    #[test]
    fn test_missing_candidate_is_reported_before_loading() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("reference.tif");
        fs::write(&present, b"not a tiff").unwrap();
        let absent = dir.path().join("avitabile.tif");

        let config = Config::new(
            file("reference", &present),
            vec![CandidateSource {
                file: file("avitabile", &absent),
                method: ResampleMethod::Nearest,
                coefficient: ScalarCoefficient::identity(),
            }],
            file("area", &present),
            OutputSettings {
                path: dir.path().join("out.tif"),
                nodata: -9999.0,
                compression: Compression::Deflate,
                pixel_type: PixelType::Float32,
                quantity_path: None,
                report_path: None,
            },
        );

        // The reference exists but is not a raster; the missing candidate must win
        match PipelineInputs::load(&config) {
            Err(HarmonizeError::MissingSource { name, reason, .. }) => {
                assert_eq!(name, "avitabile");
                assert_eq!(reason, "file not found");
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
