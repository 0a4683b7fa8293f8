use super::report::RunReport;
use super::sources::PipelineInputs;
use super::{DiskStore, HarmonizationOutput, HarmonizationPipeline};
use crate::config::Config;
use crate::error::Result;
use crate::readers::{SaveOptions, save};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// Runs the pipeline for a configuration and publishes its outputs.
#[derive(Debug)]
pub struct HarmonizationRunner {
    config: Config,
}

impl HarmonizationRunner {
    pub fn new(config: Config) -> Self {
        HarmonizationRunner { config }
    }

    pub fn process(&self) -> Result<RunReport> {
        let inputs = PipelineInputs::load(&self.config)?;

        let mut pipeline = HarmonizationPipeline::new(self.config.output().nodata);
        if let Some(directory) = self.config.cache_directory() {
            info!("Using stage cache in {}", directory.display());
            pipeline = pipeline.with_store(Box::new(DiskStore::new(directory)?));
        }

        let output = pipeline.run(inputs)?;
        self.write_outputs(&output)
    }

    /// Writes the rasters and the report into a run-scoped scratch directory, then moves
    /// them into place once all of them were written.
    fn write_outputs(&self, output: &HarmonizationOutput) -> Result<RunReport> {
        let settings = self.config.output();
        let parent = settings
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        fs::create_dir_all(parent)?;

        let scratch = tempfile::Builder::new().prefix("run_").tempdir_in(parent)?;
        debug!("Scratch directory: {}", scratch.path().display());

        let options = SaveOptions {
            nodata: settings.nodata,
            compression: settings.compression,
            pixel_type: settings.pixel_type,
        };

        let mut rasters = vec![(
            "fused_density.tif",
            &output.fused_density,
            settings.path.clone(),
        )];
        if let Some(path) = &settings.quantity_path {
            rasters.push(("fused_quantity.tif", &output.fused_quantity, path.clone()));
        }

        let mut staged = Vec::with_capacity(rasters.len() + 1);
        for (name, raster, destination) in rasters {
            let scratch_path = scratch.path().join(name);
            save(raster, &scratch_path, &options)?;
            staged.push((scratch_path, destination));
        }

        let written = staged.iter().map(|(_, d)| d.clone()).collect();
        let report = RunReport::new(&self.config, output, written);

        if let Some(path) = &settings.report_path {
            let scratch_path = scratch.path().join("report.json");
            report.write_json(&scratch_path)?;
            staged.push((scratch_path, path.clone()));
        }

        publish_all(&staged, scratch.path())?;
        for (_, destination) in &staged {
            info!("✓ Saved {}", destination.display());
        }

        Ok(report)
    }
}

/// Moves every staged file to its destination, or none of them.
///
/// Files already at a destination are set aside in `scratch` and put back when a later
/// move fails.
fn publish_all(staged: &[(PathBuf, PathBuf)], scratch: &Path) -> Result<()> {
    let mut published: Vec<(&Path, Option<PathBuf>)> = Vec::with_capacity(staged.len());

    for (index, (from, to)) in staged.iter().enumerate() {
        match publish_one(from, to, &scratch.join(format!("previous_{}", index))) {
            Ok(previous) => published.push((to.as_path(), previous)),
            Err(e) => {
                roll_back(published);
                return Err(e);
            }
        }
    }
    Ok(())
}

fn publish_one(from: &Path, to: &Path, backup: &Path) -> Result<Option<PathBuf>> {
    if let Some(parent) = to.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let previous = if to.exists() {
        move_file(to, backup)?;
        Some(backup.to_path_buf())
    } else {
        None
    };

    if let Err(e) = move_file(from, to) {
        if let Some(backup) = &previous
            && let Err(restore) = move_file(backup, to)
        {
            warn!("Could not restore {}: {}", to.display(), restore);
        }
        return Err(e);
    }

    Ok(previous)
}

fn roll_back(published: Vec<(&Path, Option<PathBuf>)>) {
    for (destination, previous) in published.into_iter().rev() {
        let restored = match previous {
            Some(backup) => move_file(&backup, destination),
            None => fs::remove_file(destination).map_err(Into::into),
        };
        match restored {
            Ok(()) => debug!("Rolled back {}", destination.display()),
            Err(e) => warn!("Could not roll back {}: {}", destination.display(), e),
        }
    }
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
    // Destinations on another filesystem cannot be renamed into
    if fs::rename(from, to).is_err() {
        fs::copy(from, to)?;
        fs::remove_file(from)?;
    }
    Ok(())
}
