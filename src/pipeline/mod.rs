//! Harmonization of a reference carbon map with higher-priority candidate maps.
//!
//! The run is a fixed chain of stages:
//! 1. align every candidate onto the reference grid,
//! 2. scale every aligned candidate into the reference's units,
//! 3. fuse candidates in priority order, with the reference as the last fallback,
//! 4. turn the fused density into a per-cell quantity and total it,
//! 5. do the same for the reference alone, for comparison.
//!
//! Every stage result may come from a [`StageStore`] instead of being recomputed.

pub mod cache;
pub mod report;
pub mod runner;
pub mod sources;

pub use cache::{DiskStore, Fingerprint, MemoryStore, Stage, StageKey, StageStore};
pub use report::RunReport;
pub use runner::HarmonizationRunner;
pub use sources::{Candidate, PipelineInputs, SourceRaster};

use crate::aggregate::{NumericOverflowWarning, Total, checked_total, density_to_quantity};
use crate::align::align;
use crate::error::Result;
use crate::fusion::{PriorityList, Validity, fuse};
use crate::raster::{GridSpec, Raster};
use crate::scale::scale;
use log::{debug, info, warn};
use rayon::prelude::*;

#[derive(Debug)]
pub struct HarmonizationOutput {
    /// Fused per-unit-area density on the reference grid.
    pub fused_density: Raster,
    pub fused_quantity: Raster,
    pub fused_total: f64,
    pub reference_quantity: Raster,
    pub reference_total: f64,
    pub warnings: Vec<NumericOverflowWarning>,
}

pub struct HarmonizationPipeline {
    nodata: f32,
    store: Option<Box<dyn StageStore>>,
}

impl HarmonizationPipeline {
    /// A pipeline writing `nodata` into every raster it produces.
    pub fn new(nodata: f32) -> Self {
        Self {
            nodata,
            store: None,
        }
    }

    pub fn with_store(mut self, store: Box<dyn StageStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn nodata(&self) -> f32 {
        self.nodata
    }

    pub fn run(&self, inputs: PipelineInputs) -> Result<HarmonizationOutput> {
        let PipelineInputs {
            reference,
            candidates,
            area_per_cell,
        } = inputs;

        let reference_fingerprint = reference.fingerprint;
        let area_fingerprint = area_per_cell.fingerprint;
        let reference = reference.raster.with_nodata(self.nodata);
        let area_per_cell = area_per_cell.raster;

        let grid = reference.grid().clone();
        grid.ensure_matches(area_per_cell.grid(), "area per cell")?;
        info!("Reference grid: {}", grid);

        // Candidates are independent of each other until fusion
        let prepared: Vec<(Raster, Fingerprint)> = candidates
            .par_iter()
            .map(|candidate| self.prepare_candidate(candidate, &grid))
            .collect::<Result<_>>()?;
        drop(candidates);

        let fuse_key = {
            let inputs: Vec<&Fingerprint> = prepared
                .iter()
                .map(|(_, fingerprint)| fingerprint)
                .chain(std::iter::once(&reference_fingerprint))
                .collect();
            StageKey::new(
                Stage::Fuse,
                "combined",
                Fingerprint::derive(Stage::Fuse, &[self.nodata_param()], &inputs),
            )
        };

        let fused_density = self.stage(&fuse_key, &grid, || {
            let mut list = PriorityList::new();
            for (raster, _) in &prepared {
                list.push(raster, Validity::Positive);
            }
            list.push(&reference, Validity::HasData);
            fuse(&list)
        })?;
        drop(prepared);

        let quantity_key = StageKey::new(
            Stage::Quantity,
            "combined",
            Fingerprint::derive(
                Stage::Quantity,
                &[],
                &[&fuse_key.fingerprint, &area_fingerprint],
            ),
        );
        let fused_quantity = self.stage(&quantity_key, &grid, || {
            density_to_quantity(&fused_density, &area_per_cell)
        })?;

        let reference_quantity_key = StageKey::new(
            Stage::ReferenceQuantity,
            "reference",
            Fingerprint::derive(
                Stage::ReferenceQuantity,
                &[self.nodata_param()],
                &[&reference_fingerprint, &area_fingerprint],
            ),
        );
        let reference_quantity = self.stage(&reference_quantity_key, &grid, || {
            density_to_quantity(&reference, &area_per_cell)
        })?;

        let mut warnings = Vec::new();
        let fused_total = take_total(checked_total(&fused_quantity), &mut warnings);
        let reference_total = take_total(checked_total(&reference_quantity), &mut warnings);

        info!("Fused total: {}", fused_total);
        info!("Reference total: {}", reference_total);

        Ok(HarmonizationOutput {
            fused_density,
            fused_quantity,
            fused_total,
            reference_quantity,
            reference_total,
            warnings,
        })
    }

    /// Aligns and scales one candidate, returning it with the fingerprint of the result.
    fn prepare_candidate(
        &self,
        candidate: &Candidate,
        grid: &GridSpec,
    ) -> Result<(Raster, Fingerprint)> {
        let align_key = StageKey::new(
            Stage::Align,
            &candidate.name,
            Fingerprint::derive(
                Stage::Align,
                &[
                    candidate.method.as_str().to_string(),
                    self.nodata_param(),
                ],
                &[&candidate.source.fingerprint, &Fingerprint::of_grid(grid)],
            ),
        );
        let scale_key = StageKey::new(
            Stage::Scale,
            &candidate.name,
            Fingerprint::derive(
                Stage::Scale,
                &[candidate.coefficient.value.to_bits().to_string()],
                &[&align_key.fingerprint],
            ),
        );

        // A stored scaled result makes the alignment unnecessary
        let scaled = self.stage(&scale_key, grid, || {
            let aligned = self.stage(&align_key, grid, || {
                align(&candidate.source.raster, grid, candidate.method, self.nodata)
            })?;
            Ok(scale(&aligned, &candidate.coefficient))
        })?;

        Ok((scaled, scale_key.fingerprint))
    }

    /// Returns the stored result for `key` if it lies on `grid`, else computes and stores it.
    fn stage<F>(&self, key: &StageKey, grid: &GridSpec, compute: F) -> Result<Raster>
    where
        F: FnOnce() -> Result<Raster>,
    {
        if let Some(store) = &self.store {
            match store.get(key)? {
                Some(raster) if raster.grid().matches(grid) => {
                    info!("Reusing stored {}", key);
                    return Ok(raster);
                }
                Some(raster) => warn!(
                    "Stored {} lies on {} instead of {}, recomputing",
                    key,
                    raster.grid(),
                    grid
                ),
                None => {}
            }
        }

        info!("Running {}", key);
        let raster = compute()?;
        debug!("{}: {}", key, raster.summary());

        if let Some(store) = &self.store {
            store.put(key, &raster)?;
        }
        Ok(raster)
    }

    fn nodata_param(&self) -> String {
        format!("nodata={}", self.nodata.to_bits())
    }
}

fn take_total(total: Total, warnings: &mut Vec<NumericOverflowWarning>) -> f64 {
    if let Some(warning) = total.warning {
        warn!("{}", warning);
        warnings.push(warning);
    }
    total.value
}
