use super::HarmonizationOutput;
use crate::aggregate::NumericOverflowWarning;
use crate::config::{CandidateSource, Config, RasterFile};
use crate::error::Result;
use crate::raster::GridSpec;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Totals and provenance of one harmonization run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub reference: RasterFile,
    pub candidates: Vec<CandidateSource>,
    pub area_per_cell: RasterFile,
    pub grid: GridSpec,
    pub nodata: f32,
    pub fused_total: f64,
    pub reference_total: f64,
    pub fused_to_reference_ratio: Option<f64>,
    pub fused_valid_cells: usize,
    pub warnings: Vec<NumericOverflowWarning>,
    pub outputs: Vec<PathBuf>,
}

impl RunReport {
    pub fn new(config: &Config, output: &HarmonizationOutput, outputs: Vec<PathBuf>) -> Self {
        let ratio = (output.reference_total != 0.0)
            .then(|| output.fused_total / output.reference_total);

        Self {
            generated_at: Utc::now(),
            reference: config.reference().clone(),
            candidates: config.candidates().to_vec(),
            area_per_cell: config.area_per_cell().clone(),
            grid: output.fused_density.grid().clone(),
            nodata: output.fused_density.nodata(),
            fused_total: output.fused_total,
            reference_total: output.reference_total,
            fused_to_reference_ratio: ratio,
            fused_valid_cells: output.fused_density.valid_count(),
            warnings: output.warnings.clone(),
            outputs,
        }
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Harmonized carbon - {} candidate(s) over {}",
            self.candidates.len(),
            self.reference.name
        )?;
        writeln!(f, "  Grid: {}", self.grid)?;
        writeln!(f, "  Fused total: {:.1}", self.fused_total)?;
        writeln!(f, "  Reference total: {:.1}", self.reference_total)?;
        if let Some(ratio) = self.fused_to_reference_ratio {
            writeln!(f, "  Fused / reference: {:.4}", ratio)?;
        }
        write!(f, "  Valid cells: {}", self.fused_valid_cells)
    }
}
