pub mod grid;

pub use grid::{Extent, GridSpec};

use crate::aggregate::NeumaierSum;
use crate::error::{HarmonizeError, Result};
use ndarray::Array2;
use std::fmt;

/// Single-band grid of `f32` samples with a no-data sentinel.
///
/// Every cell holds either the sentinel or a finite value; constructors replace
/// non-finite samples with the sentinel.
#[derive(Debug, Clone)]
pub struct Raster {
    data: Array2<f32>,
    nodata: f32,
    grid: GridSpec,
}

impl Raster {
    pub fn new(data: Array2<f32>, nodata: f32, grid: GridSpec) -> Result<Self> {
        if data.dim() != grid.shape() {
            return Err(HarmonizeError::GridMismatch(format!(
                "array of shape {:?} does not fit grid {}",
                data.dim(),
                grid
            )));
        }

        let mut raster = Raster { data, nodata, grid };
        raster.normalize_non_finite();
        Ok(raster)
    }

    /// Builds a raster from row-major samples.
    pub fn from_vec(grid: GridSpec, nodata: f32, samples: Vec<f32>) -> Result<Self> {
        let data = Array2::from_shape_vec(grid.shape(), samples)?;
        Raster::new(data, nodata, grid)
    }

    /// A raster on `grid` where every cell holds `value`.
    pub fn filled(grid: GridSpec, nodata: f32, value: f32) -> Result<Self> {
        let data = try_alloc(grid.shape(), value)?;
        Raster::new(data, nodata, grid)
    }

    /// Wraps an array produced by an in-crate transform on `grid`.
    pub(crate) fn from_parts(data: Array2<f32>, nodata: f32, grid: GridSpec) -> Self {
        debug_assert_eq!(data.dim(), grid.shape());
        Raster { data, nodata, grid }
    }

    fn normalize_non_finite(&mut self) {
        let nodata = self.nodata;
        self.data.mapv_inplace(|v| if v.is_finite() { v } else { nodata });
    }

    /// Re-labels sentinel cells with a new sentinel value.
    pub fn with_nodata(mut self, nodata: f32) -> Self {
        if is_sentinel(nodata, self.nodata) {
            return self;
        }
        let old = self.nodata;
        self.data
            .mapv_inplace(|v| if is_sentinel(v, old) { nodata } else { v });
        self.nodata = nodata;
        self
    }

    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    pub fn nodata(&self) -> f32 {
        self.nodata
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn is_nodata(&self, value: f32) -> bool {
        is_sentinel(value, self.nodata)
    }

    /// Value at `(row, col)`, or `None` for a sentinel or out-of-range cell.
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        self.data
            .get((row, col))
            .copied()
            .filter(|&v| !self.is_nodata(v))
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|&&v| !self.is_nodata(v)).count()
    }

    pub fn summary(&self) -> RasterSummary {
        let mut summary = RasterSummary {
            min: f32::INFINITY,
            max: f32::NEG_INFINITY,
            mean: f64::NAN,
            valid: 0,
            cells: self.data.len(),
        };

        let mut sum = NeumaierSum::default();
        for &value in self.data.iter().filter(|&&v| !self.is_nodata(v)) {
            summary.min = summary.min.min(value);
            summary.max = summary.max.max(value);
            summary.valid += 1;
            sum.add(value as f64);
        }

        if summary.valid > 0 {
            summary.mean = sum.value() / summary.valid as f64;
        } else {
            summary.min = f32::NAN;
            summary.max = f32::NAN;
        }
        summary
    }
}

pub(crate) fn is_sentinel(value: f32, nodata: f32) -> bool {
    value == nodata || (nodata.is_nan() && value.is_nan())
}

/// Allocates a `(rows, cols)` array, failing instead of aborting when memory runs out.
pub(crate) fn try_alloc(shape: (usize, usize), fill: f32) -> Result<Array2<f32>> {
    let cells = shape
        .0
        .checked_mul(shape.1)
        .ok_or(HarmonizeError::Allocation(usize::MAX))?;

    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(cells)
        .map_err(|_| HarmonizeError::Allocation(cells))?;
    buffer.resize(cells, fill);

    Ok(Array2::from_shape_vec(shape, buffer)?)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterSummary {
    pub min: f32,
    pub max: f32,
    pub mean: f64,
    pub valid: usize,
    pub cells: usize,
}

impl fmt::Display for RasterSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let share = if self.cells == 0 {
            0.0
        } else {
            100.0 * self.valid as f64 / self.cells as f64
        };
        write!(
            f,
            "min {:.4}, max {:.4}, mean {:.4}, valid {} / {} ({:.1}%)",
            self.min, self.max, self.mean, self.valid, self.cells, share
        )
    }
}

impl fmt::Display for Raster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Grid: {}\nNo-data: {}\nValues: {}",
            self.grid,
            self.nodata,
            self.summary()
        )
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// North-up grid of unit cells with its top-left corner at `(0, rows)`.
    pub fn unit_grid(rows: usize, cols: usize) -> GridSpec {
        GridSpec::new(rows, cols, [0.0, 1.0, 0.0, rows as f64, 0.0, -1.0], None).unwrap()
    }

    pub fn raster_from_rows(rows: &[&[f32]], nodata: f32) -> Raster {
        let cols = rows.first().map_or(0, |r| r.len());
        let samples: Vec<f32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Raster::from_vec(unit_grid(rows.len(), cols), nodata, samples).unwrap()
    }
}
