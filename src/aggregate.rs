use crate::error::Result;
use crate::raster::{Raster, is_sentinel, try_alloc};
use crate::scale::finite_product;
use log::warn;
use ndarray::{Axis, Zip};
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Above this magnitude consecutive f64 values are more than one unit apart.
pub const PRECISION_WARNING_THRESHOLD: f64 = 4_503_599_627_370_496.0; // 2^52

/// Neumaier compensated accumulator.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeumaierSum {
    sum: f64,
    compensation: f64,
}

impl NeumaierSum {
    pub fn add(&mut self, value: f64) {
        let t = self.sum + value;
        if self.sum.abs() >= value.abs() {
            self.compensation += (self.sum - t) + value;
        } else {
            self.compensation += (value - t) + self.sum;
        }
        self.sum = t;
    }

    pub fn merge(&mut self, other: NeumaierSum) {
        self.add(other.sum);
        self.add(other.compensation);
    }

    pub fn value(&self) -> f64 {
        self.sum + self.compensation
    }
}

/// A total approaching the precision limit of the accumulator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericOverflowWarning {
    pub total: f64,
    pub threshold: f64,
}

impl fmt::Display for NumericOverflowWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total.is_finite() {
            write!(
                f,
                "total {:e} exceeds {:e}, sub-unit precision is lost",
                self.total, self.threshold
            )
        } else {
            write!(f, "total overflowed to {}", self.total)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Total {
    pub value: f64,
    pub warning: Option<NumericOverflowWarning>,
}

/// Per-cell quantity from a per-area density and the area of each cell.
///
/// A cell is the sentinel when either input is; the output uses the density's sentinel.
/// Products outside the `f32` range also become the sentinel and are counted in a warning.
///
/// A finite product that happens to equal the sentinel is indistinguishable from no-data
/// and drops out of later totals. Choose a sentinel no real quantity can take.
pub fn density_to_quantity(density: &Raster, area_per_cell: &Raster) -> Result<Raster> {
    density
        .grid()
        .ensure_matches(area_per_cell.grid(), "area per cell")?;

    let nodata = density.nodata();
    let area_nodata = area_per_cell.nodata();
    let mut quantity = try_alloc(density.shape(), nodata)?;
    let overflowed = AtomicUsize::new(0);

    Zip::from(&mut quantity)
        .and(density.data())
        .and(area_per_cell.data())
        .par_for_each(|out, &d, &a| {
            if is_sentinel(d, nodata) || is_sentinel(a, area_nodata) {
                return;
            }
            match finite_product(d, a as f64) {
                Some(product) => *out = product,
                None => {
                    overflowed.fetch_add(1, Ordering::Relaxed);
                }
            }
        });

    let overflowed = overflowed.into_inner();
    if overflowed > 0 {
        warn!(
            "{} cell(s) overflowed when converting density to quantity and were set to no-data",
            overflowed
        );
    }

    Ok(Raster::from_parts(quantity, nodata, density.grid().clone()))
}

/// Sum of every non-sentinel cell, logging a warning when precision is at risk.
pub fn total(raster: &Raster) -> f64 {
    let total = checked_total(raster);
    if let Some(warning) = &total.warning {
        warn!("{}", warning);
    }
    total.value
}

/// Sum of every non-sentinel cell together with a precision warning, if any.
///
/// Rows are summed in parallel and combined in row order, so the result does not depend
/// on the number of threads.
pub fn checked_total(raster: &Raster) -> Total {
    let nodata = raster.nodata();

    let row_sums: Vec<NeumaierSum> = raster
        .data()
        .axis_iter(Axis(0))
        .into_par_iter()
        .map(|row| {
            let mut sum = NeumaierSum::default();
            for &value in row.iter().filter(|&&v| !is_sentinel(v, nodata)) {
                sum.add(value as f64);
            }
            sum
        })
        .collect();

    let mut sum = NeumaierSum::default();
    for row in row_sums {
        sum.merge(row);
    }

    let value = sum.value();
    let warning = (!value.is_finite() || value.abs() >= PRECISION_WARNING_THRESHOLD).then(|| {
        NumericOverflowWarning {
            total: value,
            threshold: PRECISION_WARNING_THRESHOLD,
        }
    });

    Total { value, warning }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarmonizeError;
    use crate::raster::GridSpec;
    use crate::raster::test_support::{raster_from_rows, unit_grid};

    const NODATA: f32 = -9999.0;

    #[test]
    fn test_quantity_and_total_of_fused_density() {
        let area = raster_from_rows(&[&[2.0, 2.0], &[2.0, 2.0]], NODATA);
        let density = raster_from_rows(&[&[10.0, 20.0], &[99.0, 5.0]], NODATA);

        let quantity = density_to_quantity(&density, &area).unwrap();

        assert_eq!(
            quantity.data(),
            &ndarray::arr2(&[[20.0, 40.0], [198.0, 10.0]])
        );
        assert_eq!(total(&quantity), 268.0);
    }

    #[test]
    fn test_sentinel_in_either_input_propagates() {
        let density = raster_from_rows(&[&[NODATA, 3.0, 4.0, NODATA]], NODATA);
        let area = raster_from_rows(&[&[1.0, -1.0, 2.0, -1.0]], -1.0);

        let quantity = density_to_quantity(&density, &area).unwrap();

        for col in 0..4 {
            let either_missing = density.is_nodata(density.data()[[0, col]])
                || area.is_nodata(area.data()[[0, col]]);
            assert_eq!(quantity.get(0, col).is_none(), either_missing, "column {}", col);
        }
        assert_eq!(quantity.data()[[0, 2]], 8.0);
        assert_eq!(quantity.nodata(), NODATA);
    }

    #[test]
    fn test_overflowing_quantity_becomes_sentinel() {
        let density = raster_from_rows(&[&[3.0e38, 1.0]], NODATA);
        let area = raster_from_rows(&[&[10.0, 1.0]], NODATA);

        let quantity = density_to_quantity(&density, &area).unwrap();

        assert_eq!(quantity.data()[[0, 0]], NODATA);
        assert_eq!(quantity.valid_count(), 1);
        let checked = checked_total(&quantity);
        assert_eq!(checked.value, 1.0);
        assert!(checked.warning.is_none());
    }

    #[test]
    fn test_product_equal_to_sentinel_reads_as_missing() {
        let density = raster_from_rows(&[&[-4999.5, 1.0]], NODATA);
        let area = raster_from_rows(&[&[2.0, 1.0]], NODATA);

        let quantity = density_to_quantity(&density, &area).unwrap();

        assert!(quantity.get(0, 0).is_none());
        assert_eq!(total(&quantity), 1.0);
    }

    #[test]
    fn test_quantity_requires_matching_grids() {
        let density = raster_from_rows(&[&[1.0, 2.0]], NODATA);
        let area = Raster::filled(unit_grid(1, 3), NODATA, 1.0).unwrap();
        assert!(matches!(
            density_to_quantity(&density, &area),
            Err(HarmonizeError::GridMismatch(_))
        ));
    }

    #[test]
    fn test_total_skips_sentinel() {
        let raster = raster_from_rows(&[&[1.5, NODATA], &[2.5, 0.0]], NODATA);
        assert_eq!(total(&raster), 4.0);
    }

    #[test]
    fn test_accumulator_is_stable_over_many_values() {
        let value = 0.1_f32 as f64;
        let n = 10_000_000_u64;

        let mut sum = NeumaierSum::default();
        for _ in 0..n {
            sum.add(value);
        }

        let expected = n as f64 * value;
        assert!(((sum.value() - expected) / expected).abs() < 1e-9);
    }

    #[test]
    fn test_total_of_identical_cells() {
        let rows = 1000;
        let cols = 1000;
        let grid = GridSpec::new(rows, cols, [0.0, 1.0, 0.0, 0.0, 0.0, -1.0], None).unwrap();
        let raster = Raster::filled(grid, NODATA, 0.3).unwrap();

        let expected = (rows * cols) as f64 * 0.3_f32 as f64;
        let result = total(&raster);
        assert!(((result - expected) / expected).abs() < 1e-9);
    }

    #[test]
    fn test_large_total_carries_warning() {
        let raster = raster_from_rows(&[&[3.0e38, 3.0e38], &[3.0e38, 1.0]], NODATA);
        let checked = checked_total(&raster);
        assert!(checked.warning.is_some());
        assert!(checked.value > PRECISION_WARNING_THRESHOLD);

        let small = raster_from_rows(&[&[1.0, 2.0]], NODATA);
        assert!(checked_total(&small).warning.is_none());
    }

    #[test]
    fn test_compensation_recovers_cancelled_terms() {
        let mut sum = NeumaierSum::default();
        for value in [1.0, 1e100, 1.0, -1e100] {
            sum.add(value);
        }
        assert_eq!(sum.value(), 2.0);
    }
}
