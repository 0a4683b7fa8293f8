//! Resampling of a raster onto a reference grid.
//!
//! Each output cell centre is projected into the source grid through the inverse of the
//! source geotransform and sampled with the requested method. Cells that fall outside the
//! source extent, or that would read a no-data source cell, get the caller's sentinel.

use crate::error::{HarmonizeError, Result};
use crate::raster::{GridSpec, Raster, try_alloc};
use log::{debug, warn};
use ndarray::Zip;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fractional offsets closer than this to a cell centre snap onto it.
const SNAP_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum ResampleMethod {
    #[serde(rename = "near")]
    Nearest,
    #[serde(rename = "bilinear")]
    Bilinear,
}

impl ResampleMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResampleMethod::Nearest => "near",
            ResampleMethod::Bilinear => "bilinear",
        }
    }
}

impl FromStr for ResampleMethod {
    type Err = HarmonizeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "near" | "nearest" => Ok(ResampleMethod::Nearest),
            "bilinear" => Ok(ResampleMethod::Bilinear),
            _ => Err(HarmonizeError::InvalidInterpolationMethod(s.to_string())),
        }
    }
}

impl TryFrom<String> for ResampleMethod {
    type Error = HarmonizeError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl fmt::Display for ResampleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resamples `source` onto `reference`, producing a raster with the reference's
/// dimensions, geotransform and CRS and `nodata` as its sentinel.
pub fn align(
    source: &Raster,
    reference: &GridSpec,
    method: ResampleMethod,
    nodata: f32,
) -> Result<Raster> {
    reference.ensure_not_degenerate()?;

    let source_grid = source.grid();
    if !source_grid.is_invertible() {
        return Err(HarmonizeError::GridMismatch(format!(
            "source geotransform {:?} cannot be inverted",
            source_grid.geotransform
        )));
    }

    if let (Some(from), Some(to)) = (&source_grid.crs, &reference.crs)
        && from != to
    {
        warn!("Source and reference CRS differ, resampling without reprojection");
    }

    debug!(
        "Resampling {} onto {} ({})",
        source_grid, reference, method
    );

    let mut out = try_alloc(reference.shape(), nodata)?;

    Zip::indexed(&mut out).par_for_each(|(row, col), cell| {
        let (x, y) = reference.cell_center(row, col);
        let Some((px, py)) = source_grid.world_to_pixel(x, y) else {
            return;
        };

        let sample = match method {
            ResampleMethod::Nearest => sample_nearest(source, px, py),
            ResampleMethod::Bilinear => sample_bilinear(source, px, py),
        };

        if let Some(value) = sample {
            *cell = value;
        }
    });

    Ok(Raster::from_parts(out, nodata, reference.clone()))
}

fn sample_nearest(source: &Raster, px: f64, py: f64) -> Option<f32> {
    if px < 0.0 || py < 0.0 {
        return None;
    }
    source.get(py.floor() as usize, px.floor() as usize)
}

fn sample_bilinear(source: &Raster, px: f64, py: f64) -> Option<f32> {
    let (rows, cols) = source.shape();
    if px < 0.0 || py < 0.0 || px >= cols as f64 || py >= rows as f64 {
        return None;
    }

    // Positions relative to cell centres
    let (c0, c1, wx) = neighbours(px - 0.5, cols);
    let (r0, r1, wy) = neighbours(py - 0.5, rows);

    let taps = [
        (r0, c0, (1.0 - wy) * (1.0 - wx)),
        (r0, c1, (1.0 - wy) * wx),
        (r1, c0, wy * (1.0 - wx)),
        (r1, c1, wy * wx),
    ];

    let mut value = 0.0_f64;
    for (row, col, weight) in taps {
        if weight == 0.0 {
            continue;
        }
        value += weight * source.get(row, col)? as f64;
    }

    Some(value as f32)
}

/// Lower and upper neighbour indices along one axis and the weight of the upper one.
/// Positions beyond the outermost centres clamp to the edge cell.
fn neighbours(position: f64, len: usize) -> (usize, usize, f64) {
    let last = len - 1;
    if position <= 0.0 {
        return (0, 0, 0.0);
    }
    if position >= last as f64 {
        return (last, last, 0.0);
    }

    let lower = position.floor();
    let fraction = position - lower;
    let lower = lower as usize;

    if fraction < SNAP_EPSILON {
        (lower, lower, 0.0)
    } else if fraction > 1.0 - SNAP_EPSILON {
        (lower + 1, lower + 1, 0.0)
    } else {
        (lower, lower + 1, fraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::test_support::{raster_from_rows, unit_grid};

    const NODATA: f32 = -9999.0;

    fn sample_raster() -> Raster {
        raster_from_rows(
            &[
                &[1.0, 2.0, 3.0, 4.0],
                &[5.0, NODATA, 7.0, 8.0],
                &[9.0, 10.0, 11.0, 12.0],
            ],
            NODATA,
        )
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("near".parse::<ResampleMethod>().unwrap(), ResampleMethod::Nearest);
        assert_eq!("Nearest".parse::<ResampleMethod>().unwrap(), ResampleMethod::Nearest);
        assert_eq!("bilinear".parse::<ResampleMethod>().unwrap(), ResampleMethod::Bilinear);
        assert!(matches!(
            "cubic".parse::<ResampleMethod>(),
            Err(HarmonizeError::InvalidInterpolationMethod(m)) if m == "cubic"
        ));
    }

    #[test]
    fn test_method_deserializes_from_config_strings() {
        let method: ResampleMethod = serde_json::from_str("\"near\"").unwrap();
        assert_eq!(method, ResampleMethod::Nearest);
        assert!(serde_json::from_str::<ResampleMethod>("\"lanczos\"").is_err());
    }

    #[test]
    fn test_nearest_on_same_grid_is_identity() {
        let source = sample_raster();
        let aligned = align(&source, source.grid(), ResampleMethod::Nearest, NODATA).unwrap();
        assert_eq!(aligned.data(), source.data());
        assert!(aligned.grid().matches(source.grid()));
    }

    #[test]
    fn test_bilinear_on_same_grid_is_near_identity() {
        let source = sample_raster();
        let aligned = align(&source, source.grid(), ResampleMethod::Bilinear, NODATA).unwrap();
        for (a, b) in aligned.data().iter().zip(source.data().iter()) {
            assert!((a - b).abs() < 1e-5, "{} != {}", a, b);
        }
    }

    #[test]
    fn test_nearest_upsampling_repeats_parent_cell() {
        // 2x2 cells of size 2 covering the same extent as a 4x4 unit grid
        let coarse_grid =
            GridSpec::new(2, 2, [0.0, 2.0, 0.0, 4.0, 0.0, -2.0], None).unwrap();
        let coarse = Raster::from_vec(coarse_grid, NODATA, vec![1.0, 2.0, 3.0, 4.0]).unwrap();

        let aligned = align(&coarse, &unit_grid(4, 4), ResampleMethod::Nearest, NODATA).unwrap();
        for row in 0..4 {
            for col in 0..4 {
                let expected = coarse.data()[[row / 2, col / 2]];
                assert_eq!(aligned.data()[[row, col]], expected);
            }
        }
    }

    #[test]
    fn test_bilinear_midpoint_is_average() {
        let source = raster_from_rows(&[&[0.0, 10.0]], NODATA);
        // Single cell centred on the boundary between the two source cells
        let reference = GridSpec::new(1, 1, [0.5, 1.0, 0.0, 1.0, 0.0, -1.0], None).unwrap();

        let aligned = align(&source, &reference, ResampleMethod::Bilinear, NODATA).unwrap();
        assert!((aligned.data()[[0, 0]] - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_bilinear_does_not_blend_with_missing_data() {
        let source = raster_from_rows(&[&[4.0, NODATA]], NODATA);
        let reference = GridSpec::new(1, 1, [0.5, 1.0, 0.0, 1.0, 0.0, -1.0], None).unwrap();

        let aligned = align(&source, &reference, ResampleMethod::Bilinear, -1.0).unwrap();
        assert_eq!(aligned.data()[[0, 0]], -1.0);
    }

    #[test]
    fn test_cells_outside_source_get_caller_sentinel() {
        let source = raster_from_rows(&[&[1.0, 2.0], &[3.0, 4.0]], NODATA);
        // Shifted two cells to the right: left column overlaps, right column does not
        let reference = GridSpec::new(2, 2, [1.0, 1.0, 0.0, 2.0, 0.0, -1.0], None).unwrap();

        for method in [ResampleMethod::Nearest, ResampleMethod::Bilinear] {
            let aligned = align(&source, &reference, method, -1.0).unwrap();
            assert_eq!(aligned.nodata(), -1.0);
            assert_eq!(aligned.data()[[0, 0]], 2.0);
            assert_eq!(aligned.data()[[1, 0]], 4.0);
            assert_eq!(aligned.data()[[0, 1]], -1.0);
            assert_eq!(aligned.data()[[1, 1]], -1.0);
        }
    }

    #[test]
    fn test_degenerate_reference_grid() {
        let source = sample_raster();
        let reference = GridSpec {
            rows: 0,
            cols: 3,
            geotransform: [0.0, 1.0, 0.0, 0.0, 0.0, -1.0],
            crs: None,
        };
        let result = align(&source, &reference, ResampleMethod::Nearest, NODATA);
        assert!(matches!(result, Err(HarmonizeError::GridMismatch(_))));
    }

    #[test]
    fn test_neighbours_clamp_at_edges() {
        assert_eq!(neighbours(-0.3, 4), (0, 0, 0.0));
        assert_eq!(neighbours(3.2, 4), (3, 3, 0.0));
        assert_eq!(neighbours(0.0, 1), (0, 0, 0.0));
        let (lo, hi, w) = neighbours(1.25, 4);
        assert_eq!((lo, hi), (1, 2));
        assert!((w - 0.25).abs() < 1e-12);
    }
}
