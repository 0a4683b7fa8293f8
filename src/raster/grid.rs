use crate::error::{HarmonizeError, Result};
use serde::Serialize;
use std::fmt;

/// Relative tolerance used when comparing geotransform coefficients.
const GEOTRANSFORM_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Extent {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

/// Resolution, extent and CRS identity of a raster.
///
/// The geotransform follows GDAL ordering:
/// `[origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridSpec {
    pub rows: usize,
    pub cols: usize,
    pub geotransform: [f64; 6],
    pub crs: Option<String>,
}

impl GridSpec {
    pub fn new(
        rows: usize,
        cols: usize,
        geotransform: [f64; 6],
        crs: Option<String>,
    ) -> Result<Self> {
        let grid = GridSpec {
            rows,
            cols,
            geotransform,
            crs: crs.filter(|wkt| !wkt.trim().is_empty()),
        };
        grid.ensure_not_degenerate()?;
        Ok(grid)
    }

    pub fn ensure_not_degenerate(&self) -> Result<()> {
        if self.rows == 0 || self.cols == 0 {
            return Err(HarmonizeError::GridMismatch(format!(
                "degenerate grid with {} rows and {} columns",
                self.rows, self.cols
            )));
        }
        Ok(())
    }

    /// `(rows, cols)`, the shape of every array laid on this grid.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn pixel_size(&self) -> (f64, f64) {
        (self.geotransform[1].abs(), self.geotransform[5].abs())
    }

    pub fn extent(&self) -> Extent {
        let corners = [
            self.pixel_to_world(0.0, 0.0),
            self.pixel_to_world(self.cols as f64, 0.0),
            self.pixel_to_world(0.0, self.rows as f64),
            self.pixel_to_world(self.cols as f64, self.rows as f64),
        ];

        let mut extent = Extent {
            xmin: f64::INFINITY,
            xmax: f64::NEG_INFINITY,
            ymin: f64::INFINITY,
            ymax: f64::NEG_INFINITY,
        };
        for (x, y) in corners {
            extent.xmin = extent.xmin.min(x);
            extent.xmax = extent.xmax.max(x);
            extent.ymin = extent.ymin.min(y);
            extent.ymax = extent.ymax.max(y);
        }
        extent
    }

    /// World coordinates of fractional pixel position `(px, py)`.
    pub fn pixel_to_world(&self, px: f64, py: f64) -> (f64, f64) {
        let gt = &self.geotransform;
        (
            gt[0] + px * gt[1] + py * gt[2],
            gt[3] + px * gt[4] + py * gt[5],
        )
    }

    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        self.pixel_to_world(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Fractional pixel position `(px, py)` of a world coordinate. Cell `(r, c)` covers
    /// `c <= px < c + 1` and `r <= py < r + 1`.
    ///
    /// Returns `None` when the geotransform cannot be inverted.
    pub fn world_to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let gt = &self.geotransform;
        let det = gt[1] * gt[5] - gt[2] * gt[4];
        if det == 0.0 || !det.is_finite() {
            return None;
        }

        let dx = x - gt[0];
        let dy = y - gt[3];
        Some((
            (gt[5] * dx - gt[2] * dy) / det,
            (gt[1] * dy - gt[4] * dx) / det,
        ))
    }

    pub fn is_invertible(&self) -> bool {
        self.world_to_pixel(self.geotransform[0], self.geotransform[3])
            .is_some()
    }

    /// True when a cell `(i, j)` on either grid covers the same ground location.
    pub fn matches(&self, other: &GridSpec) -> bool {
        if self.shape() != other.shape() {
            return false;
        }

        let (width, height) = self.pixel_size();
        let tolerance = GEOTRANSFORM_TOLERANCE * width.max(height).max(f64::MIN_POSITIVE);
        let same_transform = self
            .geotransform
            .iter()
            .zip(other.geotransform.iter())
            .all(|(a, b)| (a - b).abs() <= tolerance);

        let same_crs = match (&self.crs, &other.crs) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };

        same_transform && same_crs
    }

    pub fn ensure_matches(&self, other: &GridSpec, context: &str) -> Result<()> {
        if self.matches(other) {
            Ok(())
        } else {
            Err(HarmonizeError::GridMismatch(format!(
                "{}: expected {}, found {}",
                context, self, other
            )))
        }
    }
}

impl fmt::Display for GridSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (width, height) = self.pixel_size();
        let Extent {
            xmin,
            xmax,
            ymin,
            ymax,
        } = self.extent();
        write!(
            f,
            "{}x{} cells of {:.6}x{:.6} over [{:.4}, {:.4}] x [{:.4}, {:.4}]",
            self.rows, self.cols, width, height, xmin, xmax, ymin, ymax
        )
    }
}
