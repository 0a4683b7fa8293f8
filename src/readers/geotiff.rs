use super::RasterReader;
use crate::error::Result;
use crate::raster::{GridSpec, Raster};
use gdal::Dataset;
use log::debug;
use ndarray::Array2;

pub struct GeoTiffReader {
    pub file_name: String,
}

impl RasterReader for GeoTiffReader {
    fn read_raster(&self) -> Result<Raster> {
        read_first_band(&self.file_name)
    }
}

/// Reads band 1 of any GDAL-openable dataset with its georeferencing.
///
/// Bands without a no-data value get a NaN sentinel.
pub(super) fn read_first_band(gdal_path: &str) -> Result<Raster> {
    let dataset = Dataset::open(gdal_path)?;
    let band = dataset.rasterband(1)?;

    let (width, height) = dataset.raster_size();
    let geotransform = dataset.geo_transform()?;
    let projection = dataset.projection();
    let grid = GridSpec::new(height, width, geotransform, Some(projection))?;

    let nodata = band
        .no_data_value()
        .map(|v| v as f32)
        .unwrap_or(f32::NAN);

    debug!(
        "Reading {}: {}x{} cells, no-data {}",
        gdal_path, width, height, nodata
    );

    let buffer = band.read_as::<f32>((0, 0), (width, height), (width, height), None)?;
    let samples: Vec<f32> = buffer.into_iter().collect();
    let data = Array2::from_shape_vec((height, width), samples)?;

    Raster::new(data, nodata, grid)
}
