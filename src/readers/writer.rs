use crate::error::Result;
use crate::raster::Raster;
use gdal::cpl::CslStringList;
use gdal::raster::{Buffer, GdalType};
use gdal::{Driver, DriverManager};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelType {
    #[default]
    Float32,
    Float64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Compression {
    None,
    #[default]
    Deflate,
    Lzw,
    Zstd,
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Compression::None => "NONE",
            Compression::Deflate => "DEFLATE",
            Compression::Lzw => "LZW",
            Compression::Zstd => "ZSTD",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SaveOptions {
    pub nodata: f32,
    pub compression: Compression,
    pub pixel_type: PixelType,
}

impl SaveOptions {
    /// Compressed float32 output keeping the raster's own sentinel.
    pub fn for_raster(raster: &Raster) -> Self {
        Self {
            nodata: raster.nodata(),
            compression: Compression::default(),
            pixel_type: PixelType::default(),
        }
    }
}

/// GTiff creation options for tiled, optionally compressed output.
pub fn creation_options(compression: Compression) -> Vec<String> {
    vec![
        format!("COMPRESS={}", compression),
        "TILED=YES".to_string(),
        "BIGTIFF=IF_SAFER".to_string(),
    ]
}

/// Writes `raster` as a single-band GeoTIFF, re-labelling its sentinel to
/// `options.nodata` when they differ.
pub fn save<P: AsRef<Path>>(raster: &Raster, path: P, options: &SaveOptions) -> Result<()> {
    let path = path.as_ref();
    info!("Writing {}", path.display());

    let raster: Cow<'_, Raster> = if raster.is_nodata(options.nodata) {
        Cow::Borrowed(raster)
    } else {
        Cow::Owned(raster.clone().with_nodata(options.nodata))
    };

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut gdal_options = CslStringList::new();
    for option in creation_options(options.compression) {
        gdal_options.add_string(&option)?;
    }

    match options.pixel_type {
        PixelType::Float32 => {
            let values: Vec<f32> = raster.data().iter().copied().collect();
            write_band(&driver, path, &raster, values, &gdal_options)
        }
        PixelType::Float64 => {
            let values: Vec<f64> = raster.data().iter().map(|&v| v as f64).collect();
            write_band(&driver, path, &raster, values, &gdal_options)
        }
    }
}

fn write_band<T: GdalType + Copy>(
    driver: &Driver,
    path: &Path,
    raster: &Raster,
    values: Vec<T>,
    options: &CslStringList,
) -> Result<()> {
    let (rows, cols) = raster.shape();
    let grid = raster.grid();

    let mut dataset =
        driver.create_with_band_type_with_options::<T, _>(path, cols, rows, 1, options)?;
    dataset.set_geo_transform(&grid.geotransform)?;
    if let Some(crs) = &grid.crs {
        dataset.set_projection(crs)?;
    }

    let mut band = dataset.rasterband(1)?;
    band.set_no_data_value(Some(raster.nodata() as f64))?;

    let mut buffer = Buffer::new((cols, rows), values);
    band.write((0, 0), (cols, rows), &mut buffer)?;

    debug!("Wrote {}x{} cells to {}", cols, rows, path.display());
    Ok(())
}
