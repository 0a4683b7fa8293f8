use crate::error::Result;
use crate::raster::Raster;

pub trait RasterReader {
    fn read_raster(&self) -> Result<Raster>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    GeoTiff,
    NetCDF,
}
