pub mod geotiff;
pub mod nc;
pub mod types;
pub mod utils;
pub mod writer;

pub use geotiff::GeoTiffReader;
pub use nc::NcReader;
pub use types::{FileType, RasterReader};
pub use utils::reader_from_filetype;
pub use writer::{Compression, PixelType, SaveOptions, save};

use crate::error::Result;
use crate::raster::Raster;
use std::path::Path;

pub fn create_reader(file_name: String, variable: Option<String>) -> Result<Box<dyn RasterReader>> {
    match reader_from_filetype(file_name.as_ref())? {
        FileType::GeoTiff => Ok(Box::new(GeoTiffReader { file_name })),
        FileType::NetCDF => Ok(Box::new(NcReader {
            file_name,
            variable,
        })),
    }
}

/// Loads band 1 of the raster at `path`.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Raster> {
    let file_name = path.as_ref().to_string_lossy().to_string();
    create_reader(file_name, None)?.read_raster()
}
