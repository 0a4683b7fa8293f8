use super::RasterReader;
use super::geotiff::read_first_band;
use crate::error::Result;
use crate::raster::Raster;

pub struct NcReader {
    pub file_name: String,
    pub variable: Option<String>,
}

impl NcReader {
    /// GDAL subdataset name, `NETCDF:<file>:<variable>` when a variable is given.
    pub fn gdal_path(&self) -> String {
        match &self.variable {
            Some(variable) => format!("NETCDF:{}:{}", self.file_name, variable),
            None => self.file_name.clone(),
        }
    }
}

impl RasterReader for NcReader {
    fn read_raster(&self) -> Result<Raster> {
        read_first_band(&self.gdal_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gdal_path_selects_variable() {
        let reader = NcReader {
            file_name: "geocarbon.nc".to_string(),
            variable: Some("agb".to_string()),
        };
        assert_eq!(reader.gdal_path(), "NETCDF:geocarbon.nc:agb");

        let reader = NcReader {
            file_name: "geocarbon.nc".to_string(),
            variable: None,
        };
        assert_eq!(reader.gdal_path(), "geocarbon.nc");
    }
}
