use super::types::FileType;
use crate::error::{HarmonizeError, Result};
use std::path::Path;

pub fn reader_from_filetype(path: &Path) -> Result<FileType> {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("tif") | Some("tiff") => Ok(FileType::GeoTiff),
        Some("nc") => Ok(FileType::NetCDF),
        _ => Err(HarmonizeError::UnsupportedFileType(
            path.display().to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_types_by_extension() {
        assert_eq!(
            reader_from_filetype(Path::new("carbon/avitabile.tif")).unwrap(),
            FileType::GeoTiff
        );
        assert_eq!(
            reader_from_filetype(Path::new("AGB.TIFF")).unwrap(),
            FileType::GeoTiff
        );
        assert_eq!(
            reader_from_filetype(Path::new("biomass.nc")).unwrap(),
            FileType::NetCDF
        );
        assert!(matches!(
            reader_from_filetype(Path::new("biomass.zarr")),
            Err(HarmonizeError::UnsupportedFileType(_))
        ));
        assert!(reader_from_filetype(Path::new("no_extension")).is_err());
    }
}
