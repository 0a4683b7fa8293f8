pub mod aggregate;
pub mod align;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod fusion;
pub mod pipeline;
pub mod raster;
pub mod readers;
pub mod scale;

pub use aggregate::{density_to_quantity, total};
pub use align::{ResampleMethod, align};
pub use error::{HarmonizeError, Result};
pub use fusion::{PriorityList, Validity, fuse};
pub use pipeline::{HarmonizationOutput, HarmonizationPipeline};
pub use raster::{GridSpec, Raster};
pub use scale::{ScalarCoefficient, scale};
