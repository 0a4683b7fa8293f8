use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "canopy")]
#[command(about = "Harmonize above-ground carbon maps into a single best-estimate grid")]
#[command(version)]
pub struct Args {
    /// JSON run configuration
    #[arg(short, long, value_name = "FILE")]
    pub config: PathBuf,

    /// Override the fused density output path
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Override the stage cache directory
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Number of threads (default: all available)
    #[arg(short, long, value_name = "N")]
    pub threads: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arguments() {
        let args = Args::parse_from([
            "canopy",
            "--config",
            "data/config/carbon_config.json",
            "-o",
            "out.tif",
            "--threads",
            "4",
            "-v",
        ]);
        assert_eq!(args.config, PathBuf::from("data/config/carbon_config.json"));
        assert_eq!(args.output, Some(PathBuf::from("out.tif")));
        assert_eq!(args.threads, Some(4));
        assert!(args.verbose);
        assert!(args.cache_dir.is_none());
    }

    #[test]
    fn test_config_is_required() {
        assert!(Args::try_parse_from(["canopy"]).is_err());
    }
}
