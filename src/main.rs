use canopy::cli::Args;
use canopy::config::Config;
use canopy::error::Result;
use canopy::pipeline::HarmonizationRunner;
use clap::Parser;
use env_logger::Env;
use log::{info, warn};

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    info!("Starting carbon map harmonization...");

    if let Some(n_threads) = args.threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build_global()
        {
            warn!("Could not configure {} threads: {}", n_threads, e);
        } else {
            info!("Using {} threads", n_threads);
        }
    }

    let mut config = Config::from_file(&args.config)?;
    if let Some(output) = args.output {
        config = config.with_output_path(output);
    }
    if let Some(cache_dir) = args.cache_dir {
        config = config.with_cache_directory(cache_dir);
    }

    let runner = HarmonizationRunner::new(config);
    let report = runner.process()?;

    for line in report.to_string().lines() {
        info!("{}", line);
    }
    for warning in &report.warnings {
        warn!("{}", warning);
    }

    Ok(())
}
