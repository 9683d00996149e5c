//! kelpline-synth - kelp linear extent synthesis driver
//!
//! Thin batch driver: loads the run manifest, executes the pipeline once,
//! and reports the outcome. All behavior lives in the library; the binary
//! only wires configuration and logging together.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use kelpline_synth::config::RunManifest;
use kelpline_synth::Pipeline;

#[derive(Parser)]
#[command(name = "kelpline-synth", version, about = "Kelp linear extent synthesis")]
struct Args {
    /// Run manifest (TOML)
    manifest: PathBuf,

    /// Override the manifest's output directory
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Log filter, e.g. "info" or "kelpline_synth=debug"
    #[arg(long, env = "KELPLINE_LOG", default_value = "info")]
    log: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&args.log)?)
        .init();

    info!("Starting kelpline-synth");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Manifest: {}", args.manifest.display());

    let mut manifest = RunManifest::from_path(&args.manifest)?;
    if let Some(output_dir) = args.output_dir {
        manifest.output_dir = output_dir;
    }

    let report = Pipeline::new(manifest).run()?;

    let n_jobs = report.jobs.len();
    let n_failed = report.n_failed_jobs();
    info!(
        "Done: {}/{} jobs completed, {} observations, {} canonical sites",
        n_jobs - n_failed,
        n_jobs,
        report.n_observations,
        report.n_canonical_sites
    );
    if n_failed > 0 {
        info!("{n_failed} jobs failed; see run_report.json for details");
    }

    Ok(())
}
