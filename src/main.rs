//! panorama360 CLI : stitch photos into a 360° equirectangular JPEG.

use clap::{Parser, Subcommand};
use panorama360::{init_thread_pool, run_job, JobConfig};
use std::path::PathBuf;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "panorama360")]
#[command(about = "Stitch overlapping photos into a 360° equirectangular panorama")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stitch the input photos into one panorama.
    Stitch {
        /// Output JPEG path.
        #[arg(long)]
        out: PathBuf,

        /// Job configuration (JSON); missing fields keep their defaults.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Keep the input files after a successful stitch.
        #[arg(long)]
        keep_inputs: bool,

        /// Do not embed GPano metadata.
        #[arg(long)]
        no_metadata: bool,

        /// Worker threads (defaults to PANO_CPU_THREADS, then all cores).
        #[arg(long)]
        threads: Option<usize>,

        /// Input photos (png/jpg/jpeg).
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Embed GPano metadata into an existing equirectangular JPEG.
    InjectMetadata {
        /// JPEG to rewrite in place.
        jpeg: PathBuf,
    },
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Stitch {
            out,
            config,
            keep_inputs,
            no_metadata,
            threads,
            inputs,
        } => run_stitch(out, config, keep_inputs, no_metadata, threads, inputs),
        Commands::InjectMetadata { jpeg } => run_inject(jpeg),
    }
}

fn run_stitch(
    out: PathBuf,
    config: Option<PathBuf>,
    keep_inputs: bool,
    no_metadata: bool,
    threads: Option<usize>,
    inputs: Vec<PathBuf>,
) -> CliResult<()> {
    init_thread_pool(threads).map_err(|e| -> CliError { format!("thread pool: {e}").into() })?;
    tracing::info!("Using {} worker threads", cv_core::current_cpu_threads());

    let mut job = match config {
        Some(path) => JobConfig::from_json_file(&path)?,
        None => JobConfig::default(),
    };
    if keep_inputs {
        job = job.with_remove_inputs(false);
    }
    if no_metadata {
        job = job.with_inject_metadata(false);
    }

    let (accepted, skipped): (Vec<PathBuf>, Vec<PathBuf>) =
        inputs.into_iter().partition(|p| cv_io::is_supported_image(p));
    for path in &skipped {
        tracing::warn!("Skipping unsupported file: {}", path.display());
    }

    let report = run_job(&accepted, &out, &job)?;
    tracing::info!(
        "Wrote {} ({}x{}){}",
        report.output.display(),
        report.width,
        report.height,
        if report.used_fallback { " using the fallback stitcher" } else { "" }
    );
    println!("{}", report.output.display());
    Ok(())
}

fn run_inject(jpeg: PathBuf) -> CliResult<()> {
    let img = image::open(&jpeg).map_err(|e| -> CliError {
        format!("Failed to open image {}: {}", jpeg.display(), e).into()
    })?;
    match cv_io::inject_gpano_metadata(&jpeg, img.width(), img.height())? {
        Some(offset) => {
            tracing::info!("Metadata injected at offset {}", offset);
            Ok(())
        }
        None => Err(format!("{} is not a JPEG file", jpeg.display()).into()),
    }
}
