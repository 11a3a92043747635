//! Command-line front end for the UPF pseudopotential file indexer.
//!
//! Verifies the archives named in a seed manifest, scans their UPF data
//! files, and writes a content-addressed JSON index. Exit codes: 0 on
//! success, 3 when the built index fails validation, 2 on any other error.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use upf_index_core::{pipeline, IndexError, IndexReport, IndexerConfig};

#[derive(Parser, Debug)]
#[command(name = "upf-index")]
#[command(about = "Build a content-addressed index of UPF pseudopotential archives")]
struct Args {
    /// Seed directory containing the manifest and the archives it names
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Manifest path (defaults to MANIFEST_PSEUDO_SEED.json under the root)
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Output index path (defaults to PSEUDO_FILE_INDEX.json under the root)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory holding external cutoff-hint documents (.djson)
    #[arg(long)]
    sidecar_dir: Option<PathBuf>,

    /// Scratch directory for archive extraction (defaults to a temp dir)
    #[arg(long)]
    scratch_dir: Option<PathBuf>,

    /// Pin the index generation timestamp (RFC 3339) for reproducible reruns
    #[arg(long)]
    timestamp: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", "=".repeat(80));
            eprintln!("INDEXING FAILED");
            eprintln!("{}", "=".repeat(80));
            eprintln!("{:#}", err);
            eprintln!("{}", "=".repeat(80));
            match err.downcast_ref::<IndexError>() {
                Some(e) if e.is_validation() => ExitCode::from(3),
                _ => ExitCode::from(2),
            }
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let root = args
        .root
        .canonicalize()
        .with_context(|| format!("Seed root not accessible: {}", args.root.display()))?;
    info!("Seed root: {}", root.display());

    let mut config = IndexerConfig::new(root);
    if let Some(manifest) = args.manifest {
        config.manifest_path = manifest;
    }
    if let Some(output) = args.output {
        config.output_path = output;
    }
    config.sidecar_dir = args.sidecar_dir;
    config.scratch_dir = args.scratch_dir;
    config.fixed_timestamp = args.timestamp;

    let summary = pipeline::run(&config)?;

    let report = IndexReport::from_index(&summary.index);
    eprintln!("{}", report);
    info!(
        "Indexed {} archive(s): {} unique file(s), {} occurrence(s), {} warning(s)",
        summary.archives_processed,
        summary.unique_files,
        summary.occurrences,
        summary.warnings
    );

    Ok(())
}
