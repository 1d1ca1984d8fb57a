// ==============================================================================
// main.rs - Cohort Splitter Entry Point
// ==============================================================================
// Description: Command line entry for VCF extraction and per-individual splitting
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cohort_splitter::cohort::CohortRange;
use cohort_splitter::config::{
    ExtractConfig, QueryBackend, SplitConfig, DEFAULT_CHECKPOINT, DEFAULT_CHUNK_SIZE,
    DEFAULT_OUTPUT_PREFIX, DEFAULT_POPULATION_TABLE, DEFAULT_SAMPLE_COLUMN,
    DEFAULT_SOURCE_TABLE, DEFAULT_VCF_PREFIX, DEFAULT_WORK_DIR,
};
use cohort_splitter::driver::Driver;
use cohort_splitter::extraction::Extractor;
use cohort_splitter::storage::{LocalObjectStore, SharedStore};
use cohort_splitter::variant_query::{BcftoolsQuery, GzipVcfQuery};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Root directory backing the object store
    #[arg(long, env = "COHORT_STORE_ROOT")]
    store_root: PathBuf,

    /// Local directory for staged copies
    #[arg(long, env = "COHORT_WORK_DIR", default_value = DEFAULT_WORK_DIR)]
    work_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the wide genotype table for a cohort from VCF shards
    Extract(ExtractArgs),

    /// Split the wide table into one artifact per individual
    Split(SplitArgs),
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// First individual to include (1-based, inclusive)
    #[arg(long)]
    start: usize,

    /// Last individual to include (1-based, inclusive)
    #[arg(long)]
    end: usize,

    /// Population table in the store
    #[arg(long, default_value = DEFAULT_POPULATION_TABLE)]
    population_table: String,

    /// Column holding sample identifiers
    #[arg(long, default_value = DEFAULT_SAMPLE_COLUMN)]
    sample_column: String,

    /// Local listing of already processed individuals
    #[arg(long, env = "COHORT_EXCLUSION_LIST")]
    exclusion_list: Option<PathBuf>,

    /// Store prefix holding .vcf.gz shards
    #[arg(long, default_value = DEFAULT_VCF_PREFIX)]
    vcf_prefix: String,

    /// Wide table written to the store
    #[arg(long, default_value = DEFAULT_SOURCE_TABLE)]
    output_table: String,

    /// Read shards in-process instead of running bcftools
    #[arg(long)]
    no_bcftools: bool,

    /// bcftools binary
    #[arg(long, env = "BCFTOOLS", default_value = "bcftools")]
    bcftools: PathBuf,
}

#[derive(Args, Debug)]
struct SplitArgs {
    /// Wide table in the store
    #[arg(long, default_value = DEFAULT_SOURCE_TABLE)]
    source_table: String,

    /// Prefix for per-individual artifacts
    #[arg(long, default_value = DEFAULT_OUTPUT_PREFIX)]
    output_prefix: String,

    /// Checkpoint record in the store
    #[arg(long, default_value = DEFAULT_CHECKPOINT)]
    checkpoint: String,

    /// Rows per chunk
    #[arg(long, env = "COHORT_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cohort_splitter=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    info!("Cohort Splitter starting, store root {:?}", cli.store_root);

    let store: SharedStore = Arc::new(LocalObjectStore::new(cli.store_root.clone()));

    match cli.command {
        Command::Extract(args) => run_extract(store, cli.work_dir, args).await,
        Command::Split(args) => run_split(store, cli.work_dir, args).await,
    }
}

async fn run_extract(store: SharedStore, work_dir: PathBuf, args: ExtractArgs) -> Result<()> {
    let backend = if args.no_bcftools {
        QueryBackend::Gzip
    } else {
        QueryBackend::Bcftools {
            binary: args.bcftools,
        }
    };

    let config = ExtractConfig {
        population_table: args.population_table,
        sample_column: args.sample_column,
        exclusion_list: args.exclusion_list,
        vcf_prefix: args.vcf_prefix,
        output_table: args.output_table,
        work_dir,
        range: CohortRange::new(args.start, args.end),
        backend,
    };

    let summary = tokio::task::spawn_blocking(move || match config.backend.clone() {
        QueryBackend::Bcftools { binary } => {
            Extractor::new(store, BcftoolsQuery::new(binary), config).run()
        }
        QueryBackend::Gzip => Extractor::new(store, GzipVcfQuery::new(), config).run(),
    })
    .await
    .context("Extraction task panicked")??;

    info!(
        "Wrote {} records for {} samples",
        summary.records_written,
        summary.samples.len()
    );
    Ok(())
}

async fn run_split(store: SharedStore, work_dir: PathBuf, args: SplitArgs) -> Result<()> {
    let config = SplitConfig {
        source_table: args.source_table,
        output_prefix: args.output_prefix,
        checkpoint: args.checkpoint,
        work_dir,
        chunk_size: args.chunk_size,
    };

    // Ctrl-C ends the run at the next chunk boundary
    let stop = Arc::new(AtomicBool::new(false));
    let signal_flag = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing current chunk");
            signal_flag.store(true, Ordering::SeqCst);
        }
    });

    let driver = Driver::new(config, store).with_stop_flag(stop);
    let summary = tokio::task::spawn_blocking(move || driver.run())
        .await
        .context("Split task panicked")??;

    if summary.interrupted {
        warn!(
            "Run interrupted; checkpoint at {:?} {:?}",
            summary.checkpoint.last_chromosome, summary.checkpoint.last_position
        );
    }
    Ok(())
}
