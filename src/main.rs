use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use regsim::aggregate;
use regsim::output::{
    build_manifest, create_timestamped_output_dir, write_failures_csv, write_manifest_json,
    write_records_csv, write_summary_csv,
};
use regsim::replicate;
use regsim::spec::ReplicationSpec;

#[derive(Debug, Parser)]
#[command(name = "regsim")]
#[command(about = "Monte-Carlo simulation and power analysis for regression models")]
struct Cli {
    /// Replication spec, TOML or JSON.
    #[arg(long)]
    config: PathBuf,

    #[arg(long, default_value = "output-regsim")]
    outdir: PathBuf,

    /// Override the run seed from the spec.
    #[arg(long)]
    seed: Option<u64>,

    /// Override the worker-pool size from the spec.
    #[arg(long)]
    workers: Option<usize>,

    /// Also write the raw coefficient-record table.
    #[arg(long, default_value_t = false)]
    keep_records: bool,
}

fn main() {
    if let Err(error) = run() {
        eprintln!("regsim failed: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut spec = ReplicationSpec::from_file(&cli.config)
        .with_context(|| format!("failed to load spec from {}", cli.config.display()))?;
    if let Some(seed) = cli.seed {
        spec.seed = seed;
    }
    if let Some(workers) = cli.workers {
        spec.workers = workers;
    }
    if cli.keep_records {
        spec.keep_records = true;
    }

    let run_dir = create_timestamped_output_dir(&cli.outdir)?;
    println!("Output directory: {}", run_dir.display());

    let result = replicate::run(&spec)?;
    let rows = aggregate::summarize(&spec, &result)?;

    write_summary_csv(&run_dir.join("summary.csv"), &rows)?;
    write_failures_csv(&run_dir.join("failures.csv"), &result)?;
    if spec.keep_records {
        write_records_csv(&run_dir.join("records.csv"), &result.records)?;
    }
    let manifest = build_manifest(&spec, &result);
    write_manifest_json(&run_dir.join("manifest.json"), &manifest)?;

    println!(
        "Combinations: {}  replications per combination: {}",
        result.combos.len(),
        spec.replications
    );
    println!(
        "Records: {}  failed: {}  skipped: {}",
        result.records.len(),
        result.failures.len(),
        result.skipped()
    );
    for combo in &manifest.combos {
        if combo.n_failed > 0 || combo.n_skipped > 0 {
            println!(
                "  combination {}: {} failed, {} skipped",
                combo.index, combo.n_failed, combo.n_skipped
            );
        }
    }
    println!("Summary rows written: {}", rows.len());

    Ok(())
}
