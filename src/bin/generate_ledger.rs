//! Generate a synthetic debt ledger
//!
//! Usage: generate_ledger --rows 1000000 --output ledger.csv [--names 500] [--seed 42]

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;

use debt_summary::generate::{generate_ledger, GeneratorOptions};

#[derive(Parser)]
#[command(name = "generate_ledger")]
#[command(about = "Write random debtor,creditor,amount rows")]
struct Args {
    /// Number of rows to write
    #[arg(short, long, default_value_t = 1_000_000)]
    rows: u64,

    #[arg(short, long)]
    output: PathBuf,

    /// Draw names from a pool of this size so keys repeat
    #[arg(long)]
    names: Option<usize>,

    /// RNG seed for reproducible ledgers
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let start = Instant::now();

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    println!("Generating {} rows into {}...", args.rows, args.output.display());

    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    let mut writer = BufWriter::with_capacity(1024 * 1024, file);
    let options = GeneratorOptions {
        rows: args.rows,
        name_pool: args.names,
    };
    generate_ledger(&mut writer, &options, &mut rng)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    writer.flush().context("Failed to flush ledger")?;

    println!("✅ Done in {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}
