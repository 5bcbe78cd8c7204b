//! debt-summary CLI
//!
//! Usage:
//!   debt-summary summarize -i ledger.csv -o summary.csv
//!   debt-summary sort      -i ledger.csv -o sorted.csv
//!   debt-summary verify    -i sorted.csv
//!
//! Sizes and the temp dir can also come from `LEDGER_*` environment variables
//! or a `.env` file.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::builder::TypedValueParser;
use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use debt_summary::config::{DEFAULT_CHUNK_SIZE, DEFAULT_IN_MEMORY_THRESHOLD, DEFAULT_MAX_BATCH_BYTES};
use debt_summary::{
    run_summary, sort_ledger_file, verify_sorted, SortBackend, Strategy, SummaryOptions,
};

#[derive(Parser)]
#[command(name = "debt-summary")]
#[command(about = "Generates a summary of monetary debt data")]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sum amounts per (debtor, creditor) pair
    Summarize {
        /// Full path to the input ledger
        #[arg(short, long)]
        input: PathBuf,
        /// Full path to the output summary
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        tuning: Tuning,
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// External-sort a ledger into canonical lines ordered by key
    Sort {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        tuning: Tuning,
    },
    /// Check that a sorted ledger is in key order
    Verify {
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[derive(Args)]
struct Tuning {
    /// Records per sorted spill chunk
    #[arg(long, env = "LEDGER_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE,
          value_parser = clap::value_parser!(u64).range(1..).map(|v| v as usize))]
    chunk_size: usize,
    /// Soft byte bound per aggregation batch
    #[arg(long, env = "LEDGER_MAX_BATCH_BYTES", default_value_t = DEFAULT_MAX_BATCH_BYTES,
          value_parser = clap::value_parser!(u64).range(1..).map(|v| v as usize))]
    max_batch_bytes: usize,
    /// Directory for spill files (default: system temp dir)
    #[arg(long, env = "LEDGER_TEMP_DIR")]
    temp_dir: Option<PathBuf>,
    #[arg(long, env = "LEDGER_STRATEGY", value_enum, default_value_t = Strategy::Auto)]
    strategy: Strategy,
    /// Inputs up to this many bytes are summarized in memory under `auto`
    #[arg(long, env = "LEDGER_IN_MEMORY_THRESHOLD", default_value_t = DEFAULT_IN_MEMORY_THRESHOLD)]
    in_memory_threshold: u64,
    #[arg(long, env = "LEDGER_SORT_BACKEND", value_enum, default_value_t = SortBackend::InProcess)]
    sort_backend: SortBackend,
}

impl Tuning {
    fn into_options(self) -> SummaryOptions {
        let defaults = SummaryOptions::default();
        SummaryOptions {
            chunk_size: self.chunk_size,
            max_batch_bytes: self.max_batch_bytes,
            temp_dir: self.temp_dir.unwrap_or(defaults.temp_dir),
            strategy: self.strategy,
            in_memory_threshold: self.in_memory_threshold,
            sort_backend: self.sort_backend,
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    // Optional .env with LEDGER_* settings; must be loaded before clap reads env
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    debug!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // SummaryError messages already lead with the failed phase
            eprintln!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    let start = Instant::now();

    match command {
        Commands::Summarize {
            input,
            output,
            tuning,
            json,
        } => {
            let options = tuning.into_options();
            if !json {
                println!("\n{}", "═".repeat(60));
                println!("DEBT SUMMARY");
                println!("{}", "═".repeat(60));
                println!("  Input: {}", input.display());
                println!("  Output: {}", output.display());
                println!("  Temp dir: {}", options.temp_dir.display());
            }

            let report = run_summary(&input, &output, &options)?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to serialize run report")?
                );
            } else {
                println!("{}", "─".repeat(60));
                println!("  ✅ Summary complete!");
                println!("  Strategy: {:?}", report.strategy);
                println!("  Lines read: {}", report.read.lines);
                println!("  Records: {}", report.read.records);
                if report.read.malformed > 0 {
                    println!("  ⚠️  Malformed lines skipped: {}", report.read.malformed);
                }
                if report.spill_chunks > 0 {
                    println!("  Spill chunks: {}", report.spill_chunks);
                }
                if report.batches > 0 {
                    println!(
                        "  Batches: {} ({} over the byte bound)",
                        report.batches, report.oversized_batches
                    );
                }
                println!("  Summary rows: {}", report.summary_rows);
                println!("  Time: {:.2}s", start.elapsed().as_secs_f64());
            }
        }
        Commands::Sort {
            input,
            output,
            tuning,
        } => {
            let options = tuning.into_options();
            println!("\n{}", "═".repeat(60));
            println!("SORT LEDGER BY KEY");
            println!("{}", "═".repeat(60));
            println!("  Input: {}", input.display());
            println!("  Output: {}", output.display());

            let report = sort_ledger_file(&input, &output, &options)
                .with_context(|| format!("Failed to sort {}", input.display()))?;

            println!("{}", "─".repeat(60));
            println!("  ✅ Sort complete!");
            println!("  Records: {} ({} malformed skipped)", report.read.records, report.read.malformed);
            println!("  Spill chunks: {}", report.spill_chunks);
            println!("  Lines written: {}", report.lines_written);
            println!("  Time: {:.2}s", start.elapsed().as_secs_f64());
        }
        Commands::Verify { input } => {
            println!("Checking key order of {}...", input.display());
            let report = verify_sorted(&input)?;
            match report.first_unsorted {
                None => println!(
                    "\n✅ Sorted ({} lines, {} distinct keys)",
                    report.lines, report.runs
                ),
                Some(line) => {
                    println!("\n❌ NOT sorted: line {} sorts before its predecessor", line);
                    anyhow::bail!("{} is not sorted by key", input.display());
                }
            }
        }
    }

    Ok(())
}
