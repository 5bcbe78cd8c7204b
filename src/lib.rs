//! debt-summary - bounded-memory summaries of debt ledgers
//!
//! Turns an append-only ledger of `debtor,creditor,amount` rows into one
//! `debtor,creditor,total` row per ordered pair, without holding the ledger in
//! memory. Large inputs go through an external merge sort and a
//! boundary-aware batcher that never splits a key across batches; small inputs
//! take a single in-memory pass.

/// Ledger line codec
pub mod record;
/// Streaming reader that skips malformed lines
pub mod reader;
pub mod error;
pub mod config;

/// External merge sort (partition + k-way merge, or system `sort`)
pub mod sort_merge;
pub mod batch;
pub mod aggregate;

/// `run_summary` entry point
pub mod summary;
pub mod verify;
pub mod generate;

pub use config::{SortBackend, Strategy, SummaryOptions};
pub use error::{Phase, Result, SummaryError};
pub use record::{parse, serialize_key, Record, SummaryRecord};
pub use sort_merge::sort_ledger_file;
pub use summary::{run_summary, summarize_reader, RunReport};
pub use verify::verify_sorted;
