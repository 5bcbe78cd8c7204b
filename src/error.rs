//! Error types for the summary pipeline
//!
//! Malformed ledger lines are not errors: they are reported and skipped by the
//! codec. Everything here is fatal to the current run.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Pipeline stage an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Validating run options
    Config,
    /// Reading the raw ledger
    Read,
    /// Writing sorted spill chunks
    Partition,
    /// K-way merge over spill chunks
    Merge,
    /// Batching and run-length aggregation
    Aggregate,
    /// Writing or finalizing the output file
    Output,
    /// Running the system `sort` backend
    SortCommand,
    /// Checking a sorted file
    Verify,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Config => "config",
            Phase::Read => "read",
            Phase::Partition => "partition",
            Phase::Merge => "merge",
            Phase::Aggregate => "aggregate",
            Phase::Output => "output",
            Phase::SortCommand => "sort-command",
            Phase::Verify => "verify",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("{phase} phase: I/O error on {}: {source}", path.display())]
    Io {
        phase: Phase,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("config phase: invalid options: {0}")]
    InvalidOptions(String),

    #[error("aggregate phase: total for {key} overflowed")]
    Overflow { key: String },

    #[error("{phase} phase: not a canonical ledger line: {line:?}")]
    CorruptLine { phase: Phase, line: String },

    #[error("sort-command phase: {0}")]
    SortCommand(String),
}

impl SummaryError {
    /// Phase that failed, for exit reporting
    pub fn phase(&self) -> Phase {
        match self {
            SummaryError::Io { phase, .. } => *phase,
            SummaryError::InvalidOptions(_) => Phase::Config,
            SummaryError::Overflow { .. } => Phase::Aggregate,
            SummaryError::CorruptLine { phase, .. } => *phase,
            SummaryError::SortCommand(_) => Phase::SortCommand,
        }
    }
}

/// `map_err` adapter attaching phase and file to an `io::Error`
pub(crate) fn io_err(phase: Phase, path: &Path) -> impl FnOnce(io::Error) -> SummaryError + '_ {
    move |source| SummaryError::Io {
        phase,
        path: path.to_path_buf(),
        source,
    }
}

pub type Result<T, E = SummaryError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_names_phase_and_file() {
        let err = io_err(Phase::Merge, Path::new("/tmp/chunk_3.run"))(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "truncated",
        ));
        let msg = err.to_string();
        assert!(msg.starts_with("merge phase"), "{}", msg);
        assert!(msg.contains("chunk_3.run"), "{}", msg);
        assert_eq!(err.phase(), Phase::Merge);
    }

    #[test]
    fn test_invalid_options_are_a_config_error() {
        let err = SummaryError::InvalidOptions("chunk_size must be positive".into());
        assert_eq!(err.phase(), Phase::Config);
        assert_eq!(err.to_string(), "config phase: invalid options: chunk_size must be positive");
    }

    #[test]
    fn test_every_message_leads_with_its_phase() {
        let errors = [
            io_err(Phase::Output, Path::new("out.csv"))(io::Error::new(io::ErrorKind::Other, "full")),
            SummaryError::InvalidOptions("x".into()),
            SummaryError::Overflow { key: "a,b".into() },
            SummaryError::CorruptLine {
                phase: Phase::Aggregate,
                line: "x".into(),
            },
            SummaryError::SortCommand("exit 2".into()),
        ];
        for err in errors {
            let prefix = format!("{} phase: ", err.phase());
            assert!(err.to_string().starts_with(&prefix), "{}", err);
        }
    }
}
