// Error types shared across the crate.
//
// Argument and I/O problems surface as process-level failures with a
// human-readable message; invariant violations abort the whole job and
// name the offending query.

use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, AlignError>;

#[derive(Debug)]
pub enum AlignError {
    /// Unknown mode, missing flag, unreadable file, out-of-range parameter
    InvalidArgument(String),

    /// Cycle, empty label, bad adjacency offsets, out-of-range vertex id
    MalformedGraph(String),

    /// Unparsable FASTA/FASTQ record
    MalformedQuery(String),

    /// Cross-check failure between alignment phases; fatal for the job
    Invariant { query: usize, details: String },

    /// Underlying I/O error
    Io(io::Error),
}

impl fmt::Display for AlignError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlignError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            AlignError::MalformedGraph(msg) => write!(f, "Malformed graph: {}", msg),
            AlignError::MalformedQuery(msg) => write!(f, "Malformed query: {}", msg),
            AlignError::Invariant { query, details } => {
                write!(f, "Internal invariant violated for query #{}: {}", query, details)
            }
            AlignError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for AlignError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AlignError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for AlignError {
    fn from(err: io::Error) -> Self {
        AlignError::Io(err)
    }
}
