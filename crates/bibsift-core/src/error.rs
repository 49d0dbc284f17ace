//! Error types for bibsift-core

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias for bibsift operations
pub type Result<T> = std::result::Result<T, SiftError>;

/// Fatal errors. Any of these aborts the run before output is written.
///
/// Citations that cannot be resolved are not errors; they are collected as
/// [`UnresolvedCitation`](crate::UnresolvedCitation) values in the report.
#[derive(Error, Debug)]
pub enum SiftError {
    /// A document includes a file that is still being processed
    #[error("Include cycle: {}", display_chain(.chain))]
    CyclicInclude { chain: Vec<PathBuf> },

    /// The output file exists and overwriting was not requested
    #[error("Output file {} already exists", .0.display())]
    OutputExists(PathBuf),

    /// The tokenizer could not structure an entry of a database
    #[error("Malformed entry in {} at line {line}: {message}", .path.display())]
    MalformedEntry {
        path: PathBuf,
        line: u32,
        message: String,
    },

    /// A document, database, config or output file could not be accessed
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SiftError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        SiftError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn display_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl From<toml::de::Error> for SiftError {
    fn from(err: toml::de::Error) -> Self {
        SiftError::Config(err.to_string())
    }
}
