//! Error taxonomy shared by the explode and implode pipelines.
//!
//! Every variant aborts the whole run.  Nothing is recovered mid-run and no
//! partially written output is cleaned up; callers must treat the output
//! directory of a failed run as untrustworthy.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SplitError {
    #[error("Could not parse container header: {0}")]
    HeaderParse(String),

    #[error("Decompression failed ({codec}): {reason}")]
    Decompression { codec: &'static str, reason: String },

    #[error("Truncated record at offset {offset}: need {needed} bytes, {available} available")]
    TruncatedRecord { offset: usize, needed: usize, available: usize },

    #[error("No schema table (DNA1) record found")]
    MissingSchemaTable,

    #[error("Malformed schema table: {0}")]
    SchemaTable(String),

    #[error("Schema reconciliation failed for struct {schema_index}: {reason}")]
    SchemaReconciliation { schema_index: i32, reason: String },

    #[error("Failed to write {}: {source}", path.display())]
    OutputWrite { path: PathBuf, source: io::Error },

    #[error("Failed to read {}: {source}", path.display())]
    InputRead { path: PathBuf, source: io::Error },

    #[error("Invalid manifest: {0}")]
    ManifestFormat(String),
}

pub type Result<T> = std::result::Result<T, SplitError>;

impl SplitError {
    pub(crate) fn output(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| SplitError::OutputWrite { path, source }
    }

    pub(crate) fn input(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| SplitError::InputRead { path, source }
    }
}

impl From<serde_json::Error> for SplitError {
    fn from(e: serde_json::Error) -> Self {
        SplitError::ManifestFormat(e.to_string())
    }
}
