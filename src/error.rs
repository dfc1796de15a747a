//! # Error Taxonomy
//!
//! Typed failure conditions for the linkage pipeline. Configuration problems
//! abort a run before any dataset is processed; the per-dataset conditions
//! fail only the dataset that raised them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkageError {
    /// Bad schema, mismatched column lengths, or out-of-range tuning values.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// An unknown blocking method name was supplied.
    #[error("invalid pair method: {0}")]
    InvalidPairMethod(String),

    /// No common non-identifier column exists to block on.
    #[error("no common non-identifier column is available as an indexing key")]
    NoIndexingKey,

    /// The compared tables share no column.
    #[error("tables share no column to compare")]
    NoCommonColumn,

    /// A supplied candidate set is missing the expected foreign-key columns.
    #[error(
        "candidate set must carry `{expected_left}` and `{expected_right}` \
         foreign-key columns, found: {found:?}"
    )]
    MalformedCandidateSet {
        expected_left: &'static str,
        expected_right: &'static str,
        found: Vec<String>,
    },

    /// The training matrix cannot support fitting a binary classifier.
    #[error("insufficient training data: {0}")]
    InsufficientTrainingData(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
