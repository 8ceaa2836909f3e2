//! Error types for the rating engine.

use std::path::PathBuf;
use thiserror::Error;

/// Everything that can stop a rating run.
///
/// Input and parameter errors are fatal for the dataset. Numeric failures are
/// raised per work unit; the stage that owns the unit decides whether to
/// recover (drop the unit) or escalate to [`EloError::AllUnitsFailed`].
#[derive(Debug, Error)]
pub enum EloError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed row at line {line}: {reason}")]
    MalformedRow { line: usize, reason: String },

    /// A row whose winner and loser are the same individual.
    #[error("self-interaction at line {line}: \"{id}\" cannot win against itself")]
    SelfInteraction { line: usize, id: String },

    #[error("dataset contains no interactions")]
    EmptyDataset,

    /// An interaction points at an individual index the dataset never loaded.
    #[error("interaction {sequence_index} references unknown individual index {index}")]
    UnknownIndividual { sequence_index: usize, index: usize },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("numeric overflow: {0}")]
    NumericOverflow(String),

    /// Every independent unit of a parallel stage failed.
    #[error("all {failed} work units failed in stage {stage}")]
    AllUnitsFailed { stage: &'static str, failed: usize },
}

pub type Result<T> = std::result::Result<T, EloError>;

impl EloError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        EloError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
