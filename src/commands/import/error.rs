use thiserror::Error;

/// Failures that abort an import before any store write happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("missing required columns: {}", .columns.join(", "))]
    MissingColumns { columns: Vec<String> },
}
