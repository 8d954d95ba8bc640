//! Error types for submit description construction.

/// Errors raised while assembling a submit description.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    /// A required builder field was never set.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A numeric resource request was zero.
    #[error("{field} must be positive")]
    NotPositive { field: &'static str },

    /// An input file path is empty or contains a comma, which would corrupt
    /// the comma-joined transfer list.
    #[error("invalid transfer input path: {0:?}")]
    InvalidInputPath(String),

    /// A directive value spans more than one line.
    #[error("value for {key} must be a single line")]
    MultilineValue { key: &'static str },
}
