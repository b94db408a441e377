//! Error types for dataset event handling.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or validating events.
#[derive(Error, Debug)]
pub enum Error {
    /// A required field was absent from the input.
    #[error("missing field '{0}'")]
    MissingField(&'static str),

    /// A field was present but its value is unusable.
    #[error("invalid field '{field}': {reason}")]
    InvalidField {
        /// The wire name of the invalid field.
        field: &'static str,
        /// Description of what's wrong.
        reason: String,
    },
}
