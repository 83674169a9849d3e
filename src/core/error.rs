//! Edit-time validation errors.
//!
//! These are raised by the configuration-editing surface (adding, editing,
//! reordering rules and channels) and never by the message pipeline itself.

use std::fmt;

/// Errors that reject a configuration edit before it is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field was left blank.
    EmptyField { field: &'static str },
    /// The regular expression did not compile.
    InvalidPattern { pattern: String, reason: String },
    /// The colour name could not be parsed.
    UnknownColor(String),
    /// Another record already uses this id.
    DuplicateId(String),
    /// No rule exists with this id.
    UnknownRule(String),
    /// No channel exists with this id.
    UnknownChannel(String),
    /// The main channel cannot be removed or demoted.
    MainChannelRemoval,
    /// Only one channel may be the main channel.
    DuplicateMain,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField { field } => write!(f, "{field} must not be empty"),
            ValidationError::InvalidPattern { pattern, reason } => {
                write!(f, "Invalid pattern '{pattern}': {reason}")
            }
            ValidationError::UnknownColor(color) => write!(f, "Unknown color: {color}"),
            ValidationError::DuplicateId(id) => write!(f, "Id '{id}' is already in use"),
            ValidationError::UnknownRule(id) => write!(f, "Rule '{id}' not found"),
            ValidationError::UnknownChannel(id) => write!(f, "Tab '{id}' not found"),
            ValidationError::MainChannelRemoval => write!(f, "The main tab cannot be removed"),
            ValidationError::DuplicateMain => write!(f, "There is already a main tab"),
        }
    }
}

impl std::error::Error for ValidationError {}
