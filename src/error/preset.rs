// Preset error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Preset error code constants
///
/// Error code range: 2001-2004
pub struct PresetErrorCodes {}

impl PresetErrorCodes {
    /// No preset with the requested id exists
    pub const NOT_FOUND: i32 = 2001;

    /// Preset name is empty or whitespace only
    pub const INVALID_NAME: i32 = 2002;

    /// Preset collection could not be encoded or decoded
    pub const SERIALIZATION: i32 = 2003;

    /// Reading or writing a preset file failed
    pub const IO: i32 = 2004;
}

/// Log a preset error with structured context
pub fn log_preset_error(err: &PresetError, context: &str) {
    error!(
        "Preset error in {}: code={}, component=PresetStore, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Preset-related errors
///
/// Error code range: 2001-2004
#[derive(Debug, Clone, PartialEq)]
pub enum PresetError {
    /// No preset with this id
    NotFound { id: String },

    /// Name rejected
    InvalidName { name: String },

    /// JSON encode/decode failure
    Serialization { details: String },

    /// Filesystem failure
    Io { details: String },
}

impl ErrorCode for PresetError {
    fn code(&self) -> i32 {
        match self {
            PresetError::NotFound { .. } => PresetErrorCodes::NOT_FOUND,
            PresetError::InvalidName { .. } => PresetErrorCodes::INVALID_NAME,
            PresetError::Serialization { .. } => PresetErrorCodes::SERIALIZATION,
            PresetError::Io { .. } => PresetErrorCodes::IO,
        }
    }

    fn message(&self) -> String {
        match self {
            PresetError::NotFound { id } => format!("Preset '{}' not found", id),
            PresetError::InvalidName { name } => {
                format!("Preset name '{}' is invalid (must not be blank)", name)
            }
            PresetError::Serialization { details } => {
                format!("Preset serialization failed: {}", details)
            }
            PresetError::Io { details } => format!("Preset I/O failed: {}", details),
        }
    }
}

impl fmt::Display for PresetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PresetError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for PresetError {}

impl From<serde_json::Error> for PresetError {
    fn from(err: serde_json::Error) -> Self {
        PresetError::Serialization {
            details: err.to_string(),
        }
    }
}

impl From<std::io::Error> for PresetError {
    fn from(err: std::io::Error) -> Self {
        PresetError::Io {
            details: err.to_string(),
        }
    }
}
