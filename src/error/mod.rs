// Error types for the metronome engine
//
// This module defines custom error types for audio and preset operations,
// providing structured error handling with stable numeric codes.

mod audio;
mod preset;

pub use audio::{log_audio_error, AudioError, AudioErrorCodes};
pub use preset::{log_preset_error, PresetError, PresetErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the engine, the CLI and any embedding UI.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
