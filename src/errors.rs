//! Error handling module following Rust best practices
//!
//! Uses `thiserror` for library errors with detailed error types
//! that consumers can match on and handle appropriately.

use std::io;
use thiserror::Error;

/// Custom error type for supervisor operations
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// IO operation failed
    #[error("IO operation failed: {0}")]
    Io(#[from] io::Error),

    /// Failed to spawn the replay process
    #[error("Failed to spawn replay process: {reason}")]
    Spawn { reason: String },

    /// Permission denied
    #[error("Permission denied: {context}")]
    PermissionDenied { context: String },

    /// Unexpected failure on the child's output/input stream
    #[error("Stream error: {0}")]
    Stream(String),

    /// Signal could not be delivered
    #[error("Signal delivery error: {0}")]
    Signal(String),

    /// A bounded wait expired
    #[error("Operation timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// The child is no longer known to the kernel (already reaped)
    #[error("Process {pid} already reaped or unknown")]
    ProcessGone { pid: i32 },

    /// System call failed
    #[cfg(unix)]
    #[error("System call failed: {0}")]
    Sys(#[from] nix::Error),
}

/// Result type alias for supervisor operations
pub type SupervisorResult<T> = Result<T, SupervisorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: SupervisorError = io_error.into();
        assert!(matches!(err, SupervisorError::Io(_)));
    }

    #[test]
    fn test_error_display() {
        let err = SupervisorError::Spawn {
            reason: "no such executable".into(),
        };
        assert!(err.to_string().contains("no such executable"));

        let err = SupervisorError::Timeout { seconds: 5 };
        assert!(err.to_string().contains("5 seconds"));
    }
}
