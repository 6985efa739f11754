/*!
 * Error types for tcptee
 */

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RelayError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FATAL: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Failed to bind the listening socket
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Configuration error (missing or invalid settings)
    #[error("configuration error: {0}")]
    Config(String),

    /// Zero-copy transport requested on a platform without splice/tee
    #[error("zero-copy transport requires kernel splice/tee support, which is not available on this platform")]
    ZeroCopyUnsupported,

    /// I/O error with operation context
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl RelayError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            RelayError::Config(_) | RelayError::ZeroCopyUnsupported => EXIT_CONFIG,
            RelayError::Bind { .. } | RelayError::Io { .. } => EXIT_FATAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RelayError::Bind {
            addr: "127.0.0.1:7000".to_string(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "address in use"),
        };
        let msg = err.to_string();
        assert!(msg.contains("failed to bind"));
        assert!(msg.contains("127.0.0.1:7000"));

        let err = RelayError::Config("listen address is required".to_string());
        assert!(err.to_string().contains("listen address is required"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(RelayError::Config(String::new()).exit_code(), EXIT_CONFIG);
        assert_eq!(RelayError::ZeroCopyUnsupported.exit_code(), EXIT_CONFIG);
        assert_eq!(
            RelayError::Bind {
                addr: String::new(),
                source: io::Error::new(io::ErrorKind::Other, "x"),
            }
            .exit_code(),
            EXIT_FATAL
        );
    }
}
