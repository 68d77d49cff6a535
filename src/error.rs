//! Error types for the synchronous connection operations.
//!
//! Upload failures travel through a different channel, the
//! [`UploadCallback`](crate::UploadCallback), and use
//! [`UploadError`](crate::UploadError).

/// Result type alias for connection and transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by [`Connection`](crate::Connection) and the
/// [`Transport`](crate::Transport) implementations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The operation needs an open connection.
    #[error("connection is not open")]
    NotOpen,

    /// No enabled transport could be probed successfully.
    #[error("no transport could be opened")]
    NoTransport,

    /// No serial port matched the requested endpoint.
    #[error("serial port not found: {0}")]
    PortNotFound(String),

    /// Error raised by the serial port layer.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(Error::NotOpen.to_string(), "connection is not open");
        assert_eq!(
            Error::PortNotFound("rfcomm0".into()).to_string(),
            "serial port not found: rfcomm0"
        );
    }

    #[test]
    fn from_io() {
        let error: Error = std::io::Error::new(std::io::ErrorKind::Other, "boom").into();
        assert!(matches!(error, Error::Io(_)));
    }
}
