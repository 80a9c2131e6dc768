//! Structured error types for scopelog
//!
//! Using thiserror for automatic Display implementation and error chaining.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to write event log: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Compression level {0} is out of range (0-9)")]
    InvalidCompressionLevel(u32),

    #[error("Failed to read config file {path}: {error}")]
    ReadFailed { path: String, error: std::io::Error },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = TelemetryError::from(io);
        assert_eq!(err.to_string(), "Failed to write event log: disk full");
    }

    #[test]
    fn test_config_error_display() {
        let err = TelemetryError::from(ConfigError::InvalidCompressionLevel(12));
        assert!(err.to_string().contains("12"));
        assert!(err.to_string().contains("0-9"));
    }
}
