//! Telemetry configuration
//!
//! All fields have defaults, so an empty JSON object is a valid config.
//! Interval fields are in milliseconds; `0` disables the timer.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::ConfigError;
use crate::eventlog::WriterOptions;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Period of the frame clock
    pub frame_interval_ms: u64,
    /// Period of the resource sampler
    pub sample_interval_ms: u64,
    /// DEFLATE level, 0-9
    pub compression_level: u32,
    /// Start the stream with a header record
    pub write_header: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 100,
            sample_interval_ms: 1000,
            compression_level: 6,
            write_header: false,
        }
    }
}

impl TelemetryConfig {
    /// Load and validate a JSON config file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// fails validation.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|error| ConfigError::ReadFailed {
            path: path.display().to_string(),
            error,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns an error if the compression level is above 9.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.compression_level > 9 {
            return Err(ConfigError::InvalidCompressionLevel(self.compression_level));
        }
        Ok(())
    }

    /// Config with both timers off, for driving frames by hand
    #[must_use]
    pub fn manual() -> Self {
        Self { frame_interval_ms: 0, sample_interval_ms: 0, ..Self::default() }
    }

    #[must_use]
    pub fn frame_interval(&self) -> Option<Duration> {
        (self.frame_interval_ms > 0).then(|| Duration::from_millis(self.frame_interval_ms))
    }

    #[must_use]
    pub fn sample_interval(&self) -> Option<Duration> {
        (self.sample_interval_ms > 0).then(|| Duration::from_millis(self.sample_interval_ms))
    }

    #[must_use]
    pub fn writer_options(&self) -> WriterOptions {
        WriterOptions { compression_level: self.compression_level, write_header: self.write_header }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = TelemetryConfig::default();
        assert_eq!(config.frame_interval(), Some(Duration::from_millis(100)));
        assert_eq!(config.sample_interval(), Some(Duration::from_secs(1)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_disables_timers() {
        let config = TelemetryConfig::manual();
        assert_eq!(config.frame_interval(), None);
        assert_eq!(config.sample_interval(), None);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "sample_interval_ms": 250, "write_header": true }}"#).unwrap();

        let config = TelemetryConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.sample_interval_ms, 250);
        assert!(config.write_header);
        assert_eq!(config.frame_interval_ms, 100);
        assert_eq!(config.compression_level, 6);
    }

    #[test]
    fn test_invalid_compression_level_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "compression_level": 12 }}"#).unwrap();

        let err = TelemetryConfig::from_json_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCompressionLevel(12)));
    }

    #[test]
    fn test_missing_file() {
        let err = TelemetryConfig::from_json_file("/nonexistent/scopelog.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/scopelog.json"));
    }
}
