//! Replay helpers for compressed event logs

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::DeflateDecoder;
use scopelog_common::{FormatError, Record, RecordReader};

/// Decoder over a DEFLATE-compressed log stream
pub fn compressed_reader<R: Read>(reader: R) -> RecordReader<DeflateDecoder<R>> {
    RecordReader::new(DeflateDecoder::new(reader))
}

/// Decode every record of an in-memory compressed log.
///
/// # Errors
/// Returns an error if the stream is truncated or malformed.
pub fn decode_compressed(bytes: &[u8]) -> Result<Vec<Record>, FormatError> {
    compressed_reader(bytes).read_all()
}

/// Open a log file and decode every record.
///
/// # Errors
/// Returns an error if the file cannot be opened or the stream is malformed.
pub fn read_log(path: impl AsRef<Path>) -> Result<Vec<Record>, FormatError> {
    let file = File::open(path).map_err(FormatError::Io)?;
    compressed_reader(BufReader::new(file)).read_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventlog::{EventLogWriter, WriterOptions};

    #[test]
    fn test_read_log_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.bin");

        let writer = EventLogWriter::create(&path, WriterOptions::default()).unwrap();
        writer.step_frame(0.25).unwrap();
        writer.close().unwrap();

        let records = read_log(&path).unwrap();
        assert_eq!(records, vec![Record::FrameStep { elapsed: 0.25 }]);
    }

    #[test]
    fn test_missing_file() {
        let result = read_log("/nonexistent/events.bin");
        assert!(matches!(result, Err(FormatError::Io(_))));
    }
}
