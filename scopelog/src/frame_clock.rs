//! Frame boundaries driven by a monotonic stopwatch
//!
//! The clock starts when the telemetry context is constructed. Each tick
//! writes a `FrameStep` carrying the seconds elapsed since then.

use std::io::Write;
use std::time::{Duration, Instant};

use crate::domain::{Frame, TelemetryError};
use crate::eventlog::EventLogWriter;

#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    started: Instant,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::start()
    }
}

impl FrameClock {
    #[must_use]
    pub fn start() -> Self {
        Self { started: Instant::now() }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    #[must_use]
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed().as_secs_f32()
    }

    /// Close the current frame on `writer` at the clock's elapsed time.
    ///
    /// # Errors
    /// Returns an error if the `FrameStep` record cannot be written.
    pub fn tick<W: Write>(&self, writer: &EventLogWriter<W>) -> Result<Frame, TelemetryError> {
        writer.step_frame(self.elapsed_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventlog::{decode_compressed, WriterOptions};
    use scopelog_common::Record;

    #[test]
    fn test_ticks_are_monotonic() {
        let writer = EventLogWriter::new(Vec::new(), WriterOptions::default()).unwrap();
        let clock = FrameClock::start();

        let first = clock.tick(&writer).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let second = clock.tick(&writer).unwrap();
        assert!(second > first);

        let bytes = writer.close().unwrap().unwrap();
        let elapsed: Vec<f32> = decode_compressed(&bytes)
            .unwrap()
            .into_iter()
            .filter_map(|r| match r {
                Record::FrameStep { elapsed } => Some(elapsed),
                _ => None,
            })
            .collect();
        assert_eq!(elapsed.len(), 2);
        assert!(elapsed[1] > elapsed[0]);
    }
}
