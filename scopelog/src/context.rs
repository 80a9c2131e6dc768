//! # Telemetry Context
//!
//! Wires the scope tracker, resource sampler and frame clock into one
//! [`EventLogWriter`]. The host only opens scopes, logs, and disposes.
//!
//! ```text
//! ┌──────────────┐ push/pop  ┌──────────────────┐
//! │ ScopeTracker │──────────▶│                  │
//! └──────────────┘           │                  │
//! ┌──────────────┐ changes   │  EventLogWriter  │──▶ DEFLATE ──▶ file
//! │   Sampler    │──────────▶│   (one mutex)    │
//! └──────────────┘           │                  │
//! ┌──────────────┐ ticks     │                  │
//! │  FrameClock  │──────────▶│                  │
//! └──────────────┘           └──────────────────┘
//! ```
//!
//! ## Teardown Order
//!
//! 1. Stop the frame timer and the sampler (both join their threads)
//! 2. Write one final `FrameStep` at the stopwatch's elapsed time
//! 3. Close the writer (finishes the compressed stream)
//!
//! Teardown never fails; errors are logged.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, warn};

use crate::config::TelemetryConfig;
use crate::domain::{EntityKey, Frame, LogLevel, Pid, TelemetryError};
use crate::eventlog::{EntityInfo, EventLogWriter};
use crate::frame_clock::FrameClock;
use crate::sampling::{ProcFs, ProcessSource, ResourceChange, ResourceSampler};
use crate::scope::{self, ScopeEventKind, ScopeGuard, ScopeTracker};
use crate::timer::PeriodicTask;

/// Parameter keys written on the root entity by the sampler
pub const CPU_KEY: &str = "CPU (%)";
pub const MEMORY_KEY: &str = "Memory (MB)";
pub const THREADS_KEY: &str = "Threads";
pub const PROCESSES_KEY: &str = "Processes";

/// Entity type and category of scope entities
pub const SCOPE_TYPE: &str = "Scope";
pub const SCOPE_CATEGORY: &str = "scope";

/// First background write failure, reported once
#[derive(Debug, Default)]
struct FailureLatch {
    failed: AtomicBool,
}

impl FailureLatch {
    /// Log `err` if it is the first failure. Returns `Break` so timers stop.
    fn report(&self, source: &str, err: &TelemetryError) -> ControlFlow<()> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            error!("Telemetry disabled after {source} failed: {err}");
        }
        ControlFlow::Break(())
    }

    fn is_set(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }
}

#[allow(clippy::cast_precision_loss)]
fn apply_change<W: Write>(
    writer: &EventLogWriter<W>,
    change: ResourceChange,
) -> Result<(), TelemetryError> {
    match change {
        ResourceChange::CpuPercent(percent) => {
            writer.set_value(EntityKey::ROOT, CPU_KEY, percent).map(drop)
        }
        ResourceChange::MemoryMb(mb) => {
            writer.set_value(EntityKey::ROOT, MEMORY_KEY, mb as f32).map(drop)
        }
        ResourceChange::Threads(count) => {
            writer.set_value(EntityKey::ROOT, THREADS_KEY, count as f32).map(drop)
        }
        ResourceChange::Processes(names) => {
            writer.set_parameter(EntityKey::ROOT, PROCESSES_KEY, &names)
        }
    }
}

/// Scoped execution telemetry for one script run
pub struct TelemetryContext<W: Write + Send + 'static = BufWriter<File>> {
    writer: Arc<EventLogWriter<W>>,
    tracker: Arc<ScopeTracker>,
    clock: FrameClock,
    failure: Arc<FailureLatch>,
    frame_timer: Option<PeriodicTask>,
    sampler: Option<ResourceSampler>,
    disposed: bool,
}

impl TelemetryContext<BufWriter<File>> {
    /// Write telemetry for the current process to `path`.
    ///
    /// # Errors
    /// Returns an error if the config is invalid, the file cannot be created,
    /// or a timer thread cannot be spawned.
    pub fn create(path: impl AsRef<Path>, config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        config.validate()?;
        let writer = EventLogWriter::create(path, config.writer_options())?;
        Self::from_writer(writer, config, Arc::new(ProcFs::new()))
    }
}

impl<W: Write + Send + 'static> TelemetryContext<W> {
    /// Write telemetry to an arbitrary sink, sampling through `source`.
    ///
    /// # Errors
    /// Returns an error if the config is invalid, the header cannot be written,
    /// or a timer thread cannot be spawned.
    pub fn with_sink(
        sink: W,
        config: &TelemetryConfig,
        source: Arc<dyn ProcessSource>,
    ) -> Result<Self, TelemetryError> {
        config.validate()?;
        let writer = EventLogWriter::new(sink, config.writer_options())?;
        Self::from_writer(writer, config, source)
    }

    fn from_writer(
        writer: EventLogWriter<W>,
        config: &TelemetryConfig,
        source: Arc<dyn ProcessSource>,
    ) -> Result<Self, TelemetryError> {
        let writer = Arc::new(writer);
        let clock = FrameClock::start();
        let failure = Arc::new(FailureLatch::default());
        let tracker = Arc::new(ScopeTracker::new());

        {
            let writer = Arc::clone(&writer);
            let failure = Arc::clone(&failure);
            tracker.subscribe(move |event| {
                let result = match event.kind {
                    ScopeEventKind::Pushed => {
                        let info = EntityInfo::named(event.scope.name())
                            .path(event.stack.path())
                            .type_name(SCOPE_TYPE)
                            .category(SCOPE_CATEGORY)
                            .static_param("depth", event.scope.depth().to_string());
                        writer.register_entity(event.scope.key(), info).map(drop)
                    }
                    ScopeEventKind::Popped => writer.unregister_entity(event.scope.key()),
                };
                if let Err(e) = result {
                    let _ = failure.report("scope event", &e);
                }
            });
        }

        let frame_timer = match config.frame_interval() {
            Some(interval) => {
                let writer = Arc::clone(&writer);
                let failure = Arc::clone(&failure);
                Some(PeriodicTask::spawn("scopelog-frames", interval, move || {
                    match clock.tick(&writer) {
                        Ok(_) => ControlFlow::Continue(()),
                        Err(e) => failure.report("frame tick", &e),
                    }
                })?)
            }
            None => None,
        };

        let sampler = match config.sample_interval() {
            Some(interval) => {
                let writer = Arc::clone(&writer);
                let failure = Arc::clone(&failure);
                Some(ResourceSampler::start(interval, source, Pid::current(), move |change| {
                    match apply_change(&writer, change) {
                        Ok(()) => ControlFlow::Continue(()),
                        Err(e) => failure.report("resource sample", &e),
                    }
                })?)
            }
            None => None,
        };

        Ok(Self { writer, tracker, clock, failure, frame_timer, sampler, disposed: false })
    }

    /// Open a scope on the calling task's stack.
    pub fn begin_scope(&self, name: impl Into<String>) -> ScopeGuard {
        self.tracker.begin_scope(name)
    }

    /// Scope names of the calling task, innermost first
    #[must_use]
    pub fn current_stack_names(&self) -> Vec<String> {
        scope::current_names()
    }

    /// Record a log line on the calling task's innermost scope (or the root)
    /// and forward it to the `log` facade.
    ///
    /// # Errors
    /// Returns an error on the first failed write.
    pub fn log(&self, level: LogLevel, message: &str) -> Result<(), TelemetryError> {
        log::log!(level.as_log_level(), "{message}");
        let key = scope::current().top().map_or(EntityKey::ROOT, |scope| scope.key());
        let result = self.writer.log(key, level.as_str(), message, level.color());
        if let Err(e) = &result {
            let _ = self.failure.report("log", e);
        }
        result
    }

    /// Close the current frame now, at the stopwatch's elapsed time.
    ///
    /// # Errors
    /// Returns an error on the first failed write.
    pub fn tick(&self) -> Result<Frame, TelemetryError> {
        self.clock.tick(&self.writer)
    }

    #[must_use]
    pub fn writer(&self) -> &Arc<EventLogWriter<W>> {
        &self.writer
    }

    #[must_use]
    pub fn tracker(&self) -> &Arc<ScopeTracker> {
        &self.tracker
    }

    /// Whether a background write has failed and telemetry stopped
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.failure.is_set()
    }

    /// Stop timers, write the closing frame and close the log.
    ///
    /// Returns the underlying sink when the stream was closed by this call.
    pub fn dispose(mut self) -> Option<W> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Option<W> {
        if self.disposed {
            return None;
        }
        self.disposed = true;

        if let Some(mut timer) = self.frame_timer.take() {
            timer.stop();
        }
        if let Some(mut sampler) = self.sampler.take() {
            sampler.stop();
        }

        if let Err(e) = self.clock.tick(&self.writer) {
            warn!("Failed to write final frame: {e}");
        }
        match self.writer.close() {
            Ok(sink) => sink,
            Err(e) => {
                warn!("Failed to close event log: {e}");
                None
            }
        }
    }
}

impl<W: Write + Send + 'static> Drop for TelemetryContext<W> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::ProcFs;

    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "no space left"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_latches() {
        let config = TelemetryConfig { compression_level: 0, ..TelemetryConfig::manual() };
        let telemetry = TelemetryContext::with_sink(FullDisk, &config, Arc::new(ProcFs::new())).unwrap();
        let big = "x".repeat(1 << 20);

        let mut failures = 0;
        for _ in 0..4 {
            if telemetry.log(LogLevel::Trace, &big).is_err() {
                failures += 1;
            }
        }
        assert_eq!(failures, 1);
        assert!(telemetry.is_failed());
        // teardown only warns
        assert!(telemetry.dispose().is_none());
    }

    #[test]
    fn test_scope_entities_follow_stack() {
        let telemetry =
            TelemetryContext::with_sink(Vec::new(), &TelemetryConfig::manual(), Arc::new(ProcFs::new()))
                .unwrap();
        let outer = telemetry.begin_scope("outer");
        let inner = telemetry.begin_scope("inner");

        let entity = telemetry.writer().entity(inner.scope().key()).unwrap();
        assert_eq!(entity.path, "outer/inner");
        assert_eq!(entity.category, SCOPE_CATEGORY);
        assert_eq!(telemetry.current_stack_names(), vec!["inner", "outer"]);

        inner.end();
        assert!(telemetry.writer().entity(outer.scope().key()).is_some());
        let key = outer.scope().key();
        outer.end();
        assert!(telemetry.writer().entity(key).is_none());
        assert!(!telemetry.is_failed());
    }
}
