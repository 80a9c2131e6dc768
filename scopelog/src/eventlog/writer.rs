//! # Binary Event Log Writer
//!
//! Appends frame-stamped records to a DEFLATE-compressed sink.
//!
//! ## Record Flow
//!
//! ```text
//! scope push ──▶ register_entity ──▶ EntityDef
//! log line   ──▶ log             ──▶ [EntityDef if unknown] EntityLog
//! sampler    ──▶ set_value       ──▶ [EntityDef if unknown] EntityValue (if changed)
//! frame tick ──▶ step_frame      ──▶ FrameStep, frame += 1
//! scope pop  ──▶ unregister      ──▶ EntityUndef
//! ```
//!
//! ## Locking
//!
//! Records arrive from the host task graph, the frame clock thread and the
//! sampler thread. One mutex guards the sink, the frame counter and the entity
//! registry; a record is encoded into a scratch buffer and written with a
//! single `write_all` while the lock is held.
//!
//! ## Failure Policy
//!
//! The first failed write is returned to the caller and marks the writer
//! broken. Later calls on a broken or closed writer are no-ops.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use flate2::write::DeflateEncoder;
use flate2::Compression;
use log::{debug, info};
use scopelog_common::{LogColor, RecordBuffer, RecordKind, Transform, FORMAT_VERSION, HEADER_MAGIC};

use super::registry::{Entity, EntityInfo, EntityRegistry};
use crate::domain::{EntityId, EntityKey, Frame, TelemetryError};

/// Options controlling how the stream is written
#[derive(Debug, Clone, Copy)]
pub struct WriterOptions {
    /// DEFLATE level, 0-9
    pub compression_level: u32,
    /// Emit the `0xFF` header record first
    pub write_header: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self { compression_level: 6, write_header: false }
    }
}

/// Per-kind record counts, logged when the writer closes
#[derive(Debug, Default, Clone, Copy)]
pub struct WriterStats {
    pub records: usize,
    pub frames: usize,
    pub suppressed_values: usize,
}

struct WriterState<W: Write> {
    sink: Option<DeflateEncoder<W>>,
    broken: bool,
    frame: Frame,
    registry: EntityRegistry,
    buf: RecordBuffer,
    stats: WriterStats,
}

impl<W: Write> WriterState<W> {
    /// Write the encoded record in `buf` to the sink.
    fn emit(&mut self) -> Result<(), TelemetryError> {
        if self.broken {
            debug!("Dropping record: event log writer is broken");
            return Ok(());
        }
        let Some(sink) = self.sink.as_mut() else {
            debug!("Dropping record: event log writer is closed");
            return Ok(());
        };
        if let Err(e) = sink.write_all(self.buf.as_ref()) {
            self.broken = true;
            return Err(TelemetryError::Io(e));
        }
        self.stats.records += 1;
        Ok(())
    }

    fn emit_def(&mut self, entity: &Entity) -> Result<(), TelemetryError> {
        encode_def(&mut self.buf, self.frame, entity);
        self.emit()
    }

    /// Look up `key`, emitting an `EntityDef` first if it had to be created.
    fn resolve(&mut self, key: EntityKey) -> Result<EntityId, TelemetryError> {
        let (entity, created) = self.registry.get_or_register(key, self.frame);
        let id = entity.id;
        if created {
            let entity = entity.clone();
            self.emit_def(&entity)?;
        }
        Ok(id)
    }
}

fn encode_def(buf: &mut RecordBuffer, frame: Frame, entity: &Entity) {
    buf.clear();
    buf.entity_header(RecordKind::EntityDef, frame.0, entity.id.0);
    buf.uvarint(entity.id.0);
    buf.str(&entity.name);
    buf.str(&entity.path);
    buf.str(&entity.type_name);
    buf.str(&entity.category);
    buf.transform(&entity.transform);
    buf.uvarint(entity.static_params.len() as u64);
    for (key, value) in &entity.static_params {
        buf.str(key);
        buf.str(value);
    }
    buf.uvarint(entity.creation_frame.0);
}

/// Frame-indexed, delta-compressed event log writer
pub struct EventLogWriter<W: Write> {
    state: Mutex<WriterState<W>>,
}

impl EventLogWriter<BufWriter<File>> {
    /// Create (or truncate) a log file at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or the header cannot be
    /// written.
    pub fn create(path: impl AsRef<Path>, options: WriterOptions) -> Result<Self, TelemetryError> {
        let file = File::create(path.as_ref())?;
        info!("Writing event log to {}", path.as_ref().display());
        Self::new(BufWriter::new(file), options)
    }
}

impl<W: Write> EventLogWriter<W> {
    /// Wrap `sink` in a DEFLATE compressor and start a new stream.
    ///
    /// # Errors
    /// Returns an error if the header record cannot be written.
    pub fn new(sink: W, options: WriterOptions) -> Result<Self, TelemetryError> {
        let level = Compression::new(options.compression_level.min(9));
        let mut state = WriterState {
            sink: Some(DeflateEncoder::new(sink, level)),
            broken: false,
            frame: Frame::default(),
            registry: EntityRegistry::new(),
            buf: RecordBuffer::with_capacity(256),
            stats: WriterStats::default(),
        };

        if options.write_header {
            state.buf.tag(RecordKind::Header);
            state.buf.str(HEADER_MAGIC);
            state.buf.uvarint(FORMAT_VERSION);
            state.emit()?;
        }

        Ok(Self { state: Mutex::new(state) })
    }

    fn lock(&self) -> MutexGuard<'_, WriterState<W>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Frame that new records are stamped with
    #[must_use]
    pub fn frame(&self) -> Frame {
        self.lock().frame
    }

    #[must_use]
    pub fn stats(&self) -> WriterStats {
        self.lock().stats
    }

    /// Live entity for `key`, if registered
    #[must_use]
    pub fn entity(&self, key: EntityKey) -> Option<Entity> {
        self.lock().registry.get(key).cloned()
    }

    /// Assign (or reuse) the entity for `key`, update its metadata and emit an
    /// `EntityDef` at the current frame.
    ///
    /// # Errors
    /// Returns an error on the first failed write.
    pub fn register_entity(
        &self,
        key: EntityKey,
        info: EntityInfo,
    ) -> Result<EntityId, TelemetryError> {
        let mut state = self.lock();
        let frame = state.frame;
        let entity = state.registry.register(key, info, frame).clone();
        state.emit_def(&entity)?;
        Ok(entity.id)
    }

    /// Emit an `EntityUndef` and drop the binding for `key`.
    ///
    /// Unknown keys are ignored. A later registration under the same key gets
    /// a new id.
    ///
    /// # Errors
    /// Returns an error on the first failed write.
    pub fn unregister_entity(&self, key: EntityKey) -> Result<(), TelemetryError> {
        let mut state = self.lock();
        let Some(entity) = state.registry.unregister(key) else {
            debug!("Ignoring unregister of unknown entity {key}");
            return Ok(());
        };
        let frame = state.frame;
        state.buf.clear();
        state.buf.entity_header(RecordKind::EntityUndef, frame.0, entity.id.0);
        state.emit()
    }

    /// Emit an `EntityLog` record, registering the entity if needed.
    ///
    /// # Errors
    /// Returns an error on the first failed write.
    pub fn log(
        &self,
        key: EntityKey,
        category: &str,
        message: &str,
        color: LogColor,
    ) -> Result<(), TelemetryError> {
        let mut state = self.lock();
        let id = state.resolve(key)?;
        let frame = state.frame;
        state.buf.clear();
        state.buf.entity_header(RecordKind::EntityLog, frame.0, id.0);
        state.buf.str(category);
        state.buf.str(message);
        state.buf.color(color);
        state.emit()
    }

    /// Emit a string-valued `EntityParameter` record. Never suppressed.
    ///
    /// # Errors
    /// Returns an error on the first failed write.
    pub fn set_parameter(
        &self,
        key: EntityKey,
        param: &str,
        value: &str,
    ) -> Result<(), TelemetryError> {
        let mut state = self.lock();
        let id = state.resolve(key)?;
        let frame = state.frame;
        state.buf.clear();
        state.buf.entity_header(RecordKind::EntityParameter, frame.0, id.0);
        state.buf.str(param);
        state.buf.str(value);
        state.emit()
    }

    /// Emit a float-valued `EntityValue` record if `value` differs from the
    /// last one written for `(entity, param)`.
    ///
    /// Returns whether a record was written.
    ///
    /// # Errors
    /// Returns an error on the first failed write.
    pub fn set_value(&self, key: EntityKey, param: &str, value: f32) -> Result<bool, TelemetryError> {
        let mut state = self.lock();
        let id = state.resolve(key)?;
        if !state.registry.value_changed(id, param, value) {
            state.stats.suppressed_values += 1;
            return Ok(false);
        }
        let frame = state.frame;
        state.buf.clear();
        state.buf.entity_header(RecordKind::EntityValue, frame.0, id.0);
        state.buf.str(param);
        state.buf.f32(value);
        state.emit()?;
        state.registry.record_value(id, param, value);
        Ok(true)
    }

    /// Emit an `EntitySetPos` record.
    ///
    /// # Errors
    /// Returns an error on the first failed write.
    pub fn set_position(&self, key: EntityKey, position: [f32; 3]) -> Result<(), TelemetryError> {
        let mut state = self.lock();
        let id = state.resolve(key)?;
        let frame = state.frame;
        state.buf.clear();
        state.buf.entity_header(RecordKind::EntitySetPos, frame.0, id.0);
        for v in position {
            state.buf.f32(v);
        }
        state.emit()
    }

    /// Emit an `EntitySetTransform` record.
    ///
    /// # Errors
    /// Returns an error on the first failed write.
    pub fn set_transform(&self, key: EntityKey, transform: &Transform) -> Result<(), TelemetryError> {
        let mut state = self.lock();
        let id = state.resolve(key)?;
        let frame = state.frame;
        state.buf.clear();
        state.buf.entity_header(RecordKind::EntitySetTransform, frame.0, id.0);
        state.buf.transform(transform);
        state.emit()
    }

    /// Emit a `FrameStep` carrying `elapsed` seconds.
    ///
    /// The first step opens frame 0, which is also the frame of anything
    /// written before it. Every later step advances the frame by one.
    /// Returns the frame that records are stamped with from now on.
    ///
    /// # Errors
    /// Returns an error on the first failed write.
    pub fn step_frame(&self, elapsed: f32) -> Result<Frame, TelemetryError> {
        let mut state = self.lock();
        state.buf.clear();
        state.buf.tag(RecordKind::FrameStep);
        state.buf.f32(elapsed);
        state.emit()?;
        if state.stats.frames > 0 {
            state.frame = state.frame.next();
        }
        state.stats.frames += 1;
        Ok(state.frame)
    }

    /// Finish the compressed stream and hand back the underlying sink.
    ///
    /// Returns `Ok(None)` if the writer was already closed. Later record calls
    /// are no-ops.
    ///
    /// # Errors
    /// Returns an error if the compressor trailer or the final flush fails.
    pub fn close(&self) -> Result<Option<W>, TelemetryError> {
        let mut state = self.lock();
        let Some(encoder) = state.sink.take() else {
            return Ok(None);
        };
        let stats = state.stats;
        drop(state);

        let mut sink = encoder.finish()?;
        sink.flush()?;
        info!(
            "Event log closed: {} records, {} frames, {} unchanged values suppressed",
            stats.records, stats.frames, stats.suppressed_values
        );
        Ok(Some(sink))
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().sink.is_none()
    }
}
