//! Binary event log
//!
//! - `registry`: entity table and float change detection
//! - `writer`: [`EventLogWriter`], the locked, compressed record sink
//! - `reader`: decompression helpers for replaying a log

pub mod reader;
pub mod registry;
pub mod writer;

pub use reader::{decode_compressed, read_log};
pub use registry::{Entity, EntityInfo, EntityRegistry};
pub use writer::{EventLogWriter, WriterOptions, WriterStats};
