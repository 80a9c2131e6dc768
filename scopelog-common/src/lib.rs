//! # Shared Event Log Format (Writer ↔ Reader)
//!
//! Defines the binary record layout shared between the telemetry writer in
//! `scopelog` and anything that replays a log (the `scopelog dump` tool, tests,
//! the external replay viewer).
//!
//! ## Stream Layout
//!
//! The log is an append-only sequence of records, written through a DEFLATE
//! compressor. Every record starts with a base-128 varint tag:
//!
//! ```text
//! FrameStep          [1][elapsed: f32]
//! EntityDef          [2][frame][entity][entity][name][path][type][category]
//!                       [transform: 7 × f32][count][count × (key, value)][creation frame]
//! EntityUndef        [3][frame][entity]
//! EntitySetPos       [4][frame][entity][3 × f32]
//! EntitySetTransform [5][frame][entity][7 × f32]
//! EntityLog          [6][frame][entity][category][message][color]
//! EntityParameter    [7][frame][entity][key][value: string]
//! EntityValue        [8][frame][entity][key][value: f32]
//! Header             [0xFF][magic: string][version]
//! ```
//!
//! Integers are unsigned varints, strings are a varint length followed by one
//! byte per character, floats are 4-byte little-endian IEEE 754.
//!
//! ## Key Types
//!
//! - [`RecordKind`] - Record tag
//! - [`LogColor`] - Console color carried by log records
//! - [`Transform`] - Initial spatial transform of an entity
//! - [`RecordBuffer`] - Encoder for a single record
//! - [`RecordReader`] - Sequential decoder producing [`Record`] values

pub mod decode;
pub mod encode;

pub use decode::{EntityDef, FormatError, Record, RecordReader};
pub use encode::RecordBuffer;

// ============================================================================
// Stream Constants
// ============================================================================

/// Magic string carried by the optional stream header
pub const HEADER_MAGIC: &str = "SCOPELOG";

/// Format version carried by the optional stream header
pub const FORMAT_VERSION: u64 = 1;

/// Maximum encoded length of a 64-bit varint
pub const MAX_VARINT_LEN: usize = 10;

// ============================================================================
// Record Kinds
// ============================================================================

/// Record tag, written as the leading varint of every record
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Advances the frame counter; carries elapsed seconds
    FrameStep,
    /// Entity definition (name, path, type, category, static params)
    EntityDef,
    /// Entity destruction
    EntityUndef,
    /// Entity position (translation only)
    EntitySetPos,
    /// Entity translation and rotation
    EntitySetTransform,
    /// Log line attached to an entity
    EntityLog,
    /// String-valued dynamic parameter
    EntityParameter,
    /// Float-valued dynamic parameter
    EntityValue,
    /// Optional stream header (magic + version)
    Header,
}

impl RecordKind {
    /// All record kinds, in tag order (header last)
    pub const ALL: [RecordKind; 9] = [
        RecordKind::FrameStep,
        RecordKind::EntityDef,
        RecordKind::EntityUndef,
        RecordKind::EntitySetPos,
        RecordKind::EntitySetTransform,
        RecordKind::EntityLog,
        RecordKind::EntityParameter,
        RecordKind::EntityValue,
        RecordKind::Header,
    ];

    /// Wire tag of this record kind
    #[must_use]
    pub const fn tag(self) -> u64 {
        match self {
            RecordKind::FrameStep => 1,
            RecordKind::EntityDef => 2,
            RecordKind::EntityUndef => 3,
            RecordKind::EntitySetPos => 4,
            RecordKind::EntitySetTransform => 5,
            RecordKind::EntityLog => 6,
            RecordKind::EntityParameter => 7,
            RecordKind::EntityValue => 8,
            RecordKind::Header => 0xFF,
        }
    }

    /// Look up a record kind by its wire tag
    #[must_use]
    pub fn from_tag(tag: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    /// Whether records of this kind carry the `[frame][entity]` header
    #[must_use]
    pub const fn has_entity_header(self) -> bool {
        !matches!(self, RecordKind::FrameStep | RecordKind::Header)
    }

    /// Human-readable name, as shown by the dump tool
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            RecordKind::FrameStep => "FrameStep",
            RecordKind::EntityDef => "EntityDef",
            RecordKind::EntityUndef => "EntityUndef",
            RecordKind::EntitySetPos => "EntitySetPos",
            RecordKind::EntitySetTransform => "EntitySetTransform",
            RecordKind::EntityLog => "EntityLog",
            RecordKind::EntityParameter => "EntityParameter",
            RecordKind::EntityValue => "EntityValue",
            RecordKind::Header => "Header",
        }
    }
}

// ============================================================================
// Log Colors
// ============================================================================

/// Console color of a log record, encoded as its varint index
///
/// The ordering matches the classic 16-color console palette, which is what
/// the replay viewer expects.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LogColor {
    Black,
    DarkBlue,
    DarkGreen,
    DarkCyan,
    DarkRed,
    DarkMagenta,
    DarkYellow,
    #[default]
    Gray,
    DarkGray,
    Blue,
    Green,
    Cyan,
    Red,
    Magenta,
    Yellow,
    White,
}

impl LogColor {
    const PALETTE: [LogColor; 16] = [
        LogColor::Black,
        LogColor::DarkBlue,
        LogColor::DarkGreen,
        LogColor::DarkCyan,
        LogColor::DarkRed,
        LogColor::DarkMagenta,
        LogColor::DarkYellow,
        LogColor::Gray,
        LogColor::DarkGray,
        LogColor::Blue,
        LogColor::Green,
        LogColor::Cyan,
        LogColor::Red,
        LogColor::Magenta,
        LogColor::Yellow,
        LogColor::White,
    ];

    /// Palette index written to the stream
    #[must_use]
    pub fn index(self) -> u64 {
        self as u64
    }

    /// Look up a color by palette index
    #[must_use]
    pub fn from_index(index: u64) -> Option<Self> {
        usize::try_from(index).ok().and_then(|i| Self::PALETTE.get(i).copied())
    }
}

// ============================================================================
// Transforms
// ============================================================================

/// Initial spatial transform of an entity
///
/// Not interpreted by the telemetry core; carried so the replay viewer can
/// place entities. Defaults to identity.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// x, y, z translation
    pub translation: [f32; 3],
    /// x, y, z, w rotation quaternion
    pub rotation: [f32; 4],
}

impl Transform {
    pub const IDENTITY: Transform =
        Transform { translation: [0.0; 3], rotation: [0.0, 0.0, 0.0, 1.0] };
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}
