//! Sequential record decoding
//!
//! The log has no index; a reader replays it front to back and keeps its own
//! entity table keyed by entity id.

use std::io::Read;

use thiserror::Error;

use crate::{LogColor, RecordKind, Transform, MAX_VARINT_LEN};

#[derive(Error, Debug)]
pub enum FormatError {
    /// Clean end of stream between records
    #[error("end of stream")]
    EndOfStream,

    #[error("stream ended in the middle of a record")]
    UnexpectedEof,

    #[error("varint exceeds {MAX_VARINT_LEN} bytes")]
    VarintOverflow,

    #[error("unknown record tag {0}")]
    UnknownTag(u64),

    #[error("invalid log color index {0}")]
    InvalidColor(u64),

    #[error("string length {0} does not fit in memory")]
    StringTooLong(u64),

    #[error(transparent)]
    Io(std::io::Error),
}

impl From<std::io::Error> for FormatError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            FormatError::UnexpectedEof
        } else {
            FormatError::Io(err)
        }
    }
}

/// Body of an `EntityDef` record.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDef {
    pub id: u64,
    pub name: String,
    pub path: String,
    pub type_name: String,
    pub category: String,
    pub transform: Transform,
    pub static_params: Vec<(String, String)>,
    pub creation_frame: u64,
}

/// One decoded record.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind"))]
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Header { magic: String, version: u64 },
    FrameStep { elapsed: f32 },
    EntityDef { frame: u64, entity: u64, def: EntityDef },
    EntityUndef { frame: u64, entity: u64 },
    EntitySetPos { frame: u64, entity: u64, position: [f32; 3] },
    EntitySetTransform { frame: u64, entity: u64, transform: Transform },
    EntityLog { frame: u64, entity: u64, category: String, message: String, color: LogColor },
    EntityParameter { frame: u64, entity: u64, key: String, value: String },
    EntityValue { frame: u64, entity: u64, key: String, value: f32 },
}

impl Record {
    #[must_use]
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Header { .. } => RecordKind::Header,
            Record::FrameStep { .. } => RecordKind::FrameStep,
            Record::EntityDef { .. } => RecordKind::EntityDef,
            Record::EntityUndef { .. } => RecordKind::EntityUndef,
            Record::EntitySetPos { .. } => RecordKind::EntitySetPos,
            Record::EntitySetTransform { .. } => RecordKind::EntitySetTransform,
            Record::EntityLog { .. } => RecordKind::EntityLog,
            Record::EntityParameter { .. } => RecordKind::EntityParameter,
            Record::EntityValue { .. } => RecordKind::EntityValue,
        }
    }

    /// Frame stamped on the record (`None` for frame steps and the header)
    #[must_use]
    pub fn frame(&self) -> Option<u64> {
        match self {
            Record::Header { .. } | Record::FrameStep { .. } => None,
            Record::EntityDef { frame, .. }
            | Record::EntityUndef { frame, .. }
            | Record::EntitySetPos { frame, .. }
            | Record::EntitySetTransform { frame, .. }
            | Record::EntityLog { frame, .. }
            | Record::EntityParameter { frame, .. }
            | Record::EntityValue { frame, .. } => Some(*frame),
        }
    }

    /// Entity the record refers to (`None` for frame steps and the header)
    #[must_use]
    pub fn entity(&self) -> Option<u64> {
        match self {
            Record::Header { .. } | Record::FrameStep { .. } => None,
            Record::EntityDef { entity, .. }
            | Record::EntityUndef { entity, .. }
            | Record::EntitySetPos { entity, .. }
            | Record::EntitySetTransform { entity, .. }
            | Record::EntityLog { entity, .. }
            | Record::EntityParameter { entity, .. }
            | Record::EntityValue { entity, .. } => Some(*entity),
        }
    }
}

/// Decodes records from an uncompressed byte stream.
pub struct RecordReader<R> {
    reader: R,
}

impl<R: Read> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read the next record. Returns `Ok(None)` at a clean end of stream.
    ///
    /// # Errors
    /// Returns an error if the stream is truncated mid-record or malformed.
    pub fn next_record(&mut self) -> Result<Option<Record>, FormatError> {
        let tag = match self.first_varint() {
            Ok(tag) => tag,
            Err(FormatError::EndOfStream) => return Ok(None),
            Err(e) => return Err(e),
        };
        let kind = RecordKind::from_tag(tag).ok_or(FormatError::UnknownTag(tag))?;

        let record = match kind {
            RecordKind::Header => {
                Record::Header { magic: self.string()?, version: self.uvarint()? }
            }
            RecordKind::FrameStep => Record::FrameStep { elapsed: self.f32()? },
            _ => {
                let frame = self.uvarint()?;
                let entity = self.uvarint()?;
                self.entity_body(kind, frame, entity)?
            }
        };
        Ok(Some(record))
    }

    /// Read all remaining records.
    ///
    /// # Errors
    /// Returns the first decoding error encountered.
    pub fn read_all(&mut self) -> Result<Vec<Record>, FormatError> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record()? {
            records.push(record);
        }
        Ok(records)
    }

    fn entity_body(
        &mut self,
        kind: RecordKind,
        frame: u64,
        entity: u64,
    ) -> Result<Record, FormatError> {
        Ok(match kind {
            RecordKind::EntityDef => {
                let id = self.uvarint()?;
                let name = self.string()?;
                let path = self.string()?;
                let type_name = self.string()?;
                let category = self.string()?;
                let transform = self.transform()?;
                let count = self.uvarint()?;
                let mut static_params = Vec::new();
                for _ in 0..count {
                    static_params.push((self.string()?, self.string()?));
                }
                let creation_frame = self.uvarint()?;
                Record::EntityDef {
                    frame,
                    entity,
                    def: EntityDef {
                        id,
                        name,
                        path,
                        type_name,
                        category,
                        transform,
                        static_params,
                        creation_frame,
                    },
                }
            }
            RecordKind::EntityUndef => Record::EntityUndef { frame, entity },
            RecordKind::EntitySetPos => Record::EntitySetPos {
                frame,
                entity,
                position: [self.f32()?, self.f32()?, self.f32()?],
            },
            RecordKind::EntitySetTransform => {
                Record::EntitySetTransform { frame, entity, transform: self.transform()? }
            }
            RecordKind::EntityLog => {
                let category = self.string()?;
                let message = self.string()?;
                let index = self.uvarint()?;
                let color = LogColor::from_index(index).ok_or(FormatError::InvalidColor(index))?;
                Record::EntityLog { frame, entity, category, message, color }
            }
            RecordKind::EntityParameter => Record::EntityParameter {
                frame,
                entity,
                key: self.string()?,
                value: self.string()?,
            },
            RecordKind::EntityValue => {
                Record::EntityValue { frame, entity, key: self.string()?, value: self.f32()? }
            }
            RecordKind::FrameStep | RecordKind::Header => unreachable!("no entity header"),
        })
    }

    fn byte(&mut self) -> Result<u8, FormatError> {
        let mut b = [0u8; 1];
        self.reader.read_exact(&mut b)?;
        Ok(b[0])
    }

    /// Reads a record tag, distinguishing a clean EOF from a truncated varint.
    fn first_varint(&mut self) -> Result<u64, FormatError> {
        let mut b = [0u8; 1];
        match self.reader.read_exact(&mut b) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(FormatError::EndOfStream);
            }
            Err(e) => return Err(FormatError::Io(e)),
        }
        self.varint_from(b[0])
    }

    fn uvarint(&mut self) -> Result<u64, FormatError> {
        let first = self.byte()?;
        self.varint_from(first)
    }

    fn varint_from(&mut self, first: u8) -> Result<u64, FormatError> {
        let mut value = u64::from(first & 0x7F);
        let mut byte = first;
        let mut shift = 7;
        let mut len = 1;
        while byte & 0x80 != 0 {
            if len == MAX_VARINT_LEN {
                return Err(FormatError::VarintOverflow);
            }
            byte = self.byte()?;
            value |= u64::from(byte & 0x7F) << shift;
            shift += 7;
            len += 1;
        }
        Ok(value)
    }

    fn f32(&mut self) -> Result<f32, FormatError> {
        let mut b = [0u8; 4];
        self.reader.read_exact(&mut b)?;
        Ok(f32::from_le_bytes(b))
    }

    fn string(&mut self) -> Result<String, FormatError> {
        let len = self.uvarint()?;
        usize::try_from(len).map_err(|_| FormatError::StringTooLong(len))?;
        // the length prefix is untrusted; grow only as bytes actually arrive
        let mut bytes = Vec::new();
        (&mut self.reader).take(len).read_to_end(&mut bytes)?;
        if (bytes.len() as u64) < len {
            return Err(FormatError::UnexpectedEof);
        }
        Ok(bytes.into_iter().map(char::from).collect())
    }

    fn transform(&mut self) -> Result<Transform, FormatError> {
        Ok(Transform {
            translation: [self.f32()?, self.f32()?, self.f32()?],
            rotation: [self.f32()?, self.f32()?, self.f32()?, self.f32()?],
        })
    }
}
