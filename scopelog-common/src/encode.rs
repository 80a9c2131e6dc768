//! Record encoding
//!
//! A record is assembled in a [`RecordBuffer`] and handed to the sink as one
//! contiguous byte slice, so a record's fields never interleave with another
//! writer's.

use crate::{LogColor, RecordKind, Transform, MAX_VARINT_LEN};

/// A buffer for encoding a single record.
#[derive(Debug, Default)]
pub struct RecordBuffer {
    scratch: [u8; MAX_VARINT_LEN],
    buf: Vec<u8>,
}

impl AsRef<[u8]> for RecordBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.buf
    }
}

impl RecordBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(size: usize) -> Self {
        RecordBuffer { scratch: [0; MAX_VARINT_LEN], buf: Vec::with_capacity(size) }
    }

    /// Discards the encoded bytes, keeping the allocation.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Writes a variable-length unsigned integer.
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub fn uvarint<U: Into<u64>>(&mut self, u: U) {
        let mut u: u64 = u.into();
        let mut i = 0;
        while u >= 0x80 {
            self.scratch[i] = (u as u8) | 0x80;
            u >>= 7;
            i += 1;
        }
        self.scratch[i] = u as u8;
        i += 1;
        self.buf.extend_from_slice(&self.scratch[..i]);
    }

    /// Writes a float, always as 4 little-endian bytes.
    #[inline]
    pub fn f32(&mut self, f: f32) {
        self.buf.extend_from_slice(&f.to_le_bytes());
    }

    /// Writes a length-prefixed string, one byte per character.
    ///
    /// Characters outside ASCII are written as `?`.
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub fn str<S: AsRef<str>>(&mut self, s: S) {
        let s = s.as_ref();
        let count = s.chars().count();
        self.buf.reserve(MAX_VARINT_LEN + count);
        self.uvarint(count as u64);
        self.buf.extend(s.chars().map(|c| if c.is_ascii() { c as u8 } else { b'?' }));
    }

    /// Writes the record tag.
    #[inline]
    pub fn tag(&mut self, kind: RecordKind) {
        self.uvarint(kind.tag());
    }

    /// Writes the tag plus the `[frame][entity]` header shared by entity records.
    #[inline]
    pub fn entity_header(&mut self, kind: RecordKind, frame: u64, entity: u64) {
        debug_assert!(kind.has_entity_header());
        self.tag(kind);
        self.uvarint(frame);
        self.uvarint(entity);
    }

    /// Writes 3 translation floats followed by 4 rotation floats.
    pub fn transform(&mut self, transform: &Transform) {
        for v in transform.translation {
            self.f32(v);
        }
        for v in transform.rotation {
            self.f32(v);
        }
    }

    /// Writes a log color as its palette index.
    #[inline]
    pub fn color(&mut self, color: LogColor) {
        self.uvarint(color.index());
    }
}
