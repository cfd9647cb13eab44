//! Primitive encoding/decoding for the IMSS binary format.
//!
//! Implements varints, fixed-width little-endian integers, length-prefixed
//! strings and block framing (`tag`, `u32 length`, payload).

use crate::error::{DecodeError, EncodeError};
use crate::grammar::BlockTag;
use crate::limits::MAX_VARINT_BYTES;
use crate::model::Guid;

// =============================================================================
// DECODING
// =============================================================================

/// Reader for decoding binary data.
///
/// Wraps a byte slice and provides methods for reading primitives with
/// bounds checking. Positions reported in errors are absolute: a reader
/// over a block payload carries the payload's offset in the whole stream.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
}

/// A framed block: its tag byte, payload and absolute offset of the tag.
#[derive(Debug, Clone)]
pub struct RawBlock<'a> {
    pub tag: u8,
    pub payload: Reader<'a>,
    pub offset: usize,
}

impl RawBlock<'_> {
    /// Returns the known block kind, if any.
    pub fn kind(&self) -> Option<BlockTag> {
        BlockTag::from_u8(self.tag)
    }
}

impl<'a> Reader<'a> {
    /// Creates a new reader from a byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_offset(data, 0)
    }

    /// Creates a reader whose first byte sits at `base` in the stream.
    pub fn with_offset(data: &'a [u8], base: usize) -> Self {
        Self { data, pos: 0, base }
    }

    /// Returns the absolute position of the next byte.
    pub fn position(&self) -> usize {
        self.base + self.pos
    }

    /// Returns the remaining bytes.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Returns the number of remaining bytes.
    pub fn remaining_len(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns true if all data has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Returns the next byte without consuming it.
    pub fn peek_byte(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Reads a single byte.
    #[inline]
    pub fn read_byte(&mut self, context: &'static str) -> Result<u8, DecodeError> {
        if self.pos >= self.data.len() {
            return Err(DecodeError::UnexpectedEof {
                context,
                offset: self.position(),
            });
        }
        let byte = self.data[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    /// Reads exactly n bytes.
    #[inline]
    pub fn read_bytes(&mut self, n: usize, context: &'static str) -> Result<&'a [u8], DecodeError> {
        if n > self.remaining_len() {
            return Err(DecodeError::UnexpectedEof {
                context,
                offset: self.position(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    /// Reads exactly N bytes into an array.
    #[inline]
    pub fn read_array<const N: usize>(&mut self, context: &'static str) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N, context)?);
        Ok(out)
    }

    /// Reads a little-endian u32.
    #[inline]
    pub fn read_u32(&mut self, context: &'static str) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.read_array(context)?))
    }

    /// Reads a 16-byte identity.
    #[inline]
    pub fn read_guid(&mut self, context: &'static str) -> Result<Guid, DecodeError> {
        Ok(Guid::from_bytes(self.read_array(context)?))
    }

    /// Reads an unsigned varint (LEB128).
    #[inline]
    pub fn read_varint(&mut self, context: &'static str) -> Result<u64, DecodeError> {
        let start = self.position();
        let mut result: u64 = 0;
        let mut shift = 0;

        for i in 0..MAX_VARINT_BYTES {
            let byte = self.read_byte(context)?;
            let value = (byte & 0x7F) as u64;

            // Check for overflow
            if shift >= 64 || (shift == 63 && value > 1) {
                return Err(DecodeError::VarintOverflow { offset: start });
            }

            result |= value << shift;

            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;

            if i == MAX_VARINT_BYTES - 1 {
                return Err(DecodeError::VarintTooLong { offset: start });
            }
        }

        Err(DecodeError::VarintTooLong { offset: start })
    }

    /// Reads a varint that must fit in a u32 id.
    pub fn read_id(&mut self, context: &'static str) -> Result<u32, DecodeError> {
        let offset = self.position();
        let value = self.read_varint(context)?;
        u32::try_from(value).map_err(|_| DecodeError::VarintOverflow { offset })
    }

    /// Reads a varint count bounded by `max`.
    pub fn read_count(&mut self, max: usize, field: &'static str) -> Result<usize, DecodeError> {
        let offset = self.position();
        let count = self.read_varint(field)? as usize;
        if count > max {
            return Err(DecodeError::LengthExceedsLimit {
                field,
                len: count,
                max,
                offset,
            });
        }
        Ok(count)
    }

    /// Reads a u32 length prefix followed by that many bytes.
    pub fn read_len_prefixed(
        &mut self,
        max_len: usize,
        field: &'static str,
    ) -> Result<&'a [u8], DecodeError> {
        let offset = self.position();
        let len = self.read_u32(field)? as usize;
        if len > max_len {
            return Err(DecodeError::LengthExceedsLimit {
                field,
                len,
                max: max_len,
                offset,
            });
        }
        self.read_bytes(len, field)
    }

    /// Reads a length-prefixed UTF-8 string.
    #[inline]
    pub fn read_string(&mut self, max_len: usize, field: &'static str) -> Result<String, DecodeError> {
        let offset = self.position();
        let bytes = self.read_len_prefixed(max_len, field)?;
        // Validate UTF-8 on borrowed slice, then allocate once (avoids intermediate Vec)
        std::str::from_utf8(bytes)
            .map(|s| s.to_string())
            .map_err(|_| DecodeError::InvalidUtf8 { field, offset })
    }

    /// Reads one framed block.
    ///
    /// The payload comes back as a sub-reader positioned in the same stream,
    /// so nested parsing keeps absolute offsets.
    pub fn read_block(&mut self) -> Result<RawBlock<'a>, DecodeError> {
        let offset = self.position();
        let tag = self.read_byte("block tag")?;
        if !BlockTag::can_open_block(tag) {
            return Err(DecodeError::UnknownBlock { tag, offset });
        }
        let len = self.read_u32("block length")? as usize;
        let payload_offset = self.position();
        let payload = self.read_bytes(len, "block payload")?;
        Ok(RawBlock {
            tag,
            payload: Reader::with_offset(payload, payload_offset),
            offset,
        })
    }

    /// Fails unless every byte has been consumed.
    pub fn expect_end(&self, context: &'static str) -> Result<(), DecodeError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(DecodeError::TrailingBytes {
                context,
                len: self.remaining_len(),
                offset: self.position(),
            })
        }
    }
}

// =============================================================================
// ENCODING
// =============================================================================

/// Writer for encoding binary data.
#[derive(Debug, Clone, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

/// Position of an open block whose length still has to be patched.
#[derive(Debug)]
#[must_use = "an open block must be closed with Writer::end_block"]
pub struct BlockMark {
    len_at: usize,
}

impl Writer {
    /// Creates a new writer.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Creates a new writer with capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Returns the written bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Returns a reference to the written bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Returns the number of bytes written.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if no bytes have been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_byte(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    /// Writes raw bytes.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes a little-endian u32.
    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a 16-byte identity.
    #[inline]
    pub fn write_guid(&mut self, id: &Guid) {
        self.buf.extend_from_slice(id.as_bytes());
    }

    /// Writes an unsigned varint (LEB128).
    #[inline]
    pub fn write_varint(&mut self, mut value: u64) {
        // Use stack buffer to batch writes (faster than multiple push calls)
        let mut buf = [0u8; 10]; // Max 10 bytes for 64-bit varint
        let mut len = 0;
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            buf[len] = byte;
            len += 1;
            if value == 0 {
                break;
            }
        }
        self.buf.extend_from_slice(&buf[..len]);
    }

    /// Writes a u32 length prefix followed by the bytes.
    pub fn write_len_prefixed(&mut self, bytes: &[u8], field: &'static str) -> Result<(), EncodeError> {
        let len = u32::try_from(bytes.len()).map_err(|_| EncodeError::LengthExceedsLimit {
            field,
            len: bytes.len(),
            max: u32::MAX as usize,
        })?;
        self.write_u32(len);
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, s: &str, field: &'static str) -> Result<(), EncodeError> {
        self.write_len_prefixed(s.as_bytes(), field)
    }

    /// Opens a block: writes the tag and reserves its length.
    pub fn begin_block(&mut self, tag: BlockTag) -> BlockMark {
        self.buf.push(tag.byte());
        let len_at = self.buf.len();
        self.buf.extend_from_slice(&[0u8; 4]);
        BlockMark { len_at }
    }

    /// Closes a block by patching its payload length.
    pub fn end_block(&mut self, mark: BlockMark) -> Result<(), EncodeError> {
        let payload_len = self.buf.len() - mark.len_at - 4;
        let len = u32::try_from(payload_len).map_err(|_| EncodeError::LengthExceedsLimit {
            field: "block",
            len: payload_len,
            max: u32::MAX as usize,
        })?;
        self.buf[mark.len_at..mark.len_at + 4].copy_from_slice(&len.to_le_bytes());
        Ok(())
    }
}
