//! Wire grammar shared by the binary and text encodings.
//!
//! A stream is `header body trailer`:
//!
//! ```text
//! IMSS 0100 BIN|TXT   <blocks...>   \[END] <16 hex digits>
//! ```
//!
//! Both encodings express the same five block kinds. The binary encoding
//! tags each block with one byte followed by a u32 little-endian payload
//! length; the text encoding uses the same characters as line sigils.

/// Four-byte format code opening every stream.
pub const FORMAT_CODE: &[u8; 4] = b"IMSS";

/// Four-digit format version.
pub const FORMAT_VERSION: &[u8; 4] = b"0100";

/// Format-kind code of the binary encoding.
pub const KIND_BINARY: &[u8; 3] = b"BIN";

/// Format-kind code of the text encoding.
pub const KIND_TEXT: &[u8; 3] = b"TXT";

/// Total header length: format code, version and kind.
pub const HEADER_LEN: usize = 11;

/// Literal marker opening the trailer.
pub const TRAILER_MARKER: &[u8; 6] = b"\\[END]";

/// Number of hex digits in the integrity tag.
pub const INTEGRITY_TAG_LEN: usize = 16;

/// Total trailer length: marker plus integrity tag.
pub const TRAILER_LEN: usize = TRAILER_MARKER.len() + INTEGRITY_TAG_LEN;

/// Bytes per block frame before the payload: tag plus u32 length.
pub const BLOCK_FRAME_LEN: usize = 5;

/// Lowest byte of the range reserved for future block tags.
///
/// Tags in `BLOCK_TAG_MIN..=BLOCK_TAG_MAX` that a reader does not know are
/// skipped using their length prefix. A byte that is neither a known tag nor
/// in this range cannot start a block at all.
pub const BLOCK_TAG_MIN: u8 = 0x21;

/// Highest byte of the range reserved for future block tags.
pub const BLOCK_TAG_MAX: u8 = 0x2F;

/// Item-kind marker of a collection whose items differ in kind or type.
pub const MIXED_ITEMS: u8 = 0xFF;

/// Text-mode name of [`MIXED_ITEMS`].
pub const MIXED_ITEMS_NAME: &str = "mixed";

/// Object-Instance mode byte of a Definition.
pub const MODE_DEFINITION: u8 = 0;

/// Object-Instance mode byte of a Reference.
pub const MODE_REFERENCE: u8 = 1;

/// Text-mode literal for a null object reference.
pub const NULL_LITERAL: &str = "null";

/// Block kinds of the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlockTag {
    /// Declares a type and its ordered fields.
    TypeDeclaration = b'@',
    /// Defines or references an object.
    ObjectInstance = b'$',
    /// Opens a collection.
    ObjectCollection = b'#',
    /// One element of a collection.
    CollectionItem = b'%',
    /// One field of an object definition.
    FieldValue = b'&',
}

impl BlockTag {
    /// Creates a BlockTag from its wire byte.
    pub fn from_u8(v: u8) -> Option<BlockTag> {
        match v {
            b'@' => Some(BlockTag::TypeDeclaration),
            b'$' => Some(BlockTag::ObjectInstance),
            b'#' => Some(BlockTag::ObjectCollection),
            b'%' => Some(BlockTag::CollectionItem),
            b'&' => Some(BlockTag::FieldValue),
            _ => None,
        }
    }

    /// Returns the wire byte (also the text-mode sigil).
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Returns the text-mode sigil.
    pub fn sigil(self) -> char {
        self as u8 as char
    }

    /// Human-readable block name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            BlockTag::TypeDeclaration => "type-declaration",
            BlockTag::ObjectInstance => "object-instance",
            BlockTag::ObjectCollection => "object-collection",
            BlockTag::CollectionItem => "collection-item",
            BlockTag::FieldValue => "field-value",
        }
    }

    /// Returns true if `v` can open a block: a known tag, or one in the
    /// reserved range that a newer writer may emit.
    pub fn can_open_block(v: u8) -> bool {
        BlockTag::from_u8(v).is_some() || (BLOCK_TAG_MIN..=BLOCK_TAG_MAX).contains(&v)
    }
}

/// The two sibling encodings of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Binary,
    Text,
}

impl StreamKind {
    /// Returns the three-byte format-kind code.
    pub fn code(self) -> &'static [u8; 3] {
        match self {
            StreamKind::Binary => KIND_BINARY,
            StreamKind::Text => KIND_TEXT,
        }
    }

    /// Returns the full header for this kind.
    pub fn header(self) -> [u8; HEADER_LEN] {
        let mut header = [0u8; HEADER_LEN];
        header[0..4].copy_from_slice(FORMAT_CODE);
        header[4..8].copy_from_slice(FORMAT_VERSION);
        header[8..11].copy_from_slice(self.code());
        header
    }

    /// Detects the kind from a stream header.
    ///
    /// Returns `None` when the input does not start with a complete
    /// `IMSS0100` header or names an unknown kind.
    pub fn detect(input: &[u8]) -> Option<StreamKind> {
        if input.len() < HEADER_LEN
            || &input[0..4] != FORMAT_CODE
            || &input[4..8] != FORMAT_VERSION
        {
            return None;
        }
        match &input[8..11] {
            k if k == KIND_BINARY => Some(StreamKind::Binary),
            k if k == KIND_TEXT => Some(StreamKind::Text),
            _ => None,
        }
    }
}
