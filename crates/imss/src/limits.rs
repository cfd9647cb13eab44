//! Resource limits applied while encoding and decoding.
//!
//! Decoders treat their input as untrusted: every length, count and nesting
//! level read from a stream is checked against these bounds before any
//! allocation is made.

/// Maximum size of a complete stream, header and trailer included.
pub const MAX_STREAM_SIZE: usize = 64 * 1024 * 1024;

/// Maximum length in bytes of a text value or a type/field name.
pub const MAX_STRING_LEN: usize = 16 * 1024 * 1024;

/// Maximum length of a raw byte value.
pub const MAX_BYTES_LEN: usize = 16 * 1024 * 1024;

/// Maximum number of fields a single type may declare.
pub const MAX_FIELDS_PER_TYPE: usize = 1024;

/// Maximum number of distinct types in one stream.
pub const MAX_TYPES: usize = 65_535;

/// Maximum number of distinct objects in one stream.
pub const MAX_OBJECTS: usize = 16 * 1024 * 1024;

/// Maximum number of items in one collection.
pub const MAX_COLLECTION_LEN: usize = 16 * 1024 * 1024;

/// Maximum nesting of object slots and collections.
///
/// The writer and both readers recurse once per level.
pub const MAX_DEPTH: usize = 256;

/// Maximum encoded length of an unsigned LEB128 varint.
pub const MAX_VARINT_BYTES: usize = 10;
