//! Error types for IMSS encoding and decoding.

use thiserror::Error;

use crate::model::{FieldId, FieldKind, Guid, NodeId};

/// Failure category shared by both directions.
///
/// Every error is fatal for the operation that raised it; the engine never
/// retries and never returns a partial graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Header/trailer damage, truncation, or structurally invalid blocks.
    Format,
    /// Type/field information that contradicts the declared schema.
    Schema,
    /// Failure of the underlying byte stream.
    Io,
}

impl ErrorKind {
    /// Returns the stable code string for this category.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Format => "FORMAT",
            ErrorKind::Schema => "SCHEMA",
            ErrorKind::Io => "IO",
        }
    }
}

/// Error during decoding of a binary or text stream.
///
/// Offsets are absolute byte positions in the input.
#[derive(Debug, Error)]
pub enum DecodeError {
    // === Framing ===
    #[error("invalid format code: expected IMSS, found {found:?}")]
    InvalidMagic { found: Vec<u8> },

    #[error("unsupported version: {found:?}")]
    UnsupportedVersion { found: Vec<u8> },

    #[error("unexpected stream kind {found:?} (expected {expected})")]
    UnexpectedKind { expected: &'static str, found: Vec<u8> },

    #[error("trailer marker missing or malformed at offset {offset}")]
    MissingTrailer { offset: usize },

    #[error("integrity tag mismatch at offset {offset}: stream says {found}, content hashes to {expected}")]
    IntegrityMismatch {
        expected: String,
        found: String,
        offset: usize,
    },

    #[error("unexpected end of input while reading {context} at offset {offset}")]
    UnexpectedEof { context: &'static str, offset: usize },

    #[error("unknown block tag 0x{tag:02x} at offset {offset}")]
    UnknownBlock { tag: u8, offset: usize },

    #[error("unexpected {found} block at offset {offset} (expected {expected})")]
    UnexpectedBlock {
        expected: &'static str,
        found: &'static str,
        offset: usize,
    },

    #[error("{len} trailing bytes after {context} at offset {offset}")]
    TrailingBytes {
        context: &'static str,
        len: usize,
        offset: usize,
    },

    // === Primitive encoding ===
    #[error("varint exceeds maximum length (10 bytes) at offset {offset}")]
    VarintTooLong { offset: usize },

    #[error("varint overflow at offset {offset}")]
    VarintOverflow { offset: usize },

    #[error("{field} length {len} exceeds maximum {max} at offset {offset}")]
    LengthExceedsLimit {
        field: &'static str,
        len: usize,
        max: usize,
        offset: usize,
    },

    #[error("invalid UTF-8 in {field} at offset {offset}")]
    InvalidUtf8 { field: &'static str, offset: usize },

    #[error("invalid UTF-16 in {field} at offset {offset}")]
    InvalidUtf16 { field: &'static str, offset: usize },

    #[error("invalid bool value {value} at offset {offset} (expected 0x00 or 0x01)")]
    InvalidBool { value: u8, offset: usize },

    #[error("invalid field kind {kind} at offset {offset}")]
    InvalidKind { kind: u8, offset: usize },

    #[error("invalid {context} mode {mode} at offset {offset}")]
    InvalidMode {
        context: &'static str,
        mode: u8,
        offset: usize,
    },

    #[error("malformed {context} at offset {offset}")]
    Malformed { context: &'static str, offset: usize },

    #[error("nesting deeper than {max} levels at offset {offset}")]
    NestingTooDeep { max: usize, offset: usize },

    // === Catalog consistency ===
    #[error("type id {found} declared out of order at offset {offset} (expected {expected})")]
    TypeIdOutOfOrder {
        expected: u32,
        found: u32,
        offset: usize,
    },

    #[error("type name {name:?} declared twice at offset {offset}")]
    DuplicateTypeName { name: String, offset: usize },

    #[error("object id {object_id} defined twice at offset {offset}")]
    DuplicateDefinition { object_id: u32, offset: usize },

    #[error("identity {identity} defined under a second object id {object_id} at offset {offset}")]
    DuplicateIdentity {
        identity: Guid,
        object_id: u32,
        offset: usize,
    },

    #[error("object id {object_id} referenced at offset {offset} but never defined")]
    UnresolvedReference { object_id: u32, offset: usize },

    #[error("object record at offset {offset} uses undeclared type id {type_id}")]
    UndeclaredType { type_id: u32, offset: usize },

    // === Schema ===
    #[error("type {type_id} has no field {field} (offset {offset})")]
    UnknownField {
        type_id: u32,
        field: String,
        offset: usize,
    },

    #[error("field {field_id} of type {type_id} is declared {declared:?} but stream holds {found:?} (offset {offset})")]
    KindMismatch {
        type_id: u32,
        field_id: FieldId,
        declared: FieldKind,
        found: FieldKind,
        offset: usize,
    },

    #[error("collection declares {declared} items but item at offset {offset} is {found:?}")]
    ItemKindMismatch {
        declared: &'static str,
        found: FieldKind,
        offset: usize,
    },

    #[error("collection declares item type {expected} but item at offset {offset} has type {found}")]
    ItemTypeMismatch {
        expected: u32,
        found: u32,
        offset: usize,
    },

    #[error("type {type_id} declares {expected} fields but definition at offset {offset} carries {found}")]
    FieldCountMismatch {
        type_id: u32,
        expected: usize,
        found: usize,
        offset: usize,
    },

    #[error("object id {object_id} was referenced as type {referenced} but defined as type {defined} (offset {offset})")]
    TypeMismatch {
        object_id: u32,
        referenced: u32,
        defined: u32,
        offset: usize,
    },

    // === I/O ===
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

impl DecodeError {
    /// Returns the failure category for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DecodeError::UnknownField { .. }
            | DecodeError::KindMismatch { .. }
            | DecodeError::ItemKindMismatch { .. }
            | DecodeError::ItemTypeMismatch { .. }
            | DecodeError::FieldCountMismatch { .. }
            | DecodeError::TypeMismatch { .. } => ErrorKind::Schema,
            DecodeError::Io(_) => ErrorKind::Io,
            _ => ErrorKind::Format,
        }
    }
}

/// Error during encoding of an object graph.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("type {type_name:?} does not expose field descriptors")]
    MissingDescriptor { type_name: String },

    #[error("type {type_name:?} declares field {field_id} ({name:?}) more than once")]
    DuplicateField {
        type_name: String,
        field_id: FieldId,
        name: String,
    },

    #[error("field {field_id} of type {type_id} is declared {declared:?} but holds {found:?}")]
    KindMismatch {
        type_id: u32,
        field_id: FieldId,
        declared: FieldKind,
        found: FieldKind,
    },

    #[error("object {identity} has no value for field {field_id} of type {type_id}")]
    MissingField {
        identity: Guid,
        type_id: u32,
        field_id: FieldId,
    },

    #[error("reference to unknown node {node:?}")]
    UnknownNode { node: NodeId },

    #[error("{found:?} value passed where a scalar was expected")]
    NotScalar { found: FieldKind },

    #[error("{field} length {len} exceeds maximum {max}")]
    LengthExceedsLimit {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("object graph nests deeper than {max} levels")]
    NestingTooDeep { max: usize },

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

impl EncodeError {
    /// Returns the failure category for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EncodeError::MissingDescriptor { .. }
            | EncodeError::DuplicateField { .. }
            | EncodeError::KindMismatch { .. }
            | EncodeError::MissingField { .. }
            | EncodeError::UnknownNode { .. }
            | EncodeError::NotScalar { .. } => ErrorKind::Schema,
            EncodeError::LengthExceedsLimit { .. } | EncodeError::NestingTooDeep { .. } => {
                ErrorKind::Format
            }
            EncodeError::Io(_) => ErrorKind::Io,
        }
    }
}
