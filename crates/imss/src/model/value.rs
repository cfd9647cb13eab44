//! Field values.

use crate::model::{FieldKind, Guid, NodeId};

/// A field value held by a graph node.
///
/// Object references point into the owning [`Graph`](crate::model::Graph)
/// arena, so cycles and shared references are plain `NodeId` copies.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Byte(u8),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Guid(Guid),
    Text(String),
    Bytes(Vec<u8>),
    /// Reference to another node; `None` is a null reference.
    Object(Option<NodeId>),
    /// Ordered items, each an inline value, an object or a nested collection.
    Collection(Vec<Value>),
}

impl Value {
    /// Returns the field kind this value encodes as.
    pub fn kind(&self) -> FieldKind {
        match self {
            Value::Bool(_) => FieldKind::Bool,
            Value::Byte(_) => FieldKind::Byte,
            Value::Int32(_) => FieldKind::Int32,
            Value::Int64(_) => FieldKind::Int64,
            Value::Float64(_) => FieldKind::Float64,
            Value::Guid(_) => FieldKind::Guid,
            Value::Text(_) => FieldKind::Text,
            Value::Bytes(_) => FieldKind::Bytes,
            Value::Object(_) => FieldKind::Object,
            Value::Collection(_) => FieldKind::Collection,
        }
    }

    /// Convenience constructor for a text value.
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// Convenience constructor for a non-null object reference.
    pub fn object(node: NodeId) -> Self {
        Value::Object(Some(node))
    }

    /// Returns the referenced node, if this is a non-null object reference.
    pub fn as_object(&self) -> Option<NodeId> {
        match self {
            Value::Object(node) => *node,
            _ => None,
        }
    }

    /// Returns the items, if this is a collection.
    pub fn as_collection(&self) -> Option<&[Value]> {
        match self {
            Value::Collection(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the string, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Encoding used for text payloads in the binary format.
///
/// Each text payload records the encoding it was written with, so readers
/// accept either regardless of how they are configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum TextEncoding {
    #[default]
    Utf8 = 0,
    /// Little-endian UTF-16.
    Utf16 = 1,
}

impl TextEncoding {
    /// Creates a TextEncoding from its wire representation.
    pub fn from_u8(v: u8) -> Option<TextEncoding> {
        match v {
            0 => Some(TextEncoding::Utf8),
            1 => Some(TextEncoding::Utf16),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_kinds() {
        assert_eq!(Value::Bool(true).kind(), FieldKind::Bool);
        assert_eq!(Value::text("x").kind(), FieldKind::Text);
        assert_eq!(Value::Object(None).kind(), FieldKind::Object);
        assert_eq!(Value::Collection(vec![]).kind(), FieldKind::Collection);
    }

    #[test]
    fn test_accessors() {
        let node = NodeId(3);
        assert_eq!(Value::object(node).as_object(), Some(node));
        assert_eq!(Value::Object(None).as_object(), None);
        assert_eq!(Value::text("hi").as_text(), Some("hi"));
        assert_eq!(
            Value::Collection(vec![Value::Int32(1)]).as_collection().map(<[Value]>::len),
            Some(1)
        );
    }

    #[test]
    fn test_text_encoding_wire() {
        assert_eq!(TextEncoding::from_u8(0), Some(TextEncoding::Utf8));
        assert_eq!(TextEncoding::from_u8(1), Some(TextEncoding::Utf16));
        assert_eq!(TextEncoding::from_u8(2), None);
        assert_eq!(TextEncoding::default(), TextEncoding::Utf8);
    }
}
