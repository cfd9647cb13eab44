//! Data model for IMSS object graphs.
//!
//! This module contains the types the engine reads from and builds:
//! - Identities (128-bit GUIDs)
//! - Field descriptors and the schema registry
//! - Field values
//! - The graph arena and the `GraphSource` capability

pub mod graph;
pub mod id;
pub mod schema;
pub mod value;

pub use graph::{Graph, GraphSource, Node, NodeId};
pub use id::{format_guid, new_identity, parse_guid, Guid, NIL_GUID};
pub use schema::{FieldDef, FieldId, FieldKind, SchemaRegistry, TypeDescriptor};
pub use value::{TextEncoding, Value};
