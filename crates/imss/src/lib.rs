//! IMSS: self-describing serialization for cyclic object graphs.
//!
//! This crate turns a graph of typed objects into a byte stream and back,
//! keeping object identity, shared references and cycles intact. The stream
//! carries its own type declarations, so a reader needs no schema up front.
//!
//! # Overview
//!
//! - **Self-describing**: each type is declared once, the first time it is
//!   used, with its name and field list
//! - **Identity-preserving**: an object reachable along several paths is
//!   written once and referenced afterwards; cycles terminate naturally
//! - **Two encodings**: a compact binary form and a line-oriented text form
//!   that share one grammar and one integrity trailer
//!
//! # Quick Start
//!
//! ```rust
//! use imss::{FieldKind, Graph, TypeDescriptor, Value, decode_graph, encode_graph, new_identity};
//!
//! let mut graph = Graph::new();
//! graph.register_type(
//!     TypeDescriptor::new("Person")
//!         .field(1, "Name", FieldKind::Text)
//!         .field(2, "Friend", FieldKind::Object),
//! );
//! let alice = graph.add_object(new_identity(), "Person");
//! let bob = graph.add_object(new_identity(), "Person");
//! graph.set(alice, "Name", Value::text("Alice"));
//! graph.set(alice, "Friend", Value::object(bob));
//! graph.set(bob, "Name", Value::text("Bob"));
//! graph.set(bob, "Friend", Value::object(alice));
//!
//! let bytes = encode_graph(&graph, alice).unwrap();
//! let decoded = decode_graph(&bytes).unwrap();
//!
//! let root = decoded.root;
//! let friend = decoded.graph.get(root, "Friend").and_then(Value::as_object).unwrap();
//! let back = decoded.graph.get(friend, "Friend").and_then(Value::as_object).unwrap();
//! assert_eq!(back, root);
//! ```
//!
//! # Modules
//!
//! - [`model`]: Identities, type descriptors, values and the graph arena
//! - [`codec`]: Binary and text encoders/decoders
//! - [`catalog`]: Per-stream type and object id catalogs
//! - [`grammar`]: Header, block tags and other wire constants
//! - [`error`]: Error types
//! - [`limits`]: Security limits for decoding
//!
//! # Security
//!
//! The decoders treat their input as untrusted:
//! - Every length, count and nesting depth is checked against [`limits`]
//! - The trailer's integrity tag is verified before the body is parsed
//! - Invalid data is rejected with an offset-carrying error; no partial
//!   graph is ever returned
//!
//! # Wire Format
//!
//! A stream is an 11-byte header (`IMSS0100BIN` or `IMSS0100TXT`), a body,
//! and a trailer `\[END]` followed by 16 hex digits of SHA-256 over
//! everything before it. [`decode_stream`] detects the encoding from the
//! header.

pub mod catalog;
pub mod codec;
pub mod error;
pub mod grammar;
pub mod limits;
pub mod model;

#[cfg(test)]
mod testing;

// Re-export commonly used types at crate root
pub use codec::{
    DecodeStats, Decoded, EncodeOptions, decode_graph, decode_graph_text, decode_stream,
    encode_graph, encode_graph_text, encode_graph_with_options, read_graph, write_graph,
};
pub use error::{DecodeError, EncodeError, ErrorKind};
pub use grammar::{FORMAT_VERSION, StreamKind};
pub use model::{
    FieldDef, FieldId, FieldKind, Graph, GraphSource, Guid, Node, NodeId, SchemaRegistry,
    TextEncoding, TypeDescriptor, Value, format_guid, new_identity, parse_guid, NIL_GUID,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_version_matches_header() {
        assert_eq!(FORMAT_VERSION, b"0100");
        assert_eq!(&StreamKind::Binary.header()[4..8], FORMAT_VERSION);
    }
}
