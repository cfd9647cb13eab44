//! Text stream encoding and decoding (`IMSS0100TXT`).
//!
//! The text encoding carries the same blocks as the binary one, one per line:
//!
//! ```text
//! IMSS0100TXT
//! @1~A~1:X:object
//! 0190b4c6-9d3e-7a1c-8f00-4f5d3c2b1a00
//! {
//! $1~1
//! X=$1~1
//! }
//! \[END]5f0c1e2d3a4b6978
//! ```
//!
//! Field lines are `Name=value`; collection items are `%kind=value`. An
//! object value is `null`, a `$type~object` reference, or empty when a
//! nested definition follows on the next lines. Delimiters inside names and
//! values are backslash-escaped (see [`escape_value`](crate::codec::field::escape_value)
//! and [`escape_name`](crate::codec::field::escape_name)).

use std::fmt::Write as _;

use rustc_hash::FxHashSet;

use crate::catalog::{ObjectCatalog, ObjectId, ObjectTable, TypeCatalog, TypeDeclaration, TypeId};
use crate::codec::binary::{collection_header, describe, field_value};
use crate::codec::field::{
    escape_name, find_unescaped, parse_scalar, render_scalar, split_unescaped, unescape,
};
use crate::codec::integrity::{append_trailer, split_trailer};
use crate::codec::{DecodeStats, Decoded, check_header, check_stream_size};
use crate::error::{DecodeError, EncodeError};
use crate::grammar::{HEADER_LEN, MIXED_ITEMS_NAME, NULL_LITERAL, StreamKind};
use crate::limits::{MAX_COLLECTION_LEN, MAX_DEPTH, MAX_FIELDS_PER_TYPE};
use crate::model::{
    FieldId, FieldKind, Graph, GraphSource, NodeId, TypeDescriptor, Value, format_guid, parse_guid,
};

// =============================================================================
// ENCODING
// =============================================================================

/// Encodes the graph reachable from `root` as a text stream.
#[tracing::instrument(level = "debug", skip_all, fields(root = root.0))]
pub fn encode_graph_text<S: GraphSource + ?Sized>(source: &S, root: NodeId) -> Result<Vec<u8>, EncodeError> {
    tracing::debug!("encoding text stream");

    let mut encoder = TextEncoder::new(source);
    encoder
        .out
        .extend(StreamKind::Text.header().iter().map(|&b| char::from(b)));
    encoder.out.push('\n');
    encoder.write_object(root, None)?;

    let types = encoder.types.len();
    let objects = encoder.objects.len();
    let mut bytes = encoder.out.into_bytes();
    append_trailer(&mut bytes);

    tracing::debug!(types, objects, len = bytes.len(), "encoded text stream");
    Ok(bytes)
}

struct TextEncoder<'g, S: ?Sized> {
    source: &'g S,
    types: TypeCatalog,
    objects: ObjectCatalog,
    out: String,
    depth: usize,
}

impl<'g, S: GraphSource + ?Sized> TextEncoder<'g, S> {
    fn new(source: &'g S) -> Self {
        Self {
            source,
            types: TypeCatalog::new(),
            objects: ObjectCatalog::new(),
            out: String::with_capacity(1024),
            depth: 0,
        }
    }

    fn enter(&mut self) -> Result<(), EncodeError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(EncodeError::NestingTooDeep { max: MAX_DEPTH });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn line(&mut self, parts: &[&str]) {
        for part in parts {
            self.out.push_str(part);
        }
        self.out.push('\n');
    }

    fn flush_declarations(&mut self) {
        for type_id in self.types.take_pending() {
            if let Some(declaration) = self.types.get(type_id) {
                write_type_declaration(&mut self.out, declaration);
            }
        }
    }

    /// Writes an object slot. `prefix` is the field or item prefix
    /// (`Name=`, `%object=`); the root has none.
    fn write_object(&mut self, node: NodeId, prefix: Option<&str>) -> Result<(), EncodeError> {
        let (identity, descriptor) = describe(self.source, node)?;
        let type_id = self.types.get_or_declare(descriptor)?;
        let registration = self.objects.register(identity, type_id)?;

        if !registration.is_new {
            tracing::trace!(object_id = registration.object_id, "reference");
            self.flush_declarations();
            let reference = instance_line(registration.type_id, registration.object_id);
            self.line(&[prefix.unwrap_or_default(), &reference]);
            return Ok(());
        }

        self.enter()?;
        tracing::trace!(object_id = registration.object_id, type_id, %identity, "definition");
        if let Some(prefix) = prefix {
            self.line(&[prefix]);
        }
        self.flush_declarations();
        self.line(&[&format_guid(&identity)]);
        self.line(&["{"]);
        self.line(&[&instance_line(type_id, registration.object_id)]);
        for field in &descriptor.fields {
            let value = field_value(self.source, node, identity, type_id, field)?;
            let mut prefix = String::with_capacity(field.name.len() + 1);
            escape_name(&field.name, &mut prefix);
            prefix.push('=');
            self.write_value(&prefix, value)?;
        }
        self.line(&["}"]);
        self.leave();
        Ok(())
    }

    fn write_value(&mut self, prefix: &str, value: &'g Value) -> Result<(), EncodeError> {
        match value {
            Value::Object(None) => self.line(&[prefix, NULL_LITERAL]),
            Value::Object(Some(node)) => self.write_object(*node, Some(prefix))?,
            Value::Collection(items) => self.write_collection(prefix, items)?,
            scalar => self.line(&[prefix, &render_scalar(scalar)?]),
        }
        Ok(())
    }

    fn write_collection(&mut self, prefix: &str, items: &'g [Value]) -> Result<(), EncodeError> {
        self.enter()?;
        if items.len() > MAX_COLLECTION_LEN {
            return Err(EncodeError::LengthExceedsLimit {
                field: "collection",
                len: items.len(),
                max: MAX_COLLECTION_LEN,
            });
        }
        let (item_kind, item_type_id) = collection_header(self.source, &mut self.types, &self.objects, items)?;
        self.flush_declarations();

        let kind_name = match FieldKind::from_u8(item_kind) {
            Some(kind) => kind.name(),
            None => MIXED_ITEMS_NAME,
        };
        let header = format!("#{kind_name}~{item_type_id}~{}", items.len());
        self.line(&[prefix, &header]);
        self.line(&["{"]);
        for item in items {
            let item_prefix = format!("%{}=", item.kind().name());
            self.write_value(&item_prefix, item)?;
        }
        self.line(&["}"]);
        self.leave();
        Ok(())
    }
}

fn instance_line(type_id: TypeId, object_id: ObjectId) -> String {
    format!("${type_id}~{object_id}")
}

fn write_type_declaration(out: &mut String, declaration: &TypeDeclaration) {
    let descriptor = &declaration.descriptor;
    let _ = write!(out, "@{}~", declaration.type_id);
    escape_name(&descriptor.name, out);
    for field in &descriptor.fields {
        let _ = write!(out, "~{}:", field.id);
        escape_name(&field.name, out);
        out.push(':');
        out.push_str(field.kind.name());
    }
    out.push('\n');
}

// =============================================================================
// DECODING
// =============================================================================

/// Decodes a text stream.
///
/// The header and the trailer are verified before the body is parsed; the
/// body must be UTF-8 and every line must end with `\n`.
#[tracing::instrument(level = "debug", skip_all, fields(len = input.len()))]
pub fn decode_graph_text(input: &[u8]) -> Result<Decoded, DecodeError> {
    check_stream_size(input)?;
    check_header(input, StreamKind::Text)?;
    let (content, integrity_tag) = split_trailer(input)?;
    if content.get(HEADER_LEN) != Some(&b'\n') {
        return Err(DecodeError::Malformed {
            context: "header line",
            offset: HEADER_LEN,
        });
    }

    let base = HEADER_LEN + 1;
    let body = std::str::from_utf8(&content[base..]).map_err(|e| DecodeError::InvalidUtf8 {
        field: "text body",
        offset: base + e.valid_up_to(),
    })?;

    let mut decoder = TextDecoder::new(Lines::new(body, base));
    let (root, _) = decoder.read_definition()?;
    if !decoder.lines.is_empty() {
        return Err(DecodeError::TrailingBytes {
            context: "root object",
            len: decoder.lines.remaining_len(),
            offset: decoder.lines.position(),
        });
    }
    if let Some((object_id, offset)) = decoder.objects.first_unresolved() {
        return Err(DecodeError::UnresolvedReference { object_id, offset });
    }

    let mut stats = decoder.stats;
    stats.integrity_tag = integrity_tag;
    tracing::debug!(
        types = stats.type_declarations,
        definitions = stats.definitions,
        references = stats.references,
        "decoded text stream"
    );
    Ok(Decoded {
        graph: decoder.graph,
        root,
        stats,
    })
}

/// Cursor over `\n`-terminated lines with absolute offsets.
struct Lines<'a> {
    body: &'a str,
    pos: usize,
    base: usize,
}

impl<'a> Lines<'a> {
    fn new(body: &'a str, base: usize) -> Self {
        Self { body, pos: 0, base }
    }

    fn position(&self) -> usize {
        self.base + self.pos
    }

    fn remaining_len(&self) -> usize {
        self.body.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.body.len()
    }

    fn peek(&self) -> Option<&'a str> {
        let rest = &self.body[self.pos..];
        if rest.is_empty() {
            return None;
        }
        Some(rest.find('\n').map_or(rest, |end| &rest[..end]))
    }

    /// Takes the next line, returning its offset and text without `\n`.
    fn next(&mut self, context: &'static str) -> Result<(usize, &'a str), DecodeError> {
        let offset = self.position();
        let rest = &self.body[self.pos..];
        if rest.is_empty() {
            return Err(DecodeError::UnexpectedEof { context, offset });
        }
        let end = rest.find('\n').ok_or(DecodeError::Malformed {
            context: "unterminated line",
            offset,
        })?;
        self.pos += end + 1;
        Ok((offset, &rest[..end]))
    }

    fn expect(&mut self, expected: &'static str, context: &'static str) -> Result<(), DecodeError> {
        let (offset, line) = self.next(context)?;
        if line != expected {
            return Err(DecodeError::Malformed { context, offset });
        }
        Ok(())
    }
}

struct TextDecoder<'a> {
    lines: Lines<'a>,
    types: TypeCatalog,
    objects: ObjectTable,
    graph: Graph,
    stats: DecodeStats,
    depth: usize,
}

impl<'a> TextDecoder<'a> {
    fn new(lines: Lines<'a>) -> Self {
        Self {
            lines,
            types: TypeCatalog::new(),
            objects: ObjectTable::new(),
            graph: Graph::new(),
            stats: DecodeStats::default(),
            depth: 0,
        }
    }

    fn enter(&mut self, offset: usize) -> Result<(), DecodeError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(DecodeError::NestingTooDeep {
                max: MAX_DEPTH,
                offset,
            });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Consumes any type declaration lines at the cursor.
    fn read_declarations(&mut self) -> Result<(), DecodeError> {
        while self.lines.peek().is_some_and(|line| line.starts_with('@')) {
            let (offset, line) = self.lines.next("type declaration")?;
            let declaration = parse_type_declaration(line, offset)?;
            let descriptor = declaration.descriptor.clone();
            self.types.declare(declaration, offset)?;
            self.graph.register_type(descriptor);
            self.stats.type_declarations += 1;
        }
        Ok(())
    }

    /// Reads a nested definition: declarations, identity line, brace block.
    fn read_definition(&mut self) -> Result<(NodeId, TypeId), DecodeError> {
        self.read_declarations()?;
        let (offset, line) = self.lines.next("identity line")?;
        let identity = parse_guid(line).ok_or(DecodeError::Malformed {
            context: "identity line",
            offset,
        })?;
        self.lines.expect("{", "definition open")?;
        let (instance_offset, line) = self.lines.next("instance line")?;
        let (type_id, object_id) = parse_instance(line, instance_offset)?;
        let type_name = self
            .types
            .resolve(type_id, instance_offset)?
            .descriptor
            .name
            .clone();

        self.enter(offset)?;
        tracing::trace!(object_id, type_id, %identity, "definition");
        let node = self.objects.define(
            &mut self.graph,
            object_id,
            identity,
            type_id,
            &type_name,
            instance_offset,
        )?;
        self.stats.definitions += 1;
        self.read_fields(node, type_id, offset)?;
        self.leave();
        Ok((node, type_id))
    }

    fn read_fields(&mut self, node: NodeId, type_id: TypeId, offset: usize) -> Result<(), DecodeError> {
        let expected = self
            .types
            .get(type_id)
            .map_or(0, |declaration| declaration.descriptor.fields.len());
        let mut seen: FxHashSet<FieldId> = FxHashSet::default();
        loop {
            self.read_declarations()?;
            let (line_offset, line) = self.lines.next("field line")?;
            if line == "}" {
                break;
            }
            let eq = find_unescaped(line, '=').ok_or(DecodeError::Malformed {
                context: "field line",
                offset: line_offset,
            })?;
            let name = unescape(&line[..eq], line_offset)?;
            let (field_id, kind) = self
                .types
                .get(type_id)
                .and_then(|declaration| declaration.descriptor.field_by_name(&name))
                .map(|field| (field.id, field.kind))
                .ok_or_else(|| DecodeError::UnknownField {
                    type_id,
                    field: name.clone(),
                    offset: line_offset,
                })?;
            if !seen.insert(field_id) {
                return Err(DecodeError::Malformed {
                    context: "repeated field value",
                    offset: line_offset,
                });
            }
            let value = self.read_value(kind, &line[eq + 1..], line_offset + eq + 1)?;
            if let Some(target) = self.graph.node_mut(node) {
                target.set(field_id, value);
            }
        }
        if seen.len() != expected {
            return Err(DecodeError::FieldCountMismatch {
                type_id,
                expected,
                found: seen.len(),
                offset,
            });
        }
        Ok(())
    }

    fn read_value(&mut self, kind: FieldKind, raw: &str, offset: usize) -> Result<Value, DecodeError> {
        match kind {
            FieldKind::Object => Ok(Value::Object(
                self.read_object_value(raw, offset)?.map(|(node, _)| node),
            )),
            FieldKind::Collection => self.read_collection(raw, offset).map(Value::Collection),
            scalar => parse_scalar(scalar, raw, offset),
        }
    }

    fn read_object_value(&mut self, raw: &str, offset: usize) -> Result<Option<(NodeId, TypeId)>, DecodeError> {
        if raw == NULL_LITERAL {
            return Ok(None);
        }
        if raw.is_empty() {
            return self.read_definition().map(Some);
        }
        let (type_id, object_id) = parse_instance(raw, offset)?;
        let type_name = self.types.resolve(type_id, offset)?.descriptor.name.clone();
        tracing::trace!(object_id, type_id, "reference");
        let node = self
            .objects
            .reference(&mut self.graph, object_id, type_id, &type_name, offset)?;
        self.stats.references += 1;
        Ok(Some((node, type_id)))
    }

    fn read_collection(&mut self, raw: &str, offset: usize) -> Result<Vec<Value>, DecodeError> {
        self.enter(offset)?;
        let header = CollectionHeader::parse(raw, offset)?;
        if header.item_type_id != 0 {
            self.types.resolve(header.item_type_id, offset)?;
            if header.item_kind != Some(FieldKind::Object) {
                return Err(DecodeError::Malformed {
                    context: "item type on non-object collection",
                    offset,
                });
            }
        }
        self.lines.expect("{", "collection open")?;

        let mut items = Vec::with_capacity(header.count.min(1024));
        loop {
            self.read_declarations()?;
            let (line_offset, line) = self.lines.next("collection item")?;
            if line == "}" {
                break;
            }
            items.push(self.read_item(&header, line, line_offset)?);
        }
        if items.len() != header.count {
            return Err(DecodeError::Malformed {
                context: "collection item count",
                offset,
            });
        }

        self.stats.collections += 1;
        self.leave();
        Ok(items)
    }

    fn read_item(&mut self, header: &CollectionHeader, line: &str, offset: usize) -> Result<Value, DecodeError> {
        let malformed = DecodeError::Malformed {
            context: "collection item",
            offset,
        };
        let Some(rest) = line.strip_prefix('%') else {
            return Err(malformed);
        };
        let Some(eq) = rest.find('=') else {
            return Err(malformed);
        };
        let kind = FieldKind::from_name(&rest[..eq]).ok_or(malformed)?;
        match header.item_kind {
            Some(declared) if declared != kind => {
                return Err(DecodeError::ItemKindMismatch {
                    declared: declared.name(),
                    found: kind,
                    offset,
                });
            }
            _ => {}
        }

        let raw = &rest[eq + 1..];
        let value_offset = offset + 1 + eq + 1;
        let value = if kind == FieldKind::Object {
            match self.read_object_value(raw, value_offset)? {
                Some((node, type_id)) => {
                    if header.item_type_id != 0 && type_id != header.item_type_id {
                        return Err(DecodeError::ItemTypeMismatch {
                            expected: header.item_type_id,
                            found: type_id,
                            offset,
                        });
                    }
                    Value::Object(Some(node))
                }
                None => Value::Object(None),
            }
        } else {
            self.read_value(kind, raw, value_offset)?
        };
        self.stats.items += 1;
        Ok(value)
    }
}

/// Parsed `#kind~item_type_id~count` value.
struct CollectionHeader {
    item_kind: Option<FieldKind>,
    item_type_id: TypeId,
    count: usize,
}

impl CollectionHeader {
    fn parse(raw: &str, offset: usize) -> Result<Self, DecodeError> {
        let malformed = DecodeError::Malformed {
            context: "collection header",
            offset,
        };
        let Some(rest) = raw.strip_prefix('#') else {
            return Err(malformed);
        };
        let parts: Vec<&str> = rest.split('~').collect();
        let [kind, item_type_id, count] = parts.as_slice() else {
            return Err(malformed);
        };
        let item_kind = if *kind == MIXED_ITEMS_NAME {
            None
        } else {
            Some(FieldKind::from_name(kind).ok_or(DecodeError::Malformed {
                context: "collection item kind",
                offset,
            })?)
        };
        let item_type_id = item_type_id.parse().map_err(|_| DecodeError::Malformed {
            context: "collection item type",
            offset,
        })?;
        let count: usize = count.parse().map_err(|_| DecodeError::Malformed {
            context: "collection count",
            offset,
        })?;
        if count > MAX_COLLECTION_LEN {
            return Err(DecodeError::LengthExceedsLimit {
                field: "collection length",
                len: count,
                max: MAX_COLLECTION_LEN,
                offset,
            });
        }
        Ok(Self {
            item_kind,
            item_type_id,
            count,
        })
    }
}

/// Parses `$type_id~object_id`.
fn parse_instance(line: &str, offset: usize) -> Result<(TypeId, ObjectId), DecodeError> {
    let malformed = || DecodeError::Malformed {
        context: "instance line",
        offset,
    };
    let (type_id, object_id) = line
        .strip_prefix('$')
        .and_then(|rest| rest.split_once('~'))
        .ok_or_else(malformed)?;
    Ok((
        type_id.parse().map_err(|_| malformed())?,
        object_id.parse().map_err(|_| malformed())?,
    ))
}

/// Parses `@tid~Name~fid:Field:kind~...`.
fn parse_type_declaration(line: &str, offset: usize) -> Result<TypeDeclaration, DecodeError> {
    let malformed = || DecodeError::Malformed {
        context: "type declaration",
        offset,
    };
    let body = line.strip_prefix('@').ok_or_else(malformed)?;
    let parts = split_unescaped(body, '~');
    let [type_id, name, fields @ ..] = parts.as_slice() else {
        return Err(malformed());
    };
    let type_id: TypeId = type_id.parse().map_err(|_| malformed())?;
    if fields.len() > MAX_FIELDS_PER_TYPE {
        return Err(DecodeError::LengthExceedsLimit {
            field: "field count",
            len: fields.len(),
            max: MAX_FIELDS_PER_TYPE,
            offset,
        });
    }

    let mut descriptor = TypeDescriptor::new(unescape(name, offset)?);
    for spec in fields {
        let field = split_unescaped(spec, ':');
        let [field_id, field_name, kind] = field.as_slice() else {
            return Err(malformed());
        };
        let field_id: u16 = field_id.parse().map_err(|_| malformed())?;
        let kind = FieldKind::from_name(kind).ok_or_else(malformed)?;
        descriptor = descriptor.field(field_id, unescape(field_name, offset)?, kind);
    }
    Ok(TypeDeclaration {
        type_id,
        descriptor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::grammar::{MIXED_ITEMS, TRAILER_LEN};
    use crate::model::{Guid, new_identity};
    use crate::testing::{arb_specs, assert_isomorphic, build_graph, library, mutual_pair};
    use proptest::prelude::*;

    fn seal(body: &str) -> Vec<u8> {
        let mut bytes = b"IMSS0100TXT\n".to_vec();
        bytes.extend_from_slice(body.as_bytes());
        append_trailer(&mut bytes);
        bytes
    }

    fn without_trailer(bytes: &[u8]) -> &str {
        std::str::from_utf8(&bytes[..bytes.len() - TRAILER_LEN]).unwrap()
    }

    const PAIR_DECL: &str = "@1~Pair~1:First:object~2:Second:object\n@2~Leaf~1:Label:text\n";

    #[test]
    fn test_roundtrip_library() {
        let (graph, root) = library();
        let bytes = encode_graph_text(&graph, root).unwrap();
        let decoded = decode_graph_text(&bytes).unwrap();

        assert_isomorphic(&graph, root, &decoded.graph, decoded.root);
        assert_eq!(decoded.stats.type_declarations, 2);
        assert_eq!(decoded.stats.definitions, 3);
        assert_eq!(decoded.stats.references, 2);
        assert_eq!(decoded.stats.collections, 2);
        assert_eq!(decoded.stats.items, 6);
    }

    #[test]
    fn test_mutual_pair_layout() {
        let (mut graph, a, _, _) = mutual_pair();
        let g1 = Guid::from_u128(0x11);
        let g2 = Guid::from_u128(0x22);
        let b = graph.get(a, "X").and_then(Value::as_object).unwrap();
        graph.node_mut(a).unwrap().identity = g1;
        graph.node_mut(b).unwrap().identity = g2;

        let bytes = encode_graph_text(&graph, a).unwrap();
        let expected = "IMSS0100TXT\n\
                        @1~A~1:X:object\n\
                        00000000-0000-0000-0000-000000000011\n\
                        {\n\
                        $1~1\n\
                        X=\n\
                        @2~B~1:Y:object\n\
                        00000000-0000-0000-0000-000000000022\n\
                        {\n\
                        $2~2\n\
                        Y=$1~1\n\
                        }\n\
                        }\n";
        assert_eq!(without_trailer(&bytes), expected);
        assert!(bytes[bytes.len() - TRAILER_LEN..].starts_with(b"\\[END]"));
        assert!(!bytes.ends_with(b"\n"));

        let decoded = decode_graph_text(&bytes).unwrap();
        let root = decoded.root;
        let other = decoded.graph.get(root, "X").and_then(Value::as_object).unwrap();
        assert_eq!(decoded.graph.node(root).unwrap().identity, g1);
        assert_eq!(decoded.graph.node(other).unwrap().identity, g2);
        assert_eq!(decoded.graph.get(other, "Y"), Some(&Value::object(root)));
    }

    #[test]
    fn test_collection_layout() {
        let (graph, root) = library();
        let bytes = encode_graph_text(&graph, root).unwrap();
        let text = without_trailer(&bytes);
        assert!(text.contains("\nTracks=#object~2~3\n{\n%object=$2~2\n%object=\n"));
        assert!(text.contains("\n%object=null\n}\n"));
        assert!(text.contains("\nTags=#mixed~0~3\n{\n%text=a\\~b\n%int64=7\n%float64=1.5\n}\n"));
        assert!(text.contains("\nName=Sonata \\{No. 1\\}\n"));
        assert!(text.contains("\nTechName=sonata\\~1\\nmain\n"));
    }

    #[test]
    fn test_escaped_names_roundtrip() {
        let mut graph = Graph::new();
        graph.register_type(
            TypeDescriptor::new("Odd~Type{}")
                .field(1, "a=b:c", FieldKind::Text)
                .field(2, "@%$#", FieldKind::Text)
                .field(3, "}", FieldKind::Int32),
        );
        let node = graph.add_object(new_identity(), "Odd~Type{}");
        graph.set(node, "a=b:c", Value::text("}\n{~\\"));
        graph.set(node, "@%$#", Value::text(""));
        graph.set(node, "}", Value::Int32(-5));

        let bytes = encode_graph_text(&graph, node).unwrap();
        let decoded = decode_graph_text(&bytes).unwrap();
        assert_isomorphic(&graph, node, &decoded.graph, decoded.root);
        assert!(decoded.graph.schema().contains("Odd~Type{}"));
    }

    #[test]
    fn test_forward_reference_resolved() {
        let g2 = new_identity();
        let body = format!(
            "{PAIR_DECL}{}\n{{\n$1~1\nFirst=$2~2\nSecond=\n{}\n{{\n$2~2\nLabel=leaf\n}}\n}}\n",
            new_identity(),
            g2
        );
        let decoded = decode_graph_text(&seal(&body)).unwrap();
        let first = decoded.graph.get(decoded.root, "First").and_then(Value::as_object).unwrap();
        let second = decoded.graph.get(decoded.root, "Second").and_then(Value::as_object).unwrap();
        assert_eq!(first, second);
        assert_eq!(decoded.graph.node(first).unwrap().identity, g2);
        assert_eq!(decoded.graph.get(first, "Label"), Some(&Value::text("leaf")));
    }

    #[test]
    fn test_unresolved_reference_rejected() {
        let body = format!("{PAIR_DECL}{}\n{{\n$1~1\nFirst=$2~2\nSecond=null\n}}\n", new_identity());
        let bytes = seal(&body);
        let value_at = bytes.windows(10).position(|w| w == b"First=$2~2").unwrap() + "First=".len();
        assert!(matches!(
            decode_graph_text(&bytes),
            Err(DecodeError::UnresolvedReference { object_id: 2, offset }) if offset == value_at
        ));
    }

    #[test]
    fn test_unknown_field_name() {
        let body = format!("{PAIR_DECL}{}\n{{\n$2~1\nTitle=x\n}}\n", new_identity());
        let err = decode_graph_text(&seal(&body)).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownField { type_id: 2, ref field, .. } if field == "Title"));
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn test_item_kind_mismatch() {
        let body = "@1~Bag~1:Items:collection\n".to_string()
            + &format!("{}\n{{\n$1~1\nItems=#int32~0~1\n{{\n%text=x\n}}\n}}\n", new_identity());
        let err = decode_graph_text(&seal(&body)).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::ItemKindMismatch { declared: "int32", found: FieldKind::Text, .. }
        ));
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn test_missing_field_line() {
        let body = format!("{PAIR_DECL}{}\n{{\n$1~1\nFirst=null\n}}\n", new_identity());
        assert!(matches!(
            decode_graph_text(&seal(&body)),
            Err(DecodeError::FieldCountMismatch { expected: 2, found: 1, .. })
        ));
    }

    #[test]
    fn test_malformed_lines() {
        let identity = new_identity();
        let cases = [
            format!("{PAIR_DECL}{identity}\n$1~1\n}}\n"),
            format!("{PAIR_DECL}not-a-guid\n{{\n$1~1\n}}\n"),
            format!("{PAIR_DECL}{identity}\n{{\n$1-1\n}}\n"),
            format!("{PAIR_DECL}{identity}\n{{\n$1~1\nFirst\n}}\n"),
            format!("@1~Pair~1:First\n{identity}\n{{\n$1~1\n}}\n"),
            format!("{PAIR_DECL}{identity}\n{{\n$1~1\nFirst=null\nSecond=null\n}}"),
        ];
        for body in cases {
            let err = decode_graph_text(&seal(&body)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Format, "{body:?}: {err:?}");
        }
    }

    #[test]
    fn test_invalid_utf8_body() {
        let mut bytes = b"IMSS0100TXT\n\xff\xfe\n".to_vec();
        append_trailer(&mut bytes);
        assert!(matches!(
            decode_graph_text(&bytes),
            Err(DecodeError::InvalidUtf8 { offset: 12, .. })
        ));
    }

    #[test]
    fn test_binary_header_rejected() {
        let (graph, root) = library();
        let bytes = crate::codec::encode_graph(&graph, root).unwrap();
        assert!(matches!(
            decode_graph_text(&bytes),
            Err(DecodeError::UnexpectedKind { expected: "TXT", .. })
        ));
    }

    #[test]
    fn test_altered_trailer_rejected() {
        let (graph, root) = library();
        let mut bytes = encode_graph_text(&graph, root).unwrap();
        let marker_at = bytes.len() - TRAILER_LEN;
        bytes[marker_at + 1] = b'{';
        assert!(matches!(decode_graph_text(&bytes), Err(DecodeError::MissingTrailer { .. })));

        let mut bytes = encode_graph_text(&graph, root).unwrap();
        bytes.push(b'\n');
        assert!(matches!(decode_graph_text(&bytes), Err(DecodeError::MissingTrailer { .. })));
    }

    #[test]
    fn test_type_declaration_parse() {
        let decl = parse_type_declaration("@3~A\\~B~1:x\\:y:int32~2:z:collection", 0).unwrap();
        assert_eq!(decl.type_id, 3);
        assert_eq!(decl.descriptor.name, "A~B");
        assert_eq!(decl.descriptor.fields.len(), 2);
        assert_eq!(decl.descriptor.fields[0].name, "x:y");
        assert_eq!(decl.descriptor.fields[1].kind, FieldKind::Collection);

        let empty = parse_type_declaration("@1~Marker", 0).unwrap();
        assert!(empty.descriptor.fields.is_empty());
        assert!(parse_type_declaration("@x~A", 0).is_err());
        assert!(parse_type_declaration("@1~A~1:x:float", 0).is_err());
    }

    #[test]
    fn test_mixed_marker_matches_binary() {
        assert!(FieldKind::from_u8(MIXED_ITEMS).is_none());
    }

    proptest! {
        #[test]
        fn prop_acyclic_roundtrip(specs in arb_specs()) {
            let (graph, root) = build_graph(&specs);
            let bytes = encode_graph_text(&graph, root).unwrap();
            let decoded = decode_graph_text(&bytes).unwrap();
            assert_isomorphic(&graph, root, &decoded.graph, decoded.root);
        }

        #[test]
        fn prop_binary_and_text_agree(specs in arb_specs()) {
            let (graph, root) = build_graph(&specs);
            let from_text = decode_graph_text(&encode_graph_text(&graph, root).unwrap()).unwrap();
            let from_binary = crate::codec::decode_graph(&crate::codec::encode_graph(&graph, root).unwrap()).unwrap();
            assert_isomorphic(&from_text.graph, from_text.root, &from_binary.graph, from_binary.root);
            prop_assert_eq!(from_text.stats.definitions, from_binary.stats.definitions);
        }
    }
}
