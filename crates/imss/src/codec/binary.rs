//! Binary stream encoding and decoding (`IMSS0100BIN`).
//!
//! The writer walks the graph depth-first from the root. Each object is
//! registered in the object catalog before its fields are visited, so a
//! cycle or a shared reference turns into a Reference block instead of a
//! second Definition. Type declarations are emitted immediately before the
//! first block that uses them.
//!
//! The reader makes a single forward pass. References to object ids not yet
//! defined allocate placeholder nodes that the Definition fills in place.

use rustc_hash::FxHashSet;

use crate::catalog::{ObjectCatalog, ObjectId, ObjectTable, TypeCatalog, TypeDeclaration, TypeId};
use crate::codec::field::{decode_scalar, encode_scalar};
use crate::codec::integrity::{append_trailer, split_trailer};
use crate::codec::primitives::{RawBlock, Reader, Writer};
use crate::codec::{DecodeStats, Decoded, check_header, check_stream_size};
use crate::error::{DecodeError, EncodeError};
use crate::grammar::{BlockTag, HEADER_LEN, MIXED_ITEMS, MODE_DEFINITION, MODE_REFERENCE, StreamKind};
use crate::limits::{MAX_COLLECTION_LEN, MAX_DEPTH, MAX_FIELDS_PER_TYPE, MAX_STRING_LEN};
use crate::model::{
    FieldDef, FieldId, FieldKind, Graph, GraphSource, Guid, NodeId, TextEncoding, TypeDescriptor,
    Value,
};

// =============================================================================
// ENCODING
// =============================================================================

/// Options for binary encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Encoding used for text payloads.
    ///
    /// Every text payload records its encoding, so readers decode either
    /// one regardless of this setting.
    pub text_encoding: TextEncoding,
}

impl EncodeOptions {
    /// Creates default options (UTF-8 text).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options that write text payloads as UTF-16LE.
    pub fn utf16() -> Self {
        Self {
            text_encoding: TextEncoding::Utf16,
        }
    }
}

/// Encodes the graph reachable from `root` as a binary stream.
pub fn encode_graph<S: GraphSource + ?Sized>(source: &S, root: NodeId) -> Result<Vec<u8>, EncodeError> {
    encode_graph_with_options(source, root, EncodeOptions::default())
}

/// Encodes the graph reachable from `root` with custom options.
#[tracing::instrument(level = "debug", skip_all, fields(root = root.0))]
pub fn encode_graph_with_options<S: GraphSource + ?Sized>(
    source: &S,
    root: NodeId,
    options: EncodeOptions,
) -> Result<Vec<u8>, EncodeError> {
    tracing::debug!(?options, "encoding binary stream");

    let mut encoder = GraphEncoder::new(source, options);
    encoder.writer.write_bytes(&StreamKind::Binary.header());
    encoder.encode_object(root)?;

    let types = encoder.types.len();
    let objects = encoder.objects.len();
    let mut bytes = encoder.writer.into_bytes();
    append_trailer(&mut bytes);

    tracing::debug!(types, objects, len = bytes.len(), "encoded binary stream");
    Ok(bytes)
}

/// Depth-first writer state for one encode call.
struct GraphEncoder<'g, S: ?Sized> {
    source: &'g S,
    types: TypeCatalog,
    objects: ObjectCatalog,
    writer: Writer,
    options: EncodeOptions,
    depth: usize,
}

impl<'g, S: GraphSource + ?Sized> GraphEncoder<'g, S> {
    fn new(source: &'g S, options: EncodeOptions) -> Self {
        Self {
            source,
            types: TypeCatalog::new(),
            objects: ObjectCatalog::new(),
            writer: Writer::with_capacity(1024),
            options,
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

    /// Writes every declaration queued since the last flush.
    fn flush_declarations(&mut self) -> Result<(), EncodeError> {
        for type_id in self.types.take_pending() {
            if let Some(declaration) = self.types.get(type_id) {
                write_type_declaration(&mut self.writer, declaration)?;
            }
        }
        Ok(())
    }

    fn encode_object(&mut self, node: NodeId) -> Result<(), EncodeError> {
        self.enter()?;
        let (identity, descriptor) = describe(self.source, node)?;
        let type_id = self.types.get_or_declare(descriptor)?;
        self.flush_declarations()?;
        let registration = self.objects.register(identity, type_id)?;

        let mark = self.writer.begin_block(BlockTag::ObjectInstance);
        if registration.is_new {
            tracing::trace!(object_id = registration.object_id, type_id, %identity, "definition");
            self.writer.write_byte(MODE_DEFINITION);
            self.writer.write_varint(type_id as u64);
            self.writer.write_varint(registration.object_id as u64);
            self.writer.write_guid(&identity);
            self.writer.write_varint(descriptor.fields.len() as u64);
            for field in &descriptor.fields {
                let value = field_value(self.source, node, identity, type_id, field)?;
                let field_mark = self.writer.begin_block(BlockTag::FieldValue);
                self.writer.write_varint(field.id.0 as u64);
                self.writer.write_byte(field.kind as u8);
                self.encode_payload(value)?;
                self.writer.end_block(field_mark)?;
            }
        } else {
            tracing::trace!(object_id = registration.object_id, "reference");
            self.writer.write_byte(MODE_REFERENCE);
            self.writer.write_varint(registration.type_id as u64);
            self.writer.write_varint(registration.object_id as u64);
        }
        self.writer.end_block(mark)?;

        self.leave();
        Ok(())
    }

    fn encode_payload(&mut self, value: &'g Value) -> Result<(), EncodeError> {
        match value {
            // An empty slot is a null reference.
            Value::Object(None) => Ok(()),
            Value::Object(Some(node)) => self.encode_object(*node),
            Value::Collection(items) => self.encode_collection(items),
            scalar => encode_scalar(&mut self.writer, scalar, self.options.text_encoding),
        }
    }

    fn encode_collection(&mut self, items: &'g [Value]) -> Result<(), EncodeError> {
        self.enter()?;
        if items.len() > MAX_COLLECTION_LEN {
            return Err(EncodeError::LengthExceedsLimit {
                field: "collection",
                len: items.len(),
                max: MAX_COLLECTION_LEN,
            });
        }
        let (item_kind, item_type_id) = collection_header(self.source, &mut self.types, &self.objects, items)?;
        self.flush_declarations()?;

        let mark = self.writer.begin_block(BlockTag::ObjectCollection);
        self.writer.write_byte(item_kind);
        self.writer.write_varint(item_type_id as u64);
        self.writer.write_varint(items.len() as u64);
        for item in items {
            let item_mark = self.writer.begin_block(BlockTag::CollectionItem);
            self.writer.write_byte(item.kind() as u8);
            self.encode_payload(item)?;
            self.writer.end_block(item_mark)?;
        }
        self.writer.end_block(mark)?;

        self.leave();
        Ok(())
    }
}

/// Looks up a node's identity and the descriptor of its type.
pub(crate) fn describe<S: GraphSource + ?Sized>(
    source: &S,
    node: NodeId,
) -> Result<(Guid, &TypeDescriptor), EncodeError> {
    let identity = source.identity(node).ok_or(EncodeError::UnknownNode { node })?;
    let type_name = source.type_name(node).ok_or(EncodeError::UnknownNode { node })?;
    let descriptor = source
        .describe(type_name)
        .ok_or_else(|| EncodeError::MissingDescriptor {
            type_name: type_name.to_string(),
        })?;
    Ok((identity, descriptor))
}

/// Fetches a field value and checks it against the declared kind.
pub(crate) fn field_value<'s, S: GraphSource + ?Sized>(
    source: &'s S,
    node: NodeId,
    identity: Guid,
    type_id: TypeId,
    field: &FieldDef,
) -> Result<&'s Value, EncodeError> {
    let value = source.field(node, field.id).ok_or(EncodeError::MissingField {
        identity,
        type_id,
        field_id: field.id,
    })?;
    if value.kind() != field.kind {
        return Err(EncodeError::KindMismatch {
            type_id,
            field_id: field.id,
            declared: field.kind,
            found: value.kind(),
        });
    }
    Ok(value)
}

/// Computes the item kind and item type id of a collection header.
///
/// The item kind is [`MIXED_ITEMS`] unless every item has the same kind. For
/// object items the item type is non-zero only when every non-null item has
/// the same type; that type is declared here so it precedes the collection
/// block. An item already registered keeps the type it was defined with.
pub(crate) fn collection_header<S: GraphSource + ?Sized>(
    source: &S,
    types: &mut TypeCatalog,
    objects: &ObjectCatalog,
    items: &[Value],
) -> Result<(u8, TypeId), EncodeError> {
    let Some(first) = items.first() else {
        return Ok((MIXED_ITEMS, 0));
    };
    let kind = first.kind();
    if items.iter().any(|item| item.kind() != kind) {
        return Ok((MIXED_ITEMS, 0));
    }
    if kind != FieldKind::Object {
        return Ok((kind as u8, 0));
    }

    let mut item_type = None;
    for node in items.iter().filter_map(Value::as_object) {
        let (identity, descriptor) = describe(source, node)?;
        let type_id = match objects.type_of(&identity) {
            Some(type_id) => type_id,
            None => types.get_or_declare(descriptor)?,
        };
        match item_type {
            None => item_type = Some(type_id),
            Some(seen) if seen == type_id => {}
            Some(_) => return Ok((kind as u8, 0)),
        }
    }
    Ok((kind as u8, item_type.unwrap_or(0)))
}

fn write_type_declaration(writer: &mut Writer, declaration: &TypeDeclaration) -> Result<(), EncodeError> {
    let descriptor = &declaration.descriptor;
    let mark = writer.begin_block(BlockTag::TypeDeclaration);
    writer.write_varint(declaration.type_id as u64);
    writer.write_string(&descriptor.name, "type name")?;
    writer.write_varint(descriptor.fields.len() as u64);
    for field in &descriptor.fields {
        writer.write_varint(field.id.0 as u64);
        writer.write_string(&field.name, "field name")?;
        writer.write_byte(field.kind as u8);
    }
    writer.end_block(mark)
}

// =============================================================================
// DECODING
// =============================================================================

/// Decodes a binary stream.
///
/// The header and the trailer (marker and integrity tag) are verified before
/// the body is parsed. The whole body must be consumed; reserved block tags
/// the reader does not know are skipped.
#[tracing::instrument(level = "debug", skip_all, fields(len = input.len()))]
pub fn decode_graph(input: &[u8]) -> Result<Decoded, DecodeError> {
    check_stream_size(input)?;
    check_header(input, StreamKind::Binary)?;
    let (content, integrity_tag) = split_trailer(input)?;

    let mut body = Reader::with_offset(&content[HEADER_LEN..], HEADER_LEN);
    let mut decoder = GraphDecoder::new();
    let root = match decoder.next_primary(&mut body, BlockTag::ObjectInstance)? {
        Some(block) => decoder.read_instance(block)?.0,
        None => {
            return Err(DecodeError::Malformed {
                context: "root object",
                offset: HEADER_LEN,
            });
        }
    };
    decoder.finish_body(&mut body)?;
    if let Some((object_id, offset)) = decoder.objects.first_unresolved() {
        return Err(DecodeError::UnresolvedReference { object_id, offset });
    }

    let mut stats = decoder.stats;
    stats.integrity_tag = integrity_tag;
    tracing::debug!(
        types = stats.type_declarations,
        definitions = stats.definitions,
        references = stats.references,
        skipped = stats.skipped_blocks,
        "decoded binary stream"
    );
    Ok(Decoded {
        graph: decoder.graph,
        root,
        stats,
    })
}

struct GraphDecoder {
    types: TypeCatalog,
    objects: ObjectTable,
    graph: Graph,
    stats: DecodeStats,
    depth: usize,
}

impl GraphDecoder {
    fn new() -> Self {
        Self {
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

    fn skip_unknown(&mut self, block: &RawBlock<'_>) {
        self.stats.skipped_blocks += 1;
        tracing::warn!(
            tag = block.tag,
            offset = block.offset,
            len = block.payload.remaining_len(),
            "skipping unknown block"
        );
    }

    /// Reads a slot: declarations, then one block of kind `want`.
    ///
    /// Returns `None` for an empty slot (null). Unknown blocks are skipped.
    fn next_primary<'a>(
        &mut self,
        reader: &mut Reader<'a>,
        want: BlockTag,
    ) -> Result<Option<RawBlock<'a>>, DecodeError> {
        let mut declared = false;
        while !reader.is_empty() {
            let block = reader.read_block()?;
            match block.kind() {
                Some(BlockTag::TypeDeclaration) => {
                    self.read_type_declaration(block)?;
                    declared = true;
                }
                Some(tag) if tag == want => return Ok(Some(block)),
                Some(tag) => {
                    return Err(DecodeError::UnexpectedBlock {
                        expected: want.name(),
                        found: tag.name(),
                        offset: block.offset,
                    });
                }
                None => self.skip_unknown(&block),
            }
        }
        if declared {
            return Err(DecodeError::UnexpectedEof {
                context: want.name(),
                offset: reader.position(),
            });
        }
        Ok(None)
    }

    /// Consumes what follows the root slot: only unknown blocks may remain.
    fn finish_body(&mut self, reader: &mut Reader<'_>) -> Result<(), DecodeError> {
        while !reader.is_empty() {
            let block = reader.read_block()?;
            match block.kind() {
                None => self.skip_unknown(&block),
                Some(_) => {
                    return Err(DecodeError::TrailingBytes {
                        context: "root object",
                        len: reader.remaining_len() + (reader.position() - block.offset),
                        offset: block.offset,
                    });
                }
            }
        }
        Ok(())
    }

    fn read_type_declaration(&mut self, block: RawBlock<'_>) -> Result<(), DecodeError> {
        let mut p = block.payload;
        let type_id = p.read_id("type id")?;
        let name = p.read_string(MAX_STRING_LEN, "type name")?;
        let field_count = p.read_count(MAX_FIELDS_PER_TYPE, "field count")?;
        let mut descriptor = TypeDescriptor::new(name);
        for _ in 0..field_count {
            let field_id = read_field_id(&mut p)?;
            let field_name = p.read_string(MAX_STRING_LEN, "field name")?;
            let kind = read_kind(&mut p)?;
            descriptor = descriptor.field(field_id.0, field_name, kind);
        }
        p.expect_end("type declaration")?;

        self.types.declare(
            TypeDeclaration {
                type_id,
                descriptor: descriptor.clone(),
            },
            block.offset,
        )?;
        self.graph.register_type(descriptor);
        self.stats.type_declarations += 1;
        Ok(())
    }

    /// Reads an Object-Instance block, returning the node and its type id.
    fn read_instance(&mut self, block: RawBlock<'_>) -> Result<(NodeId, TypeId), DecodeError> {
        let offset = block.offset;
        let mut p = block.payload;
        let mode_offset = p.position();
        let mode = p.read_byte("instance mode")?;
        let type_offset = p.position();
        let type_id = p.read_id("type id")?;
        let object_id = p.read_id("object id")?;
        let type_name = self.types.resolve(type_id, type_offset)?.descriptor.name.clone();

        match mode {
            MODE_REFERENCE => {
                p.expect_end("reference")?;
                tracing::trace!(object_id, type_id, "reference");
                let node = self
                    .objects
                    .reference(&mut self.graph, object_id, type_id, &type_name, offset)?;
                self.stats.references += 1;
                Ok((node, type_id))
            }
            MODE_DEFINITION => {
                self.enter(offset)?;
                let identity = p.read_guid("identity")?;
                tracing::trace!(object_id, type_id, %identity, "definition");
                let node = self.objects.define(
                    &mut self.graph,
                    object_id,
                    identity,
                    type_id,
                    &type_name,
                    offset,
                )?;
                self.stats.definitions += 1;
                self.read_fields(&mut p, node, type_id, object_id, offset)?;
                self.leave();
                Ok((node, type_id))
            }
            mode => Err(DecodeError::InvalidMode {
                context: "object instance",
                mode,
                offset: mode_offset,
            }),
        }
    }

    fn read_fields(
        &mut self,
        p: &mut Reader<'_>,
        node: NodeId,
        type_id: TypeId,
        object_id: ObjectId,
        offset: usize,
    ) -> Result<(), DecodeError> {
        let expected = self
            .types
            .get(type_id)
            .map_or(0, |declaration| declaration.descriptor.fields.len());
        let count = p.read_count(MAX_FIELDS_PER_TYPE, "field count")?;
        if count != expected {
            return Err(DecodeError::FieldCountMismatch {
                type_id,
                expected,
                found: count,
                offset,
            });
        }

        let mut seen = FxHashSet::default();
        while !p.is_empty() {
            let block = p.read_block()?;
            match block.kind() {
                Some(BlockTag::FieldValue) => {
                    let field_offset = block.offset;
                    let (field_id, value) = self.read_field_value(block, type_id)?;
                    if !seen.insert(field_id) {
                        return Err(DecodeError::Malformed {
                            context: "repeated field value",
                            offset: field_offset,
                        });
                    }
                    if let Some(target) = self.graph.node_mut(node) {
                        target.set(field_id, value);
                    }
                }
                Some(tag) => {
                    return Err(DecodeError::UnexpectedBlock {
                        expected: BlockTag::FieldValue.name(),
                        found: tag.name(),
                        offset: block.offset,
                    });
                }
                None => self.skip_unknown(&block),
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
        tracing::trace!(object_id, fields = seen.len(), "definition complete");
        Ok(())
    }

    fn read_field_value(
        &mut self,
        block: RawBlock<'_>,
        type_id: TypeId,
    ) -> Result<(FieldId, Value), DecodeError> {
        let mut p = block.payload;
        let field_offset = p.position();
        let field_id = read_field_id(&mut p)?;
        let declared = self
            .types
            .get(type_id)
            .and_then(|declaration| declaration.descriptor.field_by_id(field_id))
            .map(|field| field.kind)
            .ok_or_else(|| DecodeError::UnknownField {
                type_id,
                field: field_id.to_string(),
                offset: field_offset,
            })?;
        let kind_offset = p.position();
        let kind = read_kind(&mut p)?;
        if kind != declared {
            return Err(DecodeError::KindMismatch {
                type_id,
                field_id,
                declared,
                found: kind,
                offset: kind_offset,
            });
        }
        let value = self.read_payload(&mut p, kind)?;
        p.expect_end("field value")?;
        Ok((field_id, value))
    }

    fn read_payload(&mut self, p: &mut Reader<'_>, kind: FieldKind) -> Result<Value, DecodeError> {
        match kind {
            FieldKind::Object => Ok(Value::Object(self.read_object_slot(p)?.map(|(node, _)| node))),
            FieldKind::Collection => {
                let offset = p.position();
                match self.next_primary(p, BlockTag::ObjectCollection)? {
                    Some(block) => Ok(Value::Collection(self.read_collection(block)?)),
                    None => Err(DecodeError::Malformed {
                        context: "empty collection slot",
                        offset,
                    }),
                }
            }
            scalar => decode_scalar(p, scalar),
        }
    }

    fn read_object_slot(&mut self, p: &mut Reader<'_>) -> Result<Option<(NodeId, TypeId)>, DecodeError> {
        match self.next_primary(p, BlockTag::ObjectInstance)? {
            Some(block) => self.read_instance(block).map(Some),
            None => Ok(None),
        }
    }

    fn read_collection(&mut self, block: RawBlock<'_>) -> Result<Vec<Value>, DecodeError> {
        let offset = block.offset;
        self.enter(offset)?;
        let mut p = block.payload;
        let kind_offset = p.position();
        let kind_byte = p.read_byte("item kind")?;
        let item_kind = if kind_byte == MIXED_ITEMS {
            None
        } else {
            Some(FieldKind::from_u8(kind_byte).ok_or(DecodeError::InvalidKind {
                kind: kind_byte,
                offset: kind_offset,
            })?)
        };
        let type_offset = p.position();
        let item_type_id = p.read_id("item type id")?;
        if item_type_id != 0 {
            self.types.resolve(item_type_id, type_offset)?;
            if item_kind != Some(FieldKind::Object) {
                return Err(DecodeError::Malformed {
                    context: "item type on non-object collection",
                    offset: type_offset,
                });
            }
        }
        let count = p.read_count(MAX_COLLECTION_LEN, "collection length")?;

        let mut items = Vec::with_capacity(count.min(1024));
        while !p.is_empty() {
            let block = p.read_block()?;
            match block.kind() {
                Some(BlockTag::CollectionItem) => {
                    let item = self.read_item(block, item_kind, item_type_id)?;
                    items.push(item);
                }
                Some(tag) => {
                    return Err(DecodeError::UnexpectedBlock {
                        expected: BlockTag::CollectionItem.name(),
                        found: tag.name(),
                        offset: block.offset,
                    });
                }
                None => self.skip_unknown(&block),
            }
        }
        if items.len() != count {
            return Err(DecodeError::Malformed {
                context: "collection item count",
                offset,
            });
        }

        self.stats.collections += 1;
        self.leave();
        Ok(items)
    }

    fn read_item(
        &mut self,
        block: RawBlock<'_>,
        item_kind: Option<FieldKind>,
        item_type_id: TypeId,
    ) -> Result<Value, DecodeError> {
        let offset = block.offset;
        let mut p = block.payload;
        let kind = read_kind(&mut p)?;
        match item_kind {
            Some(declared) if declared != kind => {
                return Err(DecodeError::ItemKindMismatch {
                    declared: declared.name(),
                    found: kind,
                    offset,
                });
            }
            _ => {}
        }

        let value = if kind == FieldKind::Object {
            match self.read_object_slot(&mut p)? {
                Some((node, type_id)) => {
                    if item_type_id != 0 && type_id != item_type_id {
                        return Err(DecodeError::ItemTypeMismatch {
                            expected: item_type_id,
                            found: type_id,
                            offset,
                        });
                    }
                    Value::Object(Some(node))
                }
                None => Value::Object(None),
            }
        } else {
            self.read_payload(&mut p, kind)?
        };
        p.expect_end("collection item")?;
        self.stats.items += 1;
        Ok(value)
    }
}

fn read_field_id(p: &mut Reader<'_>) -> Result<FieldId, DecodeError> {
    let offset = p.position();
    let raw = p.read_id("field id")?;
    u16::try_from(raw)
        .map(FieldId)
        .map_err(|_| DecodeError::VarintOverflow { offset })
}

fn read_kind(p: &mut Reader<'_>) -> Result<FieldKind, DecodeError> {
    let offset = p.position();
    let kind = p.read_byte("field kind")?;
    FieldKind::from_u8(kind).ok_or(DecodeError::InvalidKind { kind, offset })
}
