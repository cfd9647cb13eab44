//! Object graph arena and the capability the writer walks.

use crate::model::{FieldId, Guid, SchemaRegistry, TypeDescriptor, Value};

/// Handle of a node inside a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Read access to an object graph, as supplied by the host entity framework.
///
/// The writer depends only on this trait: identity, type name, the ordered
/// field descriptors of each type, and field values by id. Returning `None`
/// from [`describe`](GraphSource::describe) means the type does not expose
/// the field-description capability.
pub trait GraphSource {
    /// Global identity of `node`, or `None` if the node does not exist.
    fn identity(&self, node: NodeId) -> Option<Guid>;

    /// Type name of `node`, or `None` if the node does not exist.
    fn type_name(&self, node: NodeId) -> Option<&str>;

    /// Ordered field descriptors of a type.
    fn describe(&self, type_name: &str) -> Option<&TypeDescriptor>;

    /// Value of one field of `node`.
    fn field(&self, node: NodeId, field: FieldId) -> Option<&Value>;
}

/// One object of the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub identity: Guid,
    pub type_name: String,
    fields: Vec<(FieldId, Value)>,
}

impl Node {
    fn new(identity: Guid, type_name: String) -> Self {
        Self {
            identity,
            type_name,
            fields: Vec::new(),
        }
    }

    /// Returns the value of a field.
    pub fn get(&self, field: FieldId) -> Option<&Value> {
        self.fields.iter().find(|(id, _)| *id == field).map(|(_, v)| v)
    }

    /// Sets a field, replacing any previous value.
    pub fn set(&mut self, field: FieldId, value: Value) {
        match self.fields.iter_mut().find(|(id, _)| *id == field) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((field, value)),
        }
    }

    /// Iterates `(field id, value)` pairs in the order they were set.
    pub fn fields(&self) -> impl Iterator<Item = (FieldId, &Value)> {
        self.fields.iter().map(|(id, v)| (*id, v))
    }
}

/// Arena-backed object graph.
///
/// Nodes reference each other by [`NodeId`], so cyclic and shared structures
/// need no reference counting. Two nodes may carry the same identity; the
/// encoder collapses them into a single stream record.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    schema: SchemaRegistry,
    nodes: Vec<Node>,
}

impl Graph {
    /// Creates an empty graph with an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty graph over an existing schema.
    pub fn with_schema(schema: SchemaRegistry) -> Self {
        Self {
            schema,
            nodes: Vec::new(),
        }
    }

    /// Returns the schema.
    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    /// Returns the schema for modification.
    pub fn schema_mut(&mut self) -> &mut SchemaRegistry {
        &mut self.schema
    }

    /// Registers a type descriptor.
    pub fn register_type(&mut self, descriptor: TypeDescriptor) {
        self.schema.register(descriptor);
    }

    /// Adds an object with no field values yet.
    pub fn add_object(&mut self, identity: Guid, type_name: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(identity, type_name.into()));
        id
    }

    /// Sets a field by name, using the node's registered type.
    ///
    /// Returns false if the node, its type, or the field is unknown.
    pub fn set(&mut self, node: NodeId, field: &str, value: Value) -> bool {
        let Some(type_name) = self.nodes.get(node.index()).map(|n| n.type_name.as_str()) else {
            return false;
        };
        let Some(field_id) = self
            .schema
            .get(type_name)
            .and_then(|t| t.field_by_name(field))
            .map(|f| f.id)
        else {
            return false;
        };
        self.nodes[node.index()].set(field_id, value);
        true
    }

    /// Reads a field by name, using the node's registered type.
    pub fn get(&self, node: NodeId, field: &str) -> Option<&Value> {
        let n = self.nodes.get(node.index())?;
        let field_id = self.schema.get(&n.type_name)?.field_by_name(field)?.id;
        n.get(field_id)
    }

    /// Returns a node.
    pub fn node(&self, node: NodeId) -> Option<&Node> {
        self.nodes.get(node.index())
    }

    /// Returns a node for modification.
    pub fn node_mut(&mut self, node: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(node.index())
    }

    /// Finds the first node carrying `identity`.
    pub fn find(&self, identity: Guid) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.identity == identity)
            .map(|idx| NodeId(idx as u32))
    }

    /// Iterates all nodes with their handles.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(idx, n)| (NodeId(idx as u32), n))
    }

    /// Returns the number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl GraphSource for Graph {
    fn identity(&self, node: NodeId) -> Option<Guid> {
        self.node(node).map(|n| n.identity)
    }

    fn type_name(&self, node: NodeId) -> Option<&str> {
        self.node(node).map(|n| n.type_name.as_str())
    }

    fn describe(&self, type_name: &str) -> Option<&TypeDescriptor> {
        self.schema.get(type_name)
    }

    fn field(&self, node: NodeId, field: FieldId) -> Option<&Value> {
        self.node(node)?.get(field)
    }
}
