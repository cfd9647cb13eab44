//! Field descriptors: the capability that replaces runtime reflection.
//!
//! A type is serializable when it exposes an ordered, stable list of
//! `(field id, name, kind)` descriptors. The engine never inspects host
//! types directly; it walks these descriptors.

use std::fmt;

use rustc_hash::FxHashMap;

/// Stable identifier of a field within its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub u16);

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kinds a field value can take (wire byte in the discriminant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FieldKind {
    Bool = 1,
    Byte = 2,
    Int32 = 3,
    Int64 = 4,
    Float64 = 5,
    Guid = 6,
    Text = 7,
    Bytes = 8,
    Object = 9,
    Collection = 10,
}

impl FieldKind {
    /// Creates a FieldKind from its wire representation.
    pub fn from_u8(v: u8) -> Option<FieldKind> {
        match v {
            1 => Some(FieldKind::Bool),
            2 => Some(FieldKind::Byte),
            3 => Some(FieldKind::Int32),
            4 => Some(FieldKind::Int64),
            5 => Some(FieldKind::Float64),
            6 => Some(FieldKind::Guid),
            7 => Some(FieldKind::Text),
            8 => Some(FieldKind::Bytes),
            9 => Some(FieldKind::Object),
            10 => Some(FieldKind::Collection),
            _ => None,
        }
    }

    /// Returns the byte width of fixed-size simple kinds.
    ///
    /// `None` for variable-size (text, bytes) and structural kinds.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            FieldKind::Bool | FieldKind::Byte => Some(1),
            FieldKind::Int32 => Some(4),
            FieldKind::Int64 | FieldKind::Float64 => Some(8),
            FieldKind::Guid => Some(16),
            FieldKind::Text | FieldKind::Bytes | FieldKind::Object | FieldKind::Collection => {
                None
            }
        }
    }

    /// Returns true for kinds whose payload is nested blocks.
    pub fn is_structural(self) -> bool {
        matches!(self, FieldKind::Object | FieldKind::Collection)
    }

    /// Text-mode name of the kind.
    pub fn name(self) -> &'static str {
        match self {
            FieldKind::Bool => "bool",
            FieldKind::Byte => "byte",
            FieldKind::Int32 => "int32",
            FieldKind::Int64 => "int64",
            FieldKind::Float64 => "float64",
            FieldKind::Guid => "guid",
            FieldKind::Text => "text",
            FieldKind::Bytes => "bytes",
            FieldKind::Object => "object",
            FieldKind::Collection => "collection",
        }
    }

    /// Parses a text-mode kind name.
    pub fn from_name(name: &str) -> Option<FieldKind> {
        match name {
            "bool" => Some(FieldKind::Bool),
            "byte" => Some(FieldKind::Byte),
            "int32" => Some(FieldKind::Int32),
            "int64" => Some(FieldKind::Int64),
            "float64" => Some(FieldKind::Float64),
            "guid" => Some(FieldKind::Guid),
            "text" => Some(FieldKind::Text),
            "bytes" => Some(FieldKind::Bytes),
            "object" => Some(FieldKind::Object),
            "collection" => Some(FieldKind::Collection),
            _ => None,
        }
    }
}

/// One field of a type, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDef {
    pub id: FieldId,
    pub name: String,
    pub kind: FieldKind,
}

/// Ordered field layout of a named type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

impl TypeDescriptor {
    /// Creates a descriptor with no fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Appends a field (builder style).
    pub fn field(mut self, id: u16, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDef {
            id: FieldId(id),
            name: name.into(),
            kind,
        });
        self
    }

    /// Looks up a field by id.
    pub fn field_by_id(&self, id: FieldId) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Looks up a field by name.
    pub fn field_by_name(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Registry of type descriptors keyed by type name.
///
/// Iteration follows registration order.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    types: Vec<TypeDescriptor>,
    index: FxHashMap<String, usize>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor, replacing any previous one with the same name.
    pub fn register(&mut self, descriptor: TypeDescriptor) {
        if let Some(&idx) = self.index.get(&descriptor.name) {
            self.types[idx] = descriptor;
        } else {
            self.index.insert(descriptor.name.clone(), self.types.len());
            self.types.push(descriptor);
        }
    }

    /// Returns the descriptor registered for `type_name`.
    pub fn get(&self, type_name: &str) -> Option<&TypeDescriptor> {
        self.index.get(type_name).map(|&idx| &self.types[idx])
    }

    /// Returns true if a descriptor is registered for `type_name`.
    pub fn contains(&self, type_name: &str) -> bool {
        self.index.contains_key(type_name)
    }

    /// Iterates descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.iter()
    }

    /// Returns the number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if no type is registered.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
