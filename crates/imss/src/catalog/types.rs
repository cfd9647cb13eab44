//! Type catalog: stream-local type ids and their field layouts.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::catalog::TypeId;
use crate::error::{DecodeError, EncodeError};
use crate::limits::{MAX_FIELDS_PER_TYPE, MAX_TYPES};
use crate::model::TypeDescriptor;

/// A type as declared in a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDeclaration {
    pub type_id: TypeId,
    pub descriptor: TypeDescriptor,
}

/// Maps types to stream-local ids.
///
/// On write, [`get_or_declare`](TypeCatalog::get_or_declare) assigns ids on
/// first use and queues the declaration; the writer drains the queue right
/// before the first block that uses the type. On read,
/// [`declare`](TypeCatalog::declare) records declarations in stream order.
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    declarations: Vec<TypeDeclaration>,
    by_name: FxHashMap<String, TypeId>,
    pending: Vec<TypeId>,
}

impl TypeCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of a type, declaring it on first use.
    pub fn get_or_declare(&mut self, descriptor: &TypeDescriptor) -> Result<TypeId, EncodeError> {
        if let Some(&type_id) = self.by_name.get(&descriptor.name) {
            return Ok(type_id);
        }
        if self.declarations.len() >= MAX_TYPES {
            return Err(EncodeError::LengthExceedsLimit {
                field: "types",
                len: self.declarations.len() + 1,
                max: MAX_TYPES,
            });
        }
        if descriptor.fields.len() > MAX_FIELDS_PER_TYPE {
            return Err(EncodeError::LengthExceedsLimit {
                field: "fields",
                len: descriptor.fields.len(),
                max: MAX_FIELDS_PER_TYPE,
            });
        }
        if let Some(duplicate) = first_duplicate_field(descriptor) {
            return Err(EncodeError::DuplicateField {
                type_name: descriptor.name.clone(),
                field_id: descriptor.fields[duplicate].id,
                name: descriptor.fields[duplicate].name.clone(),
            });
        }

        let type_id = self.declarations.len() as TypeId + 1;
        self.declarations.push(TypeDeclaration {
            type_id,
            descriptor: descriptor.clone(),
        });
        self.by_name.insert(descriptor.name.clone(), type_id);
        self.pending.push(type_id);
        tracing::debug!(type_id, type_name = %descriptor.name, "declared type");
        Ok(type_id)
    }

    /// Takes the ids declared since the last call, in declaration order.
    pub fn take_pending(&mut self) -> Vec<TypeId> {
        std::mem::take(&mut self.pending)
    }

    /// Records a declaration read from a stream.
    ///
    /// Ids must arrive in order (`1, 2, ...`), names must be unique and at
    /// most [`MAX_TYPES`] types may be declared.
    pub fn declare(&mut self, declaration: TypeDeclaration, offset: usize) -> Result<(), DecodeError> {
        let expected = self.declarations.len() as TypeId + 1;
        if declaration.type_id != expected {
            return Err(DecodeError::TypeIdOutOfOrder {
                expected,
                found: declaration.type_id,
                offset,
            });
        }
        if self.declarations.len() >= MAX_TYPES {
            return Err(DecodeError::LengthExceedsLimit {
                field: "types",
                len: self.declarations.len() + 1,
                max: MAX_TYPES,
                offset,
            });
        }
        if self.by_name.contains_key(&declaration.descriptor.name) {
            return Err(DecodeError::DuplicateTypeName {
                name: declaration.descriptor.name,
                offset,
            });
        }
        if first_duplicate_field(&declaration.descriptor).is_some() {
            return Err(DecodeError::Malformed {
                context: "type declaration with duplicate field",
                offset,
            });
        }
        tracing::debug!(
            type_id = declaration.type_id,
            type_name = %declaration.descriptor.name,
            "read type declaration"
        );
        self.by_name
            .insert(declaration.descriptor.name.clone(), declaration.type_id);
        self.declarations.push(declaration);
        Ok(())
    }

    /// Returns a declaration by id.
    pub fn get(&self, type_id: TypeId) -> Option<&TypeDeclaration> {
        let idx = (type_id as usize).checked_sub(1)?;
        self.declarations.get(idx)
    }

    /// Returns a declaration by id, failing on undeclared ids.
    pub fn resolve(&self, type_id: TypeId, offset: usize) -> Result<&TypeDeclaration, DecodeError> {
        self.get(type_id)
            .ok_or(DecodeError::UndeclaredType { type_id, offset })
    }

    /// Returns the id assigned to a type name.
    pub fn id_of(&self, type_name: &str) -> Option<TypeId> {
        self.by_name.get(type_name).copied()
    }

    /// Iterates declarations in id order.
    pub fn iter(&self) -> impl Iterator<Item = &TypeDeclaration> {
        self.declarations.iter()
    }

    /// Returns the number of declared types.
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    /// Returns true if no type has been declared.
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

/// Returns the index of the first field repeating an earlier id or name.
fn first_duplicate_field(descriptor: &TypeDescriptor) -> Option<usize> {
    let mut ids = FxHashSet::default();
    let mut names = FxHashSet::default();
    descriptor
        .fields
        .iter()
        .position(|f| !ids.insert(f.id) || !names.insert(f.name.as_str()))
}
