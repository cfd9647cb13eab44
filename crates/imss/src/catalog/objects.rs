//! Object catalog: stream-local object ids keyed by global identity.
//!
//! The writer registers an object before serializing its fields, so a
//! revisit through a cycle finds the slot taken and emits a Reference. The
//! reader's [`ObjectTable`] allocates placeholders for references that
//! arrive before their definition and fills them in place later.

use rustc_hash::FxHashMap;

use crate::catalog::{ObjectId, TypeId};
use crate::error::{DecodeError, EncodeError};
use crate::limits::MAX_OBJECTS;
use crate::model::{Graph, Guid, NIL_GUID, NodeId};

/// Outcome of registering an object on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub object_id: ObjectId,
    /// Type id recorded with the Definition; References repeat it.
    pub type_id: TypeId,
    /// True the first time an identity is seen: emit a Definition.
    pub is_new: bool,
}

/// Write-side catalog mapping identities to object ids.
#[derive(Debug, Clone, Default)]
pub struct ObjectCatalog {
    ids: FxHashMap<Guid, (ObjectId, TypeId)>,
}

impl ObjectCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an identity, assigning the next object id on first sight.
    pub fn register(&mut self, identity: Guid, type_id: TypeId) -> Result<Registration, EncodeError> {
        if let Some(&(object_id, type_id)) = self.ids.get(&identity) {
            return Ok(Registration {
                object_id,
                type_id,
                is_new: false,
            });
        }
        if self.ids.len() >= MAX_OBJECTS {
            return Err(EncodeError::LengthExceedsLimit {
                field: "objects",
                len: self.ids.len() + 1,
                max: MAX_OBJECTS,
            });
        }
        let object_id = self.ids.len() as ObjectId + 1;
        self.ids.insert(identity, (object_id, type_id));
        Ok(Registration {
            object_id,
            type_id,
            is_new: true,
        })
    }

    /// Returns the type id an identity was registered with, if any.
    pub fn type_of(&self, identity: &Guid) -> Option<TypeId> {
        self.ids.get(identity).map(|&(_, type_id)| type_id)
    }

    /// Returns the number of registered identities.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    node: NodeId,
    type_id: TypeId,
    defined: bool,
    /// Offset of the first Reference, for placeholders.
    referenced_at: usize,
}

/// Read-side catalog mapping object ids to decoded nodes.
#[derive(Debug, Clone, Default)]
pub struct ObjectTable {
    slots: FxHashMap<ObjectId, Slot>,
    identities: FxHashMap<Guid, ObjectId>,
}

impl ObjectTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves a Reference.
    ///
    /// An unknown object id gets a placeholder node of the referenced type
    /// right away, so the referring field can be completed.
    pub fn reference(
        &mut self,
        graph: &mut Graph,
        object_id: ObjectId,
        type_id: TypeId,
        type_name: &str,
        offset: usize,
    ) -> Result<NodeId, DecodeError> {
        if let Some(slot) = self.slots.get(&object_id) {
            if slot.type_id != type_id {
                return Err(DecodeError::TypeMismatch {
                    object_id,
                    referenced: type_id,
                    defined: slot.type_id,
                    offset,
                });
            }
            return Ok(slot.node);
        }
        self.check_capacity(offset)?;
        let node = graph.add_object(NIL_GUID, type_name);
        tracing::trace!(object_id, type_id, "forward reference, placeholder allocated");
        self.slots.insert(
            object_id,
            Slot {
                node,
                type_id,
                defined: false,
                referenced_at: offset,
            },
        );
        Ok(node)
    }

    /// Records a Definition, filling a placeholder if one exists.
    pub fn define(
        &mut self,
        graph: &mut Graph,
        object_id: ObjectId,
        identity: Guid,
        type_id: TypeId,
        type_name: &str,
        offset: usize,
    ) -> Result<NodeId, DecodeError> {
        if let Some(&owner) = self.identities.get(&identity) {
            return Err(if owner == object_id {
                DecodeError::DuplicateDefinition { object_id, offset }
            } else {
                DecodeError::DuplicateIdentity {
                    identity,
                    object_id,
                    offset,
                }
            });
        }

        let node = match self.slots.get_mut(&object_id) {
            Some(slot) if slot.defined => {
                return Err(DecodeError::DuplicateDefinition { object_id, offset });
            }
            Some(slot) => {
                if slot.type_id != type_id {
                    return Err(DecodeError::TypeMismatch {
                        object_id,
                        referenced: slot.type_id,
                        defined: type_id,
                        offset,
                    });
                }
                slot.defined = true;
                if let Some(placeholder) = graph.node_mut(slot.node) {
                    placeholder.identity = identity;
                }
                slot.node
            }
            None => {
                self.check_capacity(offset)?;
                let node = graph.add_object(identity, type_name);
                self.slots.insert(
                    object_id,
                    Slot {
                        node,
                        type_id,
                        defined: true,
                        referenced_at: offset,
                    },
                );
                node
            }
        };
        self.identities.insert(identity, object_id);
        Ok(node)
    }

    /// Returns the lowest object id that was referenced but never defined,
    /// with the offset of its first Reference.
    pub fn first_unresolved(&self) -> Option<(ObjectId, usize)> {
        self.slots
            .iter()
            .filter(|(_, slot)| !slot.defined)
            .map(|(&object_id, slot)| (object_id, slot.referenced_at))
            .min()
    }

    /// Returns the number of known object ids.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if no object id is known.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn check_capacity(&self, offset: usize) -> Result<(), DecodeError> {
        if self.slots.len() >= MAX_OBJECTS {
            return Err(DecodeError::LengthExceedsLimit {
                field: "objects",
                len: self.slots.len() + 1,
                max: MAX_OBJECTS,
                offset,
            });
        }
        Ok(())
    }
}
