//! Per-operation catalogs.
//!
//! Both catalogs live exactly as long as one encode or decode call. They
//! are owned by the graph writer/reader and dropped with it; nothing is
//! cached across streams.

pub mod objects;
pub mod types;

pub use objects::{ObjectCatalog, ObjectTable, Registration};
pub use types::{TypeCatalog, TypeDeclaration};

/// Stream-local type id, assigned from 1 in order of first use.
pub type TypeId = u32;

/// Stream-local object id, assigned from 1 in order of first use.
pub type ObjectId = u32;
