//! # engine_component
//!
//! Entity and component storage.
//!
//! This crate provides:
//!
//! - [`EntityId`]: 16, 32 and 64-bit entity identifiers with a reserved null
//!   value.
//! - [`SparseSet`]: paged `entity -> dense index` map with O(1) insert,
//!   swap-remove and lookup.
//! - [`ComponentTable`]: one sparse set plus an index-aligned value array per
//!   component type, with add/remove observers.
//! - [`TableCell`]: non-blocking runtime borrow tracking for tables shared
//!   with systems.
//! - [`OpaqueTableRegistry`]: a type-erased collection of tables that can
//!   remove an entity from every table without knowing the types involved.
//! - [`View`]: joins across up to eight tables, driven by the smallest one.

pub mod borrow;
pub mod component;
pub mod entity;
pub mod error;
pub mod opaque;
pub mod sparse_set;
pub mod table;
pub mod view;

pub use borrow::{Ref, RefMut, TableCell};
pub use component::{Component, ComponentTypeId};
pub use entity::{Entity, EntityId, LongEntity, ShortEntity};
pub use error::{BorrowKind, ComponentError};
pub use opaque::{OpaqueTableRegistry, TableHandle};
pub use sparse_set::SparseSet;
pub use table::{ComponentTable, Observer};
pub use view::{View, ViewTable, ViewTableMut};
