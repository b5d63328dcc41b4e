//! Type-erased collection of component tables.
//!
//! Every registered component type owns one `ComponentTable<T, E>` behind an
//! `Arc<TableCell<_>>`. The registry stores it as `Arc<dyn Any>` next to a
//! [`TableVTable`] of plain function pointers instantiated for `T`, so the
//! owner can sweep an entity out of every table or clear all storage without
//! knowing which component types exist. Typed access looks the entry up by
//! [`ComponentTypeId`] and downcasts.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::borrow::{Ref, RefMut, TableCell};
use crate::component::{Component, ComponentTypeId};
use crate::entity::{Entity, EntityId};
use crate::error::ComponentError;
use crate::table::ComponentTable;

type Erased = dyn Any + Send + Sync;

/// A cloneable, typed handle to a registered table.
///
/// Systems capture handles during setup and borrow the table from inside
/// their tasks. Borrows are checked at runtime and never block.
pub struct TableHandle<T, E: EntityId = Entity> {
    cell: Arc<TableCell<ComponentTable<T, E>>>,
}

impl<T: Component, E: EntityId> TableHandle<T, E> {
    /// Borrow the table for reading.
    ///
    /// # Errors
    ///
    /// [`ComponentError::BorrowConflict`] while a writer holds the table.
    pub fn read(&self) -> Result<Ref<'_, ComponentTable<T, E>>, ComponentError> {
        self.cell.try_borrow()
    }

    /// Borrow the table for writing.
    ///
    /// # Errors
    ///
    /// [`ComponentError::BorrowConflict`] while any other borrow is live.
    pub fn write(&self) -> Result<RefMut<'_, ComponentTable<T, E>>, ComponentError> {
        self.cell.try_borrow_mut()
    }

    /// Component type name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.cell.name()
    }

    /// Returns `true` if both handles refer to the same table.
    #[must_use]
    pub fn same_table(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl<T, E: EntityId> Clone for TableHandle<T, E> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T, E: EntityId> fmt::Debug for TableHandle<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TableHandle").field(&self.cell.name()).finish()
    }
}

/// Operations every table supports without its static type.
#[derive(Clone, Copy)]
struct TableVTable<E> {
    contains: fn(&Erased, E) -> Result<bool, ComponentError>,
    claim: fn(&Erased) -> Result<Box<dyn ClaimedTable<E> + '_>, ComponentError>,
    clear: fn(&Erased) -> Result<(), ComponentError>,
    len: fn(&Erased) -> Result<usize, ComponentError>,
}

impl<E: EntityId> TableVTable<E> {
    fn of<T: Component>() -> Self {
        Self {
            contains: |storage, entity| Ok(cell_of::<T, E>(storage)?.try_borrow()?.contains(entity)),
            claim: claim::<T, E>,
            clear: |storage| {
                cell_of::<T, E>(storage)?.try_borrow_mut()?.clear();
                Ok(())
            },
            len: |storage| Ok(cell_of::<T, E>(storage)?.try_borrow()?.len()),
        }
    }
}

/// An exclusively borrowed table with its component type erased.
trait ClaimedTable<E> {
    fn erase(&mut self, entity: E) -> Result<(), ComponentError>;
}

impl<T: Component, E: EntityId> ClaimedTable<E> for RefMut<'_, ComponentTable<T, E>> {
    fn erase(&mut self, entity: E) -> Result<(), ComponentError> {
        self.remove(entity).map(drop)
    }
}

fn claim<T: Component, E: EntityId>(
    storage: &Erased,
) -> Result<Box<dyn ClaimedTable<E> + '_>, ComponentError> {
    Ok(Box::new(cell_of::<T, E>(storage)?.try_borrow_mut()?))
}

fn cell_of<T: Component, E: EntityId>(
    storage: &Erased,
) -> Result<&TableCell<ComponentTable<T, E>>, ComponentError> {
    storage
        .downcast_ref::<TableCell<ComponentTable<T, E>>>()
        .ok_or(ComponentError::MissingTable(std::any::type_name::<T>()))
}

struct OpaqueTable<E> {
    id: ComponentTypeId,
    storage: Arc<Erased>,
    vtable: TableVTable<E>,
}

/// One component table per registered type, reachable by type or through
/// type-erased operations.
pub struct OpaqueTableRegistry<E: EntityId = Entity> {
    tables: Vec<OpaqueTable<E>>,
    index: HashMap<ComponentTypeId, usize>,
}

impl<E: EntityId> OpaqueTableRegistry<E> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Allocate and register the table for `T`.
    ///
    /// # Errors
    ///
    /// [`ComponentError::DuplicateTable`] if `T` is already registered.
    pub fn add<T: Component>(&mut self) -> Result<TableHandle<T, E>, ComponentError> {
        let id = ComponentTypeId::of::<T>();
        if self.index.contains_key(&id) {
            return Err(ComponentError::DuplicateTable(id.name()));
        }
        let cell = Arc::new(TableCell::new(id.name(), ComponentTable::<T, E>::new()));
        let storage: Arc<Erased> = cell.clone();
        self.index.insert(id, self.tables.len());
        self.tables.push(OpaqueTable {
            id,
            storage,
            vtable: TableVTable::of::<T>(),
        });
        debug!(component = id.name(), tables = self.tables.len(), "component table registered");
        Ok(TableHandle { cell })
    }

    /// Returns `true` if a table for `T` is registered.
    #[must_use]
    pub fn exists<T: Component>(&self) -> bool {
        self.exists_id(ComponentTypeId::of::<T>())
    }

    /// Returns `true` if a table for the given type id is registered.
    #[must_use]
    pub fn exists_id(&self, id: ComponentTypeId) -> bool {
        self.index.contains_key(&id)
    }

    /// The shared cell holding the table for `T`.
    ///
    /// # Errors
    ///
    /// [`ComponentError::MissingTable`] if `T` is not registered.
    pub fn cell<T: Component>(&self) -> Result<&TableCell<ComponentTable<T, E>>, ComponentError> {
        let id = ComponentTypeId::of::<T>();
        let entry = self
            .index
            .get(&id)
            .map(|&slot| &self.tables[slot])
            .ok_or(ComponentError::MissingTable(id.name()))?;
        cell_of::<T, E>(&*entry.storage)
    }

    /// A cloneable handle to the table for `T`.
    ///
    /// # Errors
    ///
    /// [`ComponentError::MissingTable`] if `T` is not registered.
    pub fn handle<T: Component>(&self) -> Result<TableHandle<T, E>, ComponentError> {
        let id = ComponentTypeId::of::<T>();
        let entry = self
            .index
            .get(&id)
            .map(|&slot| &self.tables[slot])
            .ok_or(ComponentError::MissingTable(id.name()))?;
        let cell = Arc::clone(&entry.storage)
            .downcast::<TableCell<ComponentTable<T, E>>>()
            .map_err(|_| ComponentError::MissingTable(id.name()))?;
        Ok(TableHandle { cell })
    }

    /// Borrow the table for `T` for reading.
    ///
    /// # Errors
    ///
    /// [`ComponentError::MissingTable`] or [`ComponentError::BorrowConflict`].
    pub fn table<T: Component>(&self) -> Result<Ref<'_, ComponentTable<T, E>>, ComponentError> {
        self.cell::<T>()?.try_borrow()
    }

    /// Borrow the table for `T` for writing.
    ///
    /// # Errors
    ///
    /// [`ComponentError::MissingTable`] or [`ComponentError::BorrowConflict`].
    pub fn table_mut<T: Component>(
        &self,
    ) -> Result<RefMut<'_, ComponentTable<T, E>>, ComponentError> {
        self.cell::<T>()?.try_borrow_mut()
    }

    /// Remove `entity` from every table that holds it and return the number
    /// of components removed.
    ///
    /// # Errors
    ///
    /// [`ComponentError::BorrowConflict`] if a table holding the entity is
    /// borrowed, for reading or writing. Every holding table is borrowed
    /// exclusively before the first removal, so on a conflict no table is
    /// changed.
    pub fn remove_entity(&self, entity: E) -> Result<usize, ComponentError> {
        let mut claimed = Vec::new();
        for table in &self.tables {
            if (table.vtable.contains)(&*table.storage, entity)? {
                claimed.push((table.vtable.claim)(&*table.storage)?);
            }
        }
        for table in &mut claimed {
            table.erase(entity)?;
        }
        Ok(claimed.len())
    }

    /// Names of the tables currently holding `entity`, in registration
    /// order.
    ///
    /// # Errors
    ///
    /// [`ComponentError::BorrowConflict`] if a table is exclusively borrowed.
    pub fn tables_containing(&self, entity: E) -> Result<Vec<&'static str>, ComponentError> {
        let mut names = Vec::new();
        for table in &self.tables {
            if (table.vtable.contains)(&*table.storage, entity)? {
                names.push(table.id.name());
            }
        }
        Ok(names)
    }

    /// `(component name, live components)` for every table, in registration
    /// order.
    ///
    /// # Errors
    ///
    /// [`ComponentError::BorrowConflict`] if a table is exclusively borrowed.
    pub fn table_sizes(&self) -> Result<Vec<(&'static str, usize)>, ComponentError> {
        self.tables
            .iter()
            .map(|table| Ok((table.id.name(), (table.vtable.len)(&*table.storage)?)))
            .collect()
    }

    /// Empty every table, then drop all of them.
    ///
    /// Outstanding [`TableHandle`]s keep their (now empty) table alive but
    /// it is no longer reachable from the registry.
    ///
    /// # Errors
    ///
    /// [`ComponentError::BorrowConflict`] if a table is borrowed. Storage is
    /// released regardless and the first conflict is reported.
    pub fn clear(&mut self) -> Result<(), ComponentError> {
        let mut first_error = None;
        for table in &self.tables {
            if let Err(err) = (table.vtable.clear)(&*table.storage) {
                first_error.get_or_insert(err);
            }
        }
        debug!(tables = self.tables.len(), "component tables cleared");
        self.tables.clear();
        self.index.clear();
        first_error.map_or(Ok(()), Err)
    }

    /// Number of registered tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns `true` if no table is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Registered component type ids, in registration order.
    pub fn component_ids(&self) -> impl Iterator<Item = ComponentTypeId> + '_ {
        self.tables.iter().map(|table| table.id)
    }

    /// Registered component names, in registration order.
    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tables.iter().map(|table| table.id.name())
    }
}

impl<E: EntityId> Default for OpaqueTableRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EntityId> fmt::Debug for OpaqueTableRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.type_names()).finish()
    }
}
