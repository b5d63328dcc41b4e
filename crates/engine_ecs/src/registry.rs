//! The [`Registry`]: entities, component tables and systems in one place.
//!
//! Entity ids are recycled through a free list threaded through the entity
//! array itself: a live slot stores its own id, a freed slot stores the id
//! freed before it (or null). [`Registry::add`] pops the most recently freed
//! id before issuing a fresh one.
//!
//! Structural changes (registering components, creating and removing
//! entities, attaching and detaching components, registering systems,
//! building) take `&mut self` and are meant to happen outside graph runs.

use engine_component::{
    Component, ComponentTable, Entity, EntityId, OpaqueTableRegistry, Ref, RefMut, TableHandle,
    View,
};
use engine_flow::{Executor, RunReport, TaskGraph};
use tracing::{debug, info, trace};

use crate::bundle::Bundle;
use crate::error::EcsError;
use crate::system_graph::SystemGraph;

/// Entity storage, component tables and the system graph.
pub struct Registry<E: EntityId = Entity> {
    tables: OpaqueTableRegistry<E>,
    entities: Vec<E>,
    last_destroyed: E,
    alive: usize,
    systems: SystemGraph<E>,
}

impl<E: EntityId> Registry<E> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: OpaqueTableRegistry::new(),
            entities: Vec::new(),
            last_destroyed: E::NULL,
            alive: 0,
            systems: SystemGraph::new(),
        }
    }

    // -- Components --

    /// Register component type `T` and return a handle to its table.
    ///
    /// # Errors
    ///
    /// [`ComponentError::DuplicateTable`](engine_component::ComponentError::DuplicateTable)
    /// if `T` is already registered.
    pub fn register_component<T: Component>(&mut self) -> Result<TableHandle<T, E>, EcsError> {
        let handle = self.tables.add::<T>()?;
        info!(component = handle.name(), "component registered");
        Ok(handle)
    }

    /// Returns `true` if component type `T` is registered.
    #[must_use]
    pub fn has_component<T: Component>(&self) -> bool {
        self.tables.exists::<T>()
    }

    /// The type-erased table collection.
    #[must_use]
    pub fn tables(&self) -> &OpaqueTableRegistry<E> {
        &self.tables
    }

    /// A cloneable handle to the table for `T`.
    ///
    /// # Errors
    ///
    /// `MissingTable` if `T` is not registered.
    pub fn handle<T: Component>(&self) -> Result<TableHandle<T, E>, EcsError> {
        Ok(self.tables.handle::<T>()?)
    }

    /// Handles to every table of bundle `B`.
    ///
    /// # Errors
    ///
    /// `MissingTable` if a type of `B` is not registered.
    pub fn handles<B: Bundle<E>>(&self) -> Result<B::Handles, EcsError> {
        Ok(B::handles(&self.tables)?)
    }

    /// Borrow the table for `T` for reading.
    ///
    /// # Errors
    ///
    /// `MissingTable`, or `BorrowConflict` while a task writes the table.
    pub fn table<T: Component>(&self) -> Result<Ref<'_, ComponentTable<T, E>>, EcsError> {
        Ok(self.tables.table::<T>()?)
    }

    /// Borrow the table for `T` for writing.
    ///
    /// # Errors
    ///
    /// `MissingTable`, or `BorrowConflict` while the table is borrowed.
    pub fn table_mut<T: Component>(
        &mut self,
    ) -> Result<RefMut<'_, ComponentTable<T, E>>, EcsError> {
        Ok(self.tables.table_mut::<T>()?)
    }

    // -- Entities --

    /// Create an entity with no component.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityExhausted`] when every id of the width is live.
    pub fn add(&mut self) -> Result<E, EcsError> {
        let entity = if self.last_destroyed.is_null() {
            let entity = E::from_index(self.entities.len());
            if entity.is_null() {
                return Err(EcsError::EntityExhausted);
            }
            self.entities.push(entity);
            entity
        } else {
            let entity = self.last_destroyed;
            let slot = &mut self.entities[entity.to_index()];
            self.last_destroyed = *slot;
            *slot = entity;
            entity
        };
        self.alive += 1;
        trace!(entity = entity.to_u64(), "entity created");
        Ok(entity)
    }

    /// Create an entity holding every component of `bundle`.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityExhausted`], or the bundle's attach error; the id
    /// is released again and nothing is attached.
    pub fn add_with<B: Bundle<E>>(&mut self, bundle: B) -> Result<E, EcsError> {
        let entity = self.add()?;
        if let Err(err) = bundle.attach(&self.tables, entity) {
            self.release(entity);
            return Err(err.into());
        }
        Ok(entity)
    }

    /// Remove `entity` and every component it holds, sweeping all tables.
    ///
    /// # Errors
    ///
    /// [`EcsError::DeadEntity`] if the entity is not alive, or
    /// `BorrowConflict` if a table holding it is borrowed.
    pub fn remove(&mut self, entity: E) -> Result<(), EcsError> {
        self.ensure_alive(entity)?;
        let removed = self.tables.remove_entity(entity)?;
        self.release(entity);
        trace!(entity = entity.to_u64(), components = removed, "entity removed");
        Ok(())
    }

    /// Remove `entity` by erasing only the components of bundle `B`.
    ///
    /// Faster than [`Registry::remove`] when the caller knows the entity's
    /// exact component set. Components of other types must not remain; this
    /// is checked in debug builds.
    ///
    /// # Errors
    ///
    /// [`EcsError::DeadEntity`], `MissingTable` or `BorrowConflict`.
    pub fn remove_with<B: Bundle<E>>(&mut self, entity: E) -> Result<(), EcsError> {
        self.ensure_alive(entity)?;
        B::remove_present(&self.tables, entity)?;
        debug_assert!(
            self.tables
                .tables_containing(entity)
                .map_or(true, |names| names.is_empty()),
            "entity {entity} still holds components outside the bundle"
        );
        self.release(entity);
        Ok(())
    }

    /// Push a live id onto the free list.
    fn release(&mut self, entity: E) {
        self.entities[entity.to_index()] = self.last_destroyed;
        self.last_destroyed = entity;
        self.alive -= 1;
    }

    fn ensure_alive(&self, entity: E) -> Result<(), EcsError> {
        if self.is_alive(entity) {
            Ok(())
        } else {
            Err(EcsError::DeadEntity(entity.to_u64()))
        }
    }

    /// Returns `true` if `entity` was created and not removed since.
    #[must_use]
    pub fn is_alive(&self, entity: E) -> bool {
        !entity.is_null()
            && self
                .entities
                .get(entity.to_index())
                .is_some_and(|&slot| slot == entity)
    }

    /// Number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.alive
    }

    /// Returns `true` if no entity is alive.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alive == 0
    }

    /// Live entities in id order.
    pub fn entities(&self) -> impl Iterator<Item = E> + '_ {
        self.entities
            .iter()
            .enumerate()
            .filter(|&(index, slot)| slot.to_index() == index)
            .map(|(_, &slot)| slot)
    }

    // -- Attach / detach --

    /// Attach `value` to `entity` and return the stored component.
    ///
    /// # Errors
    ///
    /// [`EcsError::DeadEntity`], `MissingTable`, `BorrowConflict` or
    /// `DuplicateEntity`.
    pub fn attach<T: Component>(
        &mut self,
        entity: E,
        value: T,
    ) -> Result<RefMut<'_, T>, EcsError> {
        self.ensure_alive(entity)?;
        let table = self.tables.table_mut::<T>()?;
        Ok(RefMut::try_map(table, |table| table.add(entity, value))?)
    }

    /// Attach every component of `bundle` to `entity`, or none of them.
    ///
    /// # Errors
    ///
    /// [`EcsError::DeadEntity`], `MissingTable`, `BorrowConflict` or
    /// `DuplicateEntity`.
    pub fn attach_bundle<B: Bundle<E>>(&mut self, entity: E, bundle: B) -> Result<(), EcsError> {
        self.ensure_alive(entity)?;
        Ok(bundle.attach(&self.tables, entity)?)
    }

    /// Detach and return the `T` component of `entity`.
    ///
    /// # Errors
    ///
    /// [`EcsError::DeadEntity`], `MissingTable`, `BorrowConflict` or
    /// `MissingEntity`.
    pub fn detach<T: Component>(&mut self, entity: E) -> Result<T, EcsError> {
        self.ensure_alive(entity)?;
        Ok(self.tables.table_mut::<T>()?.remove(entity)?)
    }

    /// Detach and return every component of bundle `B`, or none of them.
    ///
    /// # Errors
    ///
    /// [`EcsError::DeadEntity`], `MissingTable`, `BorrowConflict` or
    /// `MissingEntity`.
    pub fn detach_bundle<B: Bundle<E>>(&mut self, entity: E) -> Result<B, EcsError> {
        self.ensure_alive(entity)?;
        Ok(B::detach(&self.tables, entity)?)
    }

    /// The `T` component of `entity`.
    ///
    /// # Errors
    ///
    /// `MissingTable`, `BorrowConflict` or `MissingEntity`.
    pub fn get<T: Component>(&self, entity: E) -> Result<Ref<'_, T>, EcsError> {
        let table = self.tables.table::<T>()?;
        Ok(Ref::try_map(table, |table| table.get(entity))?)
    }

    /// The `T` component of `entity`, mutably.
    ///
    /// # Errors
    ///
    /// `MissingTable`, `BorrowConflict` or `MissingEntity`.
    pub fn get_mut<T: Component>(&mut self, entity: E) -> Result<RefMut<'_, T>, EcsError> {
        let table = self.tables.table_mut::<T>()?;
        Ok(RefMut::try_map(table, |table| table.get_mut(entity))?)
    }

    /// Returns `true` if `entity` holds a `T` component.
    ///
    /// # Errors
    ///
    /// `MissingTable` or `BorrowConflict`.
    pub fn contains<T: Component>(&self, entity: E) -> Result<bool, EcsError> {
        Ok(self.tables.table::<T>()?.contains(entity))
    }

    // -- Views --

    /// A view over the tables of `B`, borrowed for writing.
    ///
    /// # Errors
    ///
    /// `MissingTable` or `BorrowConflict`.
    pub fn view<B: Bundle<E>>(&self) -> Result<View<B::Write<'_>>, EcsError> {
        Ok(View::new(B::borrow_mut(&self.tables)?))
    }

    /// A view over the tables of `B`, borrowed for reading.
    ///
    /// # Errors
    ///
    /// `MissingTable` or `BorrowConflict`.
    pub fn view_ref<B: Bundle<E>>(&self) -> Result<View<B::Read<'_>>, EcsError> {
        Ok(View::new(B::borrow(&self.tables)?))
    }

    // -- Systems --

    /// The system graph.
    #[must_use]
    pub fn system_graph(&self) -> &SystemGraph<E> {
        &self.systems
    }

    /// The system graph, mutably. Register systems through this.
    pub fn system_graph_mut(&mut self) -> &mut SystemGraph<E> {
        &mut self.systems
    }

    /// Set up every registered system and link the master task graph.
    ///
    /// The systems are moved out of the registry for the duration of the
    /// build, so inside [`System::setup`](crate::System::setup)
    /// `registry.system_graph()` is empty.
    ///
    /// # Errors
    ///
    /// See [`SystemGraph::build`].
    pub fn build_system_graph(&mut self) -> Result<(), EcsError> {
        let mut systems = std::mem::take(&mut self.systems);
        let result = systems.build(self);
        self.systems = systems;
        result
    }

    /// The master task graph, to hand to an executor.
    #[must_use]
    pub fn graph(&self) -> &TaskGraph {
        self.systems.graph()
    }

    /// Run the built system graph once on `executor` and wait for it.
    ///
    /// # Errors
    ///
    /// [`EcsError::NotBuilt`] before a successful build, otherwise the
    /// first task failure.
    pub fn run(&self, executor: &Executor) -> Result<RunReport, EcsError> {
        if !self.systems.is_built() {
            return Err(EcsError::NotBuilt);
        }
        Ok(executor.run_and_wait(self.systems.graph())?)
    }

    // -- Lifetime --

    /// Drop every component, system and entity.
    ///
    /// # Errors
    ///
    /// `BorrowConflict` if a table was borrowed; the registry is emptied
    /// regardless.
    pub fn clear(&mut self) -> Result<(), EcsError> {
        self.systems.clear();
        let tables = self.tables.clear();
        debug!(entities = self.alive, "registry cleared");
        self.entities.clear();
        self.last_destroyed = E::NULL;
        self.alive = 0;
        Ok(tables?)
    }
}

impl<E: EntityId> Default for Registry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EntityId> std::fmt::Debug for Registry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("entities", &self.alive)
            .field("tables", &self.tables)
            .field("systems", &self.systems)
            .finish()
    }
}
