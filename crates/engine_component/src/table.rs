//! Per-type component storage.
//!
//! A [`ComponentTable`] pairs a [`SparseSet`] with a dense `Vec<T>`. Element
//! `i` of the value array always belongs to `entities()[i]`; removals apply
//! the same swap to both arrays so the alignment holds after every
//! operation. Iteration order is the current dense order, which is insertion
//! order only until the first removal.

use std::any::type_name;
use std::fmt;

use crate::component::Component;
use crate::entity::{Entity, EntityId};
use crate::error::ComponentError;
use crate::sparse_set::SparseSet;

/// Callback fired with the entity whose component was added or is about to
/// be removed.
pub type Observer<E> = Box<dyn FnMut(E) + Send + Sync>;

struct Observers<E> {
    on_add: Vec<Observer<E>>,
    on_remove: Vec<Observer<E>>,
}

/// Storage for every instance of component type `T`.
///
/// Observer lists are kept out of line so the table header has the same
/// size for every `T` and stays within two cache lines.
pub struct ComponentTable<T, E: EntityId = Entity> {
    indexes: SparseSet<E>,
    components: Vec<T>,
    observers: Option<Box<Observers<E>>>,
}

impl<T: Component, E: EntityId> ComponentTable<T, E> {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            indexes: SparseSet::new(),
            components: Vec::new(),
            observers: None,
        }
    }

    /// Component type name, used in errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        type_name::<T>()
    }

    /// Returns `true` if `entity` has a component in this table.
    #[inline]
    #[must_use]
    pub fn contains(&self, entity: E) -> bool {
        self.indexes.contains(entity)
    }

    /// Attach `value` to `entity` and return a reference to the stored
    /// component, valid until the next structural change of the table.
    ///
    /// Add observers fire before this returns.
    ///
    /// # Errors
    ///
    /// [`ComponentError::DuplicateEntity`] if `entity` already has a
    /// component here, [`ComponentError::NullEntity`] for the null id. The
    /// table is left untouched on error.
    pub fn add(&mut self, entity: E, value: T) -> Result<&mut T, ComponentError> {
        if entity.is_null() {
            return Err(ComponentError::NullEntity);
        }
        let index = self
            .indexes
            .insert(entity)
            .ok_or_else(|| self.duplicate(entity))?;
        debug_assert_eq!(index, self.components.len());
        self.components.push(value);
        if let Some(observers) = self.observers.as_mut() {
            for observer in &mut observers.on_add {
                observer(entity);
            }
        }
        Ok(&mut self.components[index])
    }

    /// Detach and return the component of `entity`.
    ///
    /// Remove observers fire first, while the entity is still present. The
    /// last component is then moved into the vacated slot.
    ///
    /// # Errors
    ///
    /// [`ComponentError::MissingEntity`] if `entity` has no component here.
    pub fn remove(&mut self, entity: E) -> Result<T, ComponentError> {
        if !self.contains(entity) {
            return Err(self.missing(entity));
        }
        if let Some(observers) = self.observers.as_mut() {
            for observer in &mut observers.on_remove {
                observer(entity);
            }
        }
        let index = self
            .indexes
            .remove(entity)
            .ok_or_else(|| self.missing(entity))?;
        Ok(self.components.swap_remove(index))
    }

    /// The component of `entity`.
    ///
    /// # Errors
    ///
    /// [`ComponentError::MissingEntity`] if `entity` has no component here.
    pub fn get(&self, entity: E) -> Result<&T, ComponentError> {
        match self.indexes.get_index(entity) {
            Some(index) => Ok(&self.components[index]),
            None => Err(self.missing(entity)),
        }
    }

    /// The component of `entity`, mutably.
    ///
    /// # Errors
    ///
    /// [`ComponentError::MissingEntity`] if `entity` has no component here.
    pub fn get_mut(&mut self, entity: E) -> Result<&mut T, ComponentError> {
        match self.indexes.get_index(entity) {
            Some(index) => Ok(&mut self.components[index]),
            None => Err(self.missing(entity)),
        }
    }

    /// Lookup for callers that already checked membership.
    #[inline]
    pub(crate) fn fetch(&self, entity: E) -> &T {
        &self.components[self.indexes.index_of(entity)]
    }

    #[inline]
    pub(crate) fn fetch_mut(&mut self, entity: E) -> &mut T {
        let index = self.indexes.index_of(entity);
        &mut self.components[index]
    }

    /// Number of stored components.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Returns `true` if the table is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Entities in dense order, index-aligned with [`ComponentTable::iter`].
    #[inline]
    #[must_use]
    pub fn entities(&self) -> &[E] {
        self.indexes.entities()
    }

    /// The underlying sparse set.
    #[must_use]
    pub fn sparse_set(&self) -> &SparseSet<E> {
        &self.indexes
    }

    /// Components in dense order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.components.iter()
    }

    /// Components in dense order, mutably.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.components.iter_mut()
    }

    /// `(entity, component)` pairs in dense order.
    pub fn iter_with_entities(&self) -> impl Iterator<Item = (E, &T)> {
        self.indexes
            .entities()
            .iter()
            .copied()
            .zip(self.components.iter())
    }

    /// `(entity, component)` pairs in dense order, mutably.
    pub fn iter_with_entities_mut(&mut self) -> impl Iterator<Item = (E, &mut T)> {
        self.indexes
            .entities()
            .iter()
            .copied()
            .zip(self.components.iter_mut())
    }

    /// Components as a dense slice.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.components
    }

    /// Components as a dense mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.components
    }

    /// Drop every component and release all sparse pages.
    ///
    /// Observers are kept and do not fire.
    pub fn clear(&mut self) {
        self.components.clear();
        self.indexes.clear();
    }

    /// Register a callback fired after each successful [`ComponentTable::add`].
    ///
    /// Observers run inline on the mutating thread and must not mutate this
    /// table.
    pub fn on_add<F>(&mut self, observer: F)
    where
        F: FnMut(E) + Send + Sync + 'static,
    {
        self.observers_mut().on_add.push(Box::new(observer));
    }

    /// Register a callback fired before each [`ComponentTable::remove`].
    pub fn on_remove<F>(&mut self, observer: F)
    where
        F: FnMut(E) + Send + Sync + 'static,
    {
        self.observers_mut().on_remove.push(Box::new(observer));
    }

    /// Drop every registered observer.
    pub fn clear_observers(&mut self) {
        self.observers = None;
    }

    fn observers_mut(&mut self) -> &mut Observers<E> {
        self.observers.get_or_insert_with(|| {
            Box::new(Observers {
                on_add: Vec::new(),
                on_remove: Vec::new(),
            })
        })
    }

    fn duplicate(&self, entity: E) -> ComponentError {
        ComponentError::DuplicateEntity {
            entity: entity.to_u64(),
            table: self.name(),
        }
    }

    fn missing(&self, entity: E) -> ComponentError {
        ComponentError::MissingEntity {
            entity: entity.to_u64(),
            table: self.name(),
        }
    }
}

impl<T: Component, E: EntityId> Default for ComponentTable<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Component + fmt::Debug, E: EntityId> fmt::Debug for ComponentTable<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter_with_entities()).finish()
    }
}

impl<'a, T: Component, E: EntityId> IntoIterator for &'a ComponentTable<T, E> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T: Component, E: EntityId> IntoIterator for &'a mut ComponentTable<T, E> {
    type Item = &'a mut T;
    type IntoIter = std::slice::IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}
