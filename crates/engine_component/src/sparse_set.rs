//! Paged sparse set mapping entity ids to dense indices.
//!
//! The set keeps two arrays:
//!
//! - **sparse pages**: lazily allocated, fixed-size pages mapping
//!   `entity -> dense index`. A page holds `16 KiB / size_of::<E>()` slots and
//!   is only allocated when an entity in its range is first inserted.
//! - **dense array**: the live entities, packed. The position of an entity in
//!   this array is the index stored in its sparse slot.
//!
//! For every entity `e` present, `dense[sparse[e]] == e`. Removal swaps the
//! removed entity with the last dense element and returns the vacated index
//! so a parallel value array can mirror the same swap.

use crate::entity::EntityId;

/// Size in bytes of one sparse page.
pub const PAGE_BYTES: usize = 16 * 1024;

/// A sparse set of entity identifiers with O(1) insert, remove and lookup.
#[derive(Debug, Clone, Default)]
pub struct SparseSet<E: EntityId> {
    /// Sparse pages. `None` until an entity in the page range is inserted.
    pages: Vec<Option<Box<[E]>>>,
    /// Live entities, packed. Index in this vector is the dense index.
    dense: Vec<E>,
}

impl<E: EntityId> SparseSet<E> {
    /// Number of slots in one sparse page.
    pub const PAGE_SIZE: usize = PAGE_BYTES / std::mem::size_of::<E>();

    /// Create an empty set. No page is allocated.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pages: Vec::new(),
            dense: Vec::new(),
        }
    }

    #[inline]
    fn page_index(entity: E) -> usize {
        entity.to_index() / Self::PAGE_SIZE
    }

    #[inline]
    fn slot_index(entity: E) -> usize {
        entity.to_index() % Self::PAGE_SIZE
    }

    /// Returns the raw sparse slot of `entity`, or `None` if its page was
    /// never allocated.
    #[inline]
    fn slot(&self, entity: E) -> Option<E> {
        self.pages
            .get(Self::page_index(entity))?
            .as_ref()
            .map(|page| page[Self::slot_index(entity)])
    }

    fn slot_mut(&mut self, entity: E) -> &mut E {
        let page_index = Self::page_index(entity);
        if page_index >= self.pages.len() {
            self.pages.resize_with(page_index + 1, || None);
        }
        let page = self.pages[page_index]
            .get_or_insert_with(|| vec![E::NULL; Self::PAGE_SIZE].into_boxed_slice());
        &mut page[Self::slot_index(entity)]
    }

    /// Returns `true` if `entity` is present.
    #[inline]
    #[must_use]
    pub fn contains(&self, entity: E) -> bool {
        !entity.is_null() && self.slot(entity).is_some_and(|slot| !slot.is_null())
    }

    /// Inserts `entity` and returns its dense index.
    ///
    /// Returns `None` without modifying the set if `entity` is already
    /// present or is [`EntityId::NULL`].
    pub fn insert(&mut self, entity: E) -> Option<usize> {
        debug_assert!(!entity.is_null(), "null entity inserted into sparse set");
        if entity.is_null() || self.contains(entity) {
            return None;
        }
        let index = self.dense.len();
        // The dense array never grows past the id width: every live id is
        // unique and below NULL.
        *self.slot_mut(entity) = E::from_index(index);
        self.dense.push(entity);
        Some(index)
    }

    /// Removes `entity` by swapping it with the last dense element.
    ///
    /// Returns the vacated dense index, or `None` if `entity` is absent.
    pub fn remove(&mut self, entity: E) -> Option<usize> {
        if !self.contains(entity) {
            return None;
        }
        let index = self.index_of(entity);
        let last = self.dense.len() - 1;
        if index != last {
            let moved = self.dense[last];
            self.dense.swap(index, last);
            *self.slot_mut(moved) = E::from_index(index);
        }
        self.dense.pop();
        *self.slot_mut(entity) = E::NULL;
        Some(index)
    }

    /// Returns the dense index of `entity`.
    ///
    /// The entity must be present; this is only checked in debug builds.
    /// Release builds return an unspecified index for absent entities.
    #[inline]
    #[must_use]
    pub fn index_of(&self, entity: E) -> usize {
        debug_assert!(self.contains(entity), "entity {entity} not in sparse set");
        self.slot(entity).map_or(usize::MAX, E::to_index)
    }

    /// Returns the dense index of `entity`, or `None` if it is absent.
    #[inline]
    #[must_use]
    pub fn get_index(&self, entity: E) -> Option<usize> {
        self.contains(entity).then(|| self.index_of(entity))
    }

    /// Live entities in current dense order.
    #[inline]
    #[must_use]
    pub fn entities(&self) -> &[E] {
        &self.dense
    }

    /// Number of live entities.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.dense.len()
    }

    /// Returns `true` if no entity is present.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// Number of allocated sparse pages.
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.iter().filter(|page| page.is_some()).count()
    }

    /// Releases every page and empties the dense array.
    pub fn clear(&mut self) {
        self.pages.clear();
        self.dense.clear();
    }
}
