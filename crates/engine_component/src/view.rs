//! Multi-table joins.
//!
//! A [`View`] holds one table per component type, each given as anything
//! that dereferences to a [`ComponentTable`]: plain references or the guards
//! returned by [`TableHandle`](crate::TableHandle). Iteration is driven by
//! the table with the fewest live entities (the first declared one on a
//! tie); every entity of the driver is probed against the other tables and
//! the callback fires for entities present in all of them.
//!
//! Views never mutate table structure. Code that needs to add or remove
//! components based on a join should [`View::collect`] the matching
//! entities first and mutate in a second pass.
//!
//! ```ignore
//! let mut view = View::new((&mut positions, &mut velocities));
//! view.traverse(|p: &mut Position, v: &mut Velocity| p.0 += v.0);
//! ```

use std::any::TypeId;
use std::ops::{Deref, DerefMut};

use crate::component::Component;
use crate::entity::EntityId;
use crate::error::ComponentError;
use crate::table::ComponentTable;

/// A table participating in a [`View`].
pub trait ViewTable {
    /// Component type stored by the table.
    type Component: Component;
    /// Entity width of the table.
    type Entity: EntityId;

    /// The underlying table.
    fn table(&self) -> &ComponentTable<Self::Component, Self::Entity>;
}

/// A table a [`View`] may hand out mutable components from.
pub trait ViewTableMut: ViewTable {
    /// The underlying table, mutably.
    fn table_mut(&mut self) -> &mut ComponentTable<Self::Component, Self::Entity>;
}

impl<D, T, E> ViewTable for D
where
    D: Deref<Target = ComponentTable<T, E>>,
    T: Component,
    E: EntityId,
{
    type Component = T;
    type Entity = E;

    #[inline]
    fn table(&self) -> &ComponentTable<T, E> {
        self
    }
}

impl<D, T, E> ViewTableMut for D
where
    D: DerefMut<Target = ComponentTable<T, E>>,
    T: Component,
    E: EntityId,
{
    #[inline]
    fn table_mut(&mut self) -> &mut ComponentTable<T, E> {
        self
    }
}

/// A join over a tuple of one to eight tables.
#[derive(Debug)]
pub struct View<D> {
    tables: D,
}

impl<D> View<D> {
    /// Build a view over `tables`.
    #[must_use]
    pub fn new(tables: D) -> Self {
        Self { tables }
    }

    /// Release the tables (and any borrow guards) held by the view.
    pub fn into_tables(self) -> D {
        self.tables
    }
}

/// Position of the first minimum.
fn first_min(lens: &[usize]) -> usize {
    lens.iter()
        .enumerate()
        .min_by_key(|(_, len)| **len)
        .map_or(0, |(index, _)| index)
}

macro_rules! impl_view {
    ($(($D:ident, $T:ident, $c:ident, $idx:tt)),+) => {
        impl<E, $($T, $D),+> View<($($D,)+)>
        where
            E: EntityId,
            $($T: Component, $D: ViewTable<Component = $T, Entity = E>,)+
        {
            /// Index (in declaration order) of the table that drives
            /// iteration: the smallest one, first declared on a tie.
            #[must_use]
            pub fn driver_index(&self) -> usize {
                first_min(&[$(self.tables.$idx.table().len()),+])
            }

            fn position_of<C: Component>() -> Result<usize, ComponentError> {
                [$(TypeId::of::<$T>()),+]
                    .iter()
                    .position(|id| *id == TypeId::of::<C>())
                    .ok_or(ComponentError::NotInView(std::any::type_name::<C>()))
            }

            fn driver_len(&self, driver: usize) -> usize {
                match driver {
                    $($idx => self.tables.$idx.table().len(),)+
                    _ => 0,
                }
            }

            fn driver_entity(&self, driver: usize, index: usize) -> E {
                match driver {
                    $($idx => self.tables.$idx.table().entities()[index],)+
                    _ => E::NULL,
                }
            }

            #[inline]
            fn matches(&self, entity: E) -> bool {
                $(self.tables.$idx.table().contains(entity))&&+
            }

            fn for_each_match(&self, driver: usize, mut f: impl FnMut(E)) -> usize {
                let mut matched = 0;
                for index in 0..self.driver_len(driver) {
                    let entity = self.driver_entity(driver, index);
                    if self.matches(entity) {
                        matched += 1;
                        f(entity);
                    }
                }
                matched
            }

            /// Call `f` with shared references to the components of every
            /// entity present in all tables. Returns whether `f` fired.
            pub fn traverse_ref<F>(&self, mut f: F) -> bool
            where
                F: FnMut($(&$T),+),
            {
                let driver = self.driver_index();
                self.for_each_match(driver, |entity| {
                    f($(self.tables.$idx.table().fetch(entity)),+)
                }) > 0
            }

            /// Like [`View::traverse_ref`], also passing the entity.
            pub fn traverse_ref_with_entity<F>(&self, mut f: F) -> bool
            where
                F: FnMut(E, $(&$T),+),
            {
                let driver = self.driver_index();
                self.for_each_match(driver, |entity| {
                    f(entity, $(self.tables.$idx.table().fetch(entity)),+)
                }) > 0
            }

            /// Append every matching entity to `out`, in driver order, and
            /// return how many were appended.
            pub fn collect<C: Extend<E>>(&self, out: &mut C) -> usize {
                let driver = self.driver_index();
                self.collect_from(driver, out)
            }

            /// Like [`View::collect`], with the driver pinned to the table of
            /// component `C`.
            ///
            /// # Errors
            ///
            /// [`ComponentError::NotInView`] if `C` is not joined by the view.
            pub fn collect_driven_by<C: Component, O: Extend<E>>(
                &self,
                out: &mut O,
            ) -> Result<usize, ComponentError> {
                let driver = Self::position_of::<C>()?;
                Ok(self.collect_from(driver, out))
            }

            fn collect_from<C: Extend<E>>(&self, driver: usize, out: &mut C) -> usize {
                self.for_each_match(driver, |entity| out.extend(Some(entity)))
            }

            /// Number of entities present in all tables.
            #[must_use]
            pub fn count(&self) -> usize {
                let driver = self.driver_index();
                self.for_each_match(driver, |_| {})
            }

            /// Returns `true` if no entity is present in all tables.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.count() == 0
            }
        }

        impl<E, $($T, $D),+> View<($($D,)+)>
        where
            E: EntityId,
            $($T: Component, $D: ViewTableMut<Component = $T, Entity = E>,)+
        {
            fn traverse_from<F>(&mut self, driver: usize, mut f: F) -> bool
            where
                F: FnMut(E, $(&mut $T),+),
            {
                let mut matched = false;
                // Callbacks cannot change table structure, so the driver's
                // length and dense order are fixed for the whole loop.
                for index in 0..self.driver_len(driver) {
                    let entity = self.driver_entity(driver, index);
                    if self.matches(entity) {
                        matched = true;
                        f(entity, $(self.tables.$idx.table_mut().fetch_mut(entity)),+);
                    }
                }
                matched
            }

            /// Call `f` with mutable references to the components of every
            /// entity present in all tables. Returns whether `f` fired.
            pub fn traverse<F>(&mut self, mut f: F) -> bool
            where
                F: FnMut($(&mut $T),+),
            {
                let driver = self.driver_index();
                self.traverse_from(driver, |_, $($c),+| f($($c),+))
            }

            /// Like [`View::traverse`], also passing the entity.
            pub fn traverse_with_entity<F>(&mut self, f: F) -> bool
            where
                F: FnMut(E, $(&mut $T),+),
            {
                let driver = self.driver_index();
                self.traverse_from(driver, f)
            }

            /// Like [`View::traverse`], with iteration pinned to the dense
            /// order of the table of component `C`.
            ///
            /// # Errors
            ///
            /// [`ComponentError::NotInView`] if `C` is not joined by the view.
            pub fn traverse_driven_by<C: Component, F>(
                &mut self,
                mut f: F,
            ) -> Result<bool, ComponentError>
            where
                F: FnMut($(&mut $T),+),
            {
                let driver = Self::position_of::<C>()?;
                Ok(self.traverse_from(driver, |_, $($c),+| f($($c),+)))
            }
        }
    };
}

impl_view!((D0, T0, c0, 0));
impl_view!((D0, T0, c0, 0), (D1, T1, c1, 1));
impl_view!((D0, T0, c0, 0), (D1, T1, c1, 1), (D2, T2, c2, 2));
impl_view!((D0, T0, c0, 0), (D1, T1, c1, 1), (D2, T2, c2, 2), (D3, T3, c3, 3));
impl_view!((D0, T0, c0, 0), (D1, T1, c1, 1), (D2, T2, c2, 2), (D3, T3, c3, 3), (D4, T4, c4, 4));
impl_view!(
    (D0, T0, c0, 0),
    (D1, T1, c1, 1),
    (D2, T2, c2, 2),
    (D3, T3, c3, 3),
    (D4, T4, c4, 4),
    (D5, T5, c5, 5)
);
impl_view!(
    (D0, T0, c0, 0),
    (D1, T1, c1, 1),
    (D2, T2, c2, 2),
    (D3, T3, c3, 3),
    (D4, T4, c4, 4),
    (D5, T5, c5, 5),
    (D6, T6, c6, 6)
);
impl_view!(
    (D0, T0, c0, 0),
    (D1, T1, c1, 1),
    (D2, T2, c2, 2),
    (D3, T3, c3, 3),
    (D4, T4, c4, 4),
    (D5, T5, c5, 5),
    (D6, T6, c6, 6),
    (D7, T7, c7, 7)
);

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::borrow::TableCell;
    use crate::entity::Entity;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position(f32);

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity(f32);

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Mass(u32);

    fn tables() -> (
        ComponentTable<Position>,
        ComponentTable<Velocity>,
        ComponentTable<Mass>,
    ) {
        let mut positions = ComponentTable::new();
        let mut velocities = ComponentTable::new();
        let mut masses = ComponentTable::new();
        for e in 0..10u32 {
            positions.add(e, Position(e as f32)).unwrap();
        }
        for e in (0..10u32).filter(|e| e % 2 == 0) {
            velocities.add(e, Velocity(e as f32 * 10.0)).unwrap();
        }
        for e in [2u32, 4, 5, 9] {
            masses.add(e, Mass(e)).unwrap();
        }
        (positions, velocities, masses)
    }

    #[test]
    fn test_traverse_visits_each_match_once() {
        let (positions, velocities, _) = tables();
        let view = View::new((&positions, &velocities));
        let mut seen = Vec::new();
        let fired = view.traverse_ref_with_entity(|e: Entity, p: &Position, v: &Velocity| {
            assert_eq!(p.0, e as f32);
            assert_eq!(v.0, e as f32 * 10.0);
            seen.push(e);
        });
        assert!(fired);
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn test_traverse_mutates_components() {
        let (mut positions, mut velocities, _) = tables();
        let mut view = View::new((&mut positions, &mut velocities));
        view.traverse(|p: &mut Position, v: &mut Velocity| p.0 += v.0);
        drop(view);
        assert_eq!(positions.get(4).unwrap(), &Position(44.0));
        assert_eq!(positions.get(3).unwrap(), &Position(3.0));
    }

    #[test]
    fn test_three_way_join() {
        let (positions, velocities, masses) = tables();
        let view = View::new((&positions, &velocities, &masses));
        let mut found = HashSet::new();
        assert_eq!(view.collect(&mut found), 2);
        assert_eq!(found, HashSet::from([2, 4]));
        assert_eq!(view.count(), 2);
    }

    #[test]
    fn test_collect_has_no_duplicates() {
        let (positions, velocities, _) = tables();
        let view = View::new((&positions, &velocities));
        let mut found = Vec::new();
        view.collect(&mut found);
        let unique: HashSet<_> = found.iter().copied().collect();
        assert_eq!(unique.len(), found.len());
        assert_eq!(found.len(), 5);
    }

    #[test]
    fn test_empty_table_never_fires() {
        let (positions, _, _) = tables();
        let empty = ComponentTable::<Velocity>::new();
        let view = View::new((&positions, &empty));
        assert!(!view.traverse_ref(|_: &Position, _: &Velocity| panic!("no match expected")));
        assert!(view.is_empty());
    }

    #[test]
    fn test_driver_is_smallest_table() {
        let (positions, velocities, masses) = tables();
        assert_eq!(View::new((&positions, &velocities)).driver_index(), 1);
        assert_eq!(View::new((&positions, &masses, &velocities)).driver_index(), 1);
    }

    #[test]
    fn test_driver_tie_goes_to_first_declared() {
        let mut a = ComponentTable::<Position>::new();
        let mut b = ComponentTable::<Velocity>::new();
        for e in [1u32, 2, 3] {
            a.add(e, Position(0.0)).unwrap();
            b.add(4 - e, Velocity(0.0)).unwrap();
        }
        let view = View::new((&a, &b));
        assert_eq!(view.driver_index(), 0);
        let mut order = Vec::new();
        view.collect(&mut order);
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_pinned_driver_controls_order() {
        let (mut positions, mut velocities, _) = tables();
        let mut view = View::new((&mut positions, &mut velocities));
        let mut order = Vec::new();
        view.collect_driven_by::<Position, _>(&mut order).unwrap();
        assert_eq!(order, vec![0, 2, 4, 6, 8]);

        let mut visited = Vec::new();
        let fired = view
            .traverse_driven_by::<Position, _>(|p: &mut Position, _: &mut Velocity| {
                visited.push(p.0)
            })
            .unwrap();
        assert!(fired);
        assert_eq!(visited, vec![0.0, 2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_pinned_driver_must_be_in_view() {
        let (positions, velocities, _) = tables();
        let view = View::new((&positions, &velocities));
        let mut out = Vec::new();
        assert!(matches!(
            view.collect_driven_by::<Mass, _>(&mut out),
            Err(ComponentError::NotInView(_))
        ));
    }

    #[test]
    fn test_order_follows_dense_order_after_removal() {
        let mut positions = ComponentTable::<Position>::new();
        for e in 0..4u32 {
            positions.add(e, Position(e as f32)).unwrap();
        }
        positions.remove(0).unwrap();
        let view = View::new((&positions,));
        let mut order = Vec::new();
        view.collect(&mut order);
        assert_eq!(order, vec![3, 1, 2]);
    }

    #[test]
    fn test_view_over_borrow_guards() {
        let positions = TableCell::new("Position", ComponentTable::<Position>::new());
        let velocities = TableCell::new("Velocity", ComponentTable::<Velocity>::new());
        positions.try_borrow_mut().unwrap().add(1, Position(1.0)).unwrap();
        velocities.try_borrow_mut().unwrap().add(1, Velocity(2.0)).unwrap();

        let mut view = View::new((
            positions.try_borrow_mut().unwrap(),
            velocities.try_borrow_mut().unwrap(),
        ));
        assert!(positions.try_borrow().is_err());
        view.traverse_with_entity(|e: Entity, p: &mut Position, v: &mut Velocity| {
            assert_eq!(e, 1);
            p.0 += v.0;
        });
        drop(view);
        assert_eq!(positions.try_borrow().unwrap().get(1).unwrap(), &Position(3.0));
    }

    #[test]
    fn test_collect_then_mutate() {
        let (mut positions, velocities, _) = tables();
        let mut moving = Vec::new();
        View::new((&positions, &velocities)).collect(&mut moving);
        for entity in moving {
            positions.remove(entity).unwrap();
        }
        assert_eq!(positions.len(), 5);
        assert!(positions.iter().all(|p| p.0 as u32 % 2 == 1));
    }
}
