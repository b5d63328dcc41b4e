//! Groups of components handled as one unit.
//!
//! A [`Bundle`] is a tuple of up to eight component types. Bundles let the
//! registry create an entity with several components, attach or detach
//! several components at once, and borrow several tables to build a
//! [`View`](engine_component::View).
//!
//! Multi-component attach and detach validate every table first: all tables
//! must be registered and borrowable, and the entity must lack (attach) or
//! hold (detach) every component. Nothing is changed when a check fails.

use engine_component::{
    Component, ComponentError, ComponentTable, EntityId, OpaqueTableRegistry, Ref, RefMut,
    TableHandle,
};

/// A tuple of distinct component types.
pub trait Bundle<E: EntityId>: Sized + Send + Sync + 'static {
    /// Write guards over every table of the bundle.
    type Write<'a>
    where
        E: 'a;
    /// Read guards over every table of the bundle.
    type Read<'a>
    where
        E: 'a;
    /// Cloneable handles to every table of the bundle.
    type Handles: Clone + Send + Sync + 'static;

    /// Component type names, in tuple order.
    fn names() -> Vec<&'static str>;

    /// Attach every component of `self` to `entity`.
    ///
    /// # Errors
    ///
    /// [`ComponentError::MissingTable`], [`ComponentError::BorrowConflict`]
    /// or [`ComponentError::DuplicateEntity`]; no component is attached.
    fn attach(self, tables: &OpaqueTableRegistry<E>, entity: E) -> Result<(), ComponentError>;

    /// Detach and return every component of the bundle from `entity`.
    ///
    /// # Errors
    ///
    /// [`ComponentError::MissingTable`], [`ComponentError::BorrowConflict`]
    /// or [`ComponentError::MissingEntity`]; no component is detached.
    fn detach(tables: &OpaqueTableRegistry<E>, entity: E) -> Result<Self, ComponentError>;

    /// Remove whichever components of the bundle `entity` holds and return
    /// how many were removed.
    ///
    /// # Errors
    ///
    /// [`ComponentError::MissingTable`] or [`ComponentError::BorrowConflict`].
    fn remove_present(tables: &OpaqueTableRegistry<E>, entity: E)
    -> Result<usize, ComponentError>;

    /// Borrow every table for writing.
    ///
    /// # Errors
    ///
    /// [`ComponentError::MissingTable`] or [`ComponentError::BorrowConflict`].
    fn borrow_mut(tables: &OpaqueTableRegistry<E>) -> Result<Self::Write<'_>, ComponentError>;

    /// Borrow every table for reading.
    ///
    /// # Errors
    ///
    /// [`ComponentError::MissingTable`] or [`ComponentError::BorrowConflict`].
    fn borrow(tables: &OpaqueTableRegistry<E>) -> Result<Self::Read<'_>, ComponentError>;

    /// Handles to every table.
    ///
    /// # Errors
    ///
    /// [`ComponentError::MissingTable`].
    fn handles(tables: &OpaqueTableRegistry<E>) -> Result<Self::Handles, ComponentError>;
}

macro_rules! impl_bundle {
    ($(($T:ident, $v:ident, $idx:tt)),+) => {
        impl<E: EntityId, $($T: Component),+> Bundle<E> for ($($T,)+) {
            type Write<'a> = ($(RefMut<'a, ComponentTable<$T, E>>,)+);
            type Read<'a> = ($(Ref<'a, ComponentTable<$T, E>>,)+);
            type Handles = ($(TableHandle<$T, E>,)+);

            fn names() -> Vec<&'static str> {
                vec![$(std::any::type_name::<$T>()),+]
            }

            fn attach(
                self,
                tables: &OpaqueTableRegistry<E>,
                entity: E,
            ) -> Result<(), ComponentError> {
                let mut guards = Self::borrow_mut(tables)?;
                if entity.is_null() {
                    return Err(ComponentError::NullEntity);
                }
                $(
                    if guards.$idx.contains(entity) {
                        return Err(ComponentError::DuplicateEntity {
                            entity: entity.to_u64(),
                            table: guards.$idx.name(),
                        });
                    }
                )+
                $(guards.$idx.add(entity, self.$idx)?;)+
                Ok(())
            }

            fn detach(
                tables: &OpaqueTableRegistry<E>,
                entity: E,
            ) -> Result<Self, ComponentError> {
                let mut guards = Self::borrow_mut(tables)?;
                $(
                    if !guards.$idx.contains(entity) {
                        return Err(ComponentError::MissingEntity {
                            entity: entity.to_u64(),
                            table: guards.$idx.name(),
                        });
                    }
                )+
                $(let $v = guards.$idx.remove(entity)?;)+
                Ok(($($v,)+))
            }

            fn remove_present(
                tables: &OpaqueTableRegistry<E>,
                entity: E,
            ) -> Result<usize, ComponentError> {
                let mut guards = Self::borrow_mut(tables)?;
                let mut removed = 0;
                $(
                    if guards.$idx.contains(entity) {
                        guards.$idx.remove(entity)?;
                        removed += 1;
                    }
                )+
                Ok(removed)
            }

            fn borrow_mut(
                tables: &OpaqueTableRegistry<E>,
            ) -> Result<Self::Write<'_>, ComponentError> {
                Ok(($(tables.table_mut::<$T>()?,)+))
            }

            fn borrow(tables: &OpaqueTableRegistry<E>) -> Result<Self::Read<'_>, ComponentError> {
                Ok(($(tables.table::<$T>()?,)+))
            }

            fn handles(tables: &OpaqueTableRegistry<E>) -> Result<Self::Handles, ComponentError> {
                Ok(($(tables.handle::<$T>()?,)+))
            }
        }
    };
}

impl_bundle!((A, a, 0));
impl_bundle!((A, a, 0), (B, b, 1));
impl_bundle!((A, a, 0), (B, b, 1), (C, c, 2));
impl_bundle!((A, a, 0), (B, b, 1), (C, c, 2), (D, d, 3));
impl_bundle!((A, a, 0), (B, b, 1), (C, c, 2), (D, d, 3), (F, f, 4));
impl_bundle!((A, a, 0), (B, b, 1), (C, c, 2), (D, d, 3), (F, f, 4), (G, g, 5));
impl_bundle!(
    (A, a, 0),
    (B, b, 1),
    (C, c, 2),
    (D, d, 3),
    (F, f, 4),
    (G, g, 5),
    (H, h, 6)
);
impl_bundle!(
    (A, a, 0),
    (B, b, 1),
    (C, c, 2),
    (D, d, 3),
    (F, f, 4),
    (G, g, 5),
    (H, h, 6),
    (I, i, 7)
);

#[cfg(test)]
mod tests {
    use engine_component::{BorrowKind, Entity};

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Position(i32);

    #[derive(Debug, Clone, PartialEq)]
    struct Velocity(i32);

    fn tables() -> OpaqueTableRegistry<Entity> {
        let mut tables = OpaqueTableRegistry::new();
        tables.add::<Position>().unwrap();
        tables.add::<Velocity>().unwrap();
        tables
    }

    #[test]
    fn test_attach_and_detach() {
        let tables = tables();
        (Position(1), Velocity(2)).attach(&tables, 5).unwrap();
        assert_eq!(tables.table::<Velocity>().unwrap().get(5).unwrap(), &Velocity(2));
        let (p, v) = <(Position, Velocity)>::detach(&tables, 5).unwrap();
        assert_eq!((p, v), (Position(1), Velocity(2)));
        assert!(tables.table::<Position>().unwrap().is_empty());
    }

    #[test]
    fn test_attach_is_all_or_nothing() {
        let tables = tables();
        tables.table_mut::<Velocity>().unwrap().add(5, Velocity(0)).unwrap();
        let err = (Position(1), Velocity(2)).attach(&tables, 5).unwrap_err();
        assert!(matches!(err, ComponentError::DuplicateEntity { entity: 5, .. }));
        assert!(!tables.table::<Position>().unwrap().contains(5));
        assert_eq!(tables.table::<Velocity>().unwrap().get(5).unwrap(), &Velocity(0));
    }

    #[test]
    fn test_attach_to_unregistered_table() {
        let tables = tables();
        let err = (Position(1), 7u8).attach(&tables, 1).unwrap_err();
        assert!(matches!(err, ComponentError::MissingTable(_)));
        assert!(tables.table::<Position>().unwrap().is_empty());
    }

    #[test]
    fn test_detach_is_all_or_nothing() {
        let tables = tables();
        tables.table_mut::<Position>().unwrap().add(3, Position(3)).unwrap();
        let err = <(Position, Velocity)>::detach(&tables, 3).unwrap_err();
        assert!(matches!(err, ComponentError::MissingEntity { entity: 3, .. }));
        assert!(tables.table::<Position>().unwrap().contains(3));
    }

    #[test]
    fn test_repeated_type_conflicts() {
        let tables = tables();
        let err = (Position(1), Position(2)).attach(&tables, 1).unwrap_err();
        assert_eq!(
            err,
            ComponentError::BorrowConflict {
                table: std::any::type_name::<Position>(),
                held: BorrowKind::Exclusive
            }
        );
    }

    #[test]
    fn test_remove_present_skips_absent() {
        let tables = tables();
        tables.table_mut::<Position>().unwrap().add(9, Position(9)).unwrap();
        assert_eq!(<(Position, Velocity)>::remove_present(&tables, 9).unwrap(), 1);
        assert_eq!(<(Position, Velocity)>::remove_present(&tables, 9).unwrap(), 0);
    }

    #[test]
    fn test_names_in_tuple_order() {
        let names = <(Velocity, Position) as Bundle<Entity>>::names();
        assert!(names[0].ends_with("Velocity"));
        assert!(names[1].ends_with("Position"));
    }
}
