//! Core [`Component`] trait and type identity.
//!
//! Any `Send + Sync + 'static` type is a component. Tables are keyed by
//! [`ComponentTypeId`], a process-stable identifier derived from the Rust
//! [`TypeId`] together with the type's name for diagnostics.

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};

/// The component trait.
///
/// Blanket-implemented for every `Send + Sync + 'static` type so plain
/// structs, primitives and standard containers can be stored directly.
/// `Send + Sync` is required because tables are shared with systems running
/// on worker threads.
pub trait Component: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Component for T {}

/// A unique identifier for a component type.
///
/// Equality and hashing only consider the underlying [`TypeId`]; the name is
/// carried for error messages and logs.
#[derive(Clone, Copy)]
pub struct ComponentTypeId {
    id: TypeId,
    name: &'static str,
}

impl ComponentTypeId {
    /// Returns the identifier of component type `T`.
    #[must_use]
    pub fn of<T: Component>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// The underlying Rust type id.
    #[must_use]
    pub fn rust_id(&self) -> TypeId {
        self.id
    }

    /// The full Rust type name (e.g. `"my_game::Velocity"`).
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ComponentTypeId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ComponentTypeId {}

impl Hash for ComponentTypeId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ComponentTypeId").field(&self.name).finish()
    }
}

impl fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Health {
        current: f32,
        max: f32,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Velocity {
        x: f32,
        y: f32,
    }

    #[test]
    fn test_component_type_id_is_stable() {
        assert_eq!(ComponentTypeId::of::<Health>(), ComponentTypeId::of::<Health>());
    }

    #[test]
    fn test_component_type_id_differs_between_types() {
        assert_ne!(
            ComponentTypeId::of::<Health>(),
            ComponentTypeId::of::<Velocity>()
        );
    }

    #[test]
    fn test_component_type_id_name() {
        let id = ComponentTypeId::of::<Health>();
        assert!(id.name().ends_with("Health"));
        assert_eq!(id.to_string(), id.name());
    }

    #[test]
    fn test_component_type_id_hashes_by_type() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(ComponentTypeId::of::<Health>());
        set.insert(ComponentTypeId::of::<Health>());
        set.insert(ComponentTypeId::of::<u32>());
        assert_eq!(set.len(), 2);
    }
}
