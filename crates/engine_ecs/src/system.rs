//! The [`System`] trait and system identity.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};

use engine_component::{Entity, EntityId};
use engine_flow::TaskGraph;

use crate::error::EcsError;
use crate::registry::Registry;

/// Identity of a system type, used to declare dependencies.
#[derive(Clone, Copy)]
pub struct SystemId {
    id: TypeId,
    name: &'static str,
}

impl SystemId {
    /// Returns the identifier of system type `S`.
    #[must_use]
    pub fn of<S: 'static>() -> Self {
        Self {
            id: TypeId::of::<S>(),
            name: type_name::<S>(),
        }
    }

    /// The full Rust type name of the system.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for SystemId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SystemId {}

impl Hash for SystemId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SystemId").field(&self.name).finish()
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A unit of per-tick logic.
///
/// During [`SystemGraph::build`](crate::SystemGraph::build) each system
/// receives its own empty [`TaskGraph`] fragment in [`System::setup`] and
/// fills it with tasks. Tasks typically capture
/// [`TableHandle`](engine_component::TableHandle)s obtained from the
/// registry and borrow the tables when they run. Every task of a system
/// starts only after all tasks of the systems it depends on completed.
///
/// ```rust,ignore
/// struct Integrate;
///
/// impl System for Integrate {
///     fn setup(&mut self, registry: &Registry, graph: &mut TaskGraph) -> Result<(), EcsError> {
///         let positions = registry.handle::<Position>()?;
///         graph.emplace("integrate", move || {
///             for p in positions.write()?.iter_mut() { p.0 += 1.0; }
///             Ok(())
///         });
///         Ok(())
///     }
///
///     fn dependencies(&self) -> Vec<SystemId> {
///         vec![SystemId::of::<Accelerate>()]
///     }
/// }
/// ```
pub trait System<E: EntityId = Entity>: Send + 'static {
    /// Enqueue this system's tasks into `graph`.
    ///
    /// # Errors
    ///
    /// Any error aborts the build; the master graph is left empty.
    fn setup(&mut self, registry: &Registry<E>, graph: &mut TaskGraph) -> Result<(), EcsError>;

    /// Systems that must complete before this one starts.
    fn dependencies(&self) -> Vec<SystemId> {
        Vec::new()
    }

    /// Name used in task names and logs.
    fn name(&self) -> &'static str {
        type_name::<Self>()
    }
}

/// Object-safe extension used to recover the concrete system type.
pub(crate) trait AnySystem<E: EntityId>: System<E> {
    fn id(&self) -> SystemId;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<E: EntityId, S: System<E>> AnySystem<E> for S {
    fn id(&self) -> SystemId {
        SystemId::of::<S>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Physics;
    struct Render;

    #[test]
    fn test_system_id_by_type() {
        assert_eq!(SystemId::of::<Physics>(), SystemId::of::<Physics>());
        assert_ne!(SystemId::of::<Physics>(), SystemId::of::<Render>());
        assert!(SystemId::of::<Physics>().name().ends_with("Physics"));
    }

    #[test]
    fn test_system_id_display() {
        let id = SystemId::of::<Render>();
        assert_eq!(id.to_string(), id.name());
    }
}
