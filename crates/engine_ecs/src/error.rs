//! Registry and system graph error types.

use engine_component::ComponentError;
use engine_flow::FlowError;

/// Errors raised by the [`Registry`](crate::Registry) and
/// [`SystemGraph`](crate::SystemGraph).
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// A component table operation failed.
    #[error(transparent)]
    Component(#[from] ComponentError),

    /// Building or running the task graph failed.
    #[error(transparent)]
    Flow(#[from] FlowError),

    /// A system of this type is already registered.
    #[error("system `{0}` is already registered")]
    DuplicateSystem(&'static str),

    /// No system of this type is registered.
    #[error("system `{0}` is not registered")]
    MissingSystem(&'static str),

    /// A declared dependency does not match any registered system.
    #[error("system `{system}` depends on unregistered system `{dependency}`")]
    UnknownDependency {
        /// The declaring system.
        system: &'static str,
        /// The unresolved dependency.
        dependency: &'static str,
    },

    /// The dependency relation contains a cycle. `path` starts and ends with
    /// the same system.
    #[error("cyclic system dependency: {}", path.join(" -> "))]
    CyclicDependency {
        /// Systems along the cycle, in dependency order.
        path: Vec<&'static str>,
    },

    /// The system graph must be built before it can run.
    #[error("system graph is not built")]
    NotBuilt,

    /// The entity is not alive in this registry.
    #[error("entity {0} is not alive")]
    DeadEntity(u64),

    /// Every identifier of the entity width is in use.
    #[error("entity identifiers exhausted")]
    EntityExhausted,
}
