//! # engine_ecs
//!
//! The entity registry and its system graph.
//!
//! - [`Registry`]: creates and recycles entities, owns one component table
//!   per registered type, and hands out [`View`]s over bundles of tables.
//! - [`System`]: per-tick logic that enqueues tasks into its own
//!   [`TaskGraph`] fragment and names the systems it runs after.
//! - [`SystemGraph`]: orders systems by their dependencies, rejects unknown
//!   dependencies and cycles, and links every fragment into one master graph
//!   that an [`Executor`] runs.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use engine_ecs::{EcsError, Executor, ExecutorConfig, Registry, System, TaskGraph};
//!
//! struct Position(f32);
//! struct Velocity(f32);
//!
//! struct Integrate;
//!
//! impl System for Integrate {
//!     fn setup(&mut self, registry: &Registry, graph: &mut TaskGraph) -> Result<(), EcsError> {
//!         let (positions, velocities) = registry.handles::<(Position, Velocity)>()?;
//!         graph.emplace("integrate", move || {
//!             let mut view = engine_ecs::View::new((positions.write()?, velocities.write()?));
//!             view.traverse(|p: &mut Position, v: &mut Velocity| p.0 += v.0);
//!             Ok(())
//!         });
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> Result<(), EcsError> {
//! let mut registry = Registry::new();
//! registry.register_component::<Position>()?;
//! registry.register_component::<Velocity>()?;
//! registry.add_with((Position(0.0), Velocity(1.0)))?;
//! registry.system_graph_mut().add(Integrate)?;
//! registry.build_system_graph()?;
//!
//! let executor = Executor::new(ExecutorConfig::from_env())?;
//! registry.run(&executor)?;
//! # Ok(())
//! # }
//! ```

pub mod bundle;
pub mod error;
pub mod registry;
pub mod system;
pub mod system_graph;

pub use bundle::Bundle;
pub use error::EcsError;
pub use registry::Registry;
pub use system::{System, SystemId};
pub use system_graph::SystemGraph;

pub use engine_component::{
    Component, ComponentError, ComponentTable, Entity, EntityId, LongEntity, Ref, RefMut,
    ShortEntity, TableHandle, View,
};
pub use engine_flow::{Executor, ExecutorConfig, FlowError, RunReport, TaskGraph, TaskId};
