//! Dependency-ordered collection of systems.
//!
//! A [`SystemGraph`] owns the registered systems and one master
//! [`TaskGraph`]. [`SystemGraph::build`] resolves every declared dependency,
//! rejects cycles with a three-colour depth-first walk, then asks each
//! system to fill its own fragment and links the fragments so that a
//! system's tasks start only after every task of its dependencies
//! completed. No system task runs during a build.
//!
//! States: unbuilt (systems registered, master graph empty), built (master
//! graph ready for repeated runs) and cleared (no systems).

use engine_component::{Entity, EntityId};
use engine_flow::{Fragment, TaskGraph};
use tracing::{debug, info};

use crate::error::EcsError;
use crate::registry::Registry;
use crate::system::{AnySystem, System, SystemId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

/// Registered systems plus the task graph they were linked into.
pub struct SystemGraph<E: EntityId = Entity> {
    systems: Vec<Box<dyn AnySystem<E>>>,
    graph: TaskGraph,
    built: bool,
}

impl<E: EntityId> SystemGraph<E> {
    /// Create an empty system graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            systems: Vec::new(),
            graph: TaskGraph::new(),
            built: false,
        }
    }

    /// Register `system` and return a reference to the stored instance.
    ///
    /// A built graph returns to the unbuilt state.
    ///
    /// # Errors
    ///
    /// [`EcsError::DuplicateSystem`] if a system of type `S` is already
    /// registered.
    pub fn add<S: System<E>>(&mut self, system: S) -> Result<&mut S, EcsError> {
        let id = SystemId::of::<S>();
        if self.position(id).is_some() {
            return Err(EcsError::DuplicateSystem(id.name()));
        }
        self.reset_graph();
        self.systems.push(Box::new(system));
        info!(
            system = id.name(),
            systems = self.systems.len(),
            "system registered"
        );
        self.systems
            .last_mut()
            .and_then(|system| system.as_any_mut().downcast_mut::<S>())
            .ok_or(EcsError::MissingSystem(id.name()))
    }

    /// Returns `true` if a system of type `S` is registered.
    #[must_use]
    pub fn exists<S: System<E>>(&self) -> bool {
        self.position(SystemId::of::<S>()).is_some()
    }

    /// The registered system of type `S`.
    ///
    /// # Errors
    ///
    /// [`EcsError::MissingSystem`] if no such system is registered.
    pub fn get<S: System<E>>(&self) -> Result<&S, EcsError> {
        let id = SystemId::of::<S>();
        self.position(id)
            .and_then(|index| self.systems[index].as_any().downcast_ref::<S>())
            .ok_or(EcsError::MissingSystem(id.name()))
    }

    /// The registered system of type `S`, mutably.
    ///
    /// # Errors
    ///
    /// [`EcsError::MissingSystem`] if no such system is registered.
    pub fn get_mut<S: System<E>>(&mut self) -> Result<&mut S, EcsError> {
        let id = SystemId::of::<S>();
        match self.position(id) {
            Some(index) => self.systems[index]
                .as_any_mut()
                .downcast_mut::<S>()
                .ok_or(EcsError::MissingSystem(id.name())),
            None => Err(EcsError::MissingSystem(id.name())),
        }
    }

    // Linear scan; system counts are small and lookups happen at setup.
    fn position(&self, id: SystemId) -> Option<usize> {
        self.systems.iter().position(|system| system.id() == id)
    }

    /// Number of registered systems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// Returns `true` if no system is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Returns `true` after a successful [`SystemGraph::build`], until the
    /// next registration or [`SystemGraph::clear`].
    #[must_use]
    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Registered system ids, in registration order.
    pub fn ids(&self) -> impl Iterator<Item = SystemId> + '_ {
        self.systems.iter().map(|system| system.id())
    }

    /// The master task graph. Empty until built.
    #[must_use]
    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Systems linearised so that every system follows its dependencies.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownDependency`] or [`EcsError::CyclicDependency`].
    pub fn order(&self) -> Result<Vec<SystemId>, EcsError> {
        let dependencies = self.resolve()?;
        let order = self.linearize(&dependencies)?;
        Ok(order.into_iter().map(|index| self.systems[index].id()).collect())
    }

    /// Map each system's declared dependencies to indices.
    fn resolve(&self) -> Result<Vec<Vec<usize>>, EcsError> {
        self.systems
            .iter()
            .map(|system| {
                system
                    .dependencies()
                    .into_iter()
                    .map(|dependency| {
                        self.position(dependency)
                            .ok_or(EcsError::UnknownDependency {
                                system: system.name(),
                                dependency: dependency.name(),
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect()
    }

    /// Depth-first post-order over the dependency relation.
    fn linearize(&self, dependencies: &[Vec<usize>]) -> Result<Vec<usize>, EcsError> {
        let mut marks = vec![Mark::Unvisited; self.systems.len()];
        let mut path = Vec::new();
        let mut order = Vec::with_capacity(self.systems.len());
        for root in 0..self.systems.len() {
            if let Err(cycle) = visit(root, dependencies, &mut marks, &mut path, &mut order) {
                return Err(EcsError::CyclicDependency {
                    path: cycle
                        .into_iter()
                        .map(|index| self.systems[index].name())
                        .collect(),
                });
            }
        }
        Ok(order)
    }

    /// Set up every system and link the fragments into the master graph.
    ///
    /// Dependencies and cycles are checked before any setup runs. Systems
    /// are set up in dependency order. A system that adds no task gets a
    /// placeholder so that ordering through it still holds.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownDependency`], [`EcsError::CyclicDependency`], or
    /// the first error returned by a system's setup. On error the master
    /// graph is left empty and the graph unbuilt.
    pub fn build(&mut self, registry: &Registry<E>) -> Result<(), EcsError> {
        self.reset_graph();
        let dependencies = self.resolve()?;
        let order = self.linearize(&dependencies)?;
        match self.link(registry, &dependencies, &order) {
            Ok(()) => {
                self.built = true;
                info!(
                    systems = self.systems.len(),
                    tasks = self.graph.len(),
                    edges = self.graph.edge_count(),
                    "system graph built"
                );
                Ok(())
            }
            Err(err) => {
                self.reset_graph();
                Err(err)
            }
        }
    }

    fn link(
        &mut self,
        registry: &Registry<E>,
        dependencies: &[Vec<usize>],
        order: &[usize],
    ) -> Result<(), EcsError> {
        let mut fragments = vec![Fragment::default(); self.systems.len()];
        for &index in order {
            let system = &mut self.systems[index];
            let mut fragment = TaskGraph::new();
            system.setup(registry, &mut fragment)?;
            if fragment.is_empty() {
                fragment.placeholder(system.name());
            }
            debug!(system = system.name(), tasks = fragment.len(), "system set up");
            fragments[index] = self.graph.absorb(fragment);
        }
        for (successor, predecessors) in dependencies.iter().enumerate() {
            for &predecessor in predecessors {
                for &exit in &fragments[predecessor].exits {
                    for &entry in &fragments[successor].entries {
                        self.graph.precede(exit, entry)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn reset_graph(&mut self) {
        self.graph.clear();
        self.built = false;
    }

    /// Drop every system and empty the master graph.
    pub fn clear(&mut self) {
        self.systems.clear();
        self.reset_graph();
    }
}

/// Three-colour visit. On a cycle returns the path from the revisited
/// system back to itself.
fn visit(
    node: usize,
    dependencies: &[Vec<usize>],
    marks: &mut [Mark],
    path: &mut Vec<usize>,
    order: &mut Vec<usize>,
) -> Result<(), Vec<usize>> {
    match marks[node] {
        Mark::Done => return Ok(()),
        Mark::Visiting => {
            let start = path.iter().position(|&n| n == node).unwrap_or(0);
            let mut cycle = path[start..].to_vec();
            cycle.push(node);
            return Err(cycle);
        }
        Mark::Unvisited => {}
    }
    marks[node] = Mark::Visiting;
    path.push(node);
    for &dependency in &dependencies[node] {
        visit(dependency, dependencies, marks, path, order)?;
    }
    path.pop();
    marks[node] = Mark::Done;
    order.push(node);
    Ok(())
}

impl<E: EntityId> Default for SystemGraph<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EntityId> std::fmt::Debug for SystemGraph<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemGraph")
            .field("systems", &self.ids().collect::<Vec<_>>())
            .field("built", &self.built)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use engine_flow::{Executor, ExecutorConfig};

    use super::*;

    type Log = Arc<Mutex<Vec<&'static str>>>;

    /// Declares a system that appends its label to a shared log.
    macro_rules! logging_system {
        ($name:ident, $label:literal, [$($dep:ident),*]) => {
            struct $name(Log);

            impl System for $name {
                fn setup(
                    &mut self,
                    _registry: &Registry,
                    graph: &mut TaskGraph,
                ) -> Result<(), EcsError> {
                    let log = self.0.clone();
                    graph.emplace($label, move || {
                        log.lock().unwrap().push($label);
                        Ok(())
                    });
                    Ok(())
                }

                fn dependencies(&self) -> Vec<SystemId> {
                    vec![$(SystemId::of::<$dep>()),*]
                }
            }
        };
    }

    logging_system!(A, "A", [B, E]);
    logging_system!(B, "B", []);
    logging_system!(C, "C", [B, D]);
    logging_system!(D, "D", [B]);
    logging_system!(E, "E", [D, C]);

    logging_system!(X, "X", [Y]);
    logging_system!(Y, "Y", [Z]);
    logging_system!(Z, "Z", [X]);

    logging_system!(First, "first", []);
    logging_system!(Second, "second", [First]);
    logging_system!(Orphan, "orphan", [Missing]);

    struct Missing;

    impl System for Missing {
        fn setup(&mut self, _registry: &Registry, _graph: &mut TaskGraph) -> Result<(), EcsError> {
            Ok(())
        }
    }

    struct SelfLoop;

    impl System for SelfLoop {
        fn setup(&mut self, _registry: &Registry, _graph: &mut TaskGraph) -> Result<(), EcsError> {
            Ok(())
        }

        fn dependencies(&self) -> Vec<SystemId> {
            vec![SystemId::of::<SelfLoop>()]
        }
    }

    /// Adds no task; ordering must still pass through it.
    struct Relay(Log);

    impl System for Relay {
        fn setup(&mut self, _registry: &Registry, _graph: &mut TaskGraph) -> Result<(), EcsError> {
            Ok(())
        }

        fn dependencies(&self) -> Vec<SystemId> {
            vec![SystemId::of::<First>()]
        }
    }

    logging_system!(AfterRelay, "after-relay", [Relay]);

    fn run(graph: &SystemGraph) {
        Executor::new(ExecutorConfig::new().with_workers(4))
            .unwrap()
            .run_and_wait(graph.graph())
            .unwrap();
    }

    fn position(log: &[&'static str], label: &str) -> usize {
        log.iter().position(|l| *l == label).unwrap()
    }

    #[test]
    fn test_add_get_exists() {
        let log = Log::default();
        let mut graph = SystemGraph::new();
        graph.add(First(log.clone())).unwrap();
        assert!(graph.exists::<First>());
        assert!(!graph.exists::<Second>());
        assert!(graph.get::<First>().is_ok());
        assert!(matches!(graph.get::<Second>(), Err(EcsError::MissingSystem(_))));
        assert!(graph.get_mut::<First>().is_ok());
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_duplicate_system_is_an_error() {
        let log = Log::default();
        let mut graph = SystemGraph::new();
        graph.add(First(log.clone())).unwrap();
        assert!(matches!(
            graph.add(First(log)),
            Err(EcsError::DuplicateSystem(_))
        ));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_linear_chain() {
        let log = Log::default();
        let registry = Registry::new();
        let mut graph = SystemGraph::new();
        // Registered in reverse to make sure order comes from dependencies.
        graph.add(Second(log.clone())).unwrap();
        graph.add(First(log.clone())).unwrap();
        graph.build(&registry).unwrap();
        assert!(graph.is_built());
        run(&graph);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_diamond() {
        let log = Log::default();
        let registry = Registry::new();
        let mut graph = SystemGraph::new();
        graph.add(A(log.clone())).unwrap();
        graph.add(B(log.clone())).unwrap();
        graph.add(C(log.clone())).unwrap();
        graph.add(D(log.clone())).unwrap();
        graph.add(E(log.clone())).unwrap();
        graph.build(&registry).unwrap();

        for _ in 0..10 {
            log.lock().unwrap().clear();
            run(&graph);
            let log = log.lock().unwrap();
            assert_eq!(log.len(), 5);
            assert_eq!(log.last(), Some(&"A"));
            assert!(position(&log, "B") < position(&log, "D"));
            assert!(position(&log, "B") < position(&log, "C"));
            assert!(position(&log, "D") < position(&log, "C"));
            assert!(position(&log, "C") < position(&log, "E"));
        }
        let order: Vec<_> = graph.order().unwrap().iter().map(|id| id.name()).collect();
        assert!(order.last().unwrap().ends_with("::A"));
    }

    #[test]
    fn test_cycle_is_rejected_without_running() {
        let log = Log::default();
        let registry = Registry::new();
        let mut graph = SystemGraph::new();
        graph.add(X(log.clone())).unwrap();
        graph.add(Y(log.clone())).unwrap();
        graph.add(Z(log.clone())).unwrap();

        let err = graph.build(&registry).unwrap_err();
        let EcsError::CyclicDependency { path } = err else {
            panic!("expected a cycle");
        };
        assert_eq!(path.len(), 4);
        assert_eq!(path.first(), path.last());
        assert!(!graph.is_built());
        assert!(graph.graph().is_empty());
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let registry = Registry::new();
        let mut graph = SystemGraph::new();
        graph.add(SelfLoop).unwrap();
        assert!(matches!(
            graph.build(&registry),
            Err(EcsError::CyclicDependency { ref path }) if path.len() == 2
        ));
    }

    #[test]
    fn test_unknown_dependency() {
        let log = Log::default();
        let registry = Registry::new();
        let mut graph = SystemGraph::new();
        graph.add(Orphan(log)).unwrap();
        let err = graph.build(&registry).unwrap_err();
        assert!(matches!(
            err,
            EcsError::UnknownDependency { dependency, .. } if dependency.ends_with("Missing")
        ));
        assert!(graph.graph().is_empty());
    }

    #[test]
    fn test_empty_fragment_keeps_transitive_order() {
        let log = Log::default();
        let registry = Registry::new();
        let mut graph = SystemGraph::new();
        graph.add(AfterRelay(log.clone())).unwrap();
        graph.add(Relay(log.clone())).unwrap();
        graph.add(First(log.clone())).unwrap();
        graph.build(&registry).unwrap();
        assert_eq!(graph.graph().len(), 3);
        run(&graph);
        assert_eq!(*log.lock().unwrap(), vec!["first", "after-relay"]);
    }

    #[test]
    fn test_add_after_build_returns_to_unbuilt() {
        let log = Log::default();
        let registry = Registry::new();
        let mut graph = SystemGraph::new();
        graph.add(First(log.clone())).unwrap();
        graph.build(&registry).unwrap();
        graph.add(Second(log.clone())).unwrap();
        assert!(!graph.is_built());
        assert!(graph.graph().is_empty());
        graph.build(&registry).unwrap();
        assert_eq!(graph.graph().edge_count(), 1);
    }

    #[test]
    fn test_clear() {
        let log = Log::default();
        let registry = Registry::new();
        let mut graph = SystemGraph::new();
        graph.add(First(log.clone())).unwrap();
        graph.build(&registry).unwrap();
        graph.clear();
        assert!(graph.is_empty());
        assert!(!graph.is_built());
        assert!(graph.graph().is_empty());
        // Caller-owned state outlives the systems.
        assert_eq!(Arc::strong_count(&log), 1);
    }
}
