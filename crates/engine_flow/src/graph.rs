//! Directed acyclic graphs of schedulable tasks.
//!
//! A [`TaskGraph`] is a set of named units of work plus "runs before" edges.
//! Graphs compose: a sub-graph built independently can be [absorbed]
//! into a larger one, which returns the [`Fragment`] boundary (its entry and
//! exit tasks) so the caller can wire precedence between whole fragments.
//!
//! [absorbed]: TaskGraph::absorb

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::error::FlowError;

/// A unit of work. Called once per graph run, possibly on any worker.
pub type Task = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Identifier of a task within one [`TaskGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(usize);

impl TaskId {
    /// Position of the task in its graph.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Node {
    name: String,
    work: Option<Task>,
    successors: Vec<TaskId>,
    predecessors: usize,
}

/// The boundary of a graph absorbed into another: tasks without
/// predecessors (`entries`) and tasks without successors (`exits`), as ids of
/// the absorbing graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    /// Tasks that start the fragment.
    pub entries: Vec<TaskId>,
    /// Tasks that end the fragment.
    pub exits: Vec<TaskId>,
}

impl Fragment {
    /// Returns `true` if the fragment has no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A reusable graph of tasks.
#[derive(Default)]
pub struct TaskGraph {
    nodes: Vec<Node>,
    edges: usize,
}

impl TaskGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task running `work`.
    pub fn emplace<F>(&mut self, name: impl Into<String>, work: F) -> TaskId
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.push(name.into(), Some(Arc::new(work)))
    }

    /// Add a task that does nothing. Useful as a join point.
    pub fn placeholder(&mut self, name: impl Into<String>) -> TaskId {
        self.push(name.into(), None)
    }

    fn push(&mut self, name: String, work: Option<Task>) -> TaskId {
        let id = TaskId(self.nodes.len());
        self.nodes.push(Node {
            name,
            work,
            successors: Vec::new(),
            predecessors: 0,
        });
        id
    }

    /// Declare that `before` completes before `after` starts. Repeated
    /// edges are ignored.
    ///
    /// # Errors
    ///
    /// [`FlowError::UnknownTask`] if either id is not part of this graph.
    pub fn precede(&mut self, before: TaskId, after: TaskId) -> Result<(), FlowError> {
        for id in [before, after] {
            if id.0 >= self.nodes.len() {
                return Err(FlowError::UnknownTask(id.0));
            }
        }
        if self.nodes[before.0].successors.contains(&after) {
            return Ok(());
        }
        self.nodes[before.0].successors.push(after);
        self.nodes[after.0].predecessors += 1;
        self.edges += 1;
        Ok(())
    }

    /// Move every task of `other` into this graph, keeping its internal
    /// edges, and return the boundary of the moved tasks.
    pub fn absorb(&mut self, other: TaskGraph) -> Fragment {
        let offset = self.nodes.len();
        let fragment = Fragment {
            entries: other.sources().into_iter().map(|id| TaskId(id.0 + offset)).collect(),
            exits: other.sinks().into_iter().map(|id| TaskId(id.0 + offset)).collect(),
        };
        self.edges += other.edges;
        self.nodes.extend(other.nodes.into_iter().map(|mut node| {
            for successor in &mut node.successors {
                successor.0 += offset;
            }
            node
        }));
        fragment
    }

    /// Tasks without predecessors.
    #[must_use]
    pub fn sources(&self) -> Vec<TaskId> {
        self.ids().filter(|id| self.nodes[id.0].predecessors == 0).collect()
    }

    /// Tasks without successors.
    #[must_use]
    pub fn sinks(&self) -> Vec<TaskId> {
        self.ids()
            .filter(|id| self.nodes[id.0].successors.is_empty())
            .collect()
    }

    fn ids(&self) -> impl Iterator<Item = TaskId> {
        (0..self.nodes.len()).map(TaskId)
    }

    /// Name of a task.
    #[must_use]
    pub fn name(&self, id: TaskId) -> Option<&str> {
        self.nodes.get(id.0).map(|node| node.name.as_str())
    }

    /// Direct successors of a task.
    #[must_use]
    pub fn successors(&self, id: TaskId) -> &[TaskId] {
        self.nodes
            .get(id.0)
            .map_or(&[][..], |node| node.successors.as_slice())
    }

    /// Number of direct predecessors of a task.
    #[must_use]
    pub fn in_degree(&self, id: TaskId) -> usize {
        self.nodes.get(id.0).map_or(0, |node| node.predecessors)
    }

    /// Returns `true` if the task has no work attached.
    #[must_use]
    pub fn is_placeholder(&self, id: TaskId) -> bool {
        self.nodes.get(id.0).is_some_and(|node| node.work.is_none())
    }

    /// Number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the graph has no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges
    }

    /// Remove every task and edge.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges = 0;
    }

    /// Check that the graph is acyclic.
    ///
    /// # Errors
    ///
    /// [`FlowError::Cycle`] with the number of tasks that sit on or behind
    /// a cycle.
    pub fn validate(&self) -> Result<(), FlowError> {
        let order = self.topological_order();
        if order.len() == self.nodes.len() {
            Ok(())
        } else {
            Err(FlowError::Cycle {
                remaining: self.nodes.len() - order.len(),
            })
        }
    }

    /// Kahn's algorithm. Tasks on or behind a cycle are left out.
    #[must_use]
    pub fn topological_order(&self) -> Vec<TaskId> {
        let mut pending: Vec<usize> = self.nodes.iter().map(|node| node.predecessors).collect();
        let mut ready: VecDeque<TaskId> = self.sources().into();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_front() {
            order.push(id);
            for &next in &self.nodes[id.0].successors {
                pending[next.0] -= 1;
                if pending[next.0] == 0 {
                    ready.push_back(next);
                }
            }
        }
        order
    }

    /// Snapshot of what the executor needs to run the graph.
    pub(crate) fn plan(&self) -> Plan {
        Plan {
            names: self.nodes.iter().map(|node| node.name.clone()).collect(),
            work: self.nodes.iter().map(|node| node.work.clone()).collect(),
            successors: self
                .nodes
                .iter()
                .map(|node| node.successors.iter().map(|id| id.0).collect())
                .collect(),
            predecessors: self.nodes.iter().map(|node| node.predecessors).collect(),
        }
    }
}

impl fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.nodes.iter().map(|n| &n.name).collect::<Vec<_>>())
            .field("edges", &self.edges)
            .finish()
    }
}

/// Owned copy of a graph's structure, shared with the executor's driver.
pub(crate) struct Plan {
    pub(crate) names: Vec<String>,
    pub(crate) work: Vec<Option<Task>>,
    pub(crate) successors: Vec<Vec<usize>>,
    pub(crate) predecessors: Vec<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> anyhow::Result<()> {
        Ok(())
    }

    #[test]
    fn test_emplace_and_precede() {
        let mut graph = TaskGraph::new();
        let a = graph.emplace("a", noop);
        let b = graph.emplace("b", noop);
        let c = graph.placeholder("c");
        graph.precede(a, b).unwrap();
        graph.precede(b, c).unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.sources(), vec![a]);
        assert_eq!(graph.sinks(), vec![c]);
        assert_eq!(graph.name(b), Some("b"));
        assert!(graph.is_placeholder(c));
        assert!(!graph.is_placeholder(a));
    }

    #[test]
    fn test_repeated_edge_is_ignored() {
        let mut graph = TaskGraph::new();
        let a = graph.placeholder("a");
        let b = graph.placeholder("b");
        graph.precede(a, b).unwrap();
        graph.precede(a, b).unwrap();
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.in_degree(b), 1);
    }

    #[test]
    fn test_precede_unknown_task() {
        let mut graph = TaskGraph::new();
        let a = graph.placeholder("a");
        let mut other = TaskGraph::new();
        other.placeholder("x");
        let far = other.placeholder("y");
        assert!(matches!(
            graph.precede(a, far),
            Err(FlowError::UnknownTask(1))
        ));
    }

    #[test]
    fn test_absorb_offsets_ids_and_reports_boundary() {
        let mut master = TaskGraph::new();
        master.placeholder("existing");

        let mut fragment = TaskGraph::new();
        let x = fragment.emplace("x", noop);
        let y = fragment.emplace("y", noop);
        let z = fragment.emplace("z", noop);
        fragment.precede(x, y).unwrap();
        fragment.precede(x, z).unwrap();

        let boundary = master.absorb(fragment);
        assert_eq!(boundary.entries, vec![TaskId(1)]);
        assert_eq!(boundary.exits, vec![TaskId(2), TaskId(3)]);
        assert_eq!(master.len(), 4);
        assert_eq!(master.edge_count(), 2);
        assert_eq!(master.successors(TaskId(1)), &[TaskId(2), TaskId(3)]);
    }

    #[test]
    fn test_absorb_empty_graph() {
        let mut master = TaskGraph::new();
        let boundary = master.absorb(TaskGraph::new());
        assert!(boundary.is_empty());
        assert!(master.is_empty());
    }

    #[test]
    fn test_validate_detects_cycle() {
        let mut graph = TaskGraph::new();
        let a = graph.placeholder("a");
        let b = graph.placeholder("b");
        let c = graph.placeholder("c");
        let d = graph.placeholder("d");
        graph.precede(a, b).unwrap();
        graph.precede(b, c).unwrap();
        graph.precede(c, b).unwrap();
        graph.precede(c, d).unwrap();
        assert!(matches!(
            graph.validate(),
            Err(FlowError::Cycle { remaining: 3 })
        ));
    }

    #[test]
    fn test_topological_order_respects_edges() {
        let mut graph = TaskGraph::new();
        let a = graph.placeholder("a");
        let b = graph.placeholder("b");
        let c = graph.placeholder("c");
        graph.precede(c, a).unwrap();
        graph.precede(a, b).unwrap();
        graph.validate().unwrap();
        assert_eq!(graph.topological_order(), vec![c, a, b]);
    }

    #[test]
    fn test_clear() {
        let mut graph = TaskGraph::new();
        let a = graph.placeholder("a");
        let b = graph.placeholder("b");
        graph.precede(a, b).unwrap();
        graph.clear();
        assert!(graph.is_empty());
        assert_eq!(graph.edge_count(), 0);
    }
}
