//! Task graph and executor error types.

/// Errors raised while building or running a task graph.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// The worker runtime could not be started.
    #[error("failed to start worker runtime: {0}")]
    Runtime(#[from] std::io::Error),

    /// A task id does not belong to this graph.
    #[error("task {0} does not exist in this graph")]
    UnknownTask(usize),

    /// The graph contains a cycle; `remaining` tasks can never become ready.
    #[error("task graph contains a cycle ({remaining} tasks unreachable)")]
    Cycle {
        /// Number of tasks left with unresolved predecessors.
        remaining: usize,
    },

    /// A task returned an error. No further tasks were started.
    #[error("task `{task}` failed: {source}")]
    Task {
        /// Name of the failing task.
        task: String,
        /// The error returned by the task.
        #[source]
        source: anyhow::Error,
    },

    /// A task panicked. No further tasks were started.
    #[error("task `{task}` panicked: {message}")]
    Panicked {
        /// Name of the panicking task.
        task: String,
        /// The panic payload, if it was a string.
        message: String,
    },

    /// The run ended with tasks that never became ready.
    #[error("run stalled after {completed} of {total} tasks")]
    Stalled {
        /// Tasks that completed.
        completed: usize,
        /// Tasks in the graph.
        total: usize,
    },

    /// The executor was shut down before the run reported back.
    #[error("executor shut down before the run completed")]
    Disconnected,
}
