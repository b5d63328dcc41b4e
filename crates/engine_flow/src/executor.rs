//! Worker-pool execution of task graphs.
//!
//! The [`Executor`] owns a multi-threaded tokio runtime. Each
//! [`Executor::run`] spawns a driver task that keeps a predecessor counter
//! per graph task, starts every ready task on the runtime's blocking pool
//! and releases successors as tasks complete. Tasks with no path between
//! them may run concurrently.
//!
//! After the first failing or panicking task no new task is started; tasks
//! already running are awaited and the first failure is reported.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use tokio::runtime::Runtime;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::config::ExecutorConfig;
use crate::error::FlowError;
use crate::graph::{Plan, TaskGraph};

/// Summary of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Tasks that completed, placeholders included.
    pub tasks: usize,
    /// Wall time from the start of the run to its last completion.
    pub elapsed: Duration,
}

/// Runs task graphs on a pool of worker threads.
///
/// Dropping an executor shuts its runtime down and must not happen from
/// inside an async context.
pub struct Executor {
    runtime: Runtime,
    config: ExecutorConfig,
}

impl Executor {
    /// Start the worker pool.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Runtime`] if the runtime cannot be built.
    pub fn new(config: ExecutorConfig) -> Result<Self, FlowError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(config.workers.max(1))
            .thread_name(config.thread_name.clone())
            .build()?;
        info!(
            workers = config.workers,
            thread_name = config.thread_name,
            "executor started"
        );
        Ok(Self { runtime, config })
    }

    /// Number of threads running tasks.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.config.workers
    }

    /// The configuration the executor was started with.
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Start running `graph` and return immediately.
    ///
    /// The graph is snapshotted, so it may be modified or run again while
    /// this run is in flight.
    pub fn run(&self, graph: &TaskGraph) -> Execution {
        let plan = graph.plan();
        let (done, outcome) = oneshot::channel();
        self.runtime.spawn(async move {
            // The receiver may have been dropped; the result is then unused.
            let _ = done.send(drive(plan).await);
        });
        Execution { outcome }
    }

    /// Run `graph` and block until it completes.
    ///
    /// # Errors
    ///
    /// See [`Execution::wait`].
    pub fn run_and_wait(&self, graph: &TaskGraph) -> Result<RunReport, FlowError> {
        self.run(graph).wait()
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A run in progress.
#[derive(Debug)]
#[must_use = "a run reports failures only through its Execution"]
pub struct Execution {
    outcome: oneshot::Receiver<Result<RunReport, FlowError>>,
}

impl Execution {
    /// Block the calling thread until every task has completed.
    ///
    /// Must not be called from inside an async context; use
    /// [`Execution::finished`] there.
    ///
    /// # Errors
    ///
    /// The first task failure ([`FlowError::Task`] or
    /// [`FlowError::Panicked`]), [`FlowError::Stalled`] if a cycle kept tasks
    /// from ever becoming ready, or [`FlowError::Disconnected`] if the
    /// executor was dropped mid-run.
    pub fn wait(self) -> Result<RunReport, FlowError> {
        self.outcome
            .blocking_recv()
            .map_err(|_| FlowError::Disconnected)?
    }

    /// Await completion from async code.
    ///
    /// # Errors
    ///
    /// See [`Execution::wait`].
    pub async fn finished(self) -> Result<RunReport, FlowError> {
        self.outcome.await.map_err(|_| FlowError::Disconnected)?
    }
}

type Outcome = (usize, std::thread::Result<anyhow::Result<()>>);

async fn drive(plan: Plan) -> Result<RunReport, FlowError> {
    let started = Instant::now();
    let total = plan.names.len();
    let mut pending = plan.predecessors.clone();
    let mut ready: Vec<usize> = (0..total).filter(|&task| pending[task] == 0).collect();
    let mut running: JoinSet<Outcome> = JoinSet::new();
    let mut completed = 0;
    let mut failure: Option<FlowError> = None;

    loop {
        while let Some(task) = ready.pop() {
            match plan.work[task].clone() {
                Some(work) => {
                    running.spawn_blocking(move || {
                        (task, panic::catch_unwind(AssertUnwindSafe(|| work())))
                    });
                }
                None => {
                    completed += 1;
                    release(&plan, task, &mut pending, &mut ready);
                }
            }
        }

        let Some(joined) = running.join_next().await else {
            break;
        };
        let (task, outcome) = match joined {
            Ok(outcome) => outcome,
            Err(err) => {
                failure.get_or_insert(FlowError::Panicked {
                    task: "<unknown>".to_string(),
                    message: err.to_string(),
                });
                continue;
            }
        };
        match outcome {
            Ok(Ok(())) => {
                completed += 1;
                if failure.is_none() {
                    release(&plan, task, &mut pending, &mut ready);
                }
            }
            Ok(Err(source)) => {
                failure.get_or_insert(FlowError::Task {
                    task: plan.names[task].clone(),
                    source,
                });
            }
            Err(payload) => {
                failure.get_or_insert(FlowError::Panicked {
                    task: plan.names[task].clone(),
                    message: panic_message(payload.as_ref()),
                });
            }
        }
        if failure.is_some() {
            ready.clear();
        }
    }

    if let Some(err) = failure {
        return Err(err);
    }
    if completed < total {
        return Err(FlowError::Stalled { completed, total });
    }
    let report = RunReport {
        tasks: completed,
        elapsed: started.elapsed(),
    };
    debug!(
        tasks = report.tasks,
        elapsed_us = report.elapsed.as_micros() as u64,
        "graph run complete"
    );
    Ok(report)
}

fn release(plan: &Plan, task: usize, pending: &mut [usize], ready: &mut Vec<usize>) {
    for &next in &plan.successors[task] {
        pending[next] -= 1;
        if pending[next] == 0 {
            ready.push(next);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier, Mutex};

    use super::*;

    fn executor(workers: usize) -> Executor {
        Executor::new(ExecutorConfig::new().with_workers(workers)).unwrap()
    }

    fn recorder(
        graph: &mut TaskGraph,
        log: &Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
    ) -> crate::graph::TaskId {
        let log = log.clone();
        graph.emplace(name, move || {
            log.lock().unwrap().push(name);
            Ok(())
        })
    }

    #[test]
    fn test_empty_graph_completes() {
        let report = executor(1).run_and_wait(&TaskGraph::new()).unwrap();
        assert_eq!(report.tasks, 0);
    }

    #[test]
    fn test_chain_runs_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut graph = TaskGraph::new();
        let a = recorder(&mut graph, &log, "a");
        let b = recorder(&mut graph, &log, "b");
        let c = recorder(&mut graph, &log, "c");
        graph.precede(b, c).unwrap();
        graph.precede(a, b).unwrap();

        let report = executor(4).run_and_wait(&graph).unwrap();
        assert_eq!(report.tasks, 3);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_independent_tasks_run_concurrently() {
        // Both tasks must be inside the barrier at the same time.
        let barrier = Arc::new(Barrier::new(2));
        let mut graph = TaskGraph::new();
        for name in ["left", "right"] {
            let barrier = barrier.clone();
            graph.emplace(name, move || {
                barrier.wait();
                Ok(())
            });
        }
        executor(2).run_and_wait(&graph).unwrap();
    }

    #[test]
    fn test_placeholder_joins_fragments() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut graph = TaskGraph::new();
        let a = recorder(&mut graph, &log, "a");
        let b = recorder(&mut graph, &log, "b");
        let join = graph.placeholder("join");
        let c = recorder(&mut graph, &log, "c");
        graph.precede(a, join).unwrap();
        graph.precede(b, join).unwrap();
        graph.precede(join, c).unwrap();

        let report = executor(2).run_and_wait(&graph).unwrap();
        assert_eq!(report.tasks, 4);
        assert_eq!(log.lock().unwrap().last(), Some(&"c"));
    }

    #[test]
    fn test_failure_stops_successors() {
        let ran = Arc::new(AtomicUsize::new(0));
        let mut graph = TaskGraph::new();
        let fail = graph.emplace("fail", || anyhow::bail!("boom"));
        let counter = ran.clone();
        let after = graph.emplace("after", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        graph.precede(fail, after).unwrap();

        let err = executor(2).run_and_wait(&graph).unwrap_err();
        match err {
            FlowError::Task { task, source } => {
                assert_eq!(task, "fail");
                assert_eq!(source.to_string(), "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panic_is_reported() {
        let mut graph = TaskGraph::new();
        graph.emplace("explode", || panic!("kaboom"));
        let err = executor(1).run_and_wait(&graph).unwrap_err();
        assert!(matches!(
            err,
            FlowError::Panicked { ref task, ref message } if task == "explode" && message == "kaboom"
        ));
    }

    #[test]
    fn test_cycle_stalls() {
        let mut graph = TaskGraph::new();
        graph.placeholder("a");
        let b = graph.placeholder("b");
        let c = graph.placeholder("c");
        graph.precede(b, c).unwrap();
        graph.precede(c, b).unwrap();
        let err = executor(1).run_and_wait(&graph).unwrap_err();
        assert!(matches!(
            err,
            FlowError::Stalled {
                completed: 1,
                total: 3
            }
        ));
    }

    #[test]
    fn test_graph_is_reusable() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut graph = TaskGraph::new();
        let counter = runs.clone();
        graph.emplace("count", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let executor = executor(2);
        for _ in 0..5 {
            executor.run_and_wait(&graph).unwrap();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 5);
    }
}
