//! # engine_flow
//!
//! Task graphs and the worker pool that runs them.
//!
//! - [`TaskGraph`]: named tasks plus "runs before" edges. Independently built
//!   graphs can be absorbed into a larger one as [`Fragment`]s.
//! - [`Executor`]: runs a graph on a pool of worker threads, starting a task
//!   only after all of its predecessors completed.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use engine_flow::{Executor, ExecutorConfig, TaskGraph};
//!
//! let mut graph = TaskGraph::new();
//! let load = graph.emplace("load", || Ok(()));
//! let step = graph.emplace("step", || Ok(()));
//! graph.precede(load, step).unwrap();
//!
//! let executor = Executor::new(ExecutorConfig::from_env()).unwrap();
//! executor.run(&graph).wait().unwrap();
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod graph;

pub use config::ExecutorConfig;
pub use error::FlowError;
pub use executor::{Execution, Executor, RunReport};
pub use graph::{Fragment, Task, TaskGraph, TaskId};
