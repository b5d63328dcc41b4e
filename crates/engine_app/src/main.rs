//! # engine_app
//!
//! Demo binary: spawns a scene of moving bodies into a [`Registry`] and runs
//! the accelerate, integrate and report systems on a fixed timestep.
//!
//! ```text
//! engine_app [config.json]
//! ```
//!
//! Logging is controlled through `RUST_LOG` and the worker count through
//! `ENGINE_WORKERS` unless the config sets `workers`.

mod components;
mod config;
mod systems;
mod tick;

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;
use engine_ecs::{Executor, ExecutorConfig, Registry};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::TickConfig;
use systems::Summary;
use tick::TickLoop;

fn main() -> Result<()> {
    // Initialise structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("engine_app=info".parse()?))
        .init();

    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = TickConfig::load(path.as_deref())?;
    info!(?config, "engine starting");

    let mut registry = Registry::new();
    components::populate(&mut registry, config.entities)?;
    let summary = systems::install(&mut registry, config.gravity, config.dt())?;
    registry.build_system_graph()?;

    let mut executor_config = ExecutorConfig::from_env();
    if config.workers > 0 {
        executor_config = executor_config.with_workers(config.workers);
    }
    let executor = Executor::new(executor_config)?;

    let mut tick_loop = TickLoop::new(config, registry, executor);
    tick_loop.run()?;

    log_shutdown(tick_loop.tick_id(), &summary);
    Ok(())
}

/// Log the final report. Returns `false` if the summary was unreadable.
fn log_shutdown(ticks: u64, summary: &Mutex<Summary>) -> bool {
    match summary.lock() {
        Ok(summary) => {
            info!(
                ticks,
                bodies = summary.bodies,
                centroid = ?summary.centroid,
                "engine shut down"
            );
            true
        }
        Err(_) => {
            warn!(ticks, "engine shut down; report summary lock poisoned");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_shutdown_log_reads_summary() {
        assert!(log_shutdown(3, &Mutex::new(Summary::default())));
    }

    #[test]
    fn test_shutdown_log_survives_poisoned_summary() {
        let summary = Arc::new(Mutex::new(Summary::default()));
        let poisoner = summary.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the summary");
        })
        .join();
        assert!(summary.is_poisoned());
        assert!(!log_shutdown(3, &summary));
    }
}
