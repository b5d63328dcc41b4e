//! Fixed-timestep tick loop.
//!
//! Each tick runs the registry's system graph once on the executor. Structural
//! changes happen between ticks, never while the graph runs.

use std::time::{Duration, Instant};

use anyhow::Result;
use engine_ecs::{Executor, Registry};
use tracing::{debug, info, warn};

use crate::config::TickConfig;

/// The tick loop state.
#[derive(Debug)]
pub struct TickLoop {
    /// Current tick counter.
    tick_id: u64,
    config: TickConfig,
    registry: Registry,
    executor: Executor,
}

impl TickLoop {
    /// Create a tick loop over a registry whose system graph is built.
    #[must_use]
    pub fn new(config: TickConfig, registry: Registry, executor: Executor) -> Self {
        Self {
            tick_id: 0,
            config,
            registry,
            executor,
        }
    }

    /// Returns the current tick counter.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    /// The registry the ticks run against.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Mutable access for structural changes between ticks.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Run one tick.
    ///
    /// # Errors
    ///
    /// Returns the first failing task of the system graph.
    pub fn tick(&mut self) -> Result<()> {
        self.tick_id += 1;
        let report = self.registry.run(&self.executor)?;
        debug!(
            tick_id = self.tick_id,
            tasks = report.tasks,
            elapsed_us = report.elapsed.as_micros() as u64,
            entities = self.registry.len(),
            "tick complete"
        );
        Ok(())
    }

    /// Run for the configured number of ticks, or until a tick fails.
    ///
    /// # Errors
    ///
    /// Stops at the first failing tick and returns its error.
    pub fn run(&mut self) -> Result<()> {
        let tick_duration = Duration::from_secs_f64(1.0 / self.config.tick_rate);
        let mut tick_count = 0u64;

        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            workers = self.executor.workers(),
            "starting tick loop"
        );

        loop {
            let start = Instant::now();
            self.tick()?;

            tick_count += 1;
            if self.config.max_ticks > 0 && tick_count >= self.config.max_ticks {
                info!(ticks = tick_count, "tick loop complete");
                return Ok(());
            }

            let elapsed = start.elapsed();
            if elapsed < tick_duration {
                std::thread::sleep(tick_duration - elapsed);
            } else {
                warn!(
                    tick_id = self.tick_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = tick_duration.as_millis() as u64,
                    "tick exceeded time budget"
                );
            }
        }
    }
}
