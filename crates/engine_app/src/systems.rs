//! Demo systems: accelerate, then integrate, then report.

use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use engine_ecs::{EcsError, Registry, System, SystemId, TaskGraph, View};
use glam::Vec3;
use tracing::debug;

use crate::components::{Name, Position, Velocity};

/// Applies a constant acceleration to every velocity.
pub struct AccelerateSystem {
    pub acceleration: Vec3,
    pub dt: f32,
}

impl System for AccelerateSystem {
    fn setup(&mut self, registry: &Registry, graph: &mut TaskGraph) -> Result<(), EcsError> {
        let velocities = registry.handle::<Velocity>()?;
        let delta = self.acceleration * self.dt;
        graph.emplace("accelerate", move || {
            for velocity in velocities.write()?.iter_mut() {
                velocity.0 += delta;
            }
            Ok(())
        });
        Ok(())
    }
}

/// Moves every entity with a velocity.
pub struct IntegrateSystem {
    pub dt: f32,
}

impl System for IntegrateSystem {
    fn setup(&mut self, registry: &Registry, graph: &mut TaskGraph) -> Result<(), EcsError> {
        let (positions, velocities) = registry.handles::<(Position, Velocity)>()?;
        let dt = self.dt;
        graph.emplace("integrate", move || {
            // Both tables are taken exclusively; velocities are only read.
            let mut view = View::new((positions.write()?, velocities.write()?));
            view.traverse(|position: &mut Position, velocity: &mut Velocity| {
                position.0 += velocity.0 * dt;
            });
            Ok(())
        });
        Ok(())
    }

    fn dependencies(&self) -> Vec<SystemId> {
        vec![SystemId::of::<AccelerateSystem>()]
    }
}

/// What [`ReportSystem`] saw on its latest run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub runs: u64,
    pub bodies: usize,
    pub centroid: Vec3,
    pub lowest: Option<(String, f32)>,
}

/// Summarises named positions after integration.
#[derive(Default)]
pub struct ReportSystem {
    summary: Arc<Mutex<Summary>>,
}

impl ReportSystem {
    /// Shared handle to the latest summary.
    #[must_use]
    pub fn summary(&self) -> Arc<Mutex<Summary>> {
        self.summary.clone()
    }
}

impl System for ReportSystem {
    fn setup(&mut self, registry: &Registry, graph: &mut TaskGraph) -> Result<(), EcsError> {
        let (positions, names) = registry.handles::<(Position, Name)>()?;
        let summary = self.summary.clone();
        graph.emplace("report", move || {
            let view = View::new((positions.read()?, names.read()?));
            let mut bodies = 0;
            let mut sum = Vec3::ZERO;
            let mut lowest: Option<(String, f32)> = None;
            view.traverse_ref(|position: &Position, name: &Name| {
                bodies += 1;
                sum += position.0;
                if lowest.as_ref().is_none_or(|(_, y)| position.0.y < *y) {
                    lowest = Some((name.0.clone(), position.0.y));
                }
            });
            let centroid = if bodies == 0 {
                Vec3::ZERO
            } else {
                sum / bodies as f32
            };

            let mut summary = summary
                .lock()
                .map_err(|_| anyhow!("report summary lock poisoned"))?;
            summary.runs += 1;
            summary.bodies = bodies;
            summary.centroid = centroid;
            summary.lowest = lowest;
            debug!(
                bodies,
                centroid = ?centroid,
                lowest = ?summary.lowest,
                "report"
            );
            Ok(())
        });
        Ok(())
    }

    fn dependencies(&self) -> Vec<SystemId> {
        vec![SystemId::of::<IntegrateSystem>()]
    }
}

/// Register the three demo systems.
///
/// # Errors
///
/// Fails if one of them is already registered.
pub fn install(
    registry: &mut Registry,
    gravity: Vec3,
    dt: f32,
) -> Result<Arc<Mutex<Summary>>, EcsError> {
    let systems = registry.system_graph_mut();
    let summary = systems.add(ReportSystem::default())?.summary();
    systems.add(IntegrateSystem { dt })?;
    systems.add(AccelerateSystem {
        acceleration: gravity,
        dt,
    })?;
    Ok(summary)
}
