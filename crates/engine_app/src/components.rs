//! Demo components and scene setup.

use engine_ecs::{EcsError, Entity, Registry};
use glam::Vec3;
use tracing::info;

/// World-space position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position(pub Vec3);

/// Linear velocity in units per second.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Velocity(pub Vec3);

/// Display name.
#[derive(Debug, Clone, PartialEq)]
pub struct Name(pub String);

/// Register the demo components and spawn `count` entities.
///
/// Every entity gets a [`Position`] and a [`Name`]; every third one is static
/// and gets no [`Velocity`].
///
/// # Errors
///
/// Fails if a component is already registered or the id space runs out.
pub fn populate(registry: &mut Registry, count: usize) -> Result<Vec<Entity>, EcsError> {
    registry.register_component::<Position>()?;
    registry.register_component::<Velocity>()?;
    registry.register_component::<Name>()?;

    let mut spawned = Vec::with_capacity(count);
    for i in 0..count {
        let offset = i as f32;
        let position = Position(Vec3::new(offset, 0.0, 0.0));
        let name = Name(format!("body-{i}"));
        let entity = if i % 3 == 2 {
            registry.add_with((position, name))?
        } else {
            let velocity = Velocity(Vec3::new(0.0, 1.0 + offset * 0.01, 0.0));
            registry.add_with((position, velocity, name))?
        };
        spawned.push(entity);
    }

    info!(entities = count, "scene populated");
    Ok(spawned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_third_entity_is_static() {
        let mut registry = Registry::new();
        let spawned = populate(&mut registry, 9).unwrap();
        assert_eq!(spawned.len(), 9);
        assert_eq!(registry.table::<Position>().unwrap().len(), 9);
        assert_eq!(registry.table::<Velocity>().unwrap().len(), 6);
        assert!(!registry.contains::<Velocity>(spawned[2]).unwrap());
        assert_eq!(registry.get::<Name>(spawned[4]).unwrap().0, "body-4");
    }

    #[test]
    fn test_populate_twice_fails() {
        let mut registry = Registry::new();
        populate(&mut registry, 1).unwrap();
        assert!(populate(&mut registry, 1).is_err());
    }
}
