#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Reference navigation collaborator that walks monsters in straight lines.
//!
//! Real deployments plug a path-finding backend in through the
//! [`Navigation`] trait; this walker exists for headless sessions and tests.
//! Every unit accelerates from rest toward its spec speed and reports its
//! arrival exactly once.

use std::{collections::BTreeMap, time::Duration};

use tracing::trace;
use wave_defence_core::{MonsterId, Motion, Navigation, NavigationError, UnitMotion, Vec2};

const DEFAULT_ARRIVAL_TOLERANCE: f32 = 0.05;

/// Navigation backend moving units along the segment toward their goal.
#[derive(Debug)]
pub struct StraightLineNavigator {
    walkers: BTreeMap<MonsterId, Walker>,
    arrival_tolerance: f32,
}

impl StraightLineNavigator {
    /// Creates a navigator with the default arrival tolerance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a navigator that snaps units to their goal within `tolerance`.
    #[must_use]
    pub fn with_arrival_tolerance(tolerance: f32) -> Self {
        Self {
            walkers: BTreeMap::new(),
            arrival_tolerance: tolerance.max(0.0),
        }
    }

    /// Number of units currently tracked.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.walkers.len()
    }
}

impl Default for StraightLineNavigator {
    fn default() -> Self {
        Self::with_arrival_tolerance(DEFAULT_ARRIVAL_TOLERANCE)
    }
}

impl Navigation for StraightLineNavigator {
    fn set_destination(
        &mut self,
        unit: MonsterId,
        origin: Vec2,
        destination: Vec2,
        motion: Motion,
    ) -> Result<(), NavigationError> {
        if self.walkers.contains_key(&unit) {
            return Err(NavigationError::AlreadyNavigating(unit));
        }

        let drivable = motion.speed.is_finite()
            && motion.speed > 0.0
            && motion.acceleration.is_finite()
            && motion.acceleration > 0.0;
        if !origin.is_finite() || !destination.is_finite() || !drivable {
            return Err(NavigationError::Unreachable(unit));
        }

        let _ = self.walkers.insert(
            unit,
            Walker {
                position: origin,
                destination,
                speed: 0.0,
                motion,
                arrived: false,
            },
        );
        Ok(())
    }

    fn release(&mut self, unit: MonsterId) {
        let _ = self.walkers.remove(&unit);
    }

    fn advance(&mut self, dt: Duration, out: &mut Vec<UnitMotion>) {
        let seconds = dt.as_secs_f32();
        if seconds <= 0.0 {
            return;
        }

        for (unit, walker) in &mut self.walkers {
            if walker.arrived {
                continue;
            }

            let arrived = walker.step(seconds, self.arrival_tolerance);
            if arrived {
                trace!(unit = unit.get(), "unit reached its destination");
            }
            out.push(UnitMotion {
                unit: *unit,
                position: walker.position,
                arrived,
            });
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Walker {
    position: Vec2,
    destination: Vec2,
    speed: f32,
    motion: Motion,
    arrived: bool,
}

impl Walker {
    fn step(&mut self, seconds: f32, tolerance: f32) -> bool {
        self.speed = (self.speed + self.motion.acceleration * seconds).min(self.motion.speed);
        let travel = self.speed * seconds;

        let offset = self.destination - self.position;
        let distance = offset.length();
        if distance <= travel + tolerance {
            self.position = self.destination;
            self.arrived = true;
            return true;
        }

        self.position += offset / distance * travel;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_is_capped_by_motion() {
        let mut walker = Walker {
            position: Vec2::ZERO,
            destination: Vec2::new(100.0, 0.0),
            speed: 0.0,
            motion: Motion {
                speed: 2.0,
                acceleration: 100.0,
            },
            arrived: false,
        };

        assert!(!walker.step(1.0, 0.0));
        assert!((walker.speed - 2.0).abs() < f32::EPSILON);
        assert!((walker.position.x - 2.0).abs() < 1e-5);
    }
}
