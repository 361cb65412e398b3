use std::time::Duration;

use wave_defence_core::{DefenderSpec, Vec2};

/// Straight-line projectile owned by exactly one combat cycle.
///
/// The direction is fixed at launch; the projectile never re-homes on its
/// target and expires when its deadline runs out.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projectile {
    position: Vec2,
    velocity: Vec2,
    damage: u32,
    contact_radius: f32,
    remaining: Duration,
}

impl Projectile {
    /// Launches a projectile from `origin` toward `target`.
    ///
    /// The projectile stays active for one fire interval of its defender.
    #[must_use]
    pub fn launch(origin: Vec2, target: Vec2, spec: &DefenderSpec) -> Self {
        let direction = (target - origin).normalize_or_zero();
        Self {
            position: origin,
            velocity: direction * spec.projectile_speed,
            damage: spec.damage,
            contact_radius: spec.projectile_contact_radius,
            remaining: spec.fire_interval,
        }
    }

    /// Current position.
    #[must_use]
    pub const fn position(&self) -> Vec2 {
        self.position
    }

    /// Velocity fixed at launch.
    #[must_use]
    pub const fn velocity(&self) -> Vec2 {
        self.velocity
    }

    /// Health removed from the unit it touches.
    #[must_use]
    pub const fn damage(&self) -> u32 {
        self.damage
    }

    /// Distance below which the projectile touches a unit.
    #[must_use]
    pub const fn contact_radius(&self) -> f32 {
        self.contact_radius
    }

    /// Reports whether the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining.is_zero()
    }

    pub(crate) fn advance(&mut self, dt: Duration) {
        self.position += self.velocity * dt.as_secs_f32();
        self.remaining = self.remaining.saturating_sub(dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> DefenderSpec {
        DefenderSpec {
            name: "archer".to_owned(),
            description: String::new(),
            damage: 3,
            attack_radius: 5.0,
            fire_interval: Duration::from_millis(200),
            projectile_speed: 10.0,
            projectile_contact_radius: 0.25,
            price: 10,
        }
    }

    #[test]
    fn flies_in_a_straight_line_until_its_deadline() {
        let mut projectile = Projectile::launch(Vec2::ZERO, Vec2::new(0.0, 4.0), &spec());
        assert_eq!(projectile.velocity(), Vec2::new(0.0, 10.0));

        projectile.advance(Duration::from_millis(100));
        assert!((projectile.position().y - 1.0).abs() < 1e-5);
        assert!(!projectile.is_expired());

        projectile.advance(Duration::from_millis(100));
        assert!(projectile.is_expired());
    }

    #[test]
    fn launch_onto_target_position_stays_put() {
        let projectile = Projectile::launch(Vec2::ONE, Vec2::ONE, &spec());
        assert_eq!(projectile.velocity(), Vec2::ZERO);
        assert_eq!(projectile.damage(), 3);
    }
}
