#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative unit registry for Wave Defence.
//!
//! The registry is the single serialization point for monster health: every
//! hit, kill and breach goes through one mutex, so a unit can only die once
//! no matter how many combat cycles resolve against it concurrently.
//! Positions are mirrored from the navigation collaborator and are never
//! computed here.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use tracing::debug;
use wave_defence_core::{
    lock_unpoisoned, DefenderId, DefenderKindId, DefenderSpec, MonsterId, MonsterKindId,
    MonsterSpec, UnitMotion, Vec2,
};

/// Result of applying one projectile hit to a monster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HitOutcome {
    /// The monster survived with the provided health.
    Damaged {
        /// Health left after the hit.
        remaining: u32,
    },
    /// This hit took the monster's health to zero; it has been removed.
    Killed {
        /// Currency earned for the kill.
        reward: u32,
    },
    /// The monster was already gone when the hit resolved.
    Missed,
}

/// Immutable representation of a live monster used for queries.
#[derive(Clone, Debug, PartialEq)]
pub struct MonsterSnapshot {
    /// Identifier assigned to the monster.
    pub id: MonsterId,
    /// Kind the monster was spawned from.
    pub kind: MonsterKindId,
    /// Last position reported by navigation.
    pub position: Vec2,
    /// Remaining health.
    pub health: u32,
    /// Body radius taken from the kind's spec.
    pub radius: f32,
}

/// Read-only snapshot describing all live monsters.
#[derive(Clone, Debug, Default)]
pub struct MonsterView {
    snapshots: Vec<MonsterSnapshot>,
}

impl MonsterView {
    /// Creates a new view from the provided snapshots.
    #[must_use]
    pub fn from_snapshots(mut snapshots: Vec<MonsterSnapshot>) -> Self {
        snapshots.sort_by_key(|snapshot| snapshot.id);
        Self { snapshots }
    }

    /// Iterator over the captured snapshots in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &MonsterSnapshot> {
        self.snapshots.iter()
    }

    /// Number of monsters captured by the view.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Reports whether the view holds no monsters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

/// Immutable representation of a placed defender.
#[derive(Clone, Debug)]
pub struct DefenderSnapshot {
    /// Identifier assigned to the defender.
    pub id: DefenderId,
    /// Kind the defender was built from.
    pub kind: DefenderKindId,
    /// Position fixed at placement.
    pub position: Vec2,
    /// Shared spec of the defender's kind.
    pub spec: Arc<DefenderSpec>,
}

/// Thread-safe registry of live monsters and placed defenders.
#[derive(Debug, Default)]
pub struct UnitRegistry {
    state: Mutex<RegistryState>,
}

impl UnitRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly spawned monster at `position`.
    pub fn register_monster(
        &self,
        kind: MonsterKindId,
        spec: Arc<MonsterSpec>,
        position: Vec2,
    ) -> MonsterId {
        let mut state = lock_unpoisoned(&self.state);
        let id = MonsterId::new(state.next_monster_id);
        state.next_monster_id = state.next_monster_id.wrapping_add(1);
        let health = spec.health;
        let _ = state.monsters.insert(
            id,
            MonsterInstance {
                kind,
                spec,
                health,
                position,
            },
        );
        id
    }

    /// Removes a monster whose instantiation was rolled back.
    ///
    /// No events are associated with a discarded monster; it never became
    /// part of the wave.
    pub fn discard_monster(&self, id: MonsterId) {
        let mut state = lock_unpoisoned(&self.state);
        if state.monsters.remove(&id).is_some() {
            debug!(unit = id.get(), "discarded monster after failed instantiation");
        }
    }

    /// Mirrors positions reported by navigation into the registry.
    ///
    /// Updates for monsters that already left the registry are ignored.
    pub fn sync_positions(&self, motions: &[UnitMotion]) {
        if motions.is_empty() {
            return;
        }

        let mut state = lock_unpoisoned(&self.state);
        for motion in motions {
            if let Some(monster) = state.monsters.get_mut(&motion.unit) {
                monster.position = motion.position;
            }
        }
    }

    /// Applies `damage` to a monster exactly once.
    ///
    /// Only the hit that takes health to zero returns
    /// [`HitOutcome::Killed`]; the monster is removed under the same lock so
    /// every later hit observes [`HitOutcome::Missed`].
    pub fn apply_hit(&self, id: MonsterId, damage: u32) -> HitOutcome {
        let mut state = lock_unpoisoned(&self.state);
        let Some(monster) = state.monsters.get_mut(&id) else {
            return HitOutcome::Missed;
        };

        monster.health = monster.health.saturating_sub(damage);
        if monster.health > 0 {
            return HitOutcome::Damaged {
                remaining: monster.health,
            };
        }

        let reward = monster.spec.reward;
        let _ = state.monsters.remove(&id);
        HitOutcome::Killed { reward }
    }

    /// Removes a live monster that reached the goal.
    ///
    /// Returns its contact damage, or `None` when the monster was already
    /// killed or never existed.
    pub fn resolve_breach(&self, id: MonsterId) -> Option<u32> {
        let mut state = lock_unpoisoned(&self.state);
        state
            .monsters
            .remove(&id)
            .map(|monster| monster.spec.damage)
    }

    /// Finds the nearest live monster whose body overlaps the circle of
    /// `radius` around `point`.
    ///
    /// Equidistant monsters resolve to the lower identifier.
    #[must_use]
    pub fn nearest_within(&self, point: Vec2, radius: f32) -> Option<MonsterSnapshot> {
        let state = lock_unpoisoned(&self.state);
        let mut best: Option<(f32, MonsterId)> = None;

        for (id, monster) in &state.monsters {
            let reach = radius + monster.spec.radius;
            let distance_sq = monster.position.distance_squared(point);
            if distance_sq > reach * reach {
                continue;
            }

            match best {
                Some((best_distance, _)) if best_distance <= distance_sq => {}
                _ => best = Some((distance_sq, *id)),
            }
        }

        best.and_then(|(_, id)| state.monsters.get(&id).map(|monster| monster.snapshot(id)))
    }

    /// Captures a snapshot of one monster.
    #[must_use]
    pub fn monster(&self, id: MonsterId) -> Option<MonsterSnapshot> {
        let state = lock_unpoisoned(&self.state);
        state.monsters.get(&id).map(|monster| monster.snapshot(id))
    }

    /// Captures a read-only view of every live monster.
    #[must_use]
    pub fn monster_view(&self) -> MonsterView {
        let state = lock_unpoisoned(&self.state);
        MonsterView::from_snapshots(
            state
                .monsters
                .iter()
                .map(|(id, monster)| monster.snapshot(*id))
                .collect(),
        )
    }

    /// Number of live monsters.
    #[must_use]
    pub fn live_monsters(&self) -> usize {
        lock_unpoisoned(&self.state).monsters.len()
    }

    /// Registers a defender at a fixed position.
    pub fn register_defender(
        &self,
        kind: DefenderKindId,
        spec: Arc<DefenderSpec>,
        position: Vec2,
    ) -> DefenderId {
        let mut state = lock_unpoisoned(&self.state);
        let id = DefenderId::new(state.next_defender_id);
        state.next_defender_id = state.next_defender_id.wrapping_add(1);
        let _ = state
            .defenders
            .insert(id, DefenderInstance { kind, spec, position });
        id
    }

    /// Captures every placed defender in identifier order.
    #[must_use]
    pub fn defenders(&self) -> Vec<DefenderSnapshot> {
        let state = lock_unpoisoned(&self.state);
        state
            .defenders
            .iter()
            .map(|(id, defender)| defender.snapshot(*id))
            .collect()
    }

    /// Captures a single defender.
    #[must_use]
    pub fn defender(&self, id: DefenderId) -> Option<DefenderSnapshot> {
        let state = lock_unpoisoned(&self.state);
        state.defenders.get(&id).map(|defender| defender.snapshot(id))
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    monsters: BTreeMap<MonsterId, MonsterInstance>,
    defenders: BTreeMap<DefenderId, DefenderInstance>,
    next_monster_id: u32,
    next_defender_id: u32,
}

#[derive(Debug)]
struct MonsterInstance {
    kind: MonsterKindId,
    spec: Arc<MonsterSpec>,
    health: u32,
    position: Vec2,
}

impl MonsterInstance {
    fn snapshot(&self, id: MonsterId) -> MonsterSnapshot {
        MonsterSnapshot {
            id,
            kind: self.kind,
            position: self.position,
            health: self.health,
            radius: self.spec.radius,
        }
    }
}

#[derive(Debug)]
struct DefenderInstance {
    kind: DefenderKindId,
    spec: Arc<DefenderSpec>,
    position: Vec2,
}

impl DefenderInstance {
    fn snapshot(&self, id: DefenderId) -> DefenderSnapshot {
        DefenderSnapshot {
            id,
            kind: self.kind,
            position: self.position,
            spec: Arc::clone(&self.spec),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(health: u32) -> Arc<MonsterSpec> {
        Arc::new(MonsterSpec {
            name: "grunt".to_owned(),
            health,
            radius: 0.5,
            speed: 2.0,
            acceleration: 4.0,
            damage: 7,
            spawn_chance: 1.0,
            reward: 15,
        })
    }

    #[test]
    fn hits_decrement_health_until_kill() {
        let registry = UnitRegistry::new();
        let id = registry.register_monster(MonsterKindId::new(0), spec(10), Vec2::ZERO);

        assert_eq!(
            registry.apply_hit(id, 4),
            HitOutcome::Damaged { remaining: 6 }
        );
        assert_eq!(registry.apply_hit(id, 6), HitOutcome::Killed { reward: 15 });
        assert_eq!(registry.apply_hit(id, 6), HitOutcome::Missed);
        assert_eq!(registry.live_monsters(), 0);
    }

    #[test]
    fn overkill_counts_as_single_kill() {
        let registry = UnitRegistry::new();
        let id = registry.register_monster(MonsterKindId::new(0), spec(3), Vec2::ZERO);

        assert_eq!(
            registry.apply_hit(id, 100),
            HitOutcome::Killed { reward: 15 }
        );
        assert!(registry.monster(id).is_none());
    }

    #[test]
    fn breach_after_kill_is_ignored() {
        let registry = UnitRegistry::new();
        let id = registry.register_monster(MonsterKindId::new(0), spec(1), Vec2::ZERO);

        assert_eq!(registry.apply_hit(id, 1), HitOutcome::Killed { reward: 15 });
        assert_eq!(registry.resolve_breach(id), None);
    }

    #[test]
    fn breach_removes_live_monster() {
        let registry = UnitRegistry::new();
        let id = registry.register_monster(MonsterKindId::new(0), spec(5), Vec2::ZERO);

        assert_eq!(registry.resolve_breach(id), Some(7));
        assert_eq!(registry.resolve_breach(id), None);
        assert_eq!(registry.apply_hit(id, 1), HitOutcome::Missed);
    }

    #[test]
    fn nearest_within_prefers_closest_then_lowest_id() {
        let registry = UnitRegistry::new();
        let far = registry.register_monster(MonsterKindId::new(0), spec(5), Vec2::new(4.0, 0.0));
        let left = registry.register_monster(MonsterKindId::new(0), spec(5), Vec2::new(-2.0, 0.0));
        let right = registry.register_monster(MonsterKindId::new(0), spec(5), Vec2::new(2.0, 0.0));

        let found = registry
            .nearest_within(Vec2::ZERO, 3.0)
            .expect("monster in range");
        assert_eq!(found.id, left);
        assert!(left < right);
        assert_ne!(found.id, far);
    }

    #[test]
    fn nearest_within_accounts_for_body_radius() {
        let registry = UnitRegistry::new();
        let id = registry.register_monster(MonsterKindId::new(0), spec(5), Vec2::new(3.4, 0.0));

        assert_eq!(
            registry.nearest_within(Vec2::ZERO, 3.0).map(|m| m.id),
            Some(id)
        );
        assert!(registry.nearest_within(Vec2::ZERO, 2.8).is_none());
    }

    #[test]
    fn sync_positions_skips_departed_monsters() {
        let registry = UnitRegistry::new();
        let kept = registry.register_monster(MonsterKindId::new(0), spec(5), Vec2::ZERO);
        let gone = registry.register_monster(MonsterKindId::new(0), spec(5), Vec2::ZERO);
        registry.discard_monster(gone);

        registry.sync_positions(&[
            UnitMotion {
                unit: kept,
                position: Vec2::new(1.0, 2.0),
                arrived: false,
            },
            UnitMotion {
                unit: gone,
                position: Vec2::new(9.0, 9.0),
                arrived: false,
            },
        ]);

        assert_eq!(
            registry.monster(kept).map(|m| m.position),
            Some(Vec2::new(1.0, 2.0))
        );
        assert!(registry.monster(gone).is_none());
        assert_eq!(registry.monster_view().len(), 1);
    }

    #[test]
    fn monster_view_lists_survivors_in_id_order() {
        let registry = UnitRegistry::new();
        let first = registry.register_monster(MonsterKindId::new(0), spec(5), Vec2::ZERO);
        let hit = registry.register_monster(MonsterKindId::new(0), spec(5), Vec2::ZERO);
        let third = registry.register_monster(MonsterKindId::new(0), spec(5), Vec2::ZERO);
        assert_eq!(registry.apply_hit(hit, 2), HitOutcome::Damaged { remaining: 3 });
        let _ = registry.resolve_breach(first);

        let view = registry.monster_view();
        let listed: Vec<_> = view.iter().map(|m| (m.id, m.health)).collect();
        assert_eq!(listed, vec![(hit, 3), (third, 5)]);
        assert!(!view.is_empty());
    }
}
