#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Wave Defence simulation.
//!
//! This crate defines the vocabulary that connects the registry, the pure
//! combat systems and the adapters. Immutable catalog entries describe what
//! can be spawned or placed, [`Event`] values describe everything that
//! happened inside the simulation, and the [`Navigation`] and [`Scene`]
//! traits mark the boundary toward collaborators the simulation never
//! implements itself (path following and scene object instantiation).

use std::{
    num::NonZeroU32,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

pub use glam::Vec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unique identifier assigned to a spawned monster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonsterId(u32);

impl MonsterId {
    /// Creates a new monster identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Unique identifier assigned to a placed defender.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefenderId(u32);

impl DefenderId {
    /// Creates a new defender identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Index of a monster kind within the [`Catalog`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonsterKindId(u32);

impl MonsterKindId {
    /// Creates a new monster kind identifier.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Index of a defender kind within the [`Catalog`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefenderKindId(u32);

impl DefenderKindId {
    /// Creates a new defender kind identifier.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// One-based index of a wave within the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaveIndex(u32);

impl WaveIndex {
    /// Creates a new wave index.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the wave index.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Returns the index of the wave that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

/// Immutable catalog entry describing a kind of mobile hostile unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonsterSpec {
    /// Display name of the monster kind.
    pub name: String,
    /// Hit points every instance starts with.
    pub health: u32,
    /// Body radius in world units.
    pub radius: f32,
    /// Maximum travel speed in world units per second.
    pub speed: f32,
    /// Acceleration toward the maximum speed in world units per second squared.
    pub acceleration: f32,
    /// Health removed from the player when the unit reaches the goal.
    pub damage: u32,
    /// Relative chance in `[0, 1]` that the spawner picks this kind.
    pub spawn_chance: f32,
    /// Currency credited to the player when the unit is killed.
    pub reward: u32,
}

/// Immutable catalog entry describing a kind of stationary defender.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefenderSpec {
    /// Display name of the defender kind.
    pub name: String,
    /// Free-form description shown by store presentations.
    #[serde(default)]
    pub description: String,
    /// Health removed from a monster by one projectile hit.
    pub damage: u32,
    /// Radius around the defender in which monsters are acquired.
    pub attack_radius: f32,
    /// Delay between two shots.
    #[serde(with = "seconds")]
    pub fire_interval: Duration,
    /// Projectile speed in world units per second.
    pub projectile_speed: f32,
    /// Distance below which a projectile counts as touching a monster.
    pub projectile_contact_radius: f32,
    /// Currency debited when the defender is placed.
    pub price: u32,
}

/// Serialized form of a catalog as supplied by the catalog collaborator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CatalogRecord {
    /// Monster kinds available to the spawner.
    #[serde(default)]
    pub monsters: Vec<MonsterSpec>,
    /// Defender kinds available to the placement collaborator.
    #[serde(default)]
    pub defenders: Vec<DefenderSpec>,
}

impl CatalogRecord {
    /// Validates the record and converts it into a shareable [`Catalog`].
    pub fn into_catalog(self) -> Result<Catalog, ConfigurationError> {
        Catalog::new(self.monsters, self.defenders)
    }
}

/// Validated, immutable set of monster and defender kinds.
///
/// Entries are reference counted so every spawned instance shares the spec
/// of its kind instead of copying it.
#[derive(Clone, Debug)]
pub struct Catalog {
    monsters: Vec<Arc<MonsterSpec>>,
    defenders: Vec<Arc<DefenderSpec>>,
}

impl Catalog {
    /// Validates the provided entries and builds a catalog.
    ///
    /// An empty or malformed catalog is a fatal startup condition, so every
    /// entry is checked before any of them is accepted.
    pub fn new(
        monsters: Vec<MonsterSpec>,
        defenders: Vec<DefenderSpec>,
    ) -> Result<Self, ConfigurationError> {
        if monsters.is_empty() {
            return Err(ConfigurationError::EmptyMonsterCatalog);
        }
        if defenders.is_empty() {
            return Err(ConfigurationError::EmptyDefenderCatalog);
        }

        for monster in &monsters {
            validate_monster(monster)?;
        }
        for defender in &defenders {
            validate_defender(defender)?;
        }

        if !monsters.iter().any(|monster| monster.spawn_chance > 0.0) {
            return Err(ConfigurationError::NoSpawnableMonsters);
        }

        Ok(Self {
            monsters: monsters.into_iter().map(Arc::new).collect(),
            defenders: defenders.into_iter().map(Arc::new).collect(),
        })
    }

    /// Looks up a monster kind.
    #[must_use]
    pub fn monster(&self, kind: MonsterKindId) -> Option<&Arc<MonsterSpec>> {
        usize::try_from(kind.get())
            .ok()
            .and_then(|index| self.monsters.get(index))
    }

    /// Looks up a defender kind.
    #[must_use]
    pub fn defender(&self, kind: DefenderKindId) -> Option<&Arc<DefenderSpec>> {
        usize::try_from(kind.get())
            .ok()
            .and_then(|index| self.defenders.get(index))
    }

    /// Finds a defender kind by its display name.
    #[must_use]
    pub fn defender_by_name(&self, name: &str) -> Option<DefenderKindId> {
        self.defenders()
            .find(|(_, spec)| spec.name == name)
            .map(|(kind, _)| kind)
    }

    /// Iterates over monster kinds in catalog order.
    pub fn monsters(&self) -> impl Iterator<Item = (MonsterKindId, &Arc<MonsterSpec>)> {
        self.monsters
            .iter()
            .enumerate()
            .map(|(index, spec)| (MonsterKindId::new(index as u32), spec))
    }

    /// Iterates over defender kinds in catalog order.
    pub fn defenders(&self) -> impl Iterator<Item = (DefenderKindId, &Arc<DefenderSpec>)> {
        self.defenders
            .iter()
            .enumerate()
            .map(|(index, spec)| (DefenderKindId::new(index as u32), spec))
    }
}

fn validate_monster(monster: &MonsterSpec) -> Result<(), ConfigurationError> {
    let malformed = |reason: &'static str| ConfigurationError::MalformedMonster {
        name: monster.name.clone(),
        reason,
    };

    if monster.health == 0 {
        return Err(malformed("health must be positive"));
    }
    if !is_positive(monster.radius) {
        return Err(malformed("radius must be positive"));
    }
    if !is_positive(monster.speed) {
        return Err(malformed("speed must be positive"));
    }
    if !is_positive(monster.acceleration) {
        return Err(malformed("acceleration must be positive"));
    }
    if !(0.0..=1.0).contains(&monster.spawn_chance) {
        return Err(malformed("spawn chance must lie within [0, 1]"));
    }
    Ok(())
}

fn validate_defender(defender: &DefenderSpec) -> Result<(), ConfigurationError> {
    let malformed = |reason: &'static str| ConfigurationError::MalformedDefender {
        name: defender.name.clone(),
        reason,
    };

    if defender.damage == 0 {
        return Err(malformed("damage must be positive"));
    }
    if !is_positive(defender.attack_radius) {
        return Err(malformed("attack radius must be positive"));
    }
    if defender.fire_interval.is_zero() {
        return Err(malformed("fire interval must be positive"));
    }
    if !is_positive(defender.projectile_speed) {
        return Err(malformed("projectile speed must be positive"));
    }
    if !is_positive(defender.projectile_contact_radius) {
        return Err(malformed("projectile contact radius must be positive"));
    }
    Ok(())
}

fn is_positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

/// Policy deriving each wave's quota and cadence from the session record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WaveScaling {
    /// Quota grows and the spawn interval shrinks with the square root of
    /// the wave index.
    #[default]
    SquareRoot,
    /// Every wave uses the record values unchanged.
    Flat,
}

impl WaveScaling {
    /// Computes the plan for the provided wave.
    #[must_use]
    pub fn plan(self, wave: WaveIndex, units_max_per_wave: u32, interval: Duration) -> WavePlan {
        let factor = match self {
            Self::SquareRoot => f64::from(wave.get().max(1)).sqrt(),
            Self::Flat => 1.0,
        };

        let scaled = (f64::from(units_max_per_wave) * factor).round();
        let quota = scaled.clamp(1.0, f64::from(u32::MAX)) as u32;

        WavePlan {
            wave,
            quota: NonZeroU32::new(quota).unwrap_or(NonZeroU32::MIN),
            interval: interval.div_f64(factor),
        }
    }
}

/// Parameters handed to the spawner when a wave starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WavePlan {
    /// Wave the plan belongs to.
    pub wave: WaveIndex,
    /// Number of units to spawn before the wave can drain.
    pub quota: NonZeroU32,
    /// Period of the spawn timer.
    pub interval: Duration,
}

/// Session parameters injected at session start.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Player health at session start; also the upper clamp for health.
    pub health_on_start: u32,
    /// Player currency at session start.
    pub currency_on_start: u32,
    /// Number of waves that must be cleared to win.
    pub waves_total: u32,
    /// Units spawned by the first wave before scaling.
    pub units_max_per_wave: u32,
    /// Spawn timer period of the first wave before scaling.
    #[serde(with = "seconds")]
    pub spawn_interval: Duration,
    /// Point at which monsters are instantiated.
    pub entry: Vec2,
    /// Point monsters walk toward; reaching it is a breach.
    pub goal: Vec2,
    /// Seed of the spawner's random stream.
    pub rng_seed: u64,
    /// Exponent applied to the uniform draw when choosing a monster kind.
    pub spawn_bias_exponent: f32,
    /// How quota and cadence scale with the wave index.
    pub wave_scaling: WaveScaling,
    /// Worker threads used to advance combat cycles; `1` keeps them inline.
    pub combat_workers: usize,
    /// Fixed simulation steps per second.
    pub tick_rate: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            health_on_start: 100,
            currency_on_start: 100,
            waves_total: 4,
            units_max_per_wave: 24,
            spawn_interval: Duration::from_secs(2),
            entry: Vec2::new(0.0, 0.0),
            goal: Vec2::new(30.0, 0.0),
            rng_seed: 0x5eed_d3fe_ace0_0001,
            spawn_bias_exponent: 2.0,
            wave_scaling: WaveScaling::SquareRoot,
            combat_workers: 1,
            tick_rate: 50,
        }
    }
}

impl SessionConfig {
    /// Rejects records the simulation cannot run with.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let positive = [
            ("healthOnStart", self.health_on_start),
            ("wavesTotal", self.waves_total),
            ("unitsMaxPerWave", self.units_max_per_wave),
            ("tickRate", self.tick_rate),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigurationError::NonPositive { field });
            }
        }

        if self.spawn_interval.is_zero() {
            return Err(ConfigurationError::NonPositive {
                field: "spawnInterval",
            });
        }
        if self.combat_workers == 0 {
            return Err(ConfigurationError::NonPositive {
                field: "combatWorkers",
            });
        }
        if !is_positive(self.spawn_bias_exponent) {
            return Err(ConfigurationError::NonPositive {
                field: "spawnBiasExponent",
            });
        }
        if !self.entry.is_finite() {
            return Err(ConfigurationError::NonFinite { field: "entry" });
        }
        if !self.goal.is_finite() {
            return Err(ConfigurationError::NonFinite { field: "goal" });
        }
        Ok(())
    }

    /// Duration of one fixed simulation step.
    #[must_use]
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate.max(1)
    }

    /// Computes the spawn plan of the provided wave.
    #[must_use]
    pub fn wave_plan(&self, wave: WaveIndex) -> WavePlan {
        self.wave_scaling
            .plan(wave, self.units_max_per_wave, self.spawn_interval)
    }
}

/// Combat-domain events exchanged over the event bus.
///
/// Events are immutable value records; publishing moves the payload to the
/// bus and every subscriber observes a shared read-only reference.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// A monster was instantiated at the entry point.
    UnitSpawned {
        /// Identifier assigned to the monster.
        unit: MonsterId,
        /// Kind the monster was drawn from.
        kind: MonsterKindId,
    },
    /// A monster reached the goal alive.
    UnitBreached {
        /// Identifier of the monster that breached.
        unit: MonsterId,
        /// Contact damage dealt to the player.
        damage: u32,
    },
    /// A monster's health dropped to zero.
    UnitKilled {
        /// Identifier of the monster that died.
        unit: MonsterId,
        /// Currency earned for the kill.
        reward: u32,
    },
    /// A new wave began spawning.
    WaveStarted {
        /// Wave that started.
        wave: WaveIndex,
    },
    /// Every unit of the wave spawned and none is left alive.
    WaveCleared {
        /// Wave that was cleared.
        wave: WaveIndex,
    },
    /// The session reached a terminal state.
    SessionOver {
        /// Whether the player won.
        won: bool,
    },
    /// A defender was placed.
    DefenderPlaced {
        /// Identifier assigned to the defender.
        defender: DefenderId,
        /// Kind of defender placed.
        kind: DefenderKindId,
        /// Fixed world position of the defender.
        position: Vec2,
    },
    /// The player's health changed.
    HealthChanged {
        /// Health after the change.
        health: u32,
    },
    /// The player's balance changed.
    CurrencyChanged {
        /// Balance after the change.
        balance: u32,
    },
}

impl Event {
    /// Reports the subscription tag of the event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::UnitSpawned { .. } => EventKind::UnitSpawned,
            Self::UnitBreached { .. } => EventKind::UnitBreached,
            Self::UnitKilled { .. } => EventKind::UnitKilled,
            Self::WaveStarted { .. } => EventKind::WaveStarted,
            Self::WaveCleared { .. } => EventKind::WaveCleared,
            Self::SessionOver { .. } => EventKind::SessionOver,
            Self::DefenderPlaced { .. } => EventKind::DefenderPlaced,
            Self::HealthChanged { .. } => EventKind::HealthChanged,
            Self::CurrencyChanged { .. } => EventKind::CurrencyChanged,
        }
    }
}

/// Payload-free tag identifying an [`Event`] variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// Tag of [`Event::UnitSpawned`].
    UnitSpawned,
    /// Tag of [`Event::UnitBreached`].
    UnitBreached,
    /// Tag of [`Event::UnitKilled`].
    UnitKilled,
    /// Tag of [`Event::WaveStarted`].
    WaveStarted,
    /// Tag of [`Event::WaveCleared`].
    WaveCleared,
    /// Tag of [`Event::SessionOver`].
    SessionOver,
    /// Tag of [`Event::DefenderPlaced`].
    DefenderPlaced,
    /// Tag of [`Event::HealthChanged`].
    HealthChanged,
    /// Tag of [`Event::CurrencyChanged`].
    CurrencyChanged,
}

/// Movement parameters handed to the navigation collaborator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Motion {
    /// Maximum travel speed in world units per second.
    pub speed: f32,
    /// Acceleration in world units per second squared.
    pub acceleration: f32,
}

impl From<&MonsterSpec> for Motion {
    fn from(spec: &MonsterSpec) -> Self {
        Self {
            speed: spec.speed,
            acceleration: spec.acceleration,
        }
    }
}

/// Position update reported by the navigation collaborator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UnitMotion {
    /// Unit that moved.
    pub unit: MonsterId,
    /// Position after the step.
    pub position: Vec2,
    /// Whether the unit reached its destination during the step.
    pub arrived: bool,
}

/// Path-following collaborator that owns monster positions.
pub trait Navigation: Send {
    /// Starts moving `unit` from `origin` toward `destination`.
    fn set_destination(
        &mut self,
        unit: MonsterId,
        origin: Vec2,
        destination: Vec2,
        motion: Motion,
    ) -> Result<(), NavigationError>;

    /// Stops tracking a unit that died or breached.
    fn release(&mut self, unit: MonsterId);

    /// Advances every tracked unit by `dt`, appending their new positions.
    fn advance(&mut self, dt: Duration, out: &mut Vec<UnitMotion>);
}

/// Scene collaborator that materializes simulation entities.
///
/// The simulation only needs to know whether instantiation succeeded; the
/// default implementations always succeed.
pub trait Scene: Send + Sync {
    /// Instantiates a monster of `kind` at `position`.
    fn instantiate_monster(
        &self,
        _kind: MonsterKindId,
        _position: Vec2,
    ) -> Result<(), InstantiationError> {
        Ok(())
    }

    /// Instantiates the projectile fired by `defender` from `origin`.
    fn instantiate_projectile(
        &self,
        _defender: DefenderId,
        _origin: Vec2,
    ) -> Result<(), InstantiationError> {
        Ok(())
    }
}

/// Scene without any presentation; instantiation always succeeds.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeadlessScene;

impl Scene for HeadlessScene {}

/// Cooperative cancellation flag shared between a task and its owner.
///
/// Clones observe the same flag. Tasks check it at the top of every
/// iteration, so cancellation is observed within one tick.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation to every clone of the token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Reports whether cancellation was signalled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Locks `mutex`, recovering the guard if a previous holder panicked.
///
/// Handler panics are isolated by the event bus, so a poisoned lock only
/// means a subscriber failed mid-delivery; the protected state itself is
/// kept consistent by the owning component.
pub fn lock_unpoisoned<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reasons the catalog or session record is rejected at startup.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigurationError {
    /// The catalog lists no monster kinds.
    #[error("catalog contains no monster kinds")]
    EmptyMonsterCatalog,
    /// The catalog lists no defender kinds.
    #[error("catalog contains no defender kinds")]
    EmptyDefenderCatalog,
    /// Every monster kind has a zero spawn chance.
    #[error("no monster kind has a positive spawn chance")]
    NoSpawnableMonsters,
    /// A monster entry holds an invalid value.
    #[error("monster `{name}` is malformed: {reason}")]
    MalformedMonster {
        /// Name of the offending entry.
        name: String,
        /// Description of the violated constraint.
        reason: &'static str,
    },
    /// A defender entry holds an invalid value.
    #[error("defender `{name}` is malformed: {reason}")]
    MalformedDefender {
        /// Name of the offending entry.
        name: String,
        /// Description of the violated constraint.
        reason: &'static str,
    },
    /// A session field that must be positive is zero or negative.
    #[error("session field `{field}` must be positive")]
    NonPositive {
        /// Name of the offending field.
        field: &'static str,
    },
    /// A session field holds a non-finite coordinate.
    #[error("session field `{field}` must be finite")]
    NonFinite {
        /// Name of the offending field.
        field: &'static str,
    },
}

/// Failures reported by the navigation collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum NavigationError {
    /// The unit already has a destination.
    #[error("unit {0:?} is already navigating")]
    AlreadyNavigating(MonsterId),
    /// No route leads to the destination.
    #[error("destination of unit {0:?} is unreachable")]
    Unreachable(MonsterId),
}

/// Failures to produce a monster or projectile.
///
/// These are recoverable: the affected tick or shot is skipped and retried.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum InstantiationError {
    /// The navigation collaborator refused the unit.
    #[error(transparent)]
    Navigation(#[from] NavigationError),
    /// The scene collaborator could not produce the object.
    #[error("scene could not instantiate {0}")]
    Scene(String),
}

/// A purchase exceeded the available balance.
///
/// This is an expected outcome of a purchase query, not a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("price {price} exceeds balance {balance}")]
pub struct InsufficientFunds {
    /// Price of the rejected purchase.
    pub price: u32,
    /// Balance at the time of the request.
    pub balance: u32,
}

mod seconds {
    use std::time::Duration;

    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S: Serializer>(
        value: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}
