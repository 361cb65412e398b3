#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Fixed-tick driver wiring the wave combat systems together.
//!
//! A [`Simulation`] owns the registry, the bus and every system. Components
//! talk to each other only through bus events; the driver itself performs
//! the per-tick sequencing:
//!
//! 1. a terminal session makes the tick a no-op;
//! 2. navigation advances and positions are mirrored into the registry,
//!    holding back units that arrived at the goal;
//! 3. the spawner timer advances, instantiating new units;
//! 4. combat cycles advance, resolving hits and publishing kills;
//! 5. held-back arrivals that are still alive resolve as breaches, so a
//!    unit killed during the same tick never breaches.

mod handlers;

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use thiserror::Error;
use tracing::{debug, info, warn};
use wave_defence_core::{
    lock_unpoisoned, Catalog, ConfigurationError, DefenderId, DefenderKindId, Event, HeadlessScene,
    InstantiationError, InsufficientFunds, MonsterId, MonsterKindId, MonsterSpec, Motion,
    Navigation, Scene, SessionConfig, UnitMotion, Vec2, WaveIndex,
};
use wave_defence_event_bus::{EventBus, Subscription};
use wave_defence_system_economy::{Debit, Ledger};
use wave_defence_system_movement::StraightLineNavigator;
use wave_defence_system_session::{Session, SessionError, SessionPhase};
use wave_defence_system_spawning::{
    Config as SpawnerConfig, SpawnerError, WavePhase, WaveSpawner, WaveState,
};
use wave_defence_system_tower_combat::{CombatContext, CombatResolver, StepReport};
use wave_defence_world::{DefenderSnapshot, UnitRegistry};

use crate::handlers::{Components, SharedNavigation};

/// Failures reported synchronously by the simulation.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// The catalog or the session record is unusable.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// The session rejected the request in its current phase.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// The spawner rejected the request in its current phase.
    #[error(transparent)]
    Spawner(#[from] SpawnerError),
    /// The placement request named a defender kind missing from the catalog.
    #[error("defender kind {0:?} is not in the catalog")]
    UnknownDefender(DefenderKindId),
    /// The placement request carried a non-finite position.
    #[error("defender position {0} is not finite")]
    NonFinitePosition(Vec2),
}

/// Answer to a placement request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// The defender was paid for and placed.
    Placed(DefenderId),
    /// The request was declined; nothing changed.
    Rejected(PlacementRejection),
}

/// Reasons a valid placement request is declined.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlacementRejection {
    /// The balance does not cover the price.
    InsufficientFunds(InsufficientFunds),
    /// The session already ended.
    SessionOver,
}

/// Summary of one fixed step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Units spawned during the step.
    pub spawned: usize,
    /// Units that breached during the step.
    pub breaches: usize,
    /// Combat counters of the step.
    pub combat: StepReport,
}

/// Wave combat simulation driven by fixed ticks.
pub struct Simulation {
    config: SessionConfig,
    catalog: Catalog,
    bus: EventBus,
    registry: UnitRegistry,
    scene: Arc<dyn Scene>,
    navigation: Arc<SharedNavigation>,
    spawner: Arc<Mutex<WaveSpawner>>,
    session: Arc<Mutex<Session>>,
    ledger: Arc<Mutex<Ledger>>,
    resolver: CombatResolver,
    motions: Vec<UnitMotion>,
    _subscriptions: Vec<Subscription>,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("session", &self.session_phase())
            .field("wave", &self.wave_state())
            .field("live_monsters", &self.registry.live_monsters())
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// Creates a simulation walking monsters in straight lines without any
    /// scene presentation.
    pub fn headless(config: SessionConfig, catalog: Catalog) -> Result<Self, SimulationError> {
        Self::new(
            config,
            catalog,
            Box::new(StraightLineNavigator::new()),
            Arc::new(HeadlessScene),
        )
    }

    /// Creates a simulation using the provided collaborators.
    ///
    /// The session record is validated first; an invalid record never
    /// reaches a wave.
    pub fn new(
        config: SessionConfig,
        catalog: Catalog,
        navigation: Box<dyn Navigation>,
        scene: Arc<dyn Scene>,
    ) -> Result<Self, SimulationError> {
        config.validate()?;

        let spawner = WaveSpawner::new(SpawnerConfig::from(&config), &catalog)?;
        let resolver = CombatResolver::new(config.combat_workers);
        let bus = EventBus::new();

        let components = Components {
            spawner: Arc::new(Mutex::new(spawner)),
            session: Arc::new(Mutex::new(Session::new(config.clone()))),
            ledger: Arc::new(Mutex::new(Ledger::new(config.currency_on_start))),
            navigation: Arc::new(Mutex::new(navigation)),
            switch: resolver.switch(),
        };
        let subscriptions = handlers::wire(&bus, &components);
        let Components {
            spawner,
            session,
            ledger,
            navigation,
            switch: _,
        } = components;

        info!(
            health = config.health_on_start,
            currency = config.currency_on_start,
            waves = config.waves_total,
            "session ready"
        );

        Ok(Self {
            config,
            catalog,
            bus,
            registry: UnitRegistry::new(),
            scene,
            navigation,
            spawner,
            session,
            ledger,
            resolver,
            motions: Vec::new(),
            _subscriptions: subscriptions,
        })
    }

    /// Bus carrying every notification of the simulation.
    ///
    /// Presentation collaborators subscribe here. Internal handlers publish
    /// follow-up events while a delivery is still running, so a subscriber
    /// attached later sees `WaveCleared` or `SessionOver` before the
    /// `UnitKilled` or `UnitBreached` that caused it.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Registry of live monsters and placed defenders.
    #[must_use]
    pub fn registry(&self) -> &UnitRegistry {
        &self.registry
    }

    /// Catalog the session was started with.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Session record the simulation was started with.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current session phase.
    #[must_use]
    pub fn session_phase(&self) -> SessionPhase {
        lock_unpoisoned(&self.session).phase()
    }

    /// Current player health.
    #[must_use]
    pub fn health(&self) -> u32 {
        lock_unpoisoned(&self.session).health()
    }

    /// Current player balance.
    #[must_use]
    pub fn balance(&self) -> u32 {
        lock_unpoisoned(&self.ledger).balance()
    }

    /// Phase of the current wave.
    #[must_use]
    pub fn wave_phase(&self) -> WavePhase {
        lock_unpoisoned(&self.spawner).phase()
    }

    /// Counters of the current wave.
    #[must_use]
    pub fn wave_state(&self) -> WaveState {
        lock_unpoisoned(&self.spawner).wave_state()
    }

    /// Number of running combat cycles.
    #[must_use]
    pub fn combat_cycles(&self) -> usize {
        self.resolver.cycles().count()
    }

    /// Outcome of a finished session, `None` while it is still running.
    #[must_use]
    pub fn outcome(&self) -> Option<bool> {
        match self.session_phase() {
            SessionPhase::Won => Some(true),
            SessionPhase::Lost => Some(false),
            SessionPhase::Idle | SessionPhase::WaveInProgress => None,
        }
    }

    /// Defender kinds the current balance can pay for.
    #[must_use]
    pub fn affordable_defenders(&self) -> Vec<DefenderKindId> {
        let ledger = lock_unpoisoned(&self.ledger);
        self.catalog
            .defenders()
            .filter(|(_, spec)| ledger.can_afford(spec.price))
            .map(|(kind, _)| kind)
            .collect()
    }

    /// Starts the next wave and arms every placed defender.
    pub fn start_wave(&mut self) -> Result<WaveIndex, SimulationError> {
        let mut events = Vec::new();
        let wave = {
            let mut session = lock_unpoisoned(&self.session);
            let mut spawner = lock_unpoisoned(&self.spawner);
            if session.phase() != SessionPhase::Idle {
                return Err(SessionError::InvalidState {
                    phase: session.phase(),
                }
                .into());
            }
            if !spawner.accepts_wave() {
                return Err(SpawnerError::InvalidState {
                    phase: spawner.phase(),
                }
                .into());
            }

            let plan = session.begin_wave()?;
            spawner.start_wave(plan, &mut events)?;
            plan.wave
        };

        self.resolver.arm(self.registry.defenders());
        self.bus_publish_all(events);
        Ok(wave)
    }

    /// Handles a validated placement request.
    ///
    /// Defenders placed during a wave join combat immediately.
    pub fn place_defender(
        &mut self,
        kind: DefenderKindId,
        position: Vec2,
    ) -> Result<Placement, SimulationError> {
        let spec = Arc::clone(
            self.catalog
                .defender(kind)
                .ok_or(SimulationError::UnknownDefender(kind))?,
        );
        if !position.is_finite() {
            return Err(SimulationError::NonFinitePosition(position));
        }
        if lock_unpoisoned(&self.session).is_terminal() {
            return Ok(Placement::Rejected(PlacementRejection::SessionOver));
        }

        let mut events = Vec::new();
        let debit = lock_unpoisoned(&self.ledger).debit(spec.price, &mut events);
        if let Debit::Rejected(funds) = debit {
            debug!(kind = kind.get(), price = funds.price, "placement rejected");
            return Ok(Placement::Rejected(PlacementRejection::InsufficientFunds(
                funds,
            )));
        }

        let id = self
            .registry
            .register_defender(kind, Arc::clone(&spec), position);
        let attached = self.resolver.attach(DefenderSnapshot {
            id,
            kind,
            position,
            spec,
        });
        info!(defender = id.get(), kind = kind.get(), attached, "defender placed");

        events.push(Event::DefenderPlaced {
            defender: id,
            kind,
            position,
        });
        self.bus_publish_all(events);
        Ok(Placement::Placed(id))
    }

    /// Advances the simulation by one fixed step of `dt`.
    pub fn tick(&mut self, dt: Duration) -> TickReport {
        let mut report = TickReport::default();
        if lock_unpoisoned(&self.session).is_terminal() {
            return report;
        }

        self.motions.clear();
        lock_unpoisoned(&self.navigation).advance(dt, &mut self.motions);
        self.registry.sync_positions(&self.motions);
        let arrivals: Vec<MonsterId> = self
            .motions
            .iter()
            .filter(|motion| motion.arrived)
            .map(|motion| motion.unit)
            .collect();

        let mut events = Vec::new();
        {
            let mut spawner = lock_unpoisoned(&self.spawner);
            let registry = &self.registry;
            let scene = &self.scene;
            let navigation = &self.navigation;
            let goal = self.config.goal;
            spawner.tick(
                dt,
                |kind, spec, entry| {
                    instantiate(registry, scene.as_ref(), navigation, goal, kind, spec, entry)
                },
                &mut events,
            );
        }
        report.spawned = events
            .iter()
            .filter(|event| matches!(event, Event::UnitSpawned { .. }))
            .count();
        self.bus_publish_all(events);

        report.combat = self.resolver.step(
            dt,
            CombatContext {
                registry: &self.registry,
                bus: &self.bus,
                scene: self.scene.as_ref(),
            },
        );

        for unit in arrivals {
            if lock_unpoisoned(&self.session).is_terminal() {
                break;
            }
            let Some(damage) = self.registry.resolve_breach(unit) else {
                continue;
            };
            lock_unpoisoned(&self.navigation).release(unit);
            report.breaches += 1;
            info!(unit = unit.get(), damage, "unit breached");
            self.bus.publish(Event::UnitBreached { unit, damage });
        }

        report
    }

    /// Ticks with the configured fixed step until the session ends or the
    /// current wave stops being in progress, at most `max_ticks` times.
    ///
    /// Returns the number of ticks performed.
    pub fn run_wave(&mut self, max_ticks: u64) -> u64 {
        let dt = self.config.tick_duration();
        let mut ticks = 0;
        while ticks < max_ticks && self.session_phase() == SessionPhase::WaveInProgress {
            let _ = self.tick(dt);
            ticks += 1;
        }
        ticks
    }

    fn bus_publish_all(&self, events: Vec<Event>) {
        for event in events {
            self.bus.publish(event);
        }
    }
}

/// Materializes one monster, rolling the registry back on failure.
fn instantiate(
    registry: &UnitRegistry,
    scene: &dyn Scene,
    navigation: &SharedNavigation,
    goal: Vec2,
    kind: MonsterKindId,
    spec: &Arc<MonsterSpec>,
    entry: Vec2,
) -> Result<MonsterId, InstantiationError> {
    let unit = registry.register_monster(kind, Arc::clone(spec), entry);

    let placed = scene.instantiate_monster(kind, entry).and_then(|()| {
        lock_unpoisoned(navigation)
            .set_destination(unit, entry, goal, Motion::from(spec.as_ref()))
            .map_err(InstantiationError::from)
    });

    if let Err(error) = placed {
        warn!(unit = unit.get(), %error, "instantiation rolled back");
        registry.discard_monster(unit);
        return Err(error);
    }
    Ok(unit)
}
