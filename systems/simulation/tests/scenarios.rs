use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use wave_defence_core::{
    Catalog, DefenderKindId, DefenderSpec, Event, EventKind, HeadlessScene, InsufficientFunds,
    InstantiationError, MonsterId, MonsterKindId, MonsterSpec, Motion, Navigation,
    NavigationError, Scene, SessionConfig, UnitMotion, Vec2, WaveIndex, WaveScaling,
};
use wave_defence_event_bus::{EventBus, Subscription};
use wave_defence_simulation::{Placement, PlacementRejection, Simulation, SimulationError};
use wave_defence_system_session::{SessionError, SessionPhase};
use wave_defence_system_spawning::WavePhase;

const ALL_KINDS: [EventKind; 9] = [
    EventKind::UnitSpawned,
    EventKind::UnitBreached,
    EventKind::UnitKilled,
    EventKind::WaveStarted,
    EventKind::WaveCleared,
    EventKind::SessionOver,
    EventKind::DefenderPlaced,
    EventKind::HealthChanged,
    EventKind::CurrencyChanged,
];

struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
    _subscriptions: Vec<Subscription>,
}

impl Recorder {
    fn attach(bus: &EventBus) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let subscriptions = ALL_KINDS
            .into_iter()
            .map(|kind| {
                let sink = Arc::clone(&events);
                bus.subscribe(kind, move |event| {
                    sink.lock().expect("event log").push(event.clone());
                })
            })
            .collect();
        Self {
            events,
            _subscriptions: subscriptions,
        }
    }

    fn of(&self, kind: EventKind) -> Vec<Event> {
        self.events
            .lock()
            .expect("event log")
            .iter()
            .filter(|event| event.kind() == kind)
            .cloned()
            .collect()
    }
}

fn grunt() -> MonsterSpec {
    MonsterSpec {
        name: "grunt".to_owned(),
        health: 10,
        radius: 0.5,
        speed: 1.0,
        acceleration: 1.0,
        damage: 5,
        spawn_chance: 1.0,
        reward: 10,
    }
}

fn sentry(price: u32) -> DefenderSpec {
    DefenderSpec {
        name: "sentry".to_owned(),
        description: "fast single-target turret".to_owned(),
        damage: 50,
        attack_radius: 4.0,
        fire_interval: Duration::from_millis(100),
        projectile_speed: 30.0,
        projectile_contact_radius: 0.5,
        price,
    }
}

fn config(quota: u32, waves: u32) -> SessionConfig {
    SessionConfig {
        units_max_per_wave: quota,
        waves_total: waves,
        wave_scaling: WaveScaling::Flat,
        spawn_interval: Duration::from_millis(20),
        tick_rate: 50,
        entry: Vec2::ZERO,
        goal: Vec2::new(60.0, 0.0),
        ..SessionConfig::default()
    }
}

fn placed(placement: Placement) {
    assert!(matches!(placement, Placement::Placed(_)), "{placement:?}");
}

#[test]
fn killing_every_unit_clears_the_wave_once_and_pays_rewards() {
    let catalog = Catalog::new(vec![grunt()], vec![sentry(50)]).expect("catalog");
    let mut simulation = Simulation::headless(config(5, 2), catalog).expect("simulation");
    let recorder = Recorder::attach(simulation.bus());

    placed(
        simulation
            .place_defender(DefenderKindId::new(0), Vec2::new(2.0, 1.0))
            .expect("placement"),
    );
    assert_eq!(simulation.balance(), 50);

    assert_eq!(simulation.start_wave().expect("wave"), WaveIndex::new(1));
    let ticks = simulation.run_wave(2_000);
    assert!(ticks < 2_000, "wave never cleared");

    assert_eq!(recorder.of(EventKind::UnitSpawned).len(), 5);
    assert_eq!(recorder.of(EventKind::UnitKilled).len(), 5);
    assert!(recorder.of(EventKind::UnitBreached).is_empty());
    assert_eq!(
        recorder.of(EventKind::WaveCleared),
        vec![Event::WaveCleared {
            wave: WaveIndex::new(1)
        }]
    );
    assert_eq!(simulation.balance(), 50 + 5 * 10);
    assert_eq!(simulation.session_phase(), SessionPhase::Idle);
    assert_eq!(simulation.wave_phase(), WavePhase::Cleared);
    assert_eq!(simulation.combat_cycles(), 0, "combat stops with the wave");
    assert_eq!(simulation.health(), 100);
}

#[test]
fn clearing_the_last_wave_wins_the_session() {
    let catalog = Catalog::new(vec![grunt()], vec![sentry(50)]).expect("catalog");
    let mut simulation = Simulation::headless(config(2, 2), catalog).expect("simulation");
    let recorder = Recorder::attach(simulation.bus());
    placed(
        simulation
            .place_defender(DefenderKindId::new(0), Vec2::new(2.0, 1.0))
            .expect("placement"),
    );

    for expected in 1..=2 {
        assert_eq!(simulation.start_wave().expect("wave"), WaveIndex::new(expected));
        let _ticks = simulation.run_wave(2_000);
    }

    assert_eq!(simulation.outcome(), Some(true));
    assert_eq!(
        recorder.of(EventKind::SessionOver),
        vec![Event::SessionOver { won: true }]
    );
    assert_eq!(
        recorder.of(EventKind::WaveStarted),
        vec![
            Event::WaveStarted {
                wave: WaveIndex::new(1)
            },
            Event::WaveStarted {
                wave: WaveIndex::new(2)
            },
        ]
    );
}

#[test]
fn breaches_of_forty_then_seventy_lose_the_session_once() {
    let catalog = Catalog::new(vec![grunt()], vec![sentry(50)]).expect("catalog");
    let mut simulation = Simulation::headless(config(5, 2), catalog).expect("simulation");
    let recorder = Recorder::attach(simulation.bus());
    let _wave = simulation.start_wave().expect("wave");

    simulation.bus().publish(Event::UnitBreached {
        unit: MonsterId::new(900),
        damage: 40,
    });
    assert_eq!(simulation.health(), 60);
    simulation.bus().publish(Event::UnitBreached {
        unit: MonsterId::new(901),
        damage: 70,
    });

    assert_eq!(
        recorder.of(EventKind::HealthChanged),
        vec![
            Event::HealthChanged { health: 60 },
            Event::HealthChanged { health: 0 },
        ]
    );
    assert_eq!(
        recorder.of(EventKind::SessionOver),
        vec![Event::SessionOver { won: false }]
    );
    assert_eq!(simulation.outcome(), Some(false));
    assert_eq!(simulation.wave_phase(), WavePhase::Aborted);

    simulation.bus().publish(Event::UnitBreached {
        unit: MonsterId::new(902),
        damage: 10,
    });
    assert_eq!(recorder.of(EventKind::HealthChanged).len(), 2);
    assert_eq!(recorder.of(EventKind::SessionOver).len(), 1);

    assert_eq!(
        simulation.tick(Duration::from_millis(20)),
        Default::default()
    );
    assert!(matches!(
        simulation.start_wave(),
        Err(SimulationError::Session(SessionError::InvalidState {
            phase: SessionPhase::Lost
        }))
    ));
    assert_eq!(
        simulation
            .place_defender(DefenderKindId::new(0), Vec2::ONE)
            .expect("placement request"),
        Placement::Rejected(PlacementRejection::SessionOver)
    );
}

#[test]
fn walking_breaches_end_the_session_and_freeze_it() {
    let runner = MonsterSpec {
        speed: 50.0,
        acceleration: 500.0,
        damage: 60,
        ..grunt()
    };
    let catalog = Catalog::new(vec![runner], vec![sentry(50)]).expect("catalog");
    let config = SessionConfig {
        goal: Vec2::new(5.0, 0.0),
        ..config(3, 1)
    };
    let mut simulation = Simulation::headless(config, catalog).expect("simulation");
    let recorder = Recorder::attach(simulation.bus());

    let _wave = simulation.start_wave().expect("wave");
    let _ticks = simulation.run_wave(500);

    assert_eq!(simulation.outcome(), Some(false));
    assert_eq!(recorder.of(EventKind::UnitBreached).len(), 2);
    assert_eq!(
        recorder.of(EventKind::HealthChanged),
        vec![
            Event::HealthChanged { health: 40 },
            Event::HealthChanged { health: 0 },
        ]
    );
    assert_eq!(recorder.of(EventKind::SessionOver).len(), 1);

    let live = simulation.registry().live_monsters();
    for _ in 0..100 {
        let _ = simulation.tick(Duration::from_millis(20));
    }
    assert_eq!(simulation.registry().live_monsters(), live);
    assert_eq!(recorder.of(EventKind::UnitBreached).len(), 2);
}

#[test]
fn purchase_above_balance_is_rejected_and_balance_kept() {
    let catalog =
        Catalog::new(vec![grunt()], vec![sentry(40), sentry(150)]).expect("catalog");
    let mut simulation = Simulation::headless(config(5, 2), catalog).expect("simulation");
    let recorder = Recorder::attach(simulation.bus());

    assert_eq!(simulation.affordable_defenders(), vec![DefenderKindId::new(0)]);
    assert_eq!(
        simulation
            .place_defender(DefenderKindId::new(1), Vec2::ONE)
            .expect("placement request"),
        Placement::Rejected(PlacementRejection::InsufficientFunds(InsufficientFunds {
            price: 150,
            balance: 100
        }))
    );
    assert_eq!(simulation.balance(), 100);
    assert!(recorder.of(EventKind::CurrencyChanged).is_empty());
    assert!(simulation.registry().defenders().is_empty());
}

#[test]
fn defender_placed_mid_wave_joins_combat() {
    let catalog = Catalog::new(vec![grunt()], vec![sentry(40)]).expect("catalog");
    let mut simulation = Simulation::headless(config(5, 2), catalog).expect("simulation");
    let recorder = Recorder::attach(simulation.bus());

    let _wave = simulation.start_wave().expect("wave");
    assert_eq!(simulation.combat_cycles(), 0);

    let placement = simulation
        .place_defender(DefenderKindId::new(0), Vec2::new(2.0, 1.0))
        .expect("placement");
    placed(placement);
    assert_eq!(simulation.combat_cycles(), 1);
    assert_eq!(recorder.of(EventKind::DefenderPlaced).len(), 1);
    assert_eq!(
        recorder.of(EventKind::CurrencyChanged),
        vec![Event::CurrencyChanged { balance: 60 }]
    );

    let _ticks = simulation.run_wave(2_000);
    assert_eq!(recorder.of(EventKind::UnitKilled).len(), 5);
}

#[test]
fn two_defenders_racing_for_one_unit_credit_one_reward() {
    for workers in [1, 2] {
        let fragile = MonsterSpec {
            health: 50,
            ..grunt()
        };
        let catalog = Catalog::new(vec![fragile], vec![sentry(40)]).expect("catalog");
        let config = SessionConfig {
            combat_workers: workers,
            ..config(1, 1)
        };
        let mut simulation = Simulation::headless(config, catalog).expect("simulation");
        let recorder = Recorder::attach(simulation.bus());

        for position in [Vec2::new(1.0, 1.5), Vec2::new(1.0, -1.5)] {
            placed(
                simulation
                    .place_defender(DefenderKindId::new(0), position)
                    .expect("placement"),
            );
        }
        assert_eq!(simulation.balance(), 20);

        let _wave = simulation.start_wave().expect("wave");
        let _ticks = simulation.run_wave(2_000);

        assert_eq!(recorder.of(EventKind::UnitKilled).len(), 1, "workers {workers}");
        assert_eq!(simulation.balance(), 30);
        assert_eq!(recorder.of(EventKind::WaveCleared).len(), 1);
        assert_eq!(simulation.outcome(), Some(true));
    }
}

/// Navigation that moves every unit onto its destination at the next step.
#[derive(Default)]
struct Teleport {
    pending: BTreeMap<MonsterId, Vec2>,
}

impl Navigation for Teleport {
    fn set_destination(
        &mut self,
        unit: MonsterId,
        _origin: Vec2,
        destination: Vec2,
        _motion: Motion,
    ) -> Result<(), NavigationError> {
        let _ = self.pending.insert(unit, destination);
        Ok(())
    }

    fn release(&mut self, unit: MonsterId) {
        let _ = self.pending.remove(&unit);
    }

    fn advance(&mut self, _dt: Duration, out: &mut Vec<UnitMotion>) {
        out.extend(
            std::mem::take(&mut self.pending)
                .into_iter()
                .map(|(unit, position)| UnitMotion {
                    unit,
                    position,
                    arrived: true,
                }),
        );
    }
}

fn point_blank(with_defender: bool) -> (Simulation, Recorder) {
    let turret = DefenderSpec {
        attack_radius: 2.0,
        projectile_speed: 1.0,
        damage: 100,
        fire_interval: Duration::from_secs(1),
        ..sentry(10)
    };
    let catalog = Catalog::new(vec![grunt()], vec![turret]).expect("catalog");
    let config = SessionConfig {
        goal: Vec2::new(0.2, 0.0),
        ..config(1, 1)
    };
    let mut simulation = Simulation::new(
        config,
        catalog,
        Box::new(Teleport::default()),
        Arc::new(HeadlessScene),
    )
    .expect("simulation");
    let recorder = Recorder::attach(simulation.bus());

    if with_defender {
        placed(
            simulation
                .place_defender(DefenderKindId::new(0), Vec2::new(0.6, 0.0))
                .expect("placement"),
        );
    }
    let _wave = simulation.start_wave().expect("wave");
    (simulation, recorder)
}

#[test]
fn kill_in_the_arrival_tick_wins_over_breach() {
    let (mut simulation, recorder) = point_blank(true);
    let dt = simulation.config().tick_duration();

    let first = simulation.tick(dt);
    assert_eq!(first.spawned, 1);
    assert_eq!(first.combat.shots, 1);

    let second = simulation.tick(dt);
    assert_eq!(second.combat.kills, 1);
    assert_eq!(second.breaches, 0);

    assert_eq!(recorder.of(EventKind::UnitKilled).len(), 1);
    assert!(recorder.of(EventKind::UnitBreached).is_empty());
    assert_eq!(simulation.health(), 100);
}

#[test]
fn unopposed_arrival_breaches() {
    let (mut simulation, recorder) = point_blank(false);
    let dt = simulation.config().tick_duration();

    let _first = simulation.tick(dt);
    let second = simulation.tick(dt);

    assert_eq!(second.breaches, 1);
    assert_eq!(recorder.of(EventKind::UnitBreached).len(), 1);
    assert_eq!(simulation.health(), 95);
    assert_eq!(simulation.outcome(), Some(true), "the only wave drained");
}

#[test]
fn failed_monster_instantiation_is_rolled_back_and_retried() {
    #[derive(Default)]
    struct FlakyScene {
        attempts: AtomicUsize,
    }

    impl Scene for FlakyScene {
        fn instantiate_monster(
            &self,
            _kind: MonsterKindId,
            _position: Vec2,
        ) -> Result<(), InstantiationError> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(InstantiationError::Scene("monster".to_owned()));
            }
            Ok(())
        }
    }

    let catalog = Catalog::new(vec![grunt()], vec![sentry(50)]).expect("catalog");
    let mut simulation = Simulation::new(
        config(2, 1),
        catalog,
        Box::new(wave_defence_system_movement::StraightLineNavigator::new()),
        Arc::new(FlakyScene::default()),
    )
    .expect("simulation");
    let recorder = Recorder::attach(simulation.bus());
    let _wave = simulation.start_wave().expect("wave");

    let dt = simulation.config().tick_duration();
    assert_eq!(simulation.tick(dt).spawned, 0);
    assert_eq!(simulation.registry().live_monsters(), 0);

    for _ in 0..2 {
        let _ = simulation.tick(dt);
    }
    assert_eq!(recorder.of(EventKind::UnitSpawned).len(), 2);
    assert_eq!(simulation.registry().live_monsters(), 2);
    assert_eq!(simulation.wave_state().spawned, 2);
}
