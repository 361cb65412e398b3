use std::sync::{Arc, Mutex};

use tracing::debug;
use wave_defence_core::{lock_unpoisoned, Event, EventKind, Navigation};
use wave_defence_event_bus::{EventBus, Subscription};
use wave_defence_system_economy::Ledger;
use wave_defence_system_session::Session;
use wave_defence_system_spawning::WaveSpawner;
use wave_defence_system_tower_combat::CombatSwitch;

pub(crate) type SharedNavigation = Mutex<Box<dyn Navigation>>;

/// Components reacting to bus traffic.
pub(crate) struct Components {
    pub(crate) spawner: Arc<Mutex<WaveSpawner>>,
    pub(crate) session: Arc<Mutex<Session>>,
    pub(crate) ledger: Arc<Mutex<Ledger>>,
    pub(crate) navigation: Arc<SharedNavigation>,
    pub(crate) switch: Arc<CombatSwitch>,
}

/// Subscribes every component to the events it consumes.
///
/// Handlers hold only weak references to their component and to the bus.
/// Each one releases its component lock before publishing follow-up events.
pub(crate) fn wire(bus: &EventBus, components: &Components) -> Vec<Subscription> {
    let mut subscriptions = Vec::with_capacity(8);

    let weak = bus.downgrade();
    subscriptions.push(bus.subscribe_owned(
        EventKind::UnitKilled,
        &components.ledger,
        move |ledger, event| {
            let Event::UnitKilled { reward, .. } = event else {
                return;
            };
            let mut out = Vec::new();
            lock_unpoisoned(ledger).credit(*reward, &mut out);
            weak.publish_all(out);
        },
    ));

    subscriptions.push(bus.subscribe_owned(
        EventKind::UnitKilled,
        &components.navigation,
        |navigation, event| {
            if let Event::UnitKilled { unit, .. } = event {
                lock_unpoisoned(navigation).release(*unit);
            }
        },
    ));

    // Breach damage lands before the spawner can clear the wave.
    let weak = bus.downgrade();
    subscriptions.push(bus.subscribe_owned(
        EventKind::UnitBreached,
        &components.session,
        move |session, event| {
            let Event::UnitBreached { damage, .. } = event else {
                return;
            };
            let mut out = Vec::new();
            lock_unpoisoned(session).record_breach(*damage, &mut out);
            weak.publish_all(out);
        },
    ));

    for kind in [EventKind::UnitKilled, EventKind::UnitBreached] {
        let weak = bus.downgrade();
        subscriptions.push(bus.subscribe_owned(
            kind,
            &components.spawner,
            move |spawner, event| {
                let unit = match event {
                    Event::UnitKilled { unit, .. } | Event::UnitBreached { unit, .. } => *unit,
                    _ => return,
                };
                let mut out = Vec::new();
                lock_unpoisoned(spawner).unit_removed(unit, &mut out);
                weak.publish_all(out);
            },
        ));
    }

    subscriptions.push(bus.subscribe_owned(
        EventKind::WaveCleared,
        &components.switch,
        |switch, _| {
            debug!("wave cleared, stopping combat cycles");
            switch.cancel();
        },
    ));

    let weak = bus.downgrade();
    subscriptions.push(bus.subscribe_owned(
        EventKind::WaveCleared,
        &components.session,
        move |session, event| {
            let Event::WaveCleared { wave } = event else {
                return;
            };
            let mut out = Vec::new();
            lock_unpoisoned(session).record_wave_cleared(*wave, &mut out);
            weak.publish_all(out);
        },
    ));

    subscriptions.push(bus.subscribe_owned(
        EventKind::SessionOver,
        &components.switch,
        |switch, _| switch.cancel(),
    ));

    subscriptions.push(bus.subscribe_owned(
        EventKind::SessionOver,
        &components.spawner,
        |spawner, _| lock_unpoisoned(spawner).abort(),
    ));

    subscriptions
}
