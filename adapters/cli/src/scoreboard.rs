//! Bus subscriber tallying the session for the final summary.

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use tracing::info;
use wave_defence_core::{Event, EventKind};
use wave_defence_event_bus::{EventBus, Subscription};

/// Running totals observed on the bus.
#[derive(Debug, Default)]
pub(crate) struct Scoreboard {
    spawned: AtomicU32,
    kills: AtomicU32,
    breaches: AtomicU32,
    waves_cleared: AtomicU32,
}

impl Scoreboard {
    /// Subscribes the scoreboard to every event it reports on.
    pub(crate) fn attach(self: &Arc<Self>, bus: &EventBus) -> Vec<Subscription> {
        [
            EventKind::UnitSpawned,
            EventKind::UnitKilled,
            EventKind::UnitBreached,
            EventKind::WaveStarted,
            EventKind::WaveCleared,
            EventKind::SessionOver,
        ]
        .into_iter()
        .map(|kind| bus.subscribe_owned(kind, self, Self::record))
        .collect()
    }

    fn record(&self, event: &Event) {
        match event {
            Event::UnitSpawned { .. } => bump(&self.spawned),
            Event::UnitKilled { .. } => bump(&self.kills),
            Event::UnitBreached { unit, damage } => {
                bump(&self.breaches);
                info!(unit = unit.get(), damage, "unit breached");
            }
            Event::WaveStarted { wave } => info!(wave = wave.get(), "wave started"),
            Event::WaveCleared { wave } => {
                bump(&self.waves_cleared);
                info!(wave = wave.get(), "wave cleared");
            }
            Event::SessionOver { won } => info!(won, "session over"),
            _ => {}
        }
    }

    /// Units spawned so far.
    pub(crate) fn spawned(&self) -> u32 {
        self.spawned.load(Ordering::Relaxed)
    }

    /// Units killed so far.
    pub(crate) fn kills(&self) -> u32 {
        self.kills.load(Ordering::Relaxed)
    }

    /// Units that reached the goal so far.
    pub(crate) fn breaches(&self) -> u32 {
        self.breaches.load(Ordering::Relaxed)
    }

    /// Waves cleared so far.
    pub(crate) fn waves_cleared(&self) -> u32 {
        self.waves_cleared.load(Ordering::Relaxed)
    }
}

fn bump(counter: &AtomicU32) {
    let _ = counter.fetch_add(1, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use wave_defence_core::{MonsterId, WaveIndex};

    #[test]
    fn tallies_published_events() {
        let bus = EventBus::new();
        let scoreboard = Arc::new(Scoreboard::default());
        let _subscriptions = scoreboard.attach(&bus);

        bus.publish(Event::WaveStarted {
            wave: WaveIndex::new(1),
        });
        bus.publish(Event::UnitKilled {
            unit: MonsterId::new(0),
            reward: 5,
        });
        bus.publish(Event::UnitBreached {
            unit: MonsterId::new(1),
            damage: 10,
        });
        bus.publish(Event::WaveCleared {
            wave: WaveIndex::new(1),
        });

        assert_eq!(scoreboard.kills(), 1);
        assert_eq!(scoreboard.breaches(), 1);
        assert_eq!(scoreboard.waves_cleared(), 1);
        assert_eq!(scoreboard.spawned(), 0);
    }
}
