#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Wave spawner producing monsters on a timed cadence until the wave quota
//! is reached, then tracking the survivors until the wave clears.
//!
//! The spawner is a pure system: it never touches the registry or the bus
//! directly. Instantiation is delegated to a caller-provided closure and
//! every resulting notification is appended to an output buffer that the
//! caller publishes once its own locks are released.

use std::{sync::Arc, time::Duration};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tracing::{debug, info, warn};
use wave_defence_core::{
    Catalog, ConfigurationError, Event, InstantiationError, MonsterId, MonsterKindId, MonsterSpec,
    SessionConfig, Vec2, WaveIndex, WavePlan,
};

/// Configuration parameters required to construct the spawner.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    entry: Vec2,
    bias_exponent: f32,
    rng_seed: u64,
}

impl Config {
    /// Creates a configuration spawning at `entry`.
    ///
    /// Kind selection raises a uniform draw to `bias_exponent` before
    /// scaling it by the number of candidates.
    #[must_use]
    pub const fn new(entry: Vec2, bias_exponent: f32, rng_seed: u64) -> Self {
        Self {
            entry,
            bias_exponent,
            rng_seed,
        }
    }
}

impl From<&SessionConfig> for Config {
    fn from(session: &SessionConfig) -> Self {
        Self::new(session.entry, session.spawn_bias_exponent, session.rng_seed)
    }
}

/// Lifecycle phase of the current wave.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WavePhase {
    /// No wave has started yet.
    Idle,
    /// The spawn timer is running.
    Spawning,
    /// The quota was reached; waiting for the survivors to die or breach.
    Draining,
    /// Every unit spawned and none is left alive.
    Cleared,
    /// The session ended; the spawner accepts no further transitions.
    Aborted,
}

/// Counters describing the current wave.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaveState {
    /// Wave the counters belong to.
    pub wave: WaveIndex,
    /// Units the wave spawns in total.
    pub quota: u32,
    /// Units spawned so far; never decreases within a wave.
    pub spawned: u32,
    /// Spawned units that have not died or breached yet.
    pub alive: u32,
}

/// Failures reported synchronously by the spawner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum SpawnerError {
    /// A wave was requested while another one is still running.
    #[error("cannot start a wave while the spawner is {phase:?}")]
    InvalidState {
        /// Phase the spawner was in when the request arrived.
        phase: WavePhase,
    },
}

/// Timed, weighted spawner of monster waves.
#[derive(Debug)]
pub struct WaveSpawner {
    entry: Vec2,
    bias_exponent: f32,
    rng: ChaCha8Rng,
    candidates: Vec<Candidate>,
    phase: WavePhase,
    state: WaveState,
    interval: Duration,
    accumulator: Duration,
}

impl WaveSpawner {
    /// Creates a spawner drawing from the spawnable kinds of `catalog`.
    ///
    /// Candidates are ordered by descending spawn chance so the biased draw
    /// favours the most common kinds.
    pub fn new(config: Config, catalog: &Catalog) -> Result<Self, ConfigurationError> {
        let mut candidates: Vec<Candidate> = catalog
            .monsters()
            .filter(|(_, spec)| spec.spawn_chance > 0.0)
            .map(|(kind, spec)| Candidate {
                kind,
                spec: Arc::clone(spec),
            })
            .collect();
        if candidates.is_empty() {
            return Err(ConfigurationError::NoSpawnableMonsters);
        }
        candidates.sort_by(|left, right| {
            right
                .spec
                .spawn_chance
                .total_cmp(&left.spec.spawn_chance)
                .then(left.kind.cmp(&right.kind))
        });

        Ok(Self {
            entry: config.entry,
            bias_exponent: config.bias_exponent,
            rng: ChaCha8Rng::seed_from_u64(config.rng_seed),
            candidates,
            phase: WavePhase::Idle,
            state: WaveState {
                wave: WaveIndex::new(0),
                quota: 0,
                spawned: 0,
                alive: 0,
            },
            interval: Duration::ZERO,
            accumulator: Duration::ZERO,
        })
    }

    /// Current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> WavePhase {
        self.phase
    }

    /// Counters of the current (or last) wave.
    #[must_use]
    pub const fn wave_state(&self) -> WaveState {
        self.state
    }

    /// Reports whether a new wave may start.
    #[must_use]
    pub const fn accepts_wave(&self) -> bool {
        matches!(self.phase, WavePhase::Idle | WavePhase::Cleared)
    }

    /// Starts spawning the wave described by `plan`.
    ///
    /// Appends [`Event::WaveStarted`] to `out`.
    pub fn start_wave(&mut self, plan: WavePlan, out: &mut Vec<Event>) -> Result<(), SpawnerError> {
        if !self.accepts_wave() {
            return Err(SpawnerError::InvalidState { phase: self.phase });
        }

        self.state = WaveState {
            wave: plan.wave,
            quota: plan.quota.get(),
            spawned: 0,
            alive: 0,
        };
        self.interval = plan.interval;
        self.accumulator = Duration::ZERO;
        self.phase = WavePhase::Spawning;

        info!(
            wave = plan.wave.get(),
            quota = plan.quota.get(),
            interval_ms = plan.interval.as_millis() as u64,
            "wave started"
        );
        out.push(Event::WaveStarted { wave: plan.wave });
        Ok(())
    }

    /// Advances the spawn timer by `dt`.
    ///
    /// Every elapsed interval attempts one spawn through `instantiate`. A
    /// failed attempt is logged and skipped; the next interval retries.
    /// Successful spawns append [`Event::UnitSpawned`] to `out`.
    pub fn tick<F>(&mut self, dt: Duration, mut instantiate: F, out: &mut Vec<Event>)
    where
        F: FnMut(MonsterKindId, &Arc<MonsterSpec>, Vec2) -> Result<MonsterId, InstantiationError>,
    {
        if self.phase != WavePhase::Spawning {
            return;
        }

        self.accumulator = self.accumulator.saturating_add(dt);
        let attempts = self.resolve_spawn_attempts();

        for _ in 0..attempts {
            if self.state.spawned >= self.state.quota {
                break;
            }

            let candidate = self.select_candidate();
            match instantiate(candidate.kind, &candidate.spec, self.entry) {
                Ok(unit) => {
                    self.state.spawned += 1;
                    self.state.alive += 1;
                    debug!(
                        unit = unit.get(),
                        kind = candidate.kind.get(),
                        spawned = self.state.spawned,
                        "unit spawned"
                    );
                    out.push(Event::UnitSpawned {
                        unit,
                        kind: candidate.kind,
                    });
                }
                Err(error) => {
                    warn!(
                        kind = candidate.kind.get(),
                        %error,
                        "spawn skipped after instantiation failure"
                    );
                }
            }
        }

        if self.state.spawned >= self.state.quota {
            self.accumulator = Duration::ZERO;
            self.phase = WavePhase::Draining;
            debug!(wave = self.state.wave.get(), "quota reached, draining");
            self.check_cleared(out);
        }
    }

    /// Records that a spawned unit died or breached.
    ///
    /// Appends [`Event::WaveCleared`] to `out` when this was the last
    /// survivor of a draining wave.
    pub fn unit_removed(&mut self, unit: MonsterId, out: &mut Vec<Event>) {
        if matches!(self.phase, WavePhase::Aborted | WavePhase::Idle) {
            return;
        }

        self.state.alive = self.state.alive.saturating_sub(1);
        debug!(unit = unit.get(), alive = self.state.alive, "unit left the wave");
        self.check_cleared(out);
    }

    /// Stops the timer for good; later ticks and removals are ignored.
    pub fn abort(&mut self) {
        if self.phase == WavePhase::Aborted {
            return;
        }
        info!(wave = self.state.wave.get(), "spawner aborted");
        self.phase = WavePhase::Aborted;
        self.accumulator = Duration::ZERO;
    }

    fn check_cleared(&mut self, out: &mut Vec<Event>) {
        if self.phase != WavePhase::Draining || self.state.alive > 0 {
            return;
        }

        self.phase = WavePhase::Cleared;
        info!(wave = self.state.wave.get(), "wave cleared");
        out.push(Event::WaveCleared {
            wave: self.state.wave,
        });
    }

    /// Converts elapsed time into spawn attempts, at most one per missing
    /// unit of the quota. Whole intervals beyond that cap are dropped; the
    /// partial interval carries over.
    fn resolve_spawn_attempts(&mut self) -> u32 {
        let interval = self.interval.as_nanos();
        if interval == 0 {
            return 0;
        }

        let accumulated = self.accumulator.as_nanos();
        let elapsed = accumulated / interval;
        let remaining = self.state.quota.saturating_sub(self.state.spawned);
        let attempts = u32::try_from(elapsed.min(u128::from(remaining))).unwrap_or(remaining);

        let leftover = if elapsed > u128::from(attempts) {
            accumulated % interval
        } else {
            accumulated - interval * u128::from(attempts)
        };
        self.accumulator = Duration::from_nanos(u64::try_from(leftover).unwrap_or(u64::MAX));
        attempts
    }

    fn select_candidate(&mut self) -> Candidate {
        let index = biased_index(
            self.rng.gen::<f32>(),
            self.bias_exponent,
            self.candidates.len(),
        );
        self.candidates[index].clone()
    }
}

#[derive(Clone, Debug)]
struct Candidate {
    kind: MonsterKindId,
    spec: Arc<MonsterSpec>,
}

/// Maps a uniform draw in `[0, 1)` to a candidate index skewed toward zero.
fn biased_index(draw: f32, exponent: f32, len: usize) -> usize {
    let scaled = draw.clamp(0.0, 1.0).powf(exponent) * len as f32;
    (scaled.floor() as usize).min(len.saturating_sub(1))
}
