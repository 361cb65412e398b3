#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Targeting and combat resolution for placed defenders.
//!
//! Every defender runs its own [`CombatCycle`]: acquire the nearest live
//! monster in range, launch a projectile toward it, poll the projectile for
//! contact once per tick and resolve the hit through the registry. Cycles
//! are independent tasks holding a [`CancellationToken`]; the token is
//! checked at the top of every iteration so a cleared wave or a finished
//! session stops all cycles within one tick.

mod projectile;

use std::{
    ops::AddAssign,
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use tracing::{debug, info, trace, warn};
use wave_defence_core::{lock_unpoisoned, CancellationToken, DefenderId, Event, MonsterId, Scene};
use wave_defence_event_bus::EventBus;
use wave_defence_world::{DefenderSnapshot, HitOutcome, UnitRegistry};

pub use projectile::Projectile;

/// Shared collaborators a combat cycle needs while advancing.
#[derive(Clone, Copy)]
pub struct CombatContext<'a> {
    /// Serialization point for monster health.
    pub registry: &'a UnitRegistry,
    /// Bus receiving kill events.
    pub bus: &'a EventBus,
    /// Scene collaborator materializing projectiles.
    pub scene: &'a dyn Scene,
}

/// Counters aggregated over one resolver step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepReport {
    /// Projectiles launched.
    pub shots: usize,
    /// Shots skipped because the projectile could not be instantiated.
    pub skipped_shots: usize,
    /// Projectiles that touched a live monster and damaged it.
    pub hits: usize,
    /// Hits that killed their monster.
    pub kills: usize,
}

impl AddAssign for StepReport {
    fn add_assign(&mut self, other: Self) {
        self.shots += other.shots;
        self.skipped_shots += other.skipped_shots;
        self.hits += other.hits;
        self.kills += other.kills;
    }
}

/// Cancellation handle shared with event handlers.
///
/// Handlers reacting to `WaveCleared` or `SessionOver` cancel the current
/// token without touching the resolver itself.
#[derive(Debug, Default)]
pub struct CombatSwitch {
    current: Mutex<CancellationToken>,
}

impl CombatSwitch {
    /// Cancels every cycle armed with the current token.
    pub fn cancel(&self) {
        lock_unpoisoned(&self.current).cancel();
    }

    /// Reports whether the current token is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        lock_unpoisoned(&self.current).is_cancelled()
    }

    fn rearm(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *lock_unpoisoned(&self.current) = token.clone();
        token
    }
}

/// Owner of every defender's combat cycle.
#[derive(Debug)]
pub struct CombatResolver {
    switch: Arc<CombatSwitch>,
    token: CancellationToken,
    cycles: Vec<CombatCycle>,
    workers: usize,
}

impl CombatResolver {
    /// Creates a disarmed resolver advancing cycles on `workers` threads.
    #[must_use]
    pub fn new(workers: usize) -> Self {
        let switch = Arc::new(CombatSwitch::default());
        switch.cancel();
        let token = CancellationToken::new();
        token.cancel();
        Self {
            switch,
            token,
            cycles: Vec::new(),
            workers: workers.max(1),
        }
    }

    /// Shared handle cancelling the armed cycles.
    #[must_use]
    pub fn switch(&self) -> Arc<CombatSwitch> {
        Arc::clone(&self.switch)
    }

    /// Starts one cycle per defender under a fresh cancellation token.
    pub fn arm(&mut self, defenders: Vec<DefenderSnapshot>) {
        self.token = self.switch.rearm();
        self.cycles = defenders
            .into_iter()
            .map(|defender| CombatCycle::new(defender, self.token.clone()))
            .collect();
        info!(cycles = self.cycles.len(), "combat cycles armed");
    }

    /// Starts a cycle for a defender placed while combat is armed.
    ///
    /// Returns `false` when no wave is active; the defender then joins the
    /// next [`arm`](Self::arm).
    pub fn attach(&mut self, defender: DefenderSnapshot) -> bool {
        if !self.is_armed() {
            return false;
        }
        debug!(defender = defender.id.get(), "combat cycle attached");
        self.cycles
            .push(CombatCycle::new(defender, self.token.clone()));
        true
    }

    /// Reports whether cycles are running.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Cancels every cycle.
    pub fn disarm(&mut self) {
        self.switch.cancel();
        self.cycles.clear();
    }

    /// Iterates over the running cycles in arming order.
    ///
    /// Cycles whose token was cancelled are no longer running, even before
    /// the next step discards them.
    pub fn cycles(&self) -> impl Iterator<Item = &CombatCycle> {
        self.cycles
            .iter()
            .filter(|cycle| !cycle.token.is_cancelled())
    }

    /// Advances every cycle by `dt`.
    ///
    /// With more than one worker the cycles are split across scoped
    /// threads; they all resolve hits through the same registry.
    pub fn step(&mut self, dt: Duration, ctx: CombatContext<'_>) -> StepReport {
        if self.token.is_cancelled() {
            if !self.cycles.is_empty() {
                debug!(cycles = self.cycles.len(), "combat cycles cancelled");
                self.cycles.clear();
            }
            return StepReport::default();
        }

        if self.workers == 1 || self.cycles.len() < 2 {
            let mut report = StepReport::default();
            for cycle in &mut self.cycles {
                report += cycle.advance(dt, ctx);
            }
            return report;
        }

        let chunk = self.cycles.len().div_ceil(self.workers);
        thread::scope(|scope| {
            let handles: Vec<_> = self
                .cycles
                .chunks_mut(chunk)
                .map(|cycles| {
                    scope.spawn(move || {
                        let mut report = StepReport::default();
                        for cycle in cycles {
                            report += cycle.advance(dt, ctx);
                        }
                        report
                    })
                })
                .collect();

            let mut report = StepReport::default();
            for handle in handles {
                match handle.join() {
                    Ok(partial) => report += partial,
                    Err(_) => warn!("combat worker panicked"),
                }
            }
            report
        })
    }
}

/// Repeating acquire, fire and resolve loop of one defender.
#[derive(Debug)]
pub struct CombatCycle {
    defender: DefenderSnapshot,
    token: CancellationToken,
    cooldown: Duration,
    projectile: Option<Projectile>,
}

impl CombatCycle {
    fn new(defender: DefenderSnapshot, token: CancellationToken) -> Self {
        Self {
            defender,
            token,
            cooldown: Duration::ZERO,
            projectile: None,
        }
    }

    /// Defender driving the cycle.
    #[must_use]
    pub const fn defender(&self) -> DefenderId {
        self.defender.id
    }

    /// Projectile currently in flight, if any.
    #[must_use]
    pub const fn projectile(&self) -> Option<&Projectile> {
        self.projectile.as_ref()
    }

    fn advance(&mut self, dt: Duration, ctx: CombatContext<'_>) -> StepReport {
        let mut report = StepReport::default();
        if self.token.is_cancelled() {
            self.projectile = None;
            return report;
        }

        self.track_projectile(dt, ctx, &mut report);

        self.cooldown = self.cooldown.saturating_sub(dt);
        if !self.cooldown.is_zero() {
            return report;
        }

        let spec = &self.defender.spec;
        let Some(target) = ctx
            .registry
            .nearest_within(self.defender.position, spec.attack_radius)
        else {
            // Poll again next tick.
            self.projectile = None;
            return report;
        };

        if let Err(error) = ctx
            .scene
            .instantiate_projectile(self.defender.id, self.defender.position)
        {
            warn!(defender = self.defender.id.get(), %error, "shot skipped");
            report.skipped_shots += 1;
            return report;
        }

        trace!(
            defender = self.defender.id.get(),
            target = target.id.get(),
            "projectile launched"
        );
        self.projectile = Some(Projectile::launch(
            self.defender.position,
            target.position,
            spec,
        ));
        self.cooldown = spec.fire_interval;
        report.shots += 1;
        report
    }

    fn track_projectile(&mut self, dt: Duration, ctx: CombatContext<'_>, report: &mut StepReport) {
        let Some(projectile) = self.projectile.as_mut() else {
            return;
        };

        projectile.advance(dt);
        let contact = ctx
            .registry
            .nearest_within(projectile.position(), projectile.contact_radius());

        match contact {
            Some(unit) => {
                let damage = projectile.damage();
                self.projectile = None;
                self.resolve_hit(unit.id, damage, ctx, report);
            }
            None if projectile.is_expired() => self.projectile = None,
            None => {}
        }
    }

    fn resolve_hit(
        &self,
        unit: MonsterId,
        damage: u32,
        ctx: CombatContext<'_>,
        report: &mut StepReport,
    ) {
        match ctx.registry.apply_hit(unit, damage) {
            HitOutcome::Damaged { remaining } => {
                report.hits += 1;
                trace!(unit = unit.get(), remaining, "unit damaged");
            }
            HitOutcome::Killed { reward } => {
                report.hits += 1;
                report.kills += 1;
                debug!(
                    defender = self.defender.id.get(),
                    unit = unit.get(),
                    reward,
                    "unit killed"
                );
                ctx.bus.publish(Event::UnitKilled { unit, reward });
            }
            HitOutcome::Missed => {
                trace!(unit = unit.get(), "hit landed on a unit that was already gone");
            }
        }
    }
}
