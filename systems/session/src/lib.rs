#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Session state machine owning player health and wave progression.
//!
//! The session consumes breach and wave-cleared notifications, decides
//! between winning, losing and waiting for the next wave, and gates every
//! wave start. Once terminal it ignores all further input.

use thiserror::Error;
use tracing::{debug, info};
use wave_defence_core::{Event, SessionConfig, WaveIndex, WavePlan};

/// Lifecycle phase of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    /// Waiting for the next wave to be started.
    Idle,
    /// A wave is spawning or draining.
    WaveInProgress,
    /// Every configured wave was cleared.
    Won,
    /// Health reached zero.
    Lost,
}

impl SessionPhase {
    /// Reports whether the phase accepts no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Won | Self::Lost)
    }
}

/// Failures reported synchronously by the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The operation is not legal in the current phase.
    #[error("operation not permitted while the session is {phase:?}")]
    InvalidState {
        /// Phase the session was in.
        phase: SessionPhase,
    },
}

/// Player-facing state of one session.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    phase: SessionPhase,
    health: u32,
    wave: WaveIndex,
}

impl Session {
    /// Creates a session at full health, before the first wave.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        let health = config.health_on_start;
        Self {
            config,
            phase: SessionPhase::Idle,
            health,
            wave: WaveIndex::new(0),
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Current health, within `[0, healthOnStart]`.
    #[must_use]
    pub const fn health(&self) -> u32 {
        self.health
    }

    /// Last wave that was started; `0` before the first one.
    #[must_use]
    pub const fn wave(&self) -> WaveIndex {
        self.wave
    }

    /// Number of waves needed to win.
    #[must_use]
    pub const fn waves_total(&self) -> u32 {
        self.config.waves_total
    }

    /// Reports whether the session reached `Won` or `Lost`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Advances to the next wave and returns its spawn plan.
    pub fn begin_wave(&mut self) -> Result<WavePlan, SessionError> {
        if self.phase != SessionPhase::Idle {
            return Err(SessionError::InvalidState { phase: self.phase });
        }

        self.wave = self.wave.next();
        self.phase = SessionPhase::WaveInProgress;
        info!(
            wave = self.wave.get(),
            total = self.config.waves_total,
            "wave begins"
        );
        Ok(self.config.wave_plan(self.wave))
    }

    /// Applies the contact damage of a breaching unit.
    ///
    /// Appends [`Event::HealthChanged`] and, when health runs out,
    /// [`Event::SessionOver`] to `out`. Ignored once terminal.
    pub fn record_breach(&mut self, damage: u32, out: &mut Vec<Event>) {
        if self.is_terminal() {
            debug!(damage, "breach ignored after session end");
            return;
        }

        self.health = self
            .health
            .saturating_sub(damage)
            .min(self.config.health_on_start);
        debug!(damage, health = self.health, "breach recorded");
        out.push(Event::HealthChanged {
            health: self.health,
        });

        if self.health == 0 {
            self.phase = SessionPhase::Lost;
            info!(wave = self.wave.get(), "session lost");
            out.push(Event::SessionOver { won: false });
        }
    }

    /// Handles a cleared wave.
    ///
    /// Clearing the final wave wins the session and appends
    /// [`Event::SessionOver`]; any other wave returns to `Idle`.
    pub fn record_wave_cleared(&mut self, wave: WaveIndex, out: &mut Vec<Event>) {
        if self.phase != SessionPhase::WaveInProgress {
            debug!(wave = wave.get(), phase = ?self.phase, "wave cleared notification ignored");
            return;
        }

        if wave.get() >= self.config.waves_total {
            self.phase = SessionPhase::Won;
            info!(wave = wave.get(), "session won");
            out.push(Event::SessionOver { won: true });
        } else {
            self.phase = SessionPhase::Idle;
            info!(wave = wave.get(), "wave cleared, awaiting next wave");
        }
    }
}
