//! Breaker state machine, free of locking and clocks.
//!
//! # State Transitions
//! ```text
//! Closed   → Open:     window holds >= minimum_calls and failure ratio > threshold
//! Open     → HalfOpen: first admission at or after the cool-down deadline
//! HalfOpen → Closed:   probe succeeds (window cleared, cool-down reset)
//! HalfOpen → Open:     probe fails (cool-down grows, capped)
//! ```
//!
//! Every method takes `now` explicitly so the machine can be driven by tests
//! without a runtime. `CircuitBreaker` owns one of these behind a mutex.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::resilience::backoff::cooldown_for;
use crate::resilience::window::OutcomeWindow;

/// Externally visible breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }

    /// Numeric encoding used for the state gauge.
    pub fn as_gauge(&self) -> f64 {
        match self {
            BreakerState::Closed => 0.0,
            BreakerState::Open => 1.0,
            BreakerState::HalfOpen => 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Closed,
    Open { until: Instant },
    HalfOpen { probe_in_flight: bool },
}

impl Phase {
    fn state(&self) -> BreakerState {
        match self {
            Phase::Closed => BreakerState::Closed,
            Phase::Open { .. } => BreakerState::Open,
            Phase::HalfOpen { .. } => BreakerState::HalfOpen,
        }
    }
}

/// Whether the outcome of a call counts as a failure for the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Result of asking the machine for permission to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Normal call in Closed state, tagged with the window generation.
    Pass { generation: u64 },
    /// The single HalfOpen probe.
    Probe,
    Reject,
}

/// A state change, reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: BreakerState,
    pub to: BreakerState,
}

/// Tunables, resolved from configuration into durations.
#[derive(Debug, Clone, Copy)]
pub struct BreakerSettings {
    pub window_size: usize,
    pub minimum_calls: usize,
    pub failure_ratio_threshold: f64,
    pub cooldown: Duration,
    pub cooldown_multiplier: f64,
    pub max_cooldown: Duration,
}

impl From<&CircuitBreakerConfig> for BreakerSettings {
    fn from(config: &CircuitBreakerConfig) -> Self {
        Self {
            window_size: config.window_size,
            minimum_calls: config.minimum_calls.clamp(1, config.window_size.max(1)),
            failure_ratio_threshold: config.failure_ratio_threshold,
            cooldown: Duration::from_millis(config.cooldown_ms),
            cooldown_multiplier: config.cooldown_multiplier,
            max_cooldown: Duration::from_millis(config.max_cooldown_ms),
        }
    }
}

/// The breaker's full mutable state.
#[derive(Debug, Clone)]
pub struct BreakerCore {
    settings: BreakerSettings,
    phase: Phase,
    window: OutcomeWindow,
    /// Bumped whenever the window is reset, so late outcomes from an older
    /// Closed period are ignored.
    generation: u64,
    /// Consecutive failed probes since the breaker last closed.
    reopens: u32,
}

impl BreakerCore {
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            window: OutcomeWindow::new(settings.window_size),
            settings,
            phase: Phase::Closed,
            generation: 0,
            reopens: 0,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.phase.state()
    }

    pub fn window(&self) -> &OutcomeWindow {
        &self.window
    }

    /// Cool-down that will apply to the next opening.
    pub fn current_cooldown(&self) -> Duration {
        self.cooldown_after(self.reopens)
    }

    /// Time left until a probe is allowed, if Open.
    pub fn remaining_cooldown(&self, now: Instant) -> Option<Duration> {
        match self.phase {
            Phase::Open { until } => Some(until.saturating_duration_since(now)),
            _ => None,
        }
    }

    fn cooldown_after(&self, reopens: u32) -> Duration {
        cooldown_for(
            reopens,
            self.settings.cooldown,
            self.settings.cooldown_multiplier,
            self.settings.max_cooldown,
        )
    }

    /// Decide whether a call may proceed.
    pub fn admit(&mut self, now: Instant) -> (Admission, Option<Transition>) {
        match self.phase {
            Phase::Closed => (
                Admission::Pass {
                    generation: self.generation,
                },
                None,
            ),
            Phase::Open { until } if now >= until => {
                let transition = self.move_to(Phase::HalfOpen {
                    probe_in_flight: true,
                });
                (Admission::Probe, transition)
            }
            Phase::Open { .. } => (Admission::Reject, None),
            Phase::HalfOpen {
                probe_in_flight: false,
            } => {
                self.phase = Phase::HalfOpen {
                    probe_in_flight: true,
                };
                (Admission::Probe, None)
            }
            Phase::HalfOpen {
                probe_in_flight: true,
            } => (Admission::Reject, None),
        }
    }

    /// Apply the outcome of a call admitted with `admission`.
    pub fn record(
        &mut self,
        admission: Admission,
        outcome: Outcome,
        now: Instant,
    ) -> Option<Transition> {
        match (admission, self.phase) {
            (Admission::Pass { generation }, Phase::Closed) if generation == self.generation => {
                self.window.push(outcome == Outcome::Failure);
                if self.should_trip() {
                    self.reopens = 0;
                    let until = now + self.cooldown_after(0);
                    return self.move_to(Phase::Open { until });
                }
                None
            }
            (Admission::Probe, Phase::HalfOpen { probe_in_flight: true }) => match outcome {
                Outcome::Success => {
                    self.reopens = 0;
                    self.reset_window();
                    self.move_to(Phase::Closed)
                }
                Outcome::Failure => {
                    self.reopens = self.reopens.saturating_add(1);
                    let until = now + self.cooldown_after(self.reopens);
                    self.move_to(Phase::Open { until })
                }
            },
            // Outcomes from calls admitted under an earlier phase are stale.
            _ => None,
        }
    }

    /// Release the probe slot of a probe that never reported.
    pub fn abandon_probe(&mut self) {
        if let Phase::HalfOpen { probe_in_flight: true } = self.phase {
            self.phase = Phase::HalfOpen {
                probe_in_flight: false,
            };
        }
    }

    /// Force back to Closed with an empty window.
    pub fn reset(&mut self) -> Option<Transition> {
        self.reopens = 0;
        self.reset_window();
        self.move_to(Phase::Closed)
    }

    fn should_trip(&self) -> bool {
        self.window.len() >= self.settings.minimum_calls
            && self.window.failure_ratio() > self.settings.failure_ratio_threshold
    }

    fn reset_window(&mut self) {
        self.window.clear();
        self.generation = self.generation.wrapping_add(1);
    }

    fn move_to(&mut self, next: Phase) -> Option<Transition> {
        let from = self.phase.state();
        self.phase = next;
        let to = next.state();
        (from != to).then_some(Transition { from, to })
    }
}
