//! # Flight Phase Detection
//!
//! Infers the phase of flight from the simulator's on-ground flag.
//!
//! ## Phases
//!
//! ```text
//! Starting ──(moving on ground)──▶ TaxiingOut
//!    │                                 │
//!    └──────(N× airborne)──────────────┴──▶ Flying ──(N× on ground)──▶ Rollout
//! ```
//!
//! `N` is the debounce width: a transition needs the last `N` airborne
//! observations to agree, which filters gear bounce and single noisy
//! samples at the ground/air boundary. `Rollout` is terminal, so takeoff
//! and landing each fire at most once per session.
//!
//! [`transition`] is a pure function of the current phase and the recent
//! observations; [`PhaseDetector`] owns the state around it.

use std::collections::VecDeque;

use serde::Serialize;
use tracing::debug;

use crate::telemetry::Reading;

/// Default number of agreeing observations required for a transition.
pub const DEFAULT_DEBOUNCE_TICKS: usize = 3;

/// Default number of airborne observations kept.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Stage of a recorded flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightPhase {
    #[default]
    Starting,
    TaxiingOut,
    Flying,
    Rollout,
}

impl std::fmt::Display for FlightPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FlightPhase::Starting => "starting",
            FlightPhase::TaxiingOut => "taxiing out",
            FlightPhase::Flying => "flying",
            FlightPhase::Rollout => "rollout",
        };
        f.write_str(name)
    }
}

/// Discrete event fired on a phase transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseEvent {
    Takeoff,
    Landing,
}

impl std::fmt::Display for PhaseEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhaseEvent::Takeoff => f.write_str("takeoff"),
            PhaseEvent::Landing => f.write_str("landing"),
        }
    }
}

/// Bounded history of airborne observations, oldest dropped first.
#[derive(Debug, Clone)]
pub struct AirborneHistory {
    entries: VecDeque<bool>,
    capacity: usize,
}

impl AirborneHistory {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, airborne: bool) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(airborne);
    }

    /// The last `n` observations, oldest first (fewer if not yet recorded).
    #[must_use]
    pub fn trailing(&self, n: usize) -> Vec<bool> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).copied().collect()
    }

    #[must_use]
    pub fn last(&self) -> Option<bool> {
        self.entries.back().copied()
    }

    #[must_use]
    pub fn any_airborne(&self) -> bool {
        self.entries.iter().any(|&a| a)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Thresholds the transition function works with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseRules {
    /// Agreeing observations required for takeoff or landing.
    pub debounce_ticks: usize,
    /// Ground speed (knots) at which a parked aircraft counts as taxiing.
    pub taxi_speed_knots: f64,
}

impl Default for PhaseRules {
    fn default() -> Self {
        Self {
            debounce_ticks: DEFAULT_DEBOUNCE_TICKS,
            taxi_speed_knots: 1.0,
        }
    }
}

fn settled(window: &[bool], debounce: usize, airborne: bool) -> bool {
    debounce > 0 && window.len() >= debounce && window.iter().all(|&a| a == airborne)
}

/// Compute the next phase.
///
/// `window` holds the most recent airborne observations, oldest first;
/// only the trailing `rules.debounce_ticks` entries are considered.
/// At most one event fires per call.
///
/// # Examples
///
/// ```
/// use flight_recorder::session::phase::{transition, FlightPhase, PhaseEvent, PhaseRules};
///
/// let rules = PhaseRules::default();
/// let (phase, event) = transition(FlightPhase::Starting, &[false, true, true], None, &rules);
/// assert_eq!((phase, event), (FlightPhase::Starting, None));
///
/// let (phase, event) = transition(FlightPhase::Starting, &[true, true, true], None, &rules);
/// assert_eq!((phase, event), (FlightPhase::Flying, Some(PhaseEvent::Takeoff)));
/// ```
#[must_use]
pub fn transition(
    phase: FlightPhase,
    window: &[bool],
    ground_speed: Reading,
    rules: &PhaseRules,
) -> (FlightPhase, Option<PhaseEvent>) {
    let tail = &window[window.len().saturating_sub(rules.debounce_ticks)..];

    match phase {
        FlightPhase::Starting | FlightPhase::TaxiingOut
            if settled(tail, rules.debounce_ticks, true) =>
        {
            (FlightPhase::Flying, Some(PhaseEvent::Takeoff))
        }
        FlightPhase::Starting
            if window.last() == Some(&false)
                && ground_speed.is_some_and(|gs| gs >= rules.taxi_speed_knots) =>
        {
            (FlightPhase::TaxiingOut, None)
        }
        FlightPhase::Flying if settled(tail, rules.debounce_ticks, false) => {
            (FlightPhase::Rollout, Some(PhaseEvent::Landing))
        }
        _ => (phase, None),
    }
}

/// Tracks the airborne flag and the flight phase across ticks.
#[derive(Debug, Clone)]
pub struct PhaseDetector {
    phase: FlightPhase,
    airborne: bool,
    history: AirborneHistory,
    rules: PhaseRules,
}

impl PhaseDetector {
    #[must_use]
    pub fn new(rules: PhaseRules, history_capacity: usize) -> Self {
        Self {
            phase: FlightPhase::Starting,
            airborne: false,
            history: AirborneHistory::new(history_capacity.max(rules.debounce_ticks)),
            rules,
        }
    }

    /// Ingest one tick's on-ground reading and advance the phase.
    ///
    /// A missing reading keeps the previous airborne flag; the retained flag
    /// is still recorded in the history.
    pub fn update(&mut self, on_ground: Option<bool>, ground_speed: Reading) -> Option<PhaseEvent> {
        match on_ground {
            Some(on_ground) => self.airborne = !on_ground,
            None => debug!("On-ground reading missing, keeping airborne = {}", self.airborne),
        }
        self.history.push(self.airborne);

        let window = self.history.trailing(self.rules.debounce_ticks);
        let (phase, event) = transition(self.phase, &window, ground_speed, &self.rules);
        if phase != self.phase {
            debug!("Flight phase {} -> {}", self.phase, phase);
        }
        self.phase = phase;
        event
    }

    #[must_use]
    pub fn phase(&self) -> FlightPhase {
        self.phase
    }

    #[must_use]
    pub fn airborne(&self) -> bool {
        self.airborne
    }

    #[must_use]
    pub fn history(&self) -> &AirborneHistory {
        &self.history
    }

    #[must_use]
    pub fn rules(&self) -> &PhaseRules {
        &self.rules
    }
}
