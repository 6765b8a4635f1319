//! # Session Module
//!
//! One recording from "start" to "stop".
//!
//! This module handles:
//! - Sampling every channel once per tick ([`SampleBuffer`])
//! - Tracking the phase of flight ([`phase::PhaseDetector`])
//! - Capturing takeoff and landing snapshots ([`EventSnapshot`])
//! - Deciding when a flight is over ([`AutoEndRule`])
//!
//! A [`Session`] owns all of this state. Resetting means building a new
//! session; nothing is cleared field by field.

pub mod auto_end;
pub mod buffer;
pub mod phase;
pub mod snapshot;

pub use auto_end::AutoEndRule;
pub use buffer::SampleBuffer;
pub use phase::{FlightPhase, PhaseEvent, PhaseRules};
pub use snapshot::{EventSnapshot, SnapshotWindow, Summary};

use std::collections::BTreeMap;

use tokio::time::Instant;
use tracing::info;

use crate::error::Result;
use crate::telemetry::{Channel, Reading, TelemetryAdapter, TelemetrySource};
use phase::{PhaseDetector, DEFAULT_HISTORY_CAPACITY};

/// Per-session settings of the detection pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub phase: PhaseRules,
    pub history_capacity: usize,
    /// Simulator variable that is non-zero while on the ground.
    pub ground_channel: String,
    pub ground_speed_channel: String,
    pub vertical_speed_channel: String,
    pub auto_end: AutoEndRule,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            phase: PhaseRules::default(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            ground_channel: "SIM_ON_GROUND".to_string(),
            ground_speed_channel: "GROUND_VELOCITY".to_string(),
            vertical_speed_channel: "VERTICAL_SPEED".to_string(),
            auto_end: AutoEndRule::default(),
        }
    }
}

/// State of one recording.
#[derive(Debug)]
pub struct Session {
    buffer: SampleBuffer,
    detector: PhaseDetector,
    takeoff: Option<EventSnapshot>,
    landing: Option<EventSnapshot>,
    started: Instant,
    settings: SessionSettings,
}

impl Session {
    /// Start a session now.
    ///
    /// The ground channel is always recorded; it is appended to `channels`
    /// if not already registered.
    ///
    /// # Errors
    ///
    /// Fails on duplicate or reserved channel keys.
    pub fn new(mut channels: Vec<Channel>, settings: SessionSettings) -> Result<Self> {
        if !channels.iter().any(|c| c.key == settings.ground_channel) {
            channels.push(Channel::new(settings.ground_channel.as_str(), "On ground", "bool"));
        }

        Ok(Self {
            buffer: SampleBuffer::new(channels)?,
            detector: PhaseDetector::new(settings.phase, settings.history_capacity),
            takeoff: None,
            landing: None,
            started: Instant::now(),
            settings,
        })
    }

    /// Sample every channel once and advance the flight phase.
    ///
    /// Returns the events fired this tick (at most one).
    ///
    /// # Errors
    ///
    /// Only [`RecorderError::BufferInvariant`](crate::error::RecorderError::BufferInvariant).
    pub async fn tick<S: TelemetrySource>(
        &mut self,
        adapter: &mut TelemetryAdapter<S>,
    ) -> Result<Vec<PhaseEvent>> {
        adapter.begin_tick();

        let elapsed = adapter
            .recorded_elapsed()
            .unwrap_or_else(|| self.started.elapsed().as_secs_f64());
        let on_ground = adapter
            .read(&self.settings.ground_channel)
            .await
            .map(|value| value != 0.0);

        self.buffer.append_tick(adapter, elapsed).await?;

        let ground_speed = self.latest(&self.settings.ground_speed_channel);
        let mut events = Vec::new();

        match self.detector.update(on_ground, ground_speed) {
            Some(PhaseEvent::Takeoff) => {
                info!("Takeoff detected at {:.1}s", elapsed);
                self.takeoff = Some(EventSnapshot::takeoff(&self.buffer));
                events.push(PhaseEvent::Takeoff);
            }
            Some(PhaseEvent::Landing) => {
                info!("Landing detected at {:.1}s", elapsed);
                self.landing = Some(EventSnapshot::landing(&self.buffer));
                events.push(PhaseEvent::Landing);
            }
            None => {}
        }

        Ok(events)
    }

    /// Latest reading of a channel, `None` if unknown, empty or missing.
    fn latest(&self, key: &str) -> Reading {
        self.buffer.latest(key).ok().flatten()
    }

    /// Latest reading of every channel.
    #[must_use]
    pub fn latest_snapshot(&self) -> BTreeMap<String, Reading> {
        self.buffer
            .channels()
            .iter()
            .map(|channel| (channel.key.clone(), self.latest(&channel.key)))
            .collect()
    }

    /// Whether the flight looks finished.
    #[must_use]
    pub fn auto_end_due(&self) -> bool {
        self.settings.auto_end.is_due(
            self.detector.history(),
            self.latest(&self.settings.vertical_speed_channel),
            self.latest(&self.settings.ground_speed_channel),
            self.buffer.elapsed().last().copied().unwrap_or(0.0),
            self.takeoff.is_some(),
        )
    }

    #[must_use]
    pub fn phase(&self) -> FlightPhase {
        self.detector.phase()
    }

    #[must_use]
    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    #[must_use]
    pub fn takeoff(&self) -> Option<&EventSnapshot> {
        self.takeoff.as_ref()
    }

    #[must_use]
    pub fn landing(&self) -> Option<&EventSnapshot> {
        self.landing.as_ref()
    }

    /// Give up the recorded data.
    #[must_use]
    pub fn into_parts(self) -> (SampleBuffer, FlightPhase, Option<EventSnapshot>, Option<EventSnapshot>) {
        let phase = self.detector.phase();
        (self.buffer, phase, self.takeoff, self.landing)
    }
}
