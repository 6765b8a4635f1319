//! # Recorder
//!
//! The interface a front end drives: start, stop, reset, tick, export.
//!
//! ```text
//!  Idle ──start──▶ Recording ──stop──▶ Stopped
//!   ▲                 │                   │
//!   └─────reset───────┴───────reset───────┘
//! ```
//!
//! Stopping cleans the recorded series; only a stopped session can be
//! exported. [`run`] is the fixed-rate loop that ticks a recorder until
//! shutdown or auto-end.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;

use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

use crate::error::{RecorderError, Result};
use crate::postflight::cleaner::CleaningReport;
use crate::postflight::export::{is_reserved_key, ExportReport};
use crate::postflight::FinalizedSession;
use crate::session::{FlightPhase, PhaseEvent, Session, SessionSettings};
use crate::telemetry::{Channel, Reading, ReplaySource, TelemetryAdapter, TelemetrySource};

/// Default sampling rate in Hz
pub const DEFAULT_TICK_RATE_HZ: u32 = 4;

/// Number of ticks between status log messages
const LOG_INTERVAL_TICKS: u64 = 240;

#[derive(Debug)]
enum State {
    Idle,
    Recording(Session),
    Stopped(FinalizedSession),
}

/// Owns the channel list, the telemetry adapter and the current session.
#[derive(Debug)]
pub struct Recorder<S> {
    channels: Vec<Channel>,
    settings: SessionSettings,
    adapter: TelemetryAdapter<S>,
    state: State,
}

impl<S: TelemetrySource> Recorder<S> {
    #[must_use]
    pub fn new(channels: Vec<Channel>, settings: SessionSettings, adapter: TelemetryAdapter<S>) -> Self {
        Self {
            channels,
            settings,
            adapter,
            state: State::Idle,
        }
    }

    /// Begin a new recording, discarding any stopped one.
    ///
    /// # Errors
    ///
    /// - [`RecorderError::InvalidState`] if already recording
    /// - channel validation errors from [`Session::new`]
    pub fn start(&mut self) -> Result<()> {
        if self.is_recording() {
            return Err(RecorderError::InvalidState("already recording".to_string()));
        }

        let session = Session::new(self.channels.clone(), self.settings.clone())?;
        self.state = State::Recording(session);
        info!("Recording started ({} channels)", self.channels.len());
        Ok(())
    }

    /// Stop recording and clean the series.
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::InvalidState`] if not recording
    pub fn stop(&mut self) -> Result<CleaningReport> {
        let session = match std::mem::replace(&mut self.state, State::Idle) {
            State::Recording(session) => session,
            other => {
                self.state = other;
                return Err(RecorderError::InvalidState("not recording".to_string()));
            }
        };

        let ticks = session.buffer().len();
        let (finalized, report) = FinalizedSession::from_session(session);
        info!(
            "Recording stopped after {} ticks ({} samples repaired, {} channels uncleaned)",
            ticks,
            report.repaired,
            report.diagnostics.len()
        );
        self.state = State::Stopped(finalized);
        Ok(report)
    }

    /// Drop any session, recording or stopped.
    pub fn reset(&mut self) {
        self.state = State::Idle;
        info!("Recorder reset");
    }

    /// Register a channel for the next recording.
    ///
    /// # Errors
    ///
    /// - [`RecorderError::ChannelSetLocked`] while recording
    /// - [`RecorderError::ReservedKey`] or [`RecorderError::DuplicateChannel`]
    pub fn add_channel(&mut self, channel: Channel) -> Result<()> {
        if self.is_recording() {
            return Err(RecorderError::ChannelSetLocked);
        }
        if is_reserved_key(&channel.key) {
            return Err(RecorderError::ReservedKey(channel.key));
        }
        if self.channels.iter().any(|c| c.key == channel.key) {
            return Err(RecorderError::DuplicateChannel(channel.key));
        }

        self.channels.push(channel);
        Ok(())
    }

    /// Unregister a channel.
    ///
    /// # Errors
    ///
    /// - [`RecorderError::ChannelSetLocked`] while recording
    /// - [`RecorderError::UnknownChannel`] if the key is not registered
    pub fn remove_channel(&mut self, key: &str) -> Result<Channel> {
        if self.is_recording() {
            return Err(RecorderError::ChannelSetLocked);
        }
        let position = self
            .channels
            .iter()
            .position(|c| c.key == key)
            .ok_or_else(|| RecorderError::UnknownChannel(key.to_string()))?;
        Ok(self.channels.remove(position))
    }

    /// Sample once and advance the flight phase.
    ///
    /// Does nothing unless recording.
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::BufferInvariant`] and aborts the recording if
    /// the buffer is corrupted.
    pub async fn tick(&mut self) -> Result<Vec<PhaseEvent>> {
        let State::Recording(session) = &mut self.state else {
            return Ok(Vec::new());
        };

        match session.tick(&mut self.adapter).await {
            Ok(events) => Ok(events),
            Err(e) => {
                error!("Recording aborted: {}", e);
                self.state = State::Idle;
                Err(e)
            }
        }
    }

    /// Latest value of every channel of the current or stopped session.
    #[must_use]
    pub fn latest_snapshot(&self) -> BTreeMap<String, Reading> {
        match &self.state {
            State::Idle => BTreeMap::new(),
            State::Recording(session) => session.latest_snapshot(),
            State::Stopped(finalized) => finalized.latest_snapshot(),
        }
    }

    #[must_use]
    pub fn phase(&self) -> FlightPhase {
        match &self.state {
            State::Idle => FlightPhase::Starting,
            State::Recording(session) => session.phase(),
            State::Stopped(finalized) => finalized.phase(),
        }
    }

    /// Write the stopped session to `path`.
    ///
    /// # Errors
    ///
    /// - [`RecorderError::InvalidState`] unless stopped
    /// - I/O and JSON errors from writing the file
    pub fn export<P: AsRef<Path>>(&self, path: P) -> Result<ExportReport> {
        match &self.state {
            State::Stopped(finalized) => finalized.export(path),
            _ => Err(RecorderError::InvalidState(
                "export requires a stopped recording".to_string(),
            )),
        }
    }

    /// Whether the current recording looks finished.
    #[must_use]
    pub fn auto_end_due(&self) -> bool {
        match &self.state {
            State::Recording(session) => session.auto_end_due(),
            _ => false,
        }
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        matches!(self.state, State::Recording(_))
    }

    /// The session being recorded.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match &self.state {
            State::Recording(session) => Some(session),
            _ => None,
        }
    }

    /// The cleaned series of the stopped session, for plotting.
    #[must_use]
    pub fn finalized(&self) -> Option<&FinalizedSession> {
        match &self.state {
            State::Stopped(finalized) => Some(finalized),
            _ => None,
        }
    }

    #[must_use]
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    #[must_use]
    pub fn adapter(&self) -> &TelemetryAdapter<S> {
        &self.adapter
    }
}

/// An event found while replaying a stored session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayedEvent {
    pub event: PhaseEvent,
    /// Elapsed time recorded in the document.
    pub elapsed: f64,
}

impl Recorder<ReplaySource> {
    /// Record the whole replay document as fast as possible.
    ///
    /// # Errors
    ///
    /// Same as [`Recorder::start`] and [`Recorder::tick`]
    pub async fn replay_all(&mut self) -> Result<Vec<ReplayedEvent>> {
        self.start()?;
        let mut found = Vec::new();

        while self.adapter.source().remaining() > 0 {
            let events = self.tick().await?;
            let elapsed = self.adapter.source().elapsed().unwrap_or(0.0);
            found.extend(events.into_iter().map(|event| ReplayedEvent { event, elapsed }));
        }

        self.stop()?;
        Ok(found)
    }
}

/// Settings of the sampling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub tick_rate_hz: u32,
    /// Stop by itself once the flight looks finished.
    pub auto_end: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
            auto_end: false,
        }
    }
}

/// Why [`run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    AutoEnd,
}

/// Outcome of [`run`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub reason: StopReason,
    pub ticks: u64,
    pub cleaning: CleaningReport,
}

/// Record at a fixed rate until `shutdown` completes or auto-end triggers.
///
/// Starts the recorder if needed and stops it before returning. Each tick
/// runs to completion before `shutdown` is polled again.
///
/// # Errors
///
/// Returns error if the recording is aborted
///
/// # Examples
///
/// ```no_run
/// use flight_recorder::recorder::{run, Recorder, RunOptions};
/// use flight_recorder::session::SessionSettings;
/// use flight_recorder::telemetry::{standard_channels, TcpSource, TelemetryAdapter};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let source = TcpSource::connect("127.0.0.1:5077").await?;
///     let adapter = TelemetryAdapter::new(source, Duration::from_millis(100));
///     let mut recorder = Recorder::new(standard_channels(), SessionSettings::default(), adapter);
///
///     let shutdown = async {
///         let _ = tokio::signal::ctrl_c().await;
///     };
///     run(&mut recorder, &RunOptions::default(), shutdown).await?;
///     recorder.export("data/flight.json")?;
///     Ok(())
/// }
/// ```
pub async fn run<S, F>(recorder: &mut Recorder<S>, options: &RunOptions, shutdown: F) -> Result<RunSummary>
where
    S: TelemetrySource,
    F: Future<Output = ()>,
{
    if !recorder.is_recording() {
        recorder.start()?;
    }

    let period = Duration::from_secs_f64(1.0 / f64::from(options.tick_rate_hz.max(1)));
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    info!("Sampling at {}Hz", options.tick_rate_hz);

    let mut ticks: u64 = 0;
    let reason = loop {
        tokio::select! {
            _ = ticker.tick() => {
                recorder.tick().await?;
                ticks += 1;

                if ticks % LOG_INTERVAL_TICKS == 0 {
                    info!("Recorded {} ticks, phase: {}", ticks, recorder.phase());
                }

                if options.auto_end && recorder.auto_end_due() {
                    info!("Flight finished, ending recording");
                    break StopReason::AutoEnd;
                }
            }

            _ = &mut shutdown => {
                info!("Shutdown requested after {} ticks", ticks);
                break StopReason::Shutdown;
            }
        }
    };

    let cleaning = recorder.stop()?;
    Ok(RunSummary {
        reason,
        ticks,
        cleaning,
    })
}
