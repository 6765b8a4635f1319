//! # Sample Buffer
//!
//! Per-channel reading series recorded in lockstep with an elapsed-time
//! series. Every tick appends exactly one slot to every channel, even when
//! the read failed, so all series always have the same length.

use std::collections::HashMap;

use crate::error::{RecorderError, Result};
use crate::postflight::export::is_reserved_key;
use crate::telemetry::{Channel, Reading, TelemetryAdapter, TelemetrySource};

/// Append-only store of the readings of one session.
///
/// # Examples
///
/// ```
/// use flight_recorder::session::SampleBuffer;
/// use flight_recorder::telemetry::Channel;
///
/// let mut buffer = SampleBuffer::new(vec![Channel::new("G_FORCE", "G-force", "g")])?;
/// buffer.push_tick(vec![("G_FORCE".to_string(), Some(1.02))].into_iter().collect(), 0.0)?;
/// assert_eq!(buffer.latest("G_FORCE")?, Some(1.02));
/// # Ok::<(), flight_recorder::error::RecorderError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct SampleBuffer {
    channels: Vec<Channel>,
    series: HashMap<String, Vec<Reading>>,
    elapsed: Vec<f64>,
}

impl SampleBuffer {
    /// Create an empty buffer for `channels`.
    ///
    /// # Errors
    ///
    /// Fails on duplicate or reserved channel keys.
    pub fn new(channels: Vec<Channel>) -> Result<Self> {
        let mut buffer = Self::default();
        for channel in channels {
            buffer.add_channel(channel)?;
        }
        Ok(buffer)
    }

    /// Register a channel.
    ///
    /// # Errors
    ///
    /// - [`RecorderError::ChannelSetLocked`] once samples have been recorded
    /// - [`RecorderError::DuplicateChannel`] if the key is already registered
    /// - [`RecorderError::ReservedKey`] if the key collides with document keys
    pub fn add_channel(&mut self, channel: Channel) -> Result<()> {
        if !self.is_empty() {
            return Err(RecorderError::ChannelSetLocked);
        }
        if is_reserved_key(&channel.key) {
            return Err(RecorderError::ReservedKey(channel.key));
        }
        if self.series.contains_key(&channel.key) {
            return Err(RecorderError::DuplicateChannel(channel.key));
        }

        self.series.insert(channel.key.clone(), Vec::new());
        self.channels.push(channel);
        Ok(())
    }

    /// Unregister a channel, discarding its series.
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::UnknownChannel`] if the key is not registered
    pub fn remove_channel(&mut self, key: &str) -> Result<Channel> {
        let position = self
            .channels
            .iter()
            .position(|c| c.key == key)
            .ok_or_else(|| RecorderError::UnknownChannel(key.to_string()))?;

        self.series.remove(key);
        Ok(self.channels.remove(position))
    }

    /// Read every registered channel through `adapter` and record one tick.
    ///
    /// # Errors
    ///
    /// Only [`RecorderError::BufferInvariant`]; failed reads are stored as
    /// missing slots.
    pub async fn append_tick<S: TelemetrySource>(
        &mut self,
        adapter: &mut TelemetryAdapter<S>,
        elapsed: f64,
    ) -> Result<()> {
        let mut readings = HashMap::with_capacity(self.channels.len());
        for channel in &self.channels {
            readings.insert(channel.key.clone(), adapter.read(&channel.key).await);
        }
        self.push_tick(readings, elapsed)
    }

    /// Record one tick from readings already taken.
    ///
    /// Channels absent from `readings` get a missing slot.
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::BufferInvariant`] if any series ends up out of
    /// step with the elapsed-time series.
    pub fn push_tick(&mut self, mut readings: HashMap<String, Reading>, elapsed: f64) -> Result<()> {
        for channel in &self.channels {
            let reading = readings.remove(&channel.key).flatten();
            self.series
                .entry(channel.key.clone())
                .or_default()
                .push(reading);
        }
        self.elapsed.push(elapsed);
        self.check_invariant()
    }

    /// Verify every series has as many slots as the elapsed-time series.
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::BufferInvariant`] naming the first offender
    pub fn check_invariant(&self) -> Result<()> {
        for channel in &self.channels {
            let series_len = self.series.get(&channel.key).map_or(0, Vec::len);
            if series_len != self.elapsed.len() {
                return Err(RecorderError::BufferInvariant {
                    key: channel.key.clone(),
                    series_len,
                    elapsed_len: self.elapsed.len(),
                });
            }
        }
        Ok(())
    }

    /// Last slot of a channel's series.
    ///
    /// # Errors
    ///
    /// - [`RecorderError::UnknownChannel`] if the key is not registered
    /// - [`RecorderError::EmptyBuffer`] if nothing has been recorded yet
    pub fn latest(&self, key: &str) -> Result<Reading> {
        self.series(key)
            .ok_or_else(|| RecorderError::UnknownChannel(key.to_string()))?
            .last()
            .copied()
            .ok_or_else(|| RecorderError::EmptyBuffer(key.to_string()))
    }

    /// The whole series of a channel.
    #[must_use]
    pub fn series(&self, key: &str) -> Option<&[Reading]> {
        self.series.get(key).map(Vec::as_slice)
    }

    /// Seconds since session start, one entry per tick.
    #[must_use]
    pub fn elapsed(&self) -> &[f64] {
        &self.elapsed
    }

    /// Registered channels in registration order.
    #[must_use]
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Number of recorded ticks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elapsed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elapsed.is_empty()
    }

    /// Give up the series, keyed by channel.
    #[must_use]
    pub fn into_parts(self) -> (Vec<Channel>, HashMap<String, Vec<Reading>>, Vec<f64>) {
        (self.channels, self.series, self.elapsed)
    }
}
