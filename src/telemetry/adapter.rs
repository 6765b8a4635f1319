//! # Telemetry Adapter
//!
//! Wraps a [`TelemetrySource`] so that every read completes within a fixed
//! timeout and yields a [`Reading`]. Timeouts, provider errors and the
//! sentinel marker all become `None`; nothing is raised past this point.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::timeout;
use tracing::debug;

use super::source::TelemetrySource;
use super::{from_raw, Reading};

/// Timeout-bounded, failure-absorbing view of a telemetry provider.
///
/// Readings are cached for the duration of one tick, so a channel read
/// twice in the same tick hits the provider once.
pub struct TelemetryAdapter<S> {
    source: S,
    read_timeout: Duration,
    tick_cache: HashMap<String, Reading>,
}

impl<S> std::fmt::Debug for TelemetryAdapter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryAdapter")
            .field("read_timeout", &self.read_timeout)
            .finish_non_exhaustive()
    }
}

impl<S: TelemetrySource> TelemetryAdapter<S> {
    #[must_use]
    pub fn new(source: S, read_timeout: Duration) -> Self {
        Self {
            source,
            read_timeout,
            tick_cache: HashMap::new(),
        }
    }

    /// Starts a new tick: clears the reading cache and notifies the source.
    pub fn begin_tick(&mut self) {
        self.tick_cache.clear();
        self.source.begin_tick();
    }

    /// Reads one channel.
    ///
    /// Never fails and never waits longer than the configured timeout.
    pub async fn read(&mut self, key: &str) -> Reading {
        if let Some(reading) = self.tick_cache.get(key) {
            return *reading;
        }

        let reading = match timeout(self.read_timeout, self.source.read(key)).await {
            Ok(Ok(raw)) => {
                let reading = from_raw(raw);
                if reading.is_none() {
                    debug!("No valid reading for {} (raw {})", key, raw);
                }
                reading
            }
            Ok(Err(e)) => {
                debug!("Read of {} failed: {}", key, e);
                None
            }
            Err(_) => {
                debug!("Read of {} timed out after {:?}", key, self.read_timeout);
                None
            }
        };

        self.tick_cache.insert(key.to_string(), reading);
        reading
    }

    /// Elapsed time supplied by the source for the current tick, if any.
    pub fn recorded_elapsed(&self) -> Option<f64> {
        self.source.recorded_elapsed()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }
}
