//! Trait abstraction for telemetry providers to enable testing

use async_trait::async_trait;
use std::io;

/// A provider of named telemetry values.
///
/// Implementations may return [`SENTINEL_FAILURE_VALUE`](super::SENTINEL_FAILURE_VALUE)
/// or an error for a failed read; the adapter treats both the same way.
#[async_trait]
pub trait TelemetrySource: Send {
    /// Read the current value of one channel
    async fn read(&mut self, key: &str) -> io::Result<f64>;

    /// Called once before the reads of each tick
    fn begin_tick(&mut self) {}

    /// Elapsed seconds of the current tick, for sources that carry their
    /// own timeline. Live sources return `None` and the session clock is used.
    fn recorded_elapsed(&self) -> Option<f64> {
        None
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use crate::telemetry::SENTINEL_FAILURE_VALUE;
    use std::collections::{HashMap, HashSet, VecDeque};

    /// Scripted telemetry source for testing
    ///
    /// Each channel plays its values in order, one per tick, and keeps
    /// repeating the last value once the script runs out.
    #[derive(Debug, Default)]
    pub struct ScriptedSource {
        scripts: HashMap<String, VecDeque<f64>>,
        current: HashMap<String, f64>,
        hanging: HashSet<String>,
        failing: HashSet<String>,
        pub ticks: usize,
        pub reads: HashMap<String, usize>,
    }

    impl ScriptedSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_series(mut self, key: &str, values: &[f64]) -> Self {
            self.scripts.insert(key.to_string(), values.iter().copied().collect());
            self
        }

        /// Ground channel script from airborne flags (`true` = airborne)
        pub fn with_airborne(self, key: &str, airborne: &[bool]) -> Self {
            let values: Vec<f64> = airborne
                .iter()
                .map(|&a| if a { 0.0 } else { 1.0 })
                .collect();
            self.with_series(key, &values)
        }

        /// Reads of this channel never complete
        pub fn with_hang(mut self, key: &str) -> Self {
            self.hanging.insert(key.to_string());
            self
        }

        /// Reads of this channel return an I/O error
        pub fn with_error(mut self, key: &str) -> Self {
            self.failing.insert(key.to_string());
            self
        }

        pub fn reads_of(&self, key: &str) -> usize {
            self.reads.get(key).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl TelemetrySource for ScriptedSource {
        async fn read(&mut self, key: &str) -> io::Result<f64> {
            *self.reads.entry(key.to_string()).or_insert(0) += 1;

            if self.hanging.contains(key) {
                std::future::pending::<()>().await;
            }
            if self.failing.contains(key) {
                return Err(io::Error::new(io::ErrorKind::Other, "Mock read error"));
            }

            match self.current.get(key) {
                Some(value) => Ok(*value),
                None if self.scripts.contains_key(key) => Ok(SENTINEL_FAILURE_VALUE),
                None => Err(io::Error::new(io::ErrorKind::NotFound, "Mock unknown channel")),
            }
        }

        fn begin_tick(&mut self) {
            self.ticks += 1;
            for (key, script) in &mut self.scripts {
                if let Some(value) = script.pop_front() {
                    self.current.insert(key.clone(), value);
                }
            }
        }
    }
}
