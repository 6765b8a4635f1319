//! # Replay Source
//!
//! Plays a stored session document back as if it were a live provider,
//! one document row per tick.

use async_trait::async_trait;
use std::io;

use super::source::TelemetrySource;
use crate::postflight::export::{SessionDocument, ELAPSED_TIME_KEY};

/// Telemetry source backed by a recorded session document
#[derive(Debug, Clone)]
pub struct ReplaySource {
    document: SessionDocument,
    rows: usize,
    /// Row served during the current tick
    row: Option<usize>,
    next_row: usize,
}

impl ReplaySource {
    /// Replay `document`; its `ELAPSED_TIME` series sets the number of ticks.
    #[must_use]
    pub fn new(document: SessionDocument) -> Self {
        let rows = document.get(ELAPSED_TIME_KEY).map_or(0, Vec::len);
        Self {
            document,
            rows,
            row: None,
            next_row: 0,
        }
    }

    /// Ticks left to play.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.rows.saturating_sub(self.next_row)
    }

    /// Recorded elapsed time of the row served this tick.
    #[must_use]
    pub fn elapsed(&self) -> Option<f64> {
        let row = self.row?;
        self.document.get(ELAPSED_TIME_KEY)?.get(row).copied()
    }
}

#[async_trait]
impl TelemetrySource for ReplaySource {
    async fn read(&mut self, key: &str) -> io::Result<f64> {
        let row = self
            .row
            .filter(|&row| row < self.rows)
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "replay finished"))?;

        self.document
            .get(key)
            .and_then(|series| series.get(row))
            .copied()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{} not recorded", key)))
    }

    fn begin_tick(&mut self) {
        self.row = Some(self.next_row);
        self.next_row += 1;
    }

    fn recorded_elapsed(&self) -> Option<f64> {
        self.elapsed()
    }
}
