//! # Post-Flight Module
//!
//! Work done once recording has stopped.
//!
//! This module handles:
//! - Repairing missing samples ([`cleaner`])
//! - Writing and reading session documents ([`export`])
//! - Holding the finished, read-only session ([`FinalizedSession`])

pub mod cleaner;
pub mod export;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::error::Result;
use crate::session::{EventSnapshot, FlightPhase, Session};
use crate::telemetry::{Channel, Reading};
use cleaner::{clean_channels, CleaningReport};
use export::{build_document, write_document, ExportReport, SessionDocument};

/// A recoverable problem with one field, reported instead of raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Channel key or document field concerned.
    pub field: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// A channel series after cleaning.
#[derive(Debug, Clone, PartialEq)]
pub enum CleanedSeries {
    /// Every slot holds a value.
    Clean(Vec<f64>),
    /// No valid sample was recorded; kept as recorded.
    Uncleaned(Vec<Reading>),
}

impl CleanedSeries {
    /// The values, if the series is clean.
    #[must_use]
    pub fn values(&self) -> Option<&[f64]> {
        match self {
            CleanedSeries::Clean(values) => Some(values),
            CleanedSeries::Uncleaned(_) => None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            CleanedSeries::Clean(values) => values.len(),
            CleanedSeries::Uncleaned(readings) => readings.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A stopped and cleaned session. Read-only.
#[derive(Debug, Clone)]
pub struct FinalizedSession {
    channels: Vec<Channel>,
    series: BTreeMap<String, CleanedSeries>,
    elapsed: Vec<f64>,
    phase: FlightPhase,
    takeoff: Option<EventSnapshot>,
    landing: Option<EventSnapshot>,
}

impl FinalizedSession {
    /// Clean a stopped session.
    #[must_use]
    pub fn from_session(session: Session) -> (Self, CleaningReport) {
        let (buffer, phase, takeoff, landing) = session.into_parts();
        let (channels, series, elapsed) = buffer.into_parts();
        let (series, report) = clean_channels(&channels, series);

        let finalized = Self {
            channels,
            series,
            elapsed,
            phase,
            takeoff,
            landing,
        };
        (finalized, report)
    }

    /// Build the session document without writing it.
    #[must_use]
    pub fn document(&self) -> (SessionDocument, Vec<Diagnostic>) {
        build_document(
            &self.series,
            &self.elapsed,
            self.landing.as_ref(),
            self.takeoff.as_ref(),
        )
    }

    /// Write the session document to `path`.
    ///
    /// # Errors
    ///
    /// Returns error only if the file cannot be written; dropped fields are
    /// listed in the report.
    pub fn export<P: AsRef<Path>>(&self, path: P) -> Result<ExportReport> {
        let (document, diagnostics) = self.document();
        write_document(&path, &document)?;

        Ok(ExportReport {
            path: path.as_ref().to_path_buf(),
            fields: document.len(),
            diagnostics,
        })
    }

    /// Last value of every channel (`None` for uncleaned or empty channels).
    #[must_use]
    pub fn latest_snapshot(&self) -> BTreeMap<String, Reading> {
        self.channels
            .iter()
            .map(|channel| {
                let latest = self
                    .series(&channel.key)
                    .and_then(CleanedSeries::values)
                    .and_then(|values| values.last().copied());
                (channel.key.clone(), latest)
            })
            .collect()
    }

    #[must_use]
    pub fn series(&self, key: &str) -> Option<&CleanedSeries> {
        self.series.get(key)
    }

    #[must_use]
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    #[must_use]
    pub fn elapsed(&self) -> &[f64] {
        &self.elapsed
    }

    #[must_use]
    pub fn phase(&self) -> FlightPhase {
        self.phase
    }

    #[must_use]
    pub fn takeoff(&self) -> Option<&EventSnapshot> {
        self.takeoff.as_ref()
    }

    #[must_use]
    pub fn landing(&self) -> Option<&EventSnapshot> {
        self.landing.as_ref()
    }
}
