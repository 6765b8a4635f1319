//! # Session Exporter
//!
//! Writes a finished session as one flat JSON object mapping keys to
//! number arrays.
//!
//! ## Document Layout
//!
//! | Key | Content |
//! |-----|---------|
//! | `<CHANNEL>` | full cleaned series of a channel |
//! | `ELAPSED_TIME` | seconds since start, same length as every channel |
//! | `LANDING_TIME` / `TAKEOFF_TIME` | `[elapsed]` of the event |
//! | `LANDING_<CHANNEL>` | event window of a channel |
//! | `LANDING_<CHANNEL>_AVG` / `_MIN` / `_MAX` | `[value]` window statistics |
//!
//! Fields that cannot be turned into a plain number array are left out of
//! the document and reported as [`Diagnostic`]s; the rest is still written.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use tracing::{info, warn};

use super::{CleanedSeries, Diagnostic};
use crate::error::Result;
use crate::session::{EventSnapshot, SnapshotWindow};
use crate::telemetry::{Channel, Reading};

/// Key of the elapsed-time series.
pub const ELAPSED_TIME_KEY: &str = "ELAPSED_TIME";

/// Prefix of landing snapshot fields.
pub const LANDING_PREFIX: &str = "LANDING_";

/// Prefix of takeoff snapshot fields.
pub const TAKEOFF_PREFIX: &str = "TAKEOFF_";

/// Flat key to number-array mapping written to disk.
pub type SessionDocument = BTreeMap<String, Vec<f64>>;

/// Whether a channel key would collide with a document key.
#[must_use]
pub fn is_reserved_key(key: &str) -> bool {
    key == ELAPSED_TIME_KEY || key.starts_with(LANDING_PREFIX) || key.starts_with(TAKEOFF_PREFIX)
}

/// Channels recorded in a document: every key that is not reserved.
///
/// Names and units are not stored, so the key doubles as the name.
#[must_use]
pub fn document_channels(document: &SessionDocument) -> Vec<Channel> {
    document
        .keys()
        .filter(|key| !is_reserved_key(key))
        .map(|key| Channel::new(key.as_str(), key.as_str(), ""))
        .collect()
}

/// Outcome of writing a session document.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportReport {
    pub path: PathBuf,
    /// Number of fields written.
    pub fields: usize,
    /// Fields left out.
    pub diagnostics: Vec<Diagnostic>,
}

/// A value on its way into the document.
#[derive(Debug, Clone, PartialEq)]
enum FieldValue {
    Sequence(Vec<f64>),
    Partial(Vec<Reading>),
    Scalar(f64),
    Unavailable(&'static str),
}

impl FieldValue {
    fn into_sequence(self) -> std::result::Result<Vec<f64>, String> {
        let values = match self {
            FieldValue::Sequence(values) => values,
            FieldValue::Scalar(value) => vec![value],
            FieldValue::Partial(readings) => {
                let missing = readings.iter().filter(|r| r.is_none()).count();
                if missing > 0 {
                    return Err(format!("{} of {} samples missing", missing, readings.len()));
                }
                readings.into_iter().flatten().collect()
            }
            FieldValue::Unavailable(reason) => return Err(reason.to_string()),
        };

        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(format!("not a finite number: {}", bad));
        }
        Ok(values)
    }
}

/// Collects fields, dropping the ones that fail conversion.
#[derive(Debug, Default)]
struct DocumentBuilder {
    document: SessionDocument,
    diagnostics: Vec<Diagnostic>,
}

impl DocumentBuilder {
    fn insert(&mut self, key: String, value: FieldValue) {
        if self.document.contains_key(&key) {
            self.drop_field(Diagnostic::new(&key, "duplicate field"));
            return;
        }
        match value.into_sequence() {
            Ok(values) => {
                self.document.insert(key, values);
            }
            Err(reason) => self.drop_field(Diagnostic::new(&key, reason)),
        }
    }

    fn drop_field(&mut self, diagnostic: Diagnostic) {
        warn!("Export dropped field: {}", diagnostic);
        self.diagnostics.push(diagnostic);
    }

    fn insert_snapshot(&mut self, prefix: &str, snapshot: &EventSnapshot) {
        self.insert(format!("{}TIME", prefix), FieldValue::Scalar(snapshot.elapsed));

        for (key, window) in &snapshot.windows {
            let field = format!("{}{}", prefix, key);
            match window {
                SnapshotWindow::Valid(values) => {
                    self.insert(field.clone(), FieldValue::Sequence(values.clone()));
                    if let Some(summary) = window.summary() {
                        self.insert(format!("{}_AVG", field), FieldValue::Scalar(summary.avg));
                        self.insert(format!("{}_MIN", field), FieldValue::Scalar(summary.min));
                        self.insert(format!("{}_MAX", field), FieldValue::Scalar(summary.max));
                    }
                }
                SnapshotWindow::Missing => {
                    self.insert(field, FieldValue::Unavailable("no valid samples in event window"));
                }
            }
        }
    }
}

/// Assemble the document for a finished session.
///
/// Never fails as a whole; fields that cannot be converted are returned as
/// diagnostics.
pub fn build_document(
    series: &BTreeMap<String, CleanedSeries>,
    elapsed: &[f64],
    landing: Option<&EventSnapshot>,
    takeoff: Option<&EventSnapshot>,
) -> (SessionDocument, Vec<Diagnostic>) {
    let mut builder = DocumentBuilder::default();

    for (key, cleaned) in series {
        let value = match cleaned {
            CleanedSeries::Clean(values) => FieldValue::Sequence(values.clone()),
            CleanedSeries::Uncleaned(readings) => FieldValue::Partial(readings.clone()),
        };
        builder.insert(key.clone(), value);
    }
    builder.insert(ELAPSED_TIME_KEY.to_string(), FieldValue::Sequence(elapsed.to_vec()));

    if let Some(landing) = landing {
        builder.insert_snapshot(LANDING_PREFIX, landing);
    }
    if let Some(takeoff) = takeoff {
        builder.insert_snapshot(TAKEOFF_PREFIX, takeoff);
    }

    (builder.document, builder.diagnostics)
}

/// Write a document as JSON, creating the parent directory if needed.
///
/// # Errors
///
/// Returns error if the file cannot be created or written
pub fn write_document<P: AsRef<Path>>(path: P, document: &SessionDocument) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, document)?;
    writer.flush()?;

    info!("Session written to {} ({} fields)", path.display(), document.len());
    Ok(())
}

/// Read a document written by [`write_document`].
///
/// # Errors
///
/// Returns error if the file cannot be read or is not a flat number-array
/// object
pub fn load_document<P: AsRef<Path>>(path: P) -> Result<SessionDocument> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// File name for a session exported at `now`, e.g. `2024-05-01T1432.json`.
#[must_use]
pub fn default_file_name<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    now.format("%Y-%m-%dT%H%M.json").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::PhaseEvent;
    use chrono::Utc;

    fn snapshot(event: PhaseEvent, windows: &[(&str, SnapshotWindow)]) -> EventSnapshot {
        EventSnapshot {
            event,
            elapsed: 42.5,
            windows: windows
                .iter()
                .map(|(k, w)| (k.to_string(), w.clone()))
                .collect(),
        }
    }

    fn series() -> BTreeMap<String, CleanedSeries> {
        [
            ("G_FORCE".to_string(), CleanedSeries::Clean(vec![1.0, 1.2, 0.9])),
            ("VERTICAL_SPEED".to_string(), CleanedSeries::Clean(vec![0.0, 10.0, -5.0])),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_channels_and_elapsed_time_written() {
        let (doc, diagnostics) = build_document(&series(), &[0.0, 0.25, 0.5], None, None);

        assert!(diagnostics.is_empty());
        assert_eq!(doc.len(), 3);
        assert_eq!(doc[ELAPSED_TIME_KEY], vec![0.0, 0.25, 0.5]);
        assert_eq!(doc["G_FORCE"], vec![1.0, 1.2, 0.9]);
    }

    #[test]
    fn test_landing_fields_prefixed() {
        let landing = snapshot(
            PhaseEvent::Landing,
            &[("VERTICAL_SPEED", SnapshotWindow::Valid(vec![-200.0, -100.0]))],
        );
        let (doc, diagnostics) = build_document(&series(), &[0.0, 0.25, 0.5], Some(&landing), None);

        assert!(diagnostics.is_empty());
        assert_eq!(doc["LANDING_TIME"], vec![42.5]);
        assert_eq!(doc["LANDING_VERTICAL_SPEED"], vec![-200.0, -100.0]);
        assert_eq!(doc["LANDING_VERTICAL_SPEED_AVG"], vec![-150.0]);
        assert_eq!(doc["LANDING_VERTICAL_SPEED_MIN"], vec![-200.0]);
        assert_eq!(doc["LANDING_VERTICAL_SPEED_MAX"], vec![-100.0]);
        assert!(!doc.contains_key("TAKEOFF_TIME"));
    }

    #[test]
    fn test_missing_window_dropped_with_diagnostic() {
        let takeoff = snapshot(
            PhaseEvent::Takeoff,
            &[
                ("G_FORCE", SnapshotWindow::Missing),
                ("VERTICAL_SPEED", SnapshotWindow::Valid(vec![300.0])),
            ],
        );
        let (doc, diagnostics) = build_document(&series(), &[0.0, 0.25, 0.5], None, Some(&takeoff));

        assert!(!doc.contains_key("TAKEOFF_G_FORCE"));
        assert!(doc.contains_key("TAKEOFF_VERTICAL_SPEED_AVG"));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].field, "TAKEOFF_G_FORCE");
    }

    #[test]
    fn test_uncleaned_channel_dropped_with_diagnostic() {
        let mut series = series();
        series.insert("FUEL".to_string(), CleanedSeries::Uncleaned(vec![None, None, None]));

        let (doc, diagnostics) = build_document(&series, &[0.0, 0.25, 0.5], None, None);

        assert!(!doc.contains_key("FUEL"));
        assert!(doc.contains_key("G_FORCE"));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("3 of 3"));
    }

    #[test]
    fn test_non_finite_aggregate_dropped() {
        let landing = snapshot(
            PhaseEvent::Landing,
            &[("G_FORCE", SnapshotWindow::Valid(vec![f64::MAX, f64::MAX]))],
        );
        let (doc, diagnostics) = build_document(&series(), &[0.0, 0.25, 0.5], Some(&landing), None);

        // the average of two f64::MAX overflows to infinity
        assert!(!doc.contains_key("LANDING_G_FORCE_AVG"));
        assert!(doc.contains_key("LANDING_G_FORCE_MAX"));
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_no_sentinel_in_document() {
        let mut series = series();
        series.insert("FUEL".to_string(), CleanedSeries::Uncleaned(vec![Some(1.0), None]));
        let (doc, _) = build_document(&series, &[0.0, 0.25, 0.5], None, None);

        for values in doc.values() {
            assert!(values
                .iter()
                .all(|&v| v != crate::telemetry::SENTINEL_FAILURE_VALUE));
        }
    }

    #[test]
    fn test_write_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("flight.json");
        let mut series = series();
        series.insert(
            "PLANE_ALTITUDE".to_string(),
            CleanedSeries::Clean(vec![1234.5678, 0.1, 98765.4321]),
        );

        let (doc, _) = build_document(&series, &[0.0, 0.2501, 0.5003], None, None);
        write_document(&path, &doc).unwrap();
        let loaded = load_document(&path).unwrap();

        assert_eq!(loaded, doc);
        for (key, values) in &loaded {
            assert_eq!(values.len(), loaded[ELAPSED_TIME_KEY].len(), "{}", key);
        }
    }

    #[test]
    fn test_load_rejects_nested_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"G_FORCE": [[1.0]]}"#).unwrap();
        assert!(load_document(&path).is_err());
    }

    #[test]
    fn test_default_file_name() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 14, 32, 9).unwrap();
        assert_eq!(default_file_name(&now), "2024-05-01T1432.json");
    }

    #[test]
    fn test_reserved_keys() {
        assert!(is_reserved_key("ELAPSED_TIME"));
        assert!(is_reserved_key("LANDING_ANYTHING"));
        assert!(is_reserved_key("TAKEOFF_TIME"));
        assert!(!is_reserved_key("LANDING"));
        assert!(!is_reserved_key("G_FORCE"));
    }

    #[test]
    fn test_document_channels_skip_reserved_keys() {
        let mut doc = SessionDocument::new();
        for key in ["G_FORCE", "SIM_ON_GROUND", "ELAPSED_TIME", "LANDING_TIME", "LANDING_G_FORCE_AVG"] {
            doc.insert(key.to_string(), vec![1.0]);
        }

        let keys: Vec<String> = document_channels(&doc).into_iter().map(|c| c.key).collect();
        assert_eq!(keys, vec!["G_FORCE", "SIM_ON_GROUND"]);
    }
}
