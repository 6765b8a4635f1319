//! # Event Snapshots
//!
//! Short per-channel windows captured when takeoff or landing fires, used
//! for the summary statistics of the flight.
//!
//! - Takeoff keeps the [`TAKEOFF_WINDOW`] samples *before* the current tick;
//!   the tick that completed the debounce is usually the noisiest one.
//! - Landing keeps the last [`LANDING_WINDOW`] samples including the
//!   current tick.
//!
//! Missing samples are dropped from a window. A window with nothing left is
//! stored as [`SnapshotWindow::Missing`] rather than as made-up numbers.

use std::collections::BTreeMap;

use serde::Serialize;

use super::buffer::SampleBuffer;
use super::phase::PhaseEvent;

/// Samples kept per channel at takeoff.
pub const TAKEOFF_WINDOW: usize = 2;

/// Samples kept per channel at landing.
pub const LANDING_WINDOW: usize = 4;

/// Average, minimum and maximum of a window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

impl Summary {
    /// `None` for an empty slice.
    #[must_use]
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = values.iter().sum::<f64>() / values.len() as f64;
        Some(Self { avg, min, max })
    }
}

/// Captured window of one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SnapshotWindow {
    /// Valid samples, oldest first
    Valid(Vec<f64>),
    /// No valid sample in the window
    Missing,
}

impl SnapshotWindow {
    fn from_slots(slots: &[Option<f64>]) -> Self {
        let values: Vec<f64> = slots.iter().flatten().copied().collect();
        if values.is_empty() {
            Self::Missing
        } else {
            Self::Valid(values)
        }
    }

    #[must_use]
    pub fn values(&self) -> Option<&[f64]> {
        match self {
            Self::Valid(values) => Some(values),
            Self::Missing => None,
        }
    }

    #[must_use]
    pub fn summary(&self) -> Option<Summary> {
        self.values().and_then(Summary::of)
    }
}

/// Data captured at one phase transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventSnapshot {
    pub event: PhaseEvent,
    /// Elapsed seconds at the tick the event fired.
    pub elapsed: f64,
    pub windows: BTreeMap<String, SnapshotWindow>,
}

impl EventSnapshot {
    /// Capture the takeoff snapshot from the buffer's current state.
    #[must_use]
    pub fn takeoff(buffer: &SampleBuffer) -> Self {
        let end = buffer.len().saturating_sub(1);
        let start = end.saturating_sub(TAKEOFF_WINDOW);
        Self::capture(buffer, PhaseEvent::Takeoff, start, end)
    }

    /// Capture the landing snapshot from the buffer's current state.
    #[must_use]
    pub fn landing(buffer: &SampleBuffer) -> Self {
        let end = buffer.len();
        let start = end.saturating_sub(LANDING_WINDOW);
        Self::capture(buffer, PhaseEvent::Landing, start, end)
    }

    fn capture(buffer: &SampleBuffer, event: PhaseEvent, start: usize, end: usize) -> Self {
        let windows = buffer
            .channels()
            .iter()
            .map(|channel| {
                let slots = buffer
                    .series(&channel.key)
                    .and_then(|series| series.get(start..end))
                    .unwrap_or(&[]);
                (channel.key.clone(), SnapshotWindow::from_slots(slots))
            })
            .collect();

        Self {
            event,
            elapsed: buffer.elapsed().last().copied().unwrap_or(0.0),
            windows,
        }
    }

    /// Summary statistics of one channel's window.
    #[must_use]
    pub fn summary(&self, key: &str) -> Option<Summary> {
        self.windows.get(key).and_then(SnapshotWindow::summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{Channel, Reading};
    use std::collections::HashMap;

    fn buffer(vs: &[Reading]) -> SampleBuffer {
        let mut buffer = SampleBuffer::new(vec![Channel::new("VERTICAL_SPEED", "Vertical speed", "ft/min")])
            .unwrap();
        for (i, reading) in vs.iter().enumerate() {
            let readings: HashMap<String, Reading> =
                [("VERTICAL_SPEED".to_string(), *reading)].into_iter().collect();
            buffer.push_tick(readings, i as f64 * 0.25).unwrap();
        }
        buffer
    }

    #[test]
    fn test_takeoff_skips_current_tick() {
        let buffer = buffer(&[Some(0.0), Some(100.0), Some(200.0), Some(900.0)]);
        let snapshot = EventSnapshot::takeoff(&buffer);

        assert_eq!(snapshot.event, PhaseEvent::Takeoff);
        assert_eq!(snapshot.elapsed, 0.75);
        assert_eq!(
            snapshot.windows["VERTICAL_SPEED"],
            SnapshotWindow::Valid(vec![100.0, 200.0])
        );
    }

    #[test]
    fn test_takeoff_with_single_sample_is_missing() {
        let buffer = buffer(&[Some(5.0)]);
        let snapshot = EventSnapshot::takeoff(&buffer);
        assert_eq!(snapshot.windows["VERTICAL_SPEED"], SnapshotWindow::Missing);
    }

    #[test]
    fn test_landing_filters_missing_samples() {
        let buffer = buffer(&[Some(-900.0), Some(-300.0), None, Some(-120.0), Some(-60.0)]);
        let snapshot = EventSnapshot::landing(&buffer);

        assert_eq!(
            snapshot.windows["VERTICAL_SPEED"],
            SnapshotWindow::Valid(vec![-300.0, -120.0, -60.0])
        );
        let summary = snapshot.summary("VERTICAL_SPEED").unwrap();
        assert_eq!(summary.avg, -160.0);
        assert_eq!(summary.min, -300.0);
        assert_eq!(summary.max, -60.0);
    }

    #[test]
    fn test_landing_all_missing_degrades() {
        let buffer = buffer(&[Some(-900.0), None, None, None, None]);
        let snapshot = EventSnapshot::landing(&buffer);

        assert_eq!(snapshot.windows["VERTICAL_SPEED"], SnapshotWindow::Missing);
        assert!(snapshot.summary("VERTICAL_SPEED").is_none());
    }

    #[test]
    fn test_summary_of_empty() {
        assert!(Summary::of(&[]).is_none());
    }
}
