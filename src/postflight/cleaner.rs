//! # Data Cleaner
//!
//! Repairs missing samples once recording has stopped.
//!
//! - Leading and trailing gaps take the nearest valid value.
//! - Interior gaps are filled by linear interpolation over sample index.
//! - A channel without a single valid sample is left as it is and
//!   reported; nothing is invented for it.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use super::{CleanedSeries, Diagnostic};
use crate::telemetry::{round_reading, Channel, Reading};

/// Outcome of cleaning a whole buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleaningReport {
    /// Number of missing slots that were filled.
    pub repaired: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Fill the gaps of one series.
///
/// Returns `None` when the series has no valid sample.
///
/// # Examples
///
/// ```
/// use flight_recorder::postflight::cleaner::clean_series;
///
/// assert_eq!(clean_series(&[Some(1.0), None, None, Some(4.0)]), Some(vec![1.0, 2.0, 3.0, 4.0]));
/// assert_eq!(clean_series(&[None, Some(2.0), Some(3.0)]), Some(vec![2.0, 2.0, 3.0]));
/// assert_eq!(clean_series(&[None, None]), None);
/// ```
#[must_use]
pub fn clean_series(series: &[Reading]) -> Option<Vec<f64>> {
    let valid: Vec<(usize, f64)> = series
        .iter()
        .enumerate()
        .filter_map(|(i, reading)| reading.map(|value| (i, value)))
        .collect();

    let (first, last) = (*valid.first()?, *valid.last()?);
    let mut cleaned = Vec::with_capacity(series.len());
    // Index into `valid` of the last valid sample at or before `i`
    let mut prev = 0;

    for (i, reading) in series.iter().enumerate() {
        if let Some(value) = reading {
            cleaned.push(*value);
            continue;
        }

        while prev + 1 < valid.len() && valid[prev + 1].0 < i {
            prev += 1;
        }

        let value = if i < first.0 {
            first.1
        } else if i > last.0 {
            last.1
        } else {
            let (i0, y0) = valid[prev];
            let (i1, y1) = valid[prev + 1];
            let fraction = (i - i0) as f64 / (i1 - i0) as f64;
            round_reading(y0 + (y1 - y0) * fraction)
        };
        cleaned.push(value);
    }

    Some(cleaned)
}

/// Clean every channel of a finished recording.
///
/// Channels are visited in registration order so diagnostics come out in
/// a stable order.
pub fn clean_channels(
    channels: &[Channel],
    mut series: HashMap<String, Vec<Reading>>,
) -> (BTreeMap<String, CleanedSeries>, CleaningReport) {
    let mut cleaned = BTreeMap::new();
    let mut report = CleaningReport::default();

    for channel in channels {
        let raw = series.remove(&channel.key).unwrap_or_default();

        match clean_series(&raw) {
            Some(values) => {
                report.repaired += raw.iter().filter(|r| r.is_none()).count();
                cleaned.insert(channel.key.clone(), CleanedSeries::Clean(values));
            }
            None if raw.is_empty() => {
                cleaned.insert(channel.key.clone(), CleanedSeries::Clean(Vec::new()));
            }
            None => {
                let diagnostic = Diagnostic::new(
                    &channel.key,
                    format!("no valid samples in {} ticks, left uncleaned", raw.len()),
                );
                warn!("Cleaning skipped: {}", diagnostic);
                report.diagnostics.push(diagnostic);
                cleaned.insert(channel.key.clone(), CleanedSeries::Uncleaned(raw));
            }
        }
    }

    (cleaned, report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interior_gap_linear() {
        assert_eq!(
            clean_series(&[Some(1.0), None, None, Some(4.0)]),
            Some(vec![1.0, 2.0, 3.0, 4.0])
        );
    }

    #[test]
    fn test_leading_gap_holds_first_value() {
        assert_eq!(
            clean_series(&[None, Some(2.0), Some(3.0)]),
            Some(vec![2.0, 2.0, 3.0])
        );
    }

    #[test]
    fn test_trailing_gap_holds_last_value() {
        assert_eq!(
            clean_series(&[Some(5.0), Some(7.0), None, None]),
            Some(vec![5.0, 7.0, 7.0, 7.0])
        );
    }

    #[test]
    fn test_multiple_gaps() {
        assert_eq!(
            clean_series(&[None, Some(0.0), None, Some(10.0), None, None, None, Some(2.0), None]),
            Some(vec![0.0, 0.0, 5.0, 10.0, 8.0, 6.0, 4.0, 2.0, 2.0])
        );
    }

    #[test]
    fn test_uneven_gap_is_rounded() {
        let cleaned = clean_series(&[Some(0.0), None, None, Some(1.0)]).unwrap();
        assert_eq!(cleaned, vec![0.0, 0.3333, 0.6667, 1.0]);
    }

    #[test]
    fn test_single_valid_sample_fills_everything() {
        assert_eq!(
            clean_series(&[None, Some(3.5), None]),
            Some(vec![3.5, 3.5, 3.5])
        );
    }

    #[test]
    fn test_all_missing_is_none() {
        assert_eq!(clean_series(&[None, None, None]), None);
        assert_eq!(clean_series(&[]), None);
    }

    #[test]
    fn test_clean_channels_reports_all_missing_channel() {
        let channels = vec![
            Channel::new("A", "A", ""),
            Channel::new("B", "B", ""),
        ];
        let series: HashMap<String, Vec<Reading>> = [
            ("A".to_string(), vec![Some(1.0), None, Some(3.0)]),
            ("B".to_string(), vec![None, None, None]),
        ]
        .into_iter()
        .collect();

        let (cleaned, report) = clean_channels(&channels, series);

        assert_eq!(cleaned["A"], CleanedSeries::Clean(vec![1.0, 2.0, 3.0]));
        assert_eq!(cleaned["B"], CleanedSeries::Uncleaned(vec![None, None, None]));
        assert_eq!(report.repaired, 1);
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].field, "B");
    }

    #[test]
    fn test_clean_channels_empty_recording() {
        let channels = vec![Channel::new("A", "A", "")];
        let series: HashMap<String, Vec<Reading>> =
            [("A".to_string(), Vec::new())].into_iter().collect();

        let (cleaned, report) = clean_channels(&channels, series);
        assert_eq!(cleaned["A"], CleanedSeries::Clean(Vec::new()));
        assert!(report.diagnostics.is_empty());
    }
}
