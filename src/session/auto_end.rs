//! # Auto-End Rule
//!
//! Decides when a recording can stop by itself: the aircraft has flown,
//! is back on the ground and has (nearly) stopped.

use super::phase::AirborneHistory;
use crate::telemetry::Reading;

/// Thresholds of the auto-end rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoEndRule {
    /// Earliest elapsed time (s) at which a session may end.
    pub min_elapsed_s: f64,
    /// Total speed must be below this.
    pub max_speed: f64,
    /// Total speed counted as standing still.
    pub standstill_speed: f64,
}

impl Default for AutoEndRule {
    fn default() -> Self {
        Self {
            min_elapsed_s: 50.0,
            max_speed: 30.0,
            standstill_speed: 2.0,
        }
    }
}

impl AutoEndRule {
    /// Whether the session should end now.
    ///
    /// The aircraft must have taken off, be slower than `max_speed`, and
    /// either have spent the whole history on the ground or be standing
    /// still on the ground. Missing speed readings never end a session.
    #[must_use]
    pub fn is_due(
        &self,
        history: &AirborneHistory,
        vertical_speed: Reading,
        ground_speed: Reading,
        elapsed: f64,
        took_off: bool,
    ) -> bool {
        let (Some(vs), Some(gs)) = (vertical_speed, ground_speed) else {
            return false;
        };
        let total_speed = vs.hypot(gs);
        let airborne = history.last().unwrap_or(false);

        let settled = !history.any_airborne() || (total_speed < self.standstill_speed && !airborne);

        settled && elapsed > self.min_elapsed_s && took_off && total_speed < self.max_speed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(entries: &[bool]) -> AirborneHistory {
        let mut history = AirborneHistory::new(100);
        for &airborne in entries {
            history.push(airborne);
        }
        history
    }

    #[test]
    fn test_due_when_stopped_after_flight() {
        let rule = AutoEndRule::default();
        let history = history(&[true, true, false, false]);
        assert!(rule.is_due(&history, Some(0.0), Some(1.0), 120.0, true));
    }

    #[test]
    fn test_not_due_before_takeoff() {
        let rule = AutoEndRule::default();
        let history = history(&[false; 10]);
        assert!(!rule.is_due(&history, Some(0.0), Some(0.0), 120.0, false));
    }

    #[test]
    fn test_not_due_too_early() {
        let rule = AutoEndRule::default();
        let history = history(&[false; 10]);
        assert!(!rule.is_due(&history, Some(0.0), Some(0.0), 10.0, true));
    }

    #[test]
    fn test_rolling_out_fast_not_due() {
        let rule = AutoEndRule::default();
        let history = history(&[true, false, false]);
        // still rolling at 25 kt with an airborne entry in history
        assert!(!rule.is_due(&history, Some(0.0), Some(25.0), 120.0, true));
    }

    #[test]
    fn test_long_ground_history_at_taxi_speed_due() {
        let rule = AutoEndRule::default();
        let history = history(&[false; 100]);
        assert!(rule.is_due(&history, Some(0.0), Some(15.0), 400.0, true));
        assert!(!rule.is_due(&history, Some(0.0), Some(35.0), 400.0, true));
    }

    #[test]
    fn test_missing_speed_not_due() {
        let rule = AutoEndRule::default();
        let history = history(&[false; 100]);
        assert!(!rule.is_due(&history, None, Some(0.0), 400.0, true));
    }
}
