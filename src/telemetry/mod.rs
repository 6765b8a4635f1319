//! # Telemetry Module
//!
//! Everything between the flight simulator and the recorded series.
//!
//! This module handles:
//! - Describing recorded variables ([`Channel`])
//! - Talking to a telemetry provider ([`TelemetrySource`])
//! - Folding provider failures into missing readings ([`TelemetryAdapter`])
//!
//! Providers report a failed read with the numeric marker
//! [`SENTINEL_FAILURE_VALUE`]. That marker is converted into `None` by
//! [`from_raw`] at the adapter boundary and never travels further.

pub mod adapter;
pub mod replay;
pub mod source;
pub mod tcp;

pub use adapter::TelemetryAdapter;
pub use replay::ReplaySource;
pub use source::TelemetrySource;
pub use tcp::TcpSource;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Value a provider returns when it has no valid reading for a channel.
pub const SENTINEL_FAILURE_VALUE: f64 = -999_999.0;

/// Number of decimal digits kept for every reading.
pub const READING_PRECISION: i32 = 4;

/// One telemetry reading. `None` means the provider failed this tick.
pub type Reading = Option<f64>;

/// Where a channel is drawn in the post-flight plot grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotPlacement {
    pub row: u8,
    pub column: u8,
}

/// A recorded telemetry variable.
///
/// # Examples
///
/// ```
/// use flight_recorder::telemetry::Channel;
///
/// let channel = Channel::new("G_FORCE", "G-force", "g");
/// assert_eq!(channel.key, "G_FORCE");
/// assert!(channel.plot.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Provider identifier, also the key in the session document.
    pub key: String,
    /// Human-readable name.
    pub name: String,
    /// Unit label.
    pub unit: String,
    #[serde(default)]
    pub plot: Option<PlotPlacement>,
}

impl Channel {
    #[must_use]
    pub fn new(key: impl Into<String>, name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            unit: unit.into(),
            plot: None,
        }
    }

    /// Places the channel in the plot grid.
    #[must_use]
    pub fn with_plot(mut self, row: u8, column: u8) -> Self {
        self.plot = Some(PlotPlacement { row, column });
        self
    }
}

/// The channels recorded when no channel list is configured.
#[must_use]
pub fn standard_channels() -> Vec<Channel> {
    vec![
        Channel::new("VERTICAL_SPEED", "Vertical speed", "ft/min").with_plot(1, 0),
        Channel::new("AIRSPEED_TRUE", "True airspeed", "knots").with_plot(0, 1),
        Channel::new("AIRSPEED_INDICATED", "Indicated airspeed", "knots").with_plot(0, 1),
        Channel::new("GROUND_VELOCITY", "Ground speed", "knots").with_plot(0, 1),
        Channel::new("PLANE_ALT_ABOVE_GROUND", "Radar altitude", "feet").with_plot(0, 0),
        Channel::new("PLANE_ALTITUDE", "Altitude (AMSL)", "feet").with_plot(0, 0),
        Channel::new("G_FORCE", "G-force", "g").with_plot(1, 1),
    ]
}

/// Parses the `key,name,unit` channel list format.
///
/// `#` starts a comment. Lines that do not hold exactly three fields are
/// skipped with a warning.
///
/// # Examples
///
/// ```
/// use flight_recorder::telemetry::parse_user_channels;
///
/// let text = "# fuel\nFUEL_TOTAL_QUANTITY,Fuel,gallons # total\n";
/// let channels = parse_user_channels(text);
/// assert_eq!(channels.len(), 1);
/// assert_eq!(channels[0].unit, "gallons");
/// ```
#[must_use]
pub fn parse_user_channels(text: &str) -> Vec<Channel> {
    let mut channels = Vec::new();

    for line in text.lines() {
        let content = line.split('#').next().unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }

        let fields: Vec<&str> = content.split(',').map(str::trim).collect();
        match fields.as_slice() {
            [key, name, unit] if !key.is_empty() => {
                channels.push(Channel::new(*key, *name, *unit));
            }
            _ => warn!("Skipping channel line: {}", line),
        }
    }

    channels
}

/// Rounds a raw value to [`READING_PRECISION`] decimal digits.
#[must_use]
pub fn round_reading(value: f64) -> f64 {
    let scale = 10f64.powi(READING_PRECISION);
    (value * scale).round() / scale
}

/// Converts a raw provider value into a [`Reading`].
///
/// The sentinel marker and non-finite values become `None`.
///
/// # Examples
///
/// ```
/// use flight_recorder::telemetry::{from_raw, SENTINEL_FAILURE_VALUE};
///
/// assert_eq!(from_raw(SENTINEL_FAILURE_VALUE), None);
/// assert_eq!(from_raw(12.345_678), Some(12.3457));
/// ```
#[must_use]
pub fn from_raw(raw: f64) -> Reading {
    if !raw.is_finite() || raw == SENTINEL_FAILURE_VALUE {
        None
    } else {
        Some(round_reading(raw))
    }
}
