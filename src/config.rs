//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and field is optional. The recording core never sees this
//! type; it receives [`SessionSettings`] and a channel list built from it.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RecorderError, Result};
use crate::recorder::RunOptions;
use crate::session::{AutoEndRule, PhaseRules, SessionSettings};
use crate::telemetry::{parse_user_channels, standard_channels, Channel};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub auto_end: AutoEndConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Recorded channels, in order. Empty means the standard set.
    #[serde(default)]
    pub channels: Vec<Channel>,
}

/// Sampling and phase detection configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RecorderConfig {
    #[serde(default = "default_tick_rate_hz")]
    pub tick_rate_hz: u32,

    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default = "default_debounce_ticks")]
    pub debounce_ticks: usize,

    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    #[serde(default = "default_taxi_speed_knots")]
    pub taxi_speed_knots: f64,

    #[serde(default = "default_ground_channel")]
    pub ground_channel: String,

    #[serde(default = "default_ground_speed_channel")]
    pub ground_speed_channel: String,

    #[serde(default = "default_vertical_speed_channel")]
    pub vertical_speed_channel: String,

    /// Extra channels in `key,name,unit` lines, appended after `[[channels]]`
    #[serde(default)]
    pub channels_file: Option<PathBuf>,
}

/// Automatic end-of-flight configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AutoEndConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_min_elapsed_s")]
    pub min_elapsed_s: f64,

    #[serde(default = "default_max_speed")]
    pub max_speed: f64,

    #[serde(default = "default_standstill_speed")]
    pub standstill_speed: f64,
}

/// Telemetry provider configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_source_address")]
    pub address: String,
}

/// Export configuration
#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: String,
}

/// Log file configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Also write a daily log file into the output directory
    #[serde(default = "default_log_file")]
    pub file: bool,
}

// Default value functions
fn default_tick_rate_hz() -> u32 { 4 }
fn default_read_timeout_ms() -> u64 { 100 }
fn default_debounce_ticks() -> usize { 3 }
fn default_history_capacity() -> usize { 100 }
fn default_taxi_speed_knots() -> f64 { 1.0 }
fn default_ground_channel() -> String { "SIM_ON_GROUND".to_string() }
fn default_ground_speed_channel() -> String { "GROUND_VELOCITY".to_string() }
fn default_vertical_speed_channel() -> String { "VERTICAL_SPEED".to_string() }

fn default_min_elapsed_s() -> f64 { 50.0 }
fn default_max_speed() -> f64 { 30.0 }
fn default_standstill_speed() -> f64 { 2.0 }

fn default_source_address() -> String { "127.0.0.1:5077".to_string() }
fn default_output_dir() -> String { "./data".to_string() }
fn default_log_file() -> bool { true }

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: default_tick_rate_hz(),
            read_timeout_ms: default_read_timeout_ms(),
            debounce_ticks: default_debounce_ticks(),
            history_capacity: default_history_capacity(),
            taxi_speed_knots: default_taxi_speed_knots(),
            ground_channel: default_ground_channel(),
            ground_speed_channel: default_ground_speed_channel(),
            vertical_speed_channel: default_vertical_speed_channel(),
            channels_file: None,
        }
    }
}

impl Default for AutoEndConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_elapsed_s: default_min_elapsed_s(),
            max_speed: default_max_speed(),
            standstill_speed: default_standstill_speed(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self { address: default_source_address() }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { dir: default_output_dir() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { file: default_log_file() }
    }
}

fn invalid(message: impl std::fmt::Display) -> RecorderError {
    RecorderError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use flight_recorder::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        let recorder = &self.recorder;

        if recorder.tick_rate_hz == 0 || recorder.tick_rate_hz > 60 {
            return Err(invalid("tick_rate_hz must be between 1 and 60"));
        }

        if recorder.read_timeout_ms == 0 || recorder.read_timeout_ms > 10000 {
            return Err(invalid("read_timeout_ms must be between 1 and 10000"));
        }

        // A single hung read must not outlast a tick
        if recorder.read_timeout_ms * u64::from(recorder.tick_rate_hz) > 1000 {
            return Err(invalid(format!(
                "read_timeout_ms must not exceed the tick period ({} ms at {} Hz)",
                1000 / recorder.tick_rate_hz,
                recorder.tick_rate_hz
            )));
        }

        if recorder.debounce_ticks == 0 || recorder.debounce_ticks > 20 {
            return Err(invalid("debounce_ticks must be between 1 and 20"));
        }

        if recorder.history_capacity < recorder.debounce_ticks {
            return Err(invalid("history_capacity must be at least debounce_ticks"));
        }

        if !recorder.taxi_speed_knots.is_finite() || recorder.taxi_speed_knots < 0.0 {
            return Err(invalid("taxi_speed_knots must be a non-negative number"));
        }

        for (name, value) in [
            ("ground_channel", &recorder.ground_channel),
            ("ground_speed_channel", &recorder.ground_speed_channel),
            ("vertical_speed_channel", &recorder.vertical_speed_channel),
        ] {
            if value.is_empty() {
                return Err(invalid(format!("{} cannot be empty", name)));
            }
        }

        for (name, value) in [
            ("min_elapsed_s", self.auto_end.min_elapsed_s),
            ("max_speed", self.auto_end.max_speed),
            ("standstill_speed", self.auto_end.standstill_speed),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!("auto_end {} must be a non-negative number", name)));
            }
        }

        if self.source.address.is_empty() {
            return Err(invalid("source address cannot be empty"));
        }

        if self.output.dir.is_empty() {
            return Err(invalid("output dir cannot be empty"));
        }

        // Duplicates would only surface at the first start otherwise
        for (i, channel) in self.channels.iter().enumerate() {
            if channel.key.is_empty() {
                return Err(invalid("channel key cannot be empty"));
            }
            if self.channels[..i].iter().any(|c| c.key == channel.key) {
                return Err(invalid(format!("channel {} is listed twice", channel.key)));
            }
        }

        Ok(())
    }

    /// Channels to record: `[[channels]]` (or the standard set) followed by
    /// the entries of `channels_file`, if configured.
    ///
    /// # Errors
    ///
    /// Returns error if `channels_file` cannot be read
    pub fn channels(&self) -> Result<Vec<Channel>> {
        let mut channels = if self.channels.is_empty() {
            standard_channels()
        } else {
            self.channels.clone()
        };

        if let Some(path) = &self.recorder.channels_file {
            let text = fs::read_to_string(path)?;
            channels.extend(parse_user_channels(&text));
        }

        Ok(channels)
    }

    #[must_use]
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            phase: PhaseRules {
                debounce_ticks: self.recorder.debounce_ticks,
                taxi_speed_knots: self.recorder.taxi_speed_knots,
            },
            history_capacity: self.recorder.history_capacity,
            ground_channel: self.recorder.ground_channel.clone(),
            ground_speed_channel: self.recorder.ground_speed_channel.clone(),
            vertical_speed_channel: self.recorder.vertical_speed_channel.clone(),
            auto_end: AutoEndRule {
                min_elapsed_s: self.auto_end.min_elapsed_s,
                max_speed: self.auto_end.max_speed,
                standstill_speed: self.auto_end.standstill_speed,
            },
        }
    }

    #[must_use]
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            tick_rate_hz: self.recorder.tick_rate_hz,
            auto_end: self.auto_end.enabled,
        }
    }

    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.recorder.read_timeout_ms)
    }

    #[must_use]
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.recorder.tick_rate_hz.max(1)))
    }

    /// Whether one tick over `channels` can outlast the tick period when
    /// every read times out. The ground channel is read even if unlisted.
    #[must_use]
    pub fn tick_may_overrun(&self, channels: &[Channel]) -> bool {
        let ground_listed = channels.iter().any(|c| c.key == self.recorder.ground_channel);
        let reads = channels.len() + usize::from(!ground_listed);
        let reads = u32::try_from(reads).unwrap_or(u32::MAX);
        self.read_timeout().saturating_mul(reads) > self.tick_period()
    }
}
