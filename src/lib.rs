//! # Flight Recorder Library
//!
//! Record flight simulator telemetry and detect takeoff and landing.
//!
//! This library samples a set of simulator variables at a fixed rate, tracks
//! the phase of flight from the ground/airborne signal, repairs missing
//! samples after the flight and exports the session as a JSON document.

pub mod config;
pub mod error;
pub mod postflight;
pub mod recorder;
pub mod session;
pub mod telemetry;
