//! Adaptive Bitrate Control
//!
//! Converts round-trip-time and packets-in-flight telemetry into a target
//! video encoder bitrate. The controller is a plain synchronous object: an
//! external caller feeds it one [`StreamStats`] sample roughly every 200 ms
//! and it notifies a delegate whenever the bitrate should change.

pub mod controller;
pub mod settings;

pub use controller::{AdaptiveBitrateController, AdaptiveBitrateDelegate, StreamStats};
pub use settings::{AdaptiveBitrateSettings, FAST_SETTINGS, SLOW_SETTINGS};
