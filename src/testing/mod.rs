//! Testing utilities for servofocus
//!
//! Simulated hardware and synthetic frames so the whole sweep pipeline can be
//! exercised offline, without a camera or a servo controller attached.

pub mod simulated;
pub mod synthetic_data;

pub use simulated::{GatedMetric, SimulatedActuator, SimulatedFrameSource, SimulatedLens};
pub use synthetic_data::{flat_frame, focus_pattern};
