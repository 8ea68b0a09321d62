//! Lens actuator control
//!
//! Position commands are fire-and-forget: the actuator gives no feedback of
//! its actual position, so callers model the settle time themselves with a
//! [`SettleModel`].
pub mod serial;

pub use serial::SerialActuator;

use crate::types::Degrees;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("Angle {angle} outside actuator range {min}..={max}")]
    OutOfRange {
        angle: Degrees,
        min: Degrees,
        max: Degrees,
    },

    #[error("Actuator link write failed: {0}")]
    Link(#[from] std::io::Error),

    #[error("Failed to open actuator port: {0}")]
    Port(#[from] serialport::Error),
}

/// Something that accepts position commands.
pub trait Actuator: Send + Sync {
    /// Send a single position command. Returns once the command is written,
    /// not once the actuator has settled.
    fn move_to(&self, angle: Degrees) -> Result<(), ActuatorError>;

    /// Inclusive range of angles the actuator accepts
    fn range(&self) -> (Degrees, Degrees) {
        (Degrees::MIN, Degrees::MAX)
    }

    /// Reject an angle without commanding anything
    fn check(&self, angle: Degrees) -> Result<(), ActuatorError> {
        let (min, max) = self.range();
        if angle < min || angle > max {
            return Err(ActuatorError::OutOfRange { angle, min, max });
        }
        Ok(())
    }
}

impl<A: Actuator + ?Sized> Actuator for Arc<A> {
    fn move_to(&self, angle: Degrees) -> Result<(), ActuatorError> {
        (**self).move_to(angle)
    }

    fn range(&self) -> (Degrees, Degrees) {
        (**self).range()
    }
}

/// Empirical settle-time model: a fixed cost per degree travelled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SettleModel {
    pub seconds_per_degree: f64,
}

impl SettleModel {
    pub const fn new(seconds_per_degree: f64) -> Self {
        Self { seconds_per_degree }
    }

    pub fn settle_time(&self, from: Degrees, to: Degrees) -> Duration {
        let seconds = self.seconds_per_degree * from.abs_diff(to) as f64;
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO)
    }
}

impl Default for SettleModel {
    fn default() -> Self {
        Self::new(0.005)
    }
}
