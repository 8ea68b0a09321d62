use crate::actuator::ActuatorError;
use crate::types::Resolution;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that reach the caller of a sweep.
///
/// Per-frame failures (bad frame shape, pool exhaustion, a failed move
/// command mid-sweep) are handled inside the pipeline and never show up here.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Mask resolution {mask} does not match capture resolution {capture}")]
    MaskResolution {
        mask: Resolution,
        capture: Resolution,
    },

    #[error("Failed to load mask from {path:?}: {message}")]
    MaskLoad { path: PathBuf, message: String },

    #[error("Config file error: {0}")]
    ConfigFile(String),

    #[error("Frame source error: {0}")]
    FrameSource(String),

    #[error("Actuator error: {0}")]
    Actuator(#[from] ActuatorError),

    #[error("Failed to spawn measurement worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Shutdown timed out with {outstanding} worker(s) still outstanding")]
    ShutdownTimeout { outstanding: usize },

    #[error("Insufficient coverage: {filled} of {total} slots filled, need {required:.0}%")]
    InsufficientCoverage {
        filled: usize,
        total: usize,
        required: f64,
    },
}

impl SweepError {
    pub fn config(message: impl Into<String>) -> Self {
        SweepError::Config(message.into())
    }

    pub fn frame_source(message: impl Into<String>) -> Self {
        SweepError::FrameSource(message.into())
    }

    /// Configuration errors are raised before any hardware is touched.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SweepError::Config(_)
                | SweepError::MaskResolution { .. }
                | SweepError::MaskLoad { .. }
                | SweepError::ConfigFile(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_resolution_display() {
        let err = SweepError::MaskResolution {
            mask: Resolution::new(320, 240),
            capture: Resolution::new(640, 480),
        };
        assert_eq!(
            err.to_string(),
            "Mask resolution 320x240 does not match capture resolution 640x480"
        );
        assert!(err.is_configuration());
    }

    #[test]
    fn test_shutdown_timeout_is_not_configuration() {
        let err = SweepError::ShutdownTimeout { outstanding: 2 };
        assert!(err.to_string().contains("2 worker(s)"));
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_coverage_display() {
        let err = SweepError::InsufficientCoverage {
            filled: 3,
            total: 10,
            required: 50.0,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient coverage: 3 of 10 slots filled, need 50%"
        );
    }
}
