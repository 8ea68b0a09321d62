//! servofocus: servo-driven autofocus for fixed-lens cameras
//!
//! A servo turns the focus ring through a list of angles while the camera
//! streams. Each frame that arrives after the servo has settled is scored for
//! sharpness by a pool of worker threads, giving one focus measure per angle.
//! The sharpest angle is then picked and the servo parked there.
//!
//! # Features
//! - Non-blocking per-frame coordination on the capture thread
//! - Bounded measurement worker pool with write-once result slots
//! - Masked Laplacian focus measure
//! - Median-filtered peak selection
//! - Simulated lens, actuator and frame source for offline testing
//! - Live camera capture through nokhwa (feature `camera`)
//!
//! # Usage
//! ```rust,no_run
//! use servofocus::{autofocus, SerialActuator, ServofocusConfig, SweepDriver};
//! use std::sync::Arc;
//!
//! # fn run(source: &mut dyn servofocus::FrameSource) -> Result<(), servofocus::SweepError> {
//! let config = ServofocusConfig::load_or_default();
//! let actuator = SerialActuator::open(
//!     &config.actuator.device,
//!     config.actuator.baud,
//!     config.actuator.min_angle,
//!     config.actuator.max_angle,
//! )?;
//! let driver = SweepDriver::new(config.sweep.clone(), Arc::new(actuator));
//! let result = autofocus(&driver, &config.angles.sequence()?, source, &config.autofocus)?;
//! println!("best focus at {} degrees", result.peak.angle);
//! # Ok(())
//! # }
//! ```
pub mod actuator;
pub mod autofocus;
pub mod config;
pub mod errors;
pub mod mask;
pub mod quality;
pub mod source;
pub mod sweep;
pub mod types;

// Testing utilities - simulated hardware for offline testing
pub mod testing;

// Re-exports for convenience
pub use actuator::{Actuator, ActuatorError, SerialActuator, SettleModel};
pub use autofocus::{autofocus, normalize, select_peak, AutofocusResult, FocusPeak};
pub use config::ServofocusConfig;
pub use errors::SweepError;
pub use mask::Mask;
pub use quality::{FocusMetric, LaplacianMean, MeasureError};
pub use source::{FrameSink, FrameSource};
pub use sweep::{SweepCoordinator, SweepDriver, SweepOutcome, SweepTermination};
pub use types::{AngleSequence, Degrees, FocusMeasures, Resolution, SweepStats};

/// Initialize logging for the sweep pipeline
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "servofocus=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        camera_support: cfg!(feature = "camera"),
        default_metric: LaplacianMean.name().to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    /// Built with the live camera frame source
    pub camera_support: bool,
    pub default_metric: String,
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_info() {
        let info = get_info();
        assert_eq!(info.name, "servofocus");
        assert!(!info.version.is_empty());
        assert!(!info.description.is_empty());
        assert_eq!(info.default_metric, "laplacian-mean");
    }

    #[test]
    fn test_init_logging_is_repeatable() {
        init_logging();
        init_logging();
    }
}
