//! Frame sources
//!
//! A frame source owns the capture thread. It pushes every captured luma
//! frame into a [`FrameSink`] inline on that thread; the sink must return
//! quickly to keep the source at its target framerate.
#[cfg(feature = "camera")]
pub mod camera;

#[cfg(feature = "camera")]
pub use camera::NokhwaFrameSource;

use crate::errors::SweepError;
use crate::types::Resolution;
use std::time::{Duration, Instant};

/// Callback receiving `width * height` luma bytes and the capture instant.
/// The buffer is only valid for the duration of the call.
pub type FrameSink = Box<dyn FnMut(&[u8], Instant) + Send>;

pub trait FrameSource: Send {
    /// Apply capture resolution and framerate. Called before `start`.
    fn configure(&mut self, resolution: Resolution, framerate: u32) -> Result<(), SweepError>;

    /// Give automatic exposure and white balance time to converge
    fn calibrate(&mut self, settle: Duration) -> Result<(), SweepError> {
        std::thread::sleep(settle);
        Ok(())
    }

    /// Freeze the calibrated exposure so brightness stays constant across the sweep
    fn lock_exposure(&mut self) -> Result<(), SweepError> {
        Ok(())
    }

    /// Begin delivering frames to `sink`
    fn start(&mut self, sink: FrameSink) -> Result<(), SweepError>;

    /// Block the caller for roughly `interval` while streaming continues
    fn wait_for_interval(&mut self, interval: Duration) -> Result<(), SweepError> {
        std::thread::sleep(interval);
        Ok(())
    }

    /// Stop delivering frames. No sink call may happen after this returns.
    fn stop(&mut self) -> Result<(), SweepError>;
}
