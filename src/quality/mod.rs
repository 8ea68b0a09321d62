/// Focus quality measurement
///
/// Scores how sharp a single-channel frame is within a mask. Scores are only
/// comparable between frames of the same scene and resolution; they are used
/// to rank actuator positions, not as absolute quality figures.
pub mod laplacian;

pub use laplacian::{laplacian, LaplacianMean};

use crate::mask::Mask;
use crate::types::Resolution;
use thiserror::Error;

/// Failures of a single measurement. None of these abort a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeasureError {
    #[error("Frame has {got} bytes, expected {expected} for {resolution}")]
    FrameSize {
        resolution: Resolution,
        expected: usize,
        got: usize,
    },

    #[error("Mask selects no pixels")]
    EmptyMask,

    #[error("Slot {index} out of range for {len} angles")]
    SlotOutOfRange { index: usize, len: usize },

    #[error("Slot {index} already holds a measure")]
    SlotAlreadyWritten { index: usize },
}

/// A sharpness score over the masked region of a frame. Higher is sharper.
pub trait FocusMetric: Send + Sync {
    fn measure(&self, frame: &[u8], mask: &Mask) -> Result<f64, MeasureError>;

    fn name(&self) -> &'static str;
}

pub(crate) fn check_frame_size(frame: &[u8], resolution: Resolution) -> Result<(), MeasureError> {
    let expected = resolution.pixels();
    if frame.len() != expected {
        return Err(MeasureError::FrameSize {
            resolution,
            expected,
            got: frame.len(),
        });
    }
    Ok(())
}
