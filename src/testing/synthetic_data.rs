//! Synthetic luma frames
//!
//! A checkerboard stands in for a textured scene. Defocus is modelled as a
//! loss of contrast around mid-grey, which lowers the Laplacian response
//! monotonically without needing a real blur kernel.

use crate::types::Resolution;
use image::{GrayImage, Luma};

const CELL: u32 = 4;
const MID_GREY: f64 = 128.0;
const MAX_SWING: f64 = 100.0;

/// Checkerboard whose contrast falls off as `1 / (1 + defocus)`.
///
/// `defocus` is in arbitrary units; 0.0 is perfectly sharp and negative
/// values are treated as 0.0.
pub fn focus_pattern(resolution: Resolution, defocus: f64) -> Vec<u8> {
    let swing = MAX_SWING / (1.0 + defocus.max(0.0));
    let light = (MID_GREY + swing).round().clamp(0.0, 255.0) as u8;
    let dark = (MID_GREY - swing).round().clamp(0.0, 255.0) as u8;

    GrayImage::from_fn(resolution.width, resolution.height, |x, y| {
        if (x / CELL + y / CELL) % 2 == 0 {
            Luma([light])
        } else {
            Luma([dark])
        }
    })
    .into_raw()
}

/// Uniform frame; every focus measure on it is zero
pub fn flat_frame(resolution: Resolution, value: u8) -> Vec<u8> {
    vec![value; resolution.pixels()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::Mask;
    use crate::quality::{FocusMetric, LaplacianMean};

    const RES: Resolution = Resolution::new(32, 24);

    #[test]
    fn test_pattern_size() {
        assert_eq!(focus_pattern(RES, 0.0).len(), RES.pixels());
        assert_eq!(flat_frame(RES, 7).len(), RES.pixels());
    }

    #[test]
    fn test_sharper_pattern_scores_higher() {
        let mask = Mask::full(RES);
        let metric = LaplacianMean;
        let sharp = metric.measure(&focus_pattern(RES, 0.0), &mask).unwrap();
        let soft = metric.measure(&focus_pattern(RES, 1.0), &mask).unwrap();
        let blurred = metric.measure(&focus_pattern(RES, 9.0), &mask).unwrap();

        assert!(sharp > soft);
        assert!(soft > blurred);
        assert_eq!(metric.measure(&flat_frame(RES, 90), &mask).unwrap(), 0.0);
    }
}
