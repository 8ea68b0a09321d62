//! Pixel selection mask applied to focus measures
//!
//! Masks are built once at sweep configuration time and shared read-only by
//! every measurement worker.

use crate::errors::SweepError;
use crate::types::Resolution;
use image::GrayImage;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    resolution: Resolution,
    bits: Vec<bool>,
    selected: usize,
}

impl Mask {
    /// A mask selecting every pixel
    pub fn full(resolution: Resolution) -> Self {
        Self {
            resolution,
            bits: vec![true; resolution.pixels()],
            selected: resolution.pixels(),
        }
    }

    /// Row-major selection bits, one per pixel
    pub fn from_bits(resolution: Resolution, bits: Vec<bool>) -> Result<Self, SweepError> {
        if bits.len() != resolution.pixels() {
            return Err(SweepError::config(format!(
                "mask has {} entries, expected {} for {}",
                bits.len(),
                resolution.pixels(),
                resolution
            )));
        }

        let selected = bits.iter().filter(|&&on| on).count();
        Ok(Self {
            resolution,
            bits,
            selected,
        })
    }

    /// Non-zero pixels are selected
    pub fn from_luma(image: &GrayImage) -> Self {
        let resolution = Resolution::new(image.width(), image.height());
        let bits: Vec<bool> = image.as_raw().iter().map(|&value| value != 0).collect();
        let selected = bits.iter().filter(|&&on| on).count();
        Self {
            resolution,
            bits,
            selected,
        }
    }

    /// Load a mask image from disk. Colour images are converted to luma first.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SweepError> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|e| SweepError::MaskLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let mask = Self::from_luma(&image.to_luma8());
        log::info!(
            "Loaded {} mask from {:?} ({} of {} pixels selected)",
            mask.resolution,
            path,
            mask.selected,
            mask.bits.len()
        );
        Ok(mask)
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn selected_count(&self) -> usize {
        self.selected
    }

    pub fn is_full(&self) -> bool {
        self.selected == self.bits.len()
    }

    pub fn is_selected(&self, x: u32, y: u32) -> bool {
        if x >= self.resolution.width || y >= self.resolution.height {
            return false;
        }
        self.bits[y as usize * self.resolution.width as usize + x as usize]
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.bits
    }

    /// Fail unless the mask covers exactly the capture resolution
    pub fn ensure_matches(&self, capture: Resolution) -> Result<(), SweepError> {
        if self.resolution != capture {
            return Err(SweepError::MaskResolution {
                mask: self.resolution,
                capture,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_full_mask() {
        let mask = Mask::full(Resolution::new(4, 3));
        assert!(mask.is_full());
        assert_eq!(mask.selected_count(), 12);
        assert!(mask.is_selected(3, 2));
        assert!(!mask.is_selected(4, 0));
    }

    #[test]
    fn test_from_luma_threshold() {
        let image = GrayImage::from_fn(4, 2, |x, _| if x < 2 { Luma([0]) } else { Luma([255]) });
        let mask = Mask::from_luma(&image);
        assert_eq!(mask.resolution(), Resolution::new(4, 2));
        assert_eq!(mask.selected_count(), 4);
        assert!(!mask.is_selected(0, 0));
        assert!(mask.is_selected(2, 1));
    }

    #[test]
    fn test_from_bits_length_mismatch() {
        let result = Mask::from_bits(Resolution::new(2, 2), vec![true; 3]);
        assert!(result.is_err());
    }

    #[test]
    fn test_ensure_matches() {
        let mask = Mask::full(Resolution::new(64, 48));
        assert!(mask.ensure_matches(Resolution::new(64, 48)).is_ok());
        assert!(matches!(
            mask.ensure_matches(Resolution::new(640, 480)),
            Err(SweepError::MaskResolution { .. })
        ));
    }

    #[test]
    fn test_load_round_trip_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.png");
        let image = GrayImage::from_fn(8, 6, |x, y| if (x + y) % 2 == 0 { Luma([1]) } else { Luma([0]) });
        image.save(&path).unwrap();

        let mask = Mask::load(&path).unwrap();
        assert_eq!(mask.resolution(), Resolution::new(8, 6));
        assert_eq!(mask.selected_count(), 24);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Mask::load("definitely/not/here.png");
        assert!(matches!(result, Err(SweepError::MaskLoad { .. })));
    }
}
