use super::{check_frame_size, FocusMetric, MeasureError};
use crate::mask::Mask;
use crate::types::Resolution;

/// Discrete 4-neighbour Laplacian of a luma frame.
///
/// Borders follow scipy's `reflect` mode (half-sample symmetric): the
/// neighbour one pixel past the edge repeats the edge pixel.
pub fn laplacian(frame: &[u8], resolution: Resolution) -> Result<Vec<i32>, MeasureError> {
    check_frame_size(frame, resolution)?;

    let width = resolution.width as usize;
    let height = resolution.height as usize;
    let mut response = Vec::with_capacity(frame.len());

    for y in 0..height {
        for x in 0..width {
            response.push(response_at(frame, width, height, x, y));
        }
    }

    Ok(response)
}

#[inline]
fn response_at(frame: &[u8], width: usize, height: usize, x: usize, y: usize) -> i32 {
    let up = y.saturating_sub(1);
    let down = (y + 1).min(height - 1);
    let left = x.saturating_sub(1);
    let right = (x + 1).min(width - 1);

    let center = frame[y * width + x] as i32;
    frame[up * width + x] as i32
        + frame[down * width + x] as i32
        + frame[y * width + left] as i32
        + frame[y * width + right] as i32
        - 4 * center
}

/// Mean Laplacian magnitude over the masked pixels.
///
/// Evaluates the operator only where the mask is set; the result equals
/// running [`laplacian`] over the whole frame and averaging the selected
/// positions.
#[derive(Debug, Clone, Copy, Default)]
pub struct LaplacianMean;

impl FocusMetric for LaplacianMean {
    fn measure(&self, frame: &[u8], mask: &Mask) -> Result<f64, MeasureError> {
        let resolution = mask.resolution();
        check_frame_size(frame, resolution)?;

        let selected = mask.selected_count();
        if selected == 0 {
            return Err(MeasureError::EmptyMask);
        }

        let width = resolution.width as usize;
        let height = resolution.height as usize;
        let bits = mask.as_slice();
        let mut total: u64 = 0;

        for y in 0..height {
            let row = y * width;
            for x in 0..width {
                if bits[row + x] {
                    total += response_at(frame, width, height, x, y).unsigned_abs() as u64;
                }
            }
        }

        Ok(total as f64 / selected as f64)
    }

    fn name(&self) -> &'static str {
        "laplacian-mean"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard(resolution: Resolution, cell: u32, low: u8, high: u8) -> Vec<u8> {
        let mut data = Vec::with_capacity(resolution.pixels());
        for y in 0..resolution.height {
            for x in 0..resolution.width {
                let on = ((x / cell) + (y / cell)) % 2 == 0;
                data.push(if on { high } else { low });
            }
        }
        data
    }

    #[test]
    fn test_flat_frame_scores_zero() {
        let res = Resolution::new(16, 12);
        let frame = vec![128u8; res.pixels()];
        let score = LaplacianMean.measure(&frame, &Mask::full(res)).unwrap();
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_single_spike_response() {
        let res = Resolution::new(3, 3);
        let mut frame = vec![0u8; 9];
        frame[4] = 10;
        let response = laplacian(&frame, res).unwrap();
        assert_eq!(response[4], -40);
        assert_eq!(response[1], 10);
        assert_eq!(response[3], 10);
        assert_eq!(response[0], 0);
    }

    #[test]
    fn test_border_repeats_edge_pixel() {
        // A horizontal ramp has zero second derivative inside; past the
        // border the neighbour repeats the edge pixel.
        let res = Resolution::new(4, 1);
        let frame = vec![0u8, 10, 20, 30];
        let response = laplacian(&frame, res).unwrap();
        assert_eq!(response, vec![10, 0, 0, -10]);
    }

    #[test]
    fn test_corner_neighbours_repeat_edge() {
        // Two of the corner's four neighbours lie outside the frame and
        // repeat the corner itself, so only the in-frame ones contribute.
        let res = Resolution::new(2, 2);
        let frame = vec![50u8, 10, 30, 0];
        let response = laplacian(&frame, res).unwrap();
        assert_eq!(response[0], 10 + 30 - 2 * 50);
        assert_eq!(response[3], 10 + 30);
    }

    #[test]
    fn test_higher_contrast_scores_higher() {
        let res = Resolution::new(32, 24);
        let mask = Mask::full(res);
        let soft = checkerboard(res, 2, 110, 146);
        let hard = checkerboard(res, 2, 20, 236);
        let soft_score = LaplacianMean.measure(&soft, &mask).unwrap();
        let hard_score = LaplacianMean.measure(&hard, &mask).unwrap();
        assert!(hard_score > soft_score);
    }

    #[test]
    fn test_matches_full_response_average() {
        let res = Resolution::new(10, 8);
        let frame: Vec<u8> = (0..res.pixels()).map(|i| ((i * 37) % 251) as u8).collect();
        let bits: Vec<bool> = (0..res.pixels()).map(|i| i % 3 != 0).collect();
        let mask = Mask::from_bits(res, bits.clone()).unwrap();

        let response = laplacian(&frame, res).unwrap();
        let (sum, count) = response
            .iter()
            .zip(&bits)
            .filter(|(_, on)| **on)
            .fold((0u64, 0u64), |(s, c), (v, _)| (s + v.unsigned_abs() as u64, c + 1));

        let expected = sum as f64 / count as f64;
        assert_eq!(LaplacianMean.measure(&frame, &mask).unwrap(), expected);
    }

    #[test]
    fn test_wrong_frame_size() {
        let res = Resolution::new(8, 8);
        let err = LaplacianMean
            .measure(&[0u8; 10], &Mask::full(res))
            .unwrap_err();
        assert_eq!(
            err,
            MeasureError::FrameSize {
                resolution: res,
                expected: 64,
                got: 10
            }
        );
    }

    #[test]
    fn test_empty_mask() {
        let res = Resolution::new(4, 4);
        let mask = Mask::from_bits(res, vec![false; 16]).unwrap();
        assert_eq!(
            LaplacianMean.measure(&[0u8; 16], &mask),
            Err(MeasureError::EmptyMask)
        );
    }
}
