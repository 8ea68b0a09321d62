//! Peak selection over a completed sweep
//!
//! Measures are optionally smoothed with a 3-point median, then the angle
//! with the highest score wins. Unmeasured angles never win and never
//! contribute to their neighbours' medians.

use crate::config::AutofocusConfig;
use crate::errors::SweepError;
use crate::source::FrameSource;
use crate::sweep::{SweepDriver, SweepOutcome};
use crate::types::{AngleSequence, Degrees};
use serde::{Deserialize, Serialize};

/// The chosen focus position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocusPeak {
    pub index: usize,
    pub angle: Degrees,
    /// Score the peak was ranked by (filtered when smoothing is on)
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutofocusResult {
    pub outcome: SweepOutcome,
    pub peak: FocusPeak,
}

/// 3-point median filter.
///
/// Positions past either end count as 0.0. Unset neighbours are skipped, so
/// a window may hold two values, in which case their mean is used. Unset
/// slots stay unset.
pub fn median_filter(measures: &[Option<f64>]) -> Vec<Option<f64>> {
    measures
        .iter()
        .enumerate()
        .map(|(i, centre)| {
            let centre = (*centre)?;
            let before = if i == 0 { Some(0.0) } else { measures[i - 1] };
            let after = measures.get(i + 1).copied().unwrap_or(Some(0.0));

            let mut window: Vec<f64> = [before, Some(centre), after].into_iter().flatten().collect();
            window.sort_by(f64::total_cmp);
            Some(match window.len() {
                3 => window[1],
                2 => (window[0] + window[1]) / 2.0,
                _ => window[0],
            })
        })
        .collect()
}

/// Highest finite score. Ties go to the earliest angle.
pub fn select_peak(
    angles: &[Degrees],
    measures: &[Option<f64>],
    smooth: bool,
) -> Option<FocusPeak> {
    let filtered;
    let scores: &[Option<f64>] = if smooth {
        filtered = median_filter(measures);
        &filtered
    } else {
        measures
    };

    let mut best: Option<FocusPeak> = None;
    for (index, (angle, score)) in angles.iter().zip(scores).enumerate() {
        let Some(score) = score.filter(|s| s.is_finite()) else {
            continue;
        };
        if best.map_or(true, |peak| score > peak.score) {
            best = Some(FocusPeak {
                index,
                angle: *angle,
                score,
            });
        }
    }
    best
}

/// Min-max scale filled measures to 0.0..=1.0. A flat curve maps to all zeros.
pub fn normalize(measures: &[Option<f64>]) -> Vec<Option<f64>> {
    let filled = measures.iter().flatten().copied().filter(|v| v.is_finite());
    let (min, max) = filled.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let span = max - min;

    measures
        .iter()
        .map(|m| {
            m.filter(|v| v.is_finite()).map(|v| {
                if span > 0.0 {
                    (v - min) / span
                } else {
                    0.0
                }
            })
        })
        .collect()
}

/// Sweep `angles`, pick the sharpest position and move the actuator there.
pub fn autofocus(
    driver: &SweepDriver,
    angles: &AngleSequence,
    source: &mut dyn FrameSource,
    config: &AutofocusConfig,
) -> Result<AutofocusResult, SweepError> {
    let outcome = driver.run(angles, source)?;

    let insufficient = || SweepError::InsufficientCoverage {
        filled: outcome.filled(),
        total: outcome.measures.len(),
        required: config.min_coverage * 100.0,
    };

    if outcome.coverage() < config.min_coverage {
        return Err(insufficient());
    }

    let peak = select_peak(&outcome.angles, &outcome.measures, config.median_filter)
        .ok_or_else(insufficient)?;

    driver.actuator().move_to(peak.angle)?;
    log::info!(
        "Autofocused at {} degrees (index {}, score {:.4})",
        peak.angle,
        peak.index,
        peak.score
    );

    Ok(AutofocusResult { outcome, peak })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_filter_full_curve() {
        let filtered = median_filter(&[Some(1.0), Some(5.0), Some(2.0), Some(8.0)]);
        assert_eq!(
            filtered,
            vec![Some(1.0), Some(2.0), Some(5.0), Some(2.0)]
        );
    }

    #[test]
    fn test_median_filter_skips_unset() {
        let filtered = median_filter(&[Some(4.0), None, Some(6.0), Some(3.0)]);
        assert_eq!(filtered, vec![Some(2.0), None, Some(4.5), Some(3.0)]);
    }

    #[test]
    fn test_median_filter_removes_single_spike() {
        let measures = [
            Some(1.0),
            Some(50.0),
            Some(2.0),
            Some(4.0),
            Some(6.0),
            Some(5.0),
            Some(1.0),
        ];
        let angles = [10, 20, 30, 40, 50, 60, 70];

        assert_eq!(select_peak(&angles, &measures, false).unwrap().angle, 20);
        assert_eq!(select_peak(&angles, &measures, true).unwrap().angle, 50);
    }

    #[test]
    fn test_select_peak_ties_go_first() {
        let peak = select_peak(&[5, 10, 15], &[Some(2.0), Some(2.0), Some(1.0)], false).unwrap();
        assert_eq!(peak.index, 0);
    }

    #[test]
    fn test_select_peak_ignores_unset_and_nan() {
        let peak = select_peak(&[5, 10, 15], &[None, Some(f64::NAN), Some(0.5)], false).unwrap();
        assert_eq!(peak.angle, 15);
        assert!(select_peak(&[5, 10], &[None, None], true).is_none());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize(&[Some(2.0), None, Some(6.0), Some(4.0)]),
            vec![Some(0.0), None, Some(1.0), Some(0.5)]
        );
        assert_eq!(normalize(&[Some(3.0), Some(3.0)]), vec![Some(0.0), Some(0.0)]);
        assert_eq!(normalize(&[None]), vec![None]);
    }
}
