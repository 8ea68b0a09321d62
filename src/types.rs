//! Core data types shared across the sweep pipeline

use crate::errors::SweepError;
use crate::quality::MeasureError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Actuator position in whole degrees.
pub type Degrees = u16;

/// Capture resolution in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels in one single-channel frame
    pub fn pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<[u32; 2]> for Resolution {
    fn from(value: [u32; 2]) -> Self {
        Self::new(value[0], value[1])
    }
}

/// Ordered, immutable list of target positions. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AngleSequence {
    angles: Vec<Degrees>,
}

impl AngleSequence {
    pub fn new(angles: Vec<Degrees>) -> Result<Self, SweepError> {
        if angles.is_empty() {
            return Err(SweepError::config("angle sequence must not be empty"));
        }
        Ok(Self { angles })
    }

    /// Angles from `start` towards `end` in increments of `step`.
    ///
    /// `end` is included when it lands on a step. A descending sweep is
    /// produced when `start > end`.
    pub fn range(start: Degrees, end: Degrees, step: Degrees) -> Result<Self, SweepError> {
        if step == 0 {
            return Err(SweepError::config("angle step must be greater than zero"));
        }

        let angles: Vec<Degrees> = if start <= end {
            (start..=end).step_by(step as usize).collect()
        } else {
            (end..=start).rev().step_by(step as usize).collect()
        };

        Self::new(angles)
    }

    pub fn len(&self) -> usize {
        self.angles.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.angles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Degrees> {
        self.angles.get(index).copied()
    }

    pub fn first(&self) -> Degrees {
        self.angles[0]
    }

    pub fn last_index(&self) -> usize {
        self.angles.len() - 1
    }

    pub fn as_slice(&self) -> &[Degrees] {
        &self.angles
    }

    pub fn iter(&self) -> impl Iterator<Item = Degrees> + '_ {
        self.angles.iter().copied()
    }
}

/// One write-once slot per angle.
///
/// Slots are written concurrently by measurement workers; each index has
/// exactly one writer, enforced by the write-once cell rather than a lock.
#[derive(Debug)]
pub struct FocusMeasures {
    slots: Vec<OnceLock<f64>>,
}

impl FocusMeasures {
    pub fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| OnceLock::new()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Store the measure for `index`. A second write to the same slot is rejected.
    pub fn record(&self, index: usize, value: f64) -> Result<(), MeasureError> {
        let slot = self.slots.get(index).ok_or(MeasureError::SlotOutOfRange {
            index,
            len: self.slots.len(),
        })?;
        slot.set(value)
            .map_err(|_| MeasureError::SlotAlreadyWritten { index })
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.slots.get(index).and_then(|slot| slot.get().copied())
    }

    pub fn filled(&self) -> usize {
        self.slots.iter().filter(|slot| slot.get().is_some()).count()
    }

    pub fn snapshot(&self) -> Vec<Option<f64>> {
        self.slots.iter().map(|slot| slot.get().copied()).collect()
    }
}

/// Per-sweep frame accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepStats {
    /// Every frame handed to the coordinator
    pub frames_seen: u64,
    /// Frames that arrived while the actuator was still settling
    pub settling_skips: u64,
    /// Eligible frames dropped because no worker was reserved
    pub dropped_no_worker: u64,
    /// Frames handed to a measurement worker
    pub dispatched: u64,
    /// Position commands issued after the initial one
    pub moves: u64,
    /// Position commands the actuator rejected; their slots stay unset
    pub failed_moves: u64,
    /// Frames delivered after the last angle was dispatched
    pub ignored_after_done: u64,
}
