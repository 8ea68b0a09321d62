//! Sweep orchestration
//!
//! Positions the actuator, prepares the frame source, streams frames into a
//! [`SweepCoordinator`] and polls until the sweep completes, times out or is
//! cancelled. Timeout and cancellation return partial results.

use super::coordinator::{CoordinatorOptions, SweepCoordinator};
use crate::actuator::Actuator;
use crate::config::SweepConfig;
use crate::errors::SweepError;
use crate::mask::Mask;
use crate::quality::{FocusMetric, LaplacianMean};
use crate::source::FrameSource;
use crate::types::{AngleSequence, Degrees, SweepStats};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Why the poll loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepTermination {
    Completed,
    TimedOut,
    Cancelled,
}

/// Result of one sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepOutcome {
    pub sweep_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub angles: Vec<Degrees>,
    /// One entry per angle; `None` where no measure was taken
    pub measures: Vec<Option<f64>>,
    pub done: bool,
    pub termination: SweepTermination,
    pub stats: SweepStats,
    pub elapsed_ms: u64,
}

impl SweepOutcome {
    pub fn filled(&self) -> usize {
        self.measures.iter().filter(|m| m.is_some()).count()
    }

    /// Fraction of slots holding a measure, 0.0 to 1.0
    pub fn coverage(&self) -> f64 {
        if self.measures.is_empty() {
            return 0.0;
        }
        self.filled() as f64 / self.measures.len() as f64
    }

    pub fn is_complete(&self) -> bool {
        self.filled() == self.measures.len()
    }
}

/// Runs sweeps against one actuator.
pub struct SweepDriver {
    config: SweepConfig,
    actuator: Arc<dyn Actuator>,
    mask: Option<Arc<Mask>>,
    metric: Arc<dyn FocusMetric>,
    cancel: Option<Arc<AtomicBool>>,
}

impl SweepDriver {
    pub fn new(config: SweepConfig, actuator: Arc<dyn Actuator>) -> Self {
        Self {
            config,
            actuator,
            mask: None,
            metric: Arc::new(LaplacianMean),
            cancel: None,
        }
    }

    /// Restrict measures to the selected pixels. Without a mask the whole frame counts.
    pub fn with_mask(mut self, mask: Mask) -> Self {
        self.mask = Some(Arc::new(mask));
        self
    }

    pub fn with_metric(mut self, metric: Arc<dyn FocusMetric>) -> Self {
        self.metric = metric;
        self
    }

    /// Setting the flag stops the sweep at the next poll, like a timeout
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    pub fn actuator(&self) -> &Arc<dyn Actuator> {
        &self.actuator
    }

    /// Sweep through `angles`, measuring one frame per angle.
    pub fn run(
        &self,
        angles: &AngleSequence,
        source: &mut dyn FrameSource,
    ) -> Result<SweepOutcome, SweepError> {
        self.config.validate()?;
        let resolution = self.config.resolution();
        let mask = match &self.mask {
            Some(mask) => {
                mask.ensure_matches(resolution)?;
                mask.clone()
            }
            None => Arc::new(Mask::full(resolution)),
        };

        for angle in angles.iter() {
            self.actuator
                .check(angle)
                .map_err(|e| SweepError::config(format!("sweep angle rejected: {}", e)))?;
        }

        let sweep_id = Uuid::new_v4();
        let started_at = Utc::now();
        log::info!(
            "Sweep {} starting: {} angles from {} degrees, {} at {} fps, {} workers",
            sweep_id,
            angles.len(),
            angles.first(),
            resolution,
            self.config.framerate,
            self.config.threads
        );

        self.actuator.move_to(angles.first())?;

        source.configure(resolution, self.config.framerate)?;
        if let Err(e) = source
            .calibrate(self.config.calibration())
            .and_then(|_| source.lock_exposure())
        {
            stop_after_failure(source);
            return Err(e);
        }

        let start = Instant::now();
        let coordinator = SweepCoordinator::new(
            angles.clone(),
            mask,
            self.metric.clone(),
            self.actuator.clone(),
            CoordinatorOptions {
                threads: self.config.threads,
                settle: self.config.settle_model(),
                worker_wait: self.config.worker_wait(),
            },
            start,
        );
        let coordinator = match coordinator {
            Ok(coordinator) => coordinator,
            Err(e) => {
                stop_after_failure(source);
                return Err(e);
            }
        };
        let done = coordinator.done_flag();
        let measures = coordinator.measures();
        let coordinator = Arc::new(Mutex::new(coordinator));

        let sink_coordinator = coordinator.clone();
        let started = source.start(Box::new(move |frame: &[u8], arrival: Instant| {
            sink_coordinator
                .lock()
                .expect("lock poisoned")
                .on_frame(frame, arrival);
        }));

        let polled = match started {
            Ok(()) => self.poll(source, &done, start),
            Err(e) => Err(e),
        };

        let stopped = source.stop();
        let (finished, stats) = {
            let mut coordinator = coordinator.lock().expect("lock poisoned");
            (
                coordinator.finish(self.config.shutdown_timeout()),
                coordinator.stats(),
            )
        };

        finished?;
        let termination = polled?;
        stopped?;

        let outcome = SweepOutcome {
            sweep_id,
            started_at,
            angles: angles.as_slice().to_vec(),
            measures: measures.snapshot(),
            done: done.load(Ordering::SeqCst),
            termination,
            stats,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };

        match termination {
            SweepTermination::Completed => log::info!(
                "Sweep {} completed in {} ms",
                sweep_id,
                outcome.elapsed_ms
            ),
            SweepTermination::TimedOut | SweepTermination::Cancelled => log::warn!(
                "Sweep {} ended early ({:?}): {}/{} slots filled",
                sweep_id,
                termination,
                outcome.filled(),
                outcome.measures.len()
            ),
        }

        Ok(outcome)
    }

    fn poll(
        &self,
        source: &mut dyn FrameSource,
        done: &AtomicBool,
        start: Instant,
    ) -> Result<SweepTermination, SweepError> {
        let timeout = self.config.timeout();
        let interval = self.config.poll_interval();

        loop {
            if done.load(Ordering::SeqCst) {
                return Ok(SweepTermination::Completed);
            }
            if self.is_cancelled() {
                return Ok(SweepTermination::Cancelled);
            }
            if start.elapsed() >= timeout {
                return Ok(SweepTermination::TimedOut);
            }
            source.wait_for_interval(interval)?;
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

fn stop_after_failure(source: &mut dyn FrameSource) {
    if let Err(e) = source.stop() {
        log::warn!("Error stopping frame source after failed setup: {}", e);
    }
}
