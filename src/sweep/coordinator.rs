//! Per-frame sweep state machine
//!
//! Runs inline on the frame source's delivery thread. Every call is
//! non-blocking: the only locks taken are the pool free list and the armed
//! worker's own slot, both held for a push, pop or buffer copy.

use super::pool::{PoolOptions, WorkerHandle, WorkerPool};
use crate::actuator::{Actuator, SettleModel};
use crate::errors::SweepError;
use crate::mask::Mask;
use crate::quality::FocusMetric;
use crate::types::{AngleSequence, Degrees, FocusMeasures, SweepStats};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where the sweep currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepState {
    pub current_index: usize,
    pub next_eligible: Instant,
    pub done: bool,
}

/// What the coordinator did with a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    /// Arrived before the actuator was modelled as settled
    Settling,
    /// Sent to a worker for the given angle index
    Dispatched { index: usize },
    /// Eligible, but no worker was reserved for it
    Dropped,
    /// The last angle has already been dispatched
    AfterDone,
}

#[derive(Debug, Clone, Copy)]
pub struct CoordinatorOptions {
    pub threads: usize,
    pub settle: SettleModel,
    pub worker_wait: Duration,
}

pub struct SweepCoordinator {
    angles: AngleSequence,
    settle: SettleModel,
    actuator: Arc<dyn Actuator>,
    /// Last angle the actuator accepted
    position: Degrees,
    pool: Arc<WorkerPool>,
    measures: Arc<FocusMeasures>,
    state: SweepState,
    reserved: Option<WorkerHandle>,
    done: Arc<AtomicBool>,
    stats: SweepStats,
    finished: bool,
}

impl SweepCoordinator {
    /// Spawn the worker pool and set up a sweep starting at index 0.
    ///
    /// The actuator is assumed to be at the first angle already; the first
    /// frame arriving at or after `start` is eligible.
    pub fn new(
        angles: AngleSequence,
        mask: Arc<Mask>,
        metric: Arc<dyn FocusMetric>,
        actuator: Arc<dyn Actuator>,
        options: CoordinatorOptions,
        start: Instant,
    ) -> Result<Self, SweepError> {
        let measures = Arc::new(FocusMeasures::new(angles.len()));
        let pool = WorkerPool::spawn(
            PoolOptions {
                threads: options.threads,
                wait_timeout: options.worker_wait,
                frame_bytes: mask.resolution().pixels(),
            },
            measures.clone(),
            mask,
            metric,
        )?;

        let position = angles.first();
        Ok(Self {
            angles,
            settle: options.settle,
            actuator,
            position,
            pool,
            measures,
            state: SweepState {
                current_index: 0,
                next_eligible: start,
                done: false,
            },
            reserved: None,
            done: Arc::new(AtomicBool::new(false)),
            stats: SweepStats::default(),
            finished: false,
        })
    }

    /// Handle one captured frame.
    pub fn on_frame(&mut self, frame: &[u8], arrival: Instant) -> FrameDisposition {
        self.stats.frames_seen += 1;

        if self.state.done {
            self.stats.ignored_after_done += 1;
            return FrameDisposition::AfterDone;
        }

        if arrival < self.state.next_eligible {
            self.stats.settling_skips += 1;
            return FrameDisposition::Settling;
        }

        let disposition = match self.reserved.take() {
            Some(worker) => {
                let index = self.state.current_index;
                self.pool.arm(worker, frame, index);
                self.stats.dispatched += 1;
                self.advance(arrival);
                FrameDisposition::Dispatched { index }
            }
            None => {
                self.stats.dropped_no_worker += 1;
                FrameDisposition::Dropped
            }
        };

        // Reserve a worker for the next eligible frame. An empty pool leaves
        // the reservation empty, which holds the actuator where it is until
        // a worker frees up.
        self.reserved = self.pool.acquire();
        if self.reserved.is_none() && !self.state.done {
            log::trace!(
                "No idle worker; holding at angle index {}",
                self.state.current_index
            );
        }

        disposition
    }

    /// Command the next angle. A failed command leaves that angle's slot
    /// unset and moves on to the one after it.
    fn advance(&mut self, arrival: Instant) {
        let mut index = self.state.current_index;
        loop {
            if index == self.angles.last_index() {
                self.state.current_index = index;
                self.state.done = true;
                self.done.store(true, Ordering::SeqCst);
                log::info!("No angles left after index {}", index);
                return;
            }

            index += 1;
            let Some(to) = self.angles.get(index) else {
                return;
            };

            match self.actuator.move_to(to) {
                Ok(()) => {
                    let from = self.position;
                    self.position = to;
                    self.state.current_index = index;
                    self.stats.moves += 1;
                    self.state.next_eligible = arrival + self.settle.settle_time(from, to);
                    log::debug!(
                        "Advanced to index {} ({} degrees), eligible in {:?}",
                        index,
                        to,
                        self.state.next_eligible.saturating_duration_since(arrival)
                    );
                    return;
                }
                Err(e) => {
                    self.stats.failed_moves += 1;
                    log::warn!(
                        "Move to {} degrees failed, index {} stays unmeasured: {}",
                        to,
                        index,
                        e
                    );
                }
            }
        }
    }

    pub fn state(&self) -> SweepState {
        self.state
    }

    pub fn stats(&self) -> SweepStats {
        self.stats
    }

    pub fn is_done(&self) -> bool {
        self.state.done
    }

    /// Shared flag for pollers on other threads
    pub fn done_flag(&self) -> Arc<AtomicBool> {
        self.done.clone()
    }

    pub fn has_reservation(&self) -> bool {
        self.reserved.is_some()
    }

    pub fn measures(&self) -> Arc<FocusMeasures> {
        self.measures.clone()
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Orderly shutdown once frames have stopped arriving.
    ///
    /// Returns the reservation to the pool and drains every worker. Only
    /// after this returns `Ok` are all measures final. May be retried after
    /// a timeout.
    pub fn finish(&mut self, join_timeout: Duration) -> Result<(), SweepError> {
        if self.finished {
            return Ok(());
        }

        if let Some(worker) = self.reserved.take() {
            self.pool.release(worker);
        }

        self.pool.shutdown(join_timeout)?;
        self.finished = true;
        log::info!(
            "Sweep finished: {}/{} slots filled, {} dispatched, {} dropped, {} settling skips",
            self.measures.filled(),
            self.measures.len(),
            self.stats.dispatched,
            self.stats.dropped_no_worker,
            self.stats.settling_skips
        );
        Ok(())
    }
}

impl Drop for SweepCoordinator {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.finish(Duration::from_millis(100)) {
                log::warn!("Error finishing sweep in drop: {}", e);
            }
        }
    }
}
