//! Fixed-size pool of measurement workers
//!
//! The pool is an arena of worker slots plus a mutex-protected stack of idle
//! slot indices. `acquire` never blocks: when every worker is busy it returns
//! `None` and the caller drops the frame. The pool also owns the count of
//! outstanding worker threads so shutdown knows when it is finished.

use super::worker::{self, WorkerContext};
use crate::errors::SweepError;
use crate::mask::Mask;
use crate::quality::FocusMetric;
use crate::types::FocusMeasures;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Exclusive claim on one idle worker.
///
/// Handles are only minted by the pool and are neither `Clone` nor `Copy`,
/// so a worker is never reachable from both the free list and a caller.
#[derive(Debug, PartialEq, Eq)]
pub struct WorkerHandle {
    pub(super) id: usize,
}

impl WorkerHandle {
    pub fn id(&self) -> usize {
        self.id
    }
}

pub(crate) struct WorkerSlot {
    pub(crate) state: Mutex<SlotState>,
    pub(crate) signal: Condvar,
}

/// Per-job payload lives here, separate from the handle that names the worker.
pub(crate) struct SlotState {
    pub(crate) job: Option<usize>,
    pub(crate) frame: Vec<u8>,
    pub(crate) terminated: bool,
}

/// Worker thread settings
#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    pub threads: usize,
    /// Upper bound on one idle wait before the termination flag is rechecked
    pub wait_timeout: Duration,
    /// Bytes reserved up front for each worker's frame copy
    pub frame_bytes: usize,
}

pub struct WorkerPool {
    slots: Vec<WorkerSlot>,
    free: Mutex<Vec<usize>>,
    threads: Mutex<Vec<Option<JoinHandle<()>>>>,
    outstanding: AtomicUsize,
}

impl WorkerPool {
    /// Spawn `options.threads` workers that score frames with `metric`
    /// and write into `measures`.
    pub fn spawn(
        options: PoolOptions,
        measures: Arc<FocusMeasures>,
        mask: Arc<Mask>,
        metric: Arc<dyn FocusMetric>,
    ) -> Result<Arc<Self>, SweepError> {
        if options.threads == 0 {
            return Err(SweepError::config("worker thread count must be at least 1"));
        }

        let slots = (0..options.threads)
            .map(|_| WorkerSlot {
                state: Mutex::new(SlotState {
                    job: None,
                    frame: Vec::with_capacity(options.frame_bytes),
                    terminated: false,
                }),
                signal: Condvar::new(),
            })
            .collect();

        let pool = Arc::new(Self {
            slots,
            free: Mutex::new(Vec::with_capacity(options.threads)),
            threads: Mutex::new((0..options.threads).map(|_| None).collect()),
            outstanding: AtomicUsize::new(0),
        });

        for id in 0..options.threads {
            let context = WorkerContext {
                id,
                pool: pool.clone(),
                measures: measures.clone(),
                mask: mask.clone(),
                metric: metric.clone(),
                wait_timeout: options.wait_timeout,
            };

            let spawned = std::thread::Builder::new()
                .name(format!("servofocus-measure-{id}"))
                .spawn(move || worker::run(context));

            match spawned {
                Ok(handle) => {
                    pool.outstanding.fetch_add(1, Ordering::SeqCst);
                    pool.threads.lock().expect("lock poisoned")[id] = Some(handle);
                    pool.free.lock().expect("lock poisoned").push(id);
                }
                Err(e) => {
                    log::error!("Failed to spawn measurement worker {}: {}", id, e);
                    if let Err(shutdown_err) = pool.shutdown(options.wait_timeout) {
                        log::error!("Cleanup after spawn failure failed: {}", shutdown_err);
                    }
                    return Err(SweepError::Spawn(e));
                }
            }
        }

        log::debug!("Spawned {} measurement workers", options.threads);
        Ok(pool)
    }

    /// Take an idle worker, or `None` if all are busy. Never blocks on workers.
    pub fn acquire(&self) -> Option<WorkerHandle> {
        self.free
            .lock()
            .expect("lock poisoned")
            .pop()
            .map(|id| WorkerHandle { id })
    }

    /// Return a worker to the free list
    pub fn release(&self, handle: WorkerHandle) {
        let mut free = self.free.lock().expect("lock poisoned");
        debug_assert!(!free.contains(&handle.id), "worker released twice");
        free.push(handle.id);
    }

    /// Hand `frame` and the target slot to the worker and wake it.
    ///
    /// The frame is copied into the worker's own buffer, so the caller may
    /// reuse its buffer as soon as this returns.
    pub fn arm(&self, handle: WorkerHandle, frame: &[u8], index: usize) {
        let slot = &self.slots[handle.id];
        {
            let mut state = slot.state.lock().expect("lock poisoned");
            state.frame.clear();
            state.frame.extend_from_slice(frame);
            state.job = Some(index);
        }
        slot.signal.notify_one();
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn idle(&self) -> usize {
        self.free.lock().expect("lock poisoned").len()
    }

    /// Worker threads spawned and not yet confirmed terminated
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    pub(crate) fn slot(&self, id: usize) -> &WorkerSlot {
        &self.slots[id]
    }

    /// Terminate every worker.
    ///
    /// Idle workers are drained from the free list, flagged and joined.
    /// Busy workers finish their measurement, return to the free list and
    /// are drained on a later pass. Fails if workers are still outstanding
    /// when `join_timeout` elapses.
    pub fn shutdown(&self, join_timeout: Duration) -> Result<(), SweepError> {
        let deadline = Instant::now() + join_timeout;

        loop {
            if self.outstanding() == 0 {
                log::debug!("All measurement workers terminated");
                return Ok(());
            }

            match self.acquire() {
                Some(handle) => self.terminate_and_join(handle, deadline)?,
                None => {
                    if Instant::now() >= deadline {
                        let outstanding = self.outstanding();
                        log::error!(
                            "Timed out waiting for {} busy measurement worker(s)",
                            outstanding
                        );
                        return Err(SweepError::ShutdownTimeout { outstanding });
                    }
                    std::thread::sleep(SHUTDOWN_POLL_INTERVAL);
                }
            }
        }
    }

    fn terminate_and_join(&self, handle: WorkerHandle, deadline: Instant) -> Result<(), SweepError> {
        let slot = &self.slots[handle.id];
        slot.state.lock().expect("lock poisoned").terminated = true;
        slot.signal.notify_one();

        let join_handle = self.threads.lock().expect("lock poisoned")[handle.id].take();
        let Some(join_handle) = join_handle else {
            // Never spawned, nothing to wait for.
            return Ok(());
        };

        let mut join_handle = Some(join_handle);
        loop {
            let finished = join_handle.as_ref().is_some_and(|h| h.is_finished());
            if finished {
                if let Some(h) = join_handle.take() {
                    if h.join().is_err() {
                        log::error!("Measurement worker {} panicked", handle.id);
                    }
                }
                self.outstanding.fetch_sub(1, Ordering::SeqCst);
                return Ok(());
            }
            if Instant::now() >= deadline {
                // Keep the handle so a later shutdown can retry the join.
                self.threads.lock().expect("lock poisoned")[handle.id] = join_handle.take();
                self.release(handle);
                return Err(SweepError::ShutdownTimeout {
                    outstanding: self.outstanding(),
                });
            }
            std::thread::sleep(SHUTDOWN_POLL_INTERVAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::LaplacianMean;
    use crate::types::Resolution;

    fn small_pool(threads: usize) -> Arc<WorkerPool> {
        let res = Resolution::new(8, 8);
        WorkerPool::spawn(
            PoolOptions {
                threads,
                wait_timeout: Duration::from_millis(50),
                frame_bytes: res.pixels(),
            },
            Arc::new(FocusMeasures::new(4)),
            Arc::new(Mask::full(res)),
            Arc::new(LaplacianMean),
        )
        .unwrap()
    }

    #[test]
    fn test_acquire_until_empty() {
        let pool = small_pool(2);
        assert_eq!(pool.capacity(), 2);
        assert_eq!(pool.outstanding(), 2);

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_ne!(a.id(), b.id());
        assert!(pool.acquire().is_none());

        pool.release(a);
        pool.release(b);
        assert_eq!(pool.idle(), 2);
        pool.shutdown(Duration::from_secs(2)).unwrap();
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_acquire_is_lifo() {
        let pool = small_pool(3);
        let first = pool.acquire().unwrap();
        let id = first.id();
        pool.release(first);
        let again = pool.acquire().unwrap();
        assert_eq!(again.id(), id);
        pool.release(again);
        pool.shutdown(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn test_shutdown_waits_for_claimed_worker() {
        let pool = small_pool(1);
        let handle = pool.acquire().unwrap();

        // A claimed worker is outside the free list, so it cannot be drained.
        assert!(matches!(
            pool.shutdown(Duration::from_millis(50)),
            Err(SweepError::ShutdownTimeout { outstanding: 1 })
        ));

        pool.release(handle);
        pool.shutdown(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn test_zero_threads_rejected() {
        let res = Resolution::new(4, 4);
        let result = WorkerPool::spawn(
            PoolOptions {
                threads: 0,
                wait_timeout: Duration::from_millis(10),
                frame_bytes: 16,
            },
            Arc::new(FocusMeasures::new(1)),
            Arc::new(Mask::full(res)),
            Arc::new(LaplacianMean),
        );
        assert!(matches!(result, Err(SweepError::Config(_))));
    }
}
