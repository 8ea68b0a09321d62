//! Measurement worker thread body
//!
//! Idle -> Armed (job set by `WorkerPool::arm`) -> Computing -> Idle, with a
//! terminal exit once the pool flags the worker during shutdown.

use super::pool::{WorkerHandle, WorkerPool};
use crate::mask::Mask;
use crate::quality::FocusMetric;
use crate::types::FocusMeasures;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

pub(crate) struct WorkerContext {
    pub(crate) id: usize,
    pub(crate) pool: Arc<WorkerPool>,
    pub(crate) measures: Arc<FocusMeasures>,
    pub(crate) mask: Arc<Mask>,
    pub(crate) metric: Arc<dyn FocusMetric>,
    pub(crate) wait_timeout: Duration,
}

pub(crate) fn run(context: WorkerContext) {
    while let Some((index, frame)) = next_job(&context) {
        score(&context, index, &frame);

        // Hand the buffer back before rejoining the pool so the next arm
        // reuses its allocation.
        context
            .pool
            .slot(context.id)
            .state
            .lock()
            .expect("lock poisoned")
            .frame = frame;
        context.pool.release(WorkerHandle { id: context.id });
    }

    log::debug!("Measurement worker {} terminated", context.id);
}

/// Block until armed or terminated. `None` means terminate.
fn next_job(context: &WorkerContext) -> Option<(usize, Vec<u8>)> {
    let slot = context.pool.slot(context.id);
    let mut state = slot.state.lock().expect("lock poisoned");

    loop {
        if state.terminated {
            return None;
        }
        if let Some(index) = state.job.take() {
            return Some((index, std::mem::take(&mut state.frame)));
        }
        let (next, _) = slot
            .signal
            .wait_timeout(state, context.wait_timeout)
            .expect("lock poisoned");
        state = next;
    }
}

fn score(context: &WorkerContext, index: usize, frame: &[u8]) {
    let metric = context.metric.as_ref();
    let mask = context.mask.as_ref();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| metric.measure(frame, mask)));

    match outcome {
        Ok(Ok(value)) => match context.measures.record(index, value) {
            Ok(()) => log::debug!(
                "Worker {} scored slot {} = {:.4}",
                context.id,
                index,
                value
            ),
            Err(e) => log::error!("Worker {} could not record slot {}: {}", context.id, index, e),
        },
        Ok(Err(e)) => log::warn!("Discarding measurement for slot {}: {}", index, e),
        Err(_) => log::error!(
            "{} panicked on slot {}; measurement discarded",
            metric.name(),
            index
        ),
    }
}
