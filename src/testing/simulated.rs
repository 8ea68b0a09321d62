//! Simulated hardware
//!
//! The simulated frame source renders each frame from the simulated
//! actuator's current position, so a sweep over it produces a measure curve
//! that peaks at the lens's best-focus angle.

use super::synthetic_data::focus_pattern;
use crate::actuator::{Actuator, ActuatorError};
use crate::errors::SweepError;
use crate::mask::Mask;
use crate::quality::{FocusMetric, MeasureError};
use crate::source::{FrameSink, FrameSource};
use crate::types::{Degrees, Resolution};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Actuator that records every command and jumps to it instantly
pub struct SimulatedActuator {
    position: AtomicU16,
    commands: Mutex<Vec<Degrees>>,
    failing: Vec<Degrees>,
    min_angle: Degrees,
    max_angle: Degrees,
}

impl SimulatedActuator {
    pub fn new(initial: Degrees) -> Self {
        Self::with_range(initial, Degrees::MIN, Degrees::MAX)
    }

    /// Commands outside `min_angle..=max_angle` fail like a real controller would
    pub fn with_range(initial: Degrees, min_angle: Degrees, max_angle: Degrees) -> Self {
        Self {
            position: AtomicU16::new(initial),
            commands: Mutex::new(Vec::new()),
            failing: Vec::new(),
            min_angle,
            max_angle,
        }
    }

    /// Moves to `angle` report a link error and leave the position unchanged
    pub fn fail_on(mut self, angle: Degrees) -> Self {
        self.failing.push(angle);
        self
    }

    pub fn position(&self) -> Degrees {
        self.position.load(Ordering::SeqCst)
    }

    /// Every accepted command, oldest first
    pub fn commands(&self) -> Vec<Degrees> {
        self.commands.lock().expect("lock poisoned").clone()
    }
}

impl Actuator for SimulatedActuator {
    fn move_to(&self, angle: Degrees) -> Result<(), ActuatorError> {
        self.check(angle)?;
        if self.failing.contains(&angle) {
            return Err(ActuatorError::Link(io::Error::other(format!(
                "simulated link failure at {} degrees",
                angle
            ))));
        }
        self.commands.lock().expect("lock poisoned").push(angle);
        self.position.store(angle, Ordering::SeqCst);
        Ok(())
    }

    fn range(&self) -> (Degrees, Degrees) {
        (self.min_angle, self.max_angle)
    }
}

/// Optics of the simulated camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedLens {
    pub best_focus: Degrees,
    /// Degrees away from best focus at which contrast halves
    pub depth_of_field: f64,
}

impl SimulatedLens {
    pub fn defocus(&self, angle: Degrees) -> f64 {
        if self.depth_of_field <= 0.0 {
            return if angle == self.best_focus { 0.0 } else { f64::MAX };
        }
        angle.abs_diff(self.best_focus) as f64 / self.depth_of_field
    }
}

/// Frame source backed by a thread that renders synthetic frames at the
/// configured framerate.
pub struct SimulatedFrameSource {
    actuator: Arc<SimulatedActuator>,
    lens: SimulatedLens,
    resolution: Option<Resolution>,
    framerate: u32,
    frame_limit: Option<u64>,
    delivered: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    exposure_locked: bool,
    thread: Option<JoinHandle<()>>,
}

impl SimulatedFrameSource {
    pub fn new(actuator: Arc<SimulatedActuator>, lens: SimulatedLens) -> Self {
        Self {
            actuator,
            lens,
            resolution: None,
            framerate: 30,
            frame_limit: None,
            delivered: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            exposure_locked: false,
            thread: None,
        }
    }

    /// Stop delivering after `limit` frames while staying "streaming"
    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    pub fn frames_delivered(&self) -> u64 {
        self.delivered.load(Ordering::SeqCst)
    }

    pub fn exposure_locked(&self) -> bool {
        self.exposure_locked
    }

    pub fn is_streaming(&self) -> bool {
        self.thread.is_some()
    }
}

impl FrameSource for SimulatedFrameSource {
    fn configure(&mut self, resolution: Resolution, framerate: u32) -> Result<(), SweepError> {
        if resolution.is_empty() || framerate == 0 {
            return Err(SweepError::frame_source(format!(
                "unsupported mode {} at {} fps",
                resolution, framerate
            )));
        }
        self.resolution = Some(resolution);
        self.framerate = framerate;
        Ok(())
    }

    fn lock_exposure(&mut self) -> Result<(), SweepError> {
        self.exposure_locked = true;
        Ok(())
    }

    fn start(&mut self, mut sink: FrameSink) -> Result<(), SweepError> {
        let resolution = self
            .resolution
            .ok_or_else(|| SweepError::frame_source("simulated source not configured"))?;
        if self.thread.is_some() {
            return Err(SweepError::frame_source("simulated source already streaming"));
        }

        let period = Duration::from_secs_f64(1.0 / self.framerate as f64);
        let actuator = self.actuator.clone();
        let lens = self.lens;
        let limit = self.frame_limit;
        let delivered = self.delivered.clone();
        let running = self.running.clone();
        running.store(true, Ordering::SeqCst);

        let handle = std::thread::Builder::new()
            .name("servofocus-sim-source".to_string())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    let exhausted = limit.is_some_and(|l| delivered.load(Ordering::SeqCst) >= l);
                    if !exhausted {
                        let frame = focus_pattern(resolution, lens.defocus(actuator.position()));
                        sink(&frame, Instant::now());
                        delivered.fetch_add(1, Ordering::SeqCst);
                    }
                    std::thread::sleep(period);
                }
            })
            .map_err(|e| SweepError::frame_source(format!("Failed to spawn source: {}", e)))?;

        self.thread = Some(handle);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SweepError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            handle
                .join()
                .map_err(|_| SweepError::frame_source("simulated source thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for SimulatedFrameSource {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("Error stopping simulated source in drop: {}", e);
        }
    }
}

struct GateState {
    open: bool,
    entered: usize,
}

/// Metric that blocks every measurement until the gate is opened.
///
/// Lets tests hold workers busy for as long as they need to observe pool
/// exhaustion deterministically.
pub struct GatedMetric {
    inner: Arc<dyn FocusMetric>,
    gate: Mutex<GateState>,
    signal: Condvar,
}

impl GatedMetric {
    pub fn new(inner: Arc<dyn FocusMetric>) -> Self {
        Self {
            inner,
            gate: Mutex::new(GateState {
                open: false,
                entered: 0,
            }),
            signal: Condvar::new(),
        }
    }

    /// Release every blocked and future measurement
    pub fn open(&self) {
        self.gate.lock().expect("lock poisoned").open = true;
        self.signal.notify_all();
    }

    /// Measurements started so far
    pub fn entered(&self) -> usize {
        self.gate.lock().expect("lock poisoned").entered
    }

    /// Wait until at least `count` measurements have started. Returns false on timeout.
    pub fn wait_for_entered(&self, count: usize, timeout: Duration) -> bool {
        let gate = self.gate.lock().expect("lock poisoned");
        let (gate, _) = self
            .signal
            .wait_timeout_while(gate, timeout, |state| state.entered < count)
            .expect("lock poisoned");
        gate.entered >= count
    }
}

impl FocusMetric for GatedMetric {
    fn measure(&self, frame: &[u8], mask: &Mask) -> Result<f64, MeasureError> {
        {
            let mut gate = self.gate.lock().expect("lock poisoned");
            gate.entered += 1;
            self.signal.notify_all();
            while !gate.open {
                gate = self.signal.wait(gate).expect("lock poisoned");
            }
        }
        self.inner.measure(frame, mask)
    }

    fn name(&self) -> &'static str {
        "gated"
    }
}
