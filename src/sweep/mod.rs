/// Sweep-and-measure pipeline
///
/// The coordinator reacts to each frame, a bounded pool of worker threads
/// scores frames off the delivery thread, and the driver wires both to an
/// actuator and a frame source.
pub mod coordinator;
pub mod driver;
pub mod pool;
mod worker;

pub use coordinator::{CoordinatorOptions, FrameDisposition, SweepCoordinator, SweepState};
pub use driver::{SweepDriver, SweepOutcome, SweepTermination};
pub use pool::{PoolOptions, WorkerHandle, WorkerPool};
