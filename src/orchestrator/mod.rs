//! Orchestrator module
//!
//! Coordinates the multi-stage kettle task: pick it up, pour in spiral
//! passes, place it back. The state machines live in [`tasks`]; the grasp
//! record carried between pick and place lives in [`session`].

pub mod session;
pub mod tasks;

use std::sync::Arc;

pub use session::{GraspRecord, TaskSession};
pub use tasks::TaskOrchestrator;

/// Shared mutex guarding the physical arm.
///
/// Held (via `try_lock_owned`) for the duration of every motion-issuing
/// operation; a second claimant is rejected with `RobotBusy` rather than
/// queued.
pub type ArmMutex = Arc<tokio::sync::Mutex<()>>;

/// A fresh, unclaimed arm mutex.
pub fn arm_mutex() -> ArmMutex {
    Arc::new(tokio::sync::Mutex::new(()))
}
