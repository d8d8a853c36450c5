//! Session state carried between task invocations.
//!
//! The one piece of state that outlives a single operation is where the
//! kettle actually ended up when it was grasped. A successful pick writes
//! the record; the next place consumes it. The slot belongs to the
//! orchestrator session, not to either operation.

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::geometry::FrameTransform;

/// The realized grasp produced by a pick: where the grasped object sits
/// relative to the base frame.
#[derive(Debug, Clone)]
pub struct GraspRecord {
    /// Base-frame transform of the grasped object.
    pub grasp: FrameTransform,
    /// When the grasp completed.
    pub grasped_at: DateTime<Utc>,
}

impl GraspRecord {
    /// Record a grasp completed now.
    pub fn new(grasp: FrameTransform) -> Self {
        Self {
            grasp,
            grasped_at: Utc::now(),
        }
    }
}

/// Holder for the session's grasp record.
#[derive(Default)]
pub struct TaskSession {
    slot: Mutex<Option<GraspRecord>>,
}

impl TaskSession {
    /// An empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a fresh grasp record, replacing any prior one.
    pub async fn store(&self, record: GraspRecord) {
        let mut slot = self.slot.lock().await;
        if slot.is_some() {
            tracing::warn!("Replacing an unconsumed grasp record");
        }
        *slot = Some(record);
    }

    /// Take the grasp record, consuming it. Returns `None` if no successful
    /// pick has run since the last place.
    pub async fn take(&self) -> Option<GraspRecord> {
        self.slot.lock().await.take()
    }

    /// Whether a grasp record is currently held.
    pub async fn holds_grasp(&self) -> bool {
        self.slot.lock().await.is_some()
    }
}
