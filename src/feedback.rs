//! Stage feedback channel.
//!
//! Operations report their progress as named stages. Feedback travels over a
//! bounded mpsc channel to whatever is streaming it to the caller; sending is
//! best-effort, so an operation never stalls or fails because the listener
//! went away.

use serde::Serialize;
use tokio::sync::mpsc;

/// One progress update naming the stage an operation is in.
#[derive(Debug, Clone, Serialize)]
pub struct StageUpdate {
    /// Human-readable stage name.
    pub stage: String,
}

/// Sending half of a feedback stream.
#[derive(Clone)]
pub struct FeedbackSink {
    tx: Option<mpsc::Sender<StageUpdate>>,
}

impl FeedbackSink {
    /// Create a connected sink/receiver pair.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<StageUpdate>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that drops every update. Used by callers that don't stream.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Report a stage. Logged either way; delivery to the stream is
    /// best-effort.
    pub async fn stage(&self, stage: impl Into<String>) {
        let stage = stage.into();
        tracing::debug!(stage = %stage, "Stage update");
        if let Some(tx) = &self.tx {
            let _ = tx.send(StageUpdate { stage }).await;
        }
    }
}
