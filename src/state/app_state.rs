// Application state management
// Holds the orchestration services and the in-flight operation registry

use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::orchestrator::{ArmMutex, TaskOrchestrator};
use crate::pour::PourMotionService;

/// Shared handle the axum handlers extract.
pub type SharedState = Arc<RwLock<AppState>>;

/// The operation currently holding the arm, if any.
#[derive(Debug, Clone)]
struct ActiveOperation {
    id: String,
    kind: &'static str,
    cancel: CancellationToken,
}

/// Registry of the single in-flight operation and its cancellation token.
#[derive(Debug, Default)]
pub struct OperationRegistry {
    active: Option<ActiveOperation>,
}

impl OperationRegistry {
    /// Register a new in-flight operation and get its id and token.
    ///
    /// Any previously registered operation is simply replaced: it has either
    /// finished (and failed to deregister only on a lost stream) or will
    /// observe its own token independently.
    pub fn begin(&mut self, kind: &'static str) -> (String, CancellationToken) {
        let id = Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        tracing::debug!(operation_id = %id, kind = %kind, "Operation registered");
        self.active = Some(ActiveOperation {
            id: id.clone(),
            kind,
            cancel: cancel.clone(),
        });
        (id, cancel)
    }

    /// Deregister a finished operation by id. A mismatched id means a newer
    /// operation already took the slot, and is left alone.
    pub fn finish(&mut self, id: &str) {
        if self.active.as_ref().is_some_and(|op| op.id == id) {
            self.active = None;
        }
    }

    /// Cancel the in-flight operation, if any. Returns what kind it was.
    pub fn cancel_active(&mut self) -> Option<&'static str> {
        match self.active.take() {
            Some(op) => {
                tracing::info!(operation_id = %op.id, kind = %op.kind, "Cancelling operation");
                op.cancel.cancel();
                Some(op.kind)
            }
            None => None,
        }
    }
}

/// Main application state
/// Owns the orchestrator, the standalone pour service, the shared arm mutex,
/// and the cancellation registry for the in-flight operation.
pub struct AppState {
    /// Task orchestrator driving pick/place/pour.
    pub orchestrator: Arc<TaskOrchestrator>,
    /// Spiral-pour service, also reachable standalone.
    pub pour: Arc<PourMotionService>,
    /// Mutex guarding the physical arm, shared with the orchestrator.
    pub arm: ArmMutex,
    /// In-flight operation registry.
    pub ops: OperationRegistry,
}

impl AppState {
    /// Assemble state from the wired services.
    pub fn new(
        orchestrator: Arc<TaskOrchestrator>,
        pour: Arc<PourMotionService>,
        arm: ArmMutex,
    ) -> Self {
        Self {
            orchestrator,
            pour,
            arm,
            ops: OperationRegistry::default(),
        }
    }
}
