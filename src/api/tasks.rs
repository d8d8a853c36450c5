//! Kettle task API handlers
//!
//! The three task entry points take no payload: the poses, frames, and
//! gripper parameters are part of the task definitions. Each handler kicks
//! the operation off on its own task, registers it for cancellation, and
//! streams the orchestrator's stage feedback back to the caller via SSE.

use async_stream::stream;
use axum::{extract::State, response::Response, Json};
use serde_json::json;

use crate::api::sse_response;
use crate::error::TaskError;
use crate::feedback::FeedbackSink;
use crate::state::SharedState;

/// Which top-level kettle operation a request maps to.
#[derive(Debug, Clone, Copy)]
enum KettleTask {
    /// Pick the kettle up from its stand.
    Pick,
    /// Place the kettle back on its stand.
    Place,
    /// Pour over the target in spiral passes.
    Pour,
}

impl KettleTask {
    fn name(&self) -> &'static str {
        match self {
            KettleTask::Pick => "pick",
            KettleTask::Place => "place",
            KettleTask::Pour => "pour",
        }
    }
}

/// POST /api/kettle/pick - pick the kettle up
pub async fn pick_kettle(State(state): State<SharedState>) -> Result<Response, TaskError> {
    run_kettle_task(state, KettleTask::Pick).await
}

/// POST /api/kettle/place - place the kettle back down
pub async fn place_kettle(State(state): State<SharedState>) -> Result<Response, TaskError> {
    run_kettle_task(state, KettleTask::Place).await
}

/// POST /api/kettle/pour - pour from the kettle
pub async fn pour_kettle(State(state): State<SharedState>) -> Result<Response, TaskError> {
    run_kettle_task(state, KettleTask::Pour).await
}

/// POST /api/task/cancel - cancel the in-flight operation, if any
///
/// Cancellation propagates to whichever gateway call the operation is
/// currently suspended on; the operation ends with a `Cancelled` result on
/// its own stream.
pub async fn cancel_task(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let cancelled = state.write().await.ops.cancel_active();
    Json(json!({ "cancelled": cancelled }))
}

/// Run one kettle task and stream its feedback.
///
/// The operation itself runs on a spawned task so the SSE stream survives
/// slow consumers; its result is appended to the stream as the terminal
/// `{"status": ...}` event.
async fn run_kettle_task(state: SharedState, task: KettleTask) -> Result<Response, TaskError> {
    let (sink, mut feedback_rx) = FeedbackSink::channel(32);

    let (orchestrator, operation_id, cancel) = {
        let mut locked = state.write().await;
        let (id, cancel) = locked.ops.begin(task.name());
        (locked.orchestrator.clone(), id, cancel)
    };

    tracing::info!(operation_id = %operation_id, task = task.name(), "Kettle task accepted");

    let worker = tokio::spawn(async move {
        match task {
            KettleTask::Pick => orchestrator.pick(&sink, &cancel).await,
            KettleTask::Place => orchestrator.place(&sink, &cancel).await,
            KettleTask::Pour => orchestrator.pour(&sink, &cancel).await,
        }
    });

    let stream = stream! {
        while let Some(update) = feedback_rx.recv().await {
            yield Ok::<String, axum::Error>(json!({ "stage": update.stage }).to_string());
        }

        match worker.await {
            Ok(Ok(())) => {
                yield Ok::<String, axum::Error>(json!({ "status": true }).to_string());
            }
            Ok(Err(e)) => {
                yield Ok::<String, axum::Error>(
                    json!({ "status": false, "error": e.to_string() }).to_string(),
                );
            }
            Err(e) => {
                yield Ok::<String, axum::Error>(
                    json!({ "status": false, "error": format!("operation aborted: {e}") })
                        .to_string(),
                );
            }
        }

        state.write().await.ops.finish(&operation_id);
        yield Ok::<String, axum::Error>("[DONE]".to_string());
    };

    sse_response(stream)
}
