//! Standalone spiral-pour API handler
//!
//! Exposes the pour motion service directly, without the surrounding kettle
//! choreography. The request carries the spiral parameters and target frame;
//! the response streams `{"stage": ...}` feedback and ends with the
//! `{"status": ...}` result event.

use async_stream::stream;
use axum::{extract::State, response::Response, Json};
use serde_json::json;

use crate::api::sse_response;
use crate::error::TaskError;
use crate::feedback::FeedbackSink;
use crate::pour::PourRequest;
use crate::state::SharedState;

/// POST /api/pour - run one spiral pour
///
/// Invalid spiral parameters are rejected with a 400 before any motion or
/// streaming starts. The pour claims the shared arm mutex for its duration,
/// the same exclusivity the kettle tasks observe.
pub async fn pour_action(
    State(state): State<SharedState>,
    Json(request): Json<PourRequest>,
) -> Result<Response, TaskError> {
    request.spiral_parameters().validate()?;

    let (sink, mut feedback_rx) = FeedbackSink::channel(32);

    let (pour, arm, operation_id, cancel) = {
        let mut locked = state.write().await;
        let (id, cancel) = locked.ops.begin("pour_action");
        (locked.pour.clone(), locked.arm.clone(), id, cancel)
    };

    tracing::info!(
        operation_id = %operation_id,
        target_frame = %request.target_frame,
        "Pour action accepted"
    );

    let worker = tokio::spawn(async move {
        let _claim = arm
            .try_lock_owned()
            .map_err(|_| TaskError::RobotBusy)?;
        pour.pour(&request, &sink, &cancel)
            .await
            .map_err(TaskError::from)
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
