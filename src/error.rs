//! Error types and error handling for the application
//!
//! This module defines the task-level error taxonomy and its conversion to
//! HTTP responses. Gateway modules carry their own error enums; everything
//! funnels into [`TaskError`] at the orchestration layer so an operation
//! always ends in an explicit, typed outcome.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::gateways::{DelayError, GraspError, MotionError, TransformError};
use crate::geometry::GeometryError;
use crate::spiral::SpiralError;

/// Task-level error taxonomy
///
/// Every failure a pick/place/pour operation can report. None of these are
/// retried automatically; retries belong to the caller issuing a fresh
/// request.
#[derive(Error, Debug)]
pub enum TaskError {
    /// A required frame transform could not be resolved (or was stale)
    #[error("Transform not found: {0}")]
    TransformNotFound(String),

    /// Trajectory or pose parameters violated their invariants
    #[error("Invalid parameters: {0}")]
    ParameterInvalid(String),

    /// The motion planner could not produce a trajectory
    #[error("Planning failed: {0}")]
    PlanningFailed(String),

    /// Object detection or grasping failed
    #[error("Grasp failed: {0}")]
    GraspFailed(String),

    /// A planned trajectory failed during physical execution
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// The operation was invoked in a state that forbids it
    /// (e.g. place without a prior successful pick)
    #[error("Precondition violated: {0}")]
    PreconditionViolated(String),

    /// Another operation currently owns the arm
    #[error("Robot arm is busy with another operation")]
    RobotBusy,

    /// The operation was cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Internal server error (catch-all for unexpected errors)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<TransformError> for TaskError {
    fn from(err: TransformError) -> Self {
        match err {
            TransformError::NotFound { child, .. } => TaskError::TransformNotFound(child),
            TransformError::Stale { child, .. } => TaskError::TransformNotFound(child),
            TransformError::NotNormalized { .. } => TaskError::ParameterInvalid(err.to_string()),
            TransformError::Unreachable(msg) => {
                TaskError::Internal(anyhow::anyhow!("transform service unreachable: {msg}"))
            }
        }
    }
}

impl From<MotionError> for TaskError {
    fn from(err: MotionError) -> Self {
        match err {
            MotionError::Planning(msg) => TaskError::PlanningFailed(msg),
            MotionError::Execution(msg) => TaskError::ExecutionFailed(msg),
            MotionError::Unreachable(msg) => {
                TaskError::ExecutionFailed(format!("motion service unreachable: {msg}"))
            }
        }
    }
}

impl From<GraspError> for TaskError {
    fn from(err: GraspError) -> Self {
        match err {
            GraspError::Failed(msg) => TaskError::GraspFailed(msg),
            GraspError::Unreachable(msg) => {
                TaskError::GraspFailed(format!("grasp service unreachable: {msg}"))
            }
        }
    }
}

impl From<DelayError> for TaskError {
    fn from(err: DelayError) -> Self {
        TaskError::Internal(anyhow::anyhow!(err))
    }
}

impl From<SpiralError> for TaskError {
    fn from(err: SpiralError) -> Self {
        TaskError::ParameterInvalid(err.to_string())
    }
}

impl From<GeometryError> for TaskError {
    fn from(err: GeometryError) -> Self {
        TaskError::ParameterInvalid(err.to_string())
    }
}

impl IntoResponse for TaskError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            TaskError::TransformNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            TaskError::ParameterInvalid(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            TaskError::PlanningFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            TaskError::GraspFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            TaskError::ExecutionFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            TaskError::PreconditionViolated(_) => (StatusCode::CONFLICT, self.to_string()),
            TaskError::RobotBusy => (StatusCode::CONFLICT, self.to_string()),
            TaskError::Cancelled => (StatusCode::CONFLICT, self.to_string()),
            TaskError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
