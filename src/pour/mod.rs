//! Spiral-pour motion service.
//!
//! One invocation walks a short state machine: resolve the target frame,
//! compute the spiral path, plan it, execute it, streaming a stage name at
//! each step. The service issues motion but owns no arm exclusivity of its
//! own: callers (the task orchestrator, or the HTTP handler for standalone
//! pours) hold the arm claim around it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::feedback::FeedbackSink;
use crate::gateways::{
    lookup_bounded, FrameTransformProvider, MotionError, MotionPlanningGateway, TransformPolicy,
};
use crate::geometry::Pose;
use crate::spiral::{self, SpiralError, SpiralParameters};

/// Goal of one spiral-pour invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PourRequest {
    /// Frame whose current position becomes the spiral center.
    pub target_frame: String,
    /// Number of waypoints along the spiral.
    pub num_points: u32,
    /// Outer spiral radius, meters.
    pub spiral_radius: f64,
    /// Number of spiral revolutions.
    pub num_loops: f64,
    /// Start at the outer radius and wind inward.
    pub start_outside: bool,
}

impl PourRequest {
    /// The spiral parameters carried by this request.
    pub fn spiral_parameters(&self) -> SpiralParameters {
        SpiralParameters {
            num_points: self.num_points,
            max_radius: self.spiral_radius,
            loops: self.num_loops,
            start_outside: self.start_outside,
        }
    }
}

/// Stages a pour invocation moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PourStage {
    /// Looking up the target frame and current end-effector orientation.
    ResolvingFrame,
    /// Generating the spiral waypoint sequence.
    ComputingPath,
    /// Submitting the waypoints to the Cartesian planner.
    Planning,
    /// Executing the planned trajectory to completion.
    Executing,
    /// Terminal success.
    Done,
    /// Terminal failure.
    Failed,
}

impl PourStage {
    /// The stage name streamed to callers, if the stage announces itself.
    pub fn label(&self) -> Option<&'static str> {
        match self {
            PourStage::ComputingPath => Some("Calculating path"),
            PourStage::Planning => Some("Planning path"),
            PourStage::Executing => Some("Executing path"),
            PourStage::ResolvingFrame | PourStage::Done | PourStage::Failed => None,
        }
    }
}

/// Failures of one pour invocation. None are retried internally.
#[derive(Error, Debug)]
pub enum PourError {
    /// The target frame could not be resolved. Recoverable for the caller:
    /// reported as an unsuccessful result, not a fatal fault.
    #[error("transform not found: {frame}")]
    TransformNotFound {
        /// The frame that could not be resolved.
        frame: String,
    },

    /// The request carried invalid spiral parameters.
    #[error(transparent)]
    InvalidParameters(#[from] SpiralError),

    /// Planning or execution failed at the motion gateway.
    #[error(transparent)]
    Motion(#[from] MotionError),

    /// The invocation was cancelled.
    #[error("pour cancelled")]
    Cancelled,
}

impl From<PourError> for TaskError {
    fn from(err: PourError) -> Self {
        match err {
            PourError::TransformNotFound { frame } => TaskError::TransformNotFound(frame),
            PourError::InvalidParameters(e) => TaskError::ParameterInvalid(e.to_string()),
            PourError::Motion(e) => TaskError::from(e),
            PourError::Cancelled => TaskError::Cancelled,
        }
    }
}

/// Orchestrates one spiral-pour sub-task against the motion and transform
/// gateways.
pub struct PourMotionService {
    transforms: Arc<dyn FrameTransformProvider>,
    motion: Arc<dyn MotionPlanningGateway>,
    base_frame: String,
    transform_policy: TransformPolicy,
}

impl PourMotionService {
    /// Create a pour service resolving frames against `base_frame`.
    pub fn new(
        transforms: Arc<dyn FrameTransformProvider>,
        motion: Arc<dyn MotionPlanningGateway>,
        base_frame: impl Into<String>,
        transform_policy: TransformPolicy,
    ) -> Self {
        Self {
            transforms,
            motion,
            base_frame: base_frame.into(),
            transform_policy,
        }
    }

    /// Run one spiral pour to completion.
    ///
    /// Streams the stage names the caller expects (`Calculating path`,
    /// `Planning path`, `Executing path`) through `feedback`. Success is
    /// reported only after the trajectory has physically completed.
    pub async fn pour(
        &self,
        request: &PourRequest,
        feedback: &FeedbackSink,
        cancel: &CancellationToken,
    ) -> Result<(), PourError> {
        let params = request.spiral_parameters();
        params.validate()?;

        self.advance(PourStage::ResolvingFrame, feedback).await;
        let transform = match lookup_bounded(
            self.transforms.as_ref(),
            &self.base_frame,
            &request.target_frame,
            self.transform_policy,
        )
        .await
        {
            Ok(tf) => tf,
            Err(err) => {
                tracing::warn!(
                    frame = %request.target_frame,
                    error = %err,
                    "Pour aborted: target frame unresolved"
                );
                self.advance(PourStage::Failed, feedback).await;
                feedback
                    .stage(format!("Failed to get transform to {}", request.target_frame))
                    .await;
                return Err(PourError::TransformNotFound {
                    frame: request.target_frame.clone(),
                });
            }
        };

        let current = self
            .step(cancel, self.motion.end_effector_pose())
            .await??;

        self.advance(PourStage::ComputingPath, feedback).await;
        let center = Pose {
            position: transform.translation,
            orientation: current.orientation,
        };
        let waypoints = spiral::generate(&center, &params)?;

        self.advance(PourStage::Planning, feedback).await;
        let trajectory = match self
            .step(cancel, self.motion.plan_cartesian(&waypoints))
            .await?
        {
            Ok(trajectory) => trajectory,
            Err(err) => {
                self.advance(PourStage::Failed, feedback).await;
                feedback.stage("Failed to plan path").await;
                return Err(PourError::Motion(err));
            }
        };

        self.advance(PourStage::Executing, feedback).await;
        if let Err(err) = self.step(cancel, self.motion.execute(trajectory)).await? {
            self.advance(PourStage::Failed, feedback).await;
            feedback.stage("Failed to execute path").await;
            return Err(PourError::Motion(err));
        }
        self.advance(PourStage::Done, feedback).await;

        tracing::info!(
            target_frame = %request.target_frame,
            num_points = request.num_points,
            start_outside = request.start_outside,
            "Pour completed"
        );
        Ok(())
    }

    /// Enter a stage: trace the transition and stream its label, if any.
    async fn advance(&self, stage: PourStage, feedback: &FeedbackSink) {
        tracing::debug!(stage = ?stage, "Pour stage transition");
        if let Some(label) = stage.label() {
            feedback.stage(label).await;
        }
    }

    /// Race one suspending step against cancellation.
    async fn step<T, E>(
        &self,
        cancel: &CancellationToken,
        fut: impl std::future::Future<Output = Result<T, E>>,
    ) -> Result<Result<T, E>, PourError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PourError::Cancelled),
            result = fut => Ok(result),
        }
    }
}
