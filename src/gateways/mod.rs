//! Contracts for the external driver services.
//!
//! The orchestration core never talks to hardware directly: motion planning,
//! grasping, transform lookup, and timed delays live in separate driver
//! services reached through the narrow async traits below. Default
//! implementations are thin HTTP clients in [`http`]; tests substitute
//! recording mocks.

pub mod http;

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{FrameTransform, Pose};

/// A named joint and its goal position in radians.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JointTarget {
    /// Joint name as the driver knows it.
    pub name: String,
    /// Goal position, radians.
    pub position: f64,
}

/// Opaque handle to a planned trajectory, minted by the planner and redeemed
/// by execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trajectory {
    /// Planner-assigned identifier.
    pub id: String,
}

/// Gripper tolerance band around the target width.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GraspEpsilon {
    /// Allowed undershoot, meters.
    pub inner: f64,
    /// Allowed overshoot, meters.
    pub outer: f64,
}

/// A gripper actuation command.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GripperCommand {
    /// Target opening width, meters.
    pub width: f64,
    /// Clamping force, newtons.
    pub force: f64,
    /// Closing speed, meters per second.
    pub speed: f64,
}

/// Goal for a full detect-and-grasp process.
///
/// The observe and refinement poses are expressed in the base frame; the
/// approach/grasp/retreat poses are fixed offsets in the detected handle
/// frame; the grasp driver finalizes them against its own detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraspRequest {
    /// Where to position the camera to observe the object.
    pub observe_pose: Pose,
    /// Refinement offset applied after the first detection.
    pub refinement_pose: Pose,
    /// Pre-grasp approach offset in the handle frame.
    pub approach_pose: Pose,
    /// Grasp offset in the handle frame.
    pub grasp_pose: Pose,
    /// Post-grasp retreat offset in the handle frame.
    pub retreat_pose: Pose,
    /// Gripper closing width, meters.
    pub width: f64,
    /// Gripper clamping force, newtons.
    pub force: f64,
    /// Gripper closing speed, meters per second.
    pub speed: f64,
    /// Width tolerance band.
    pub epsilon: GraspEpsilon,
    /// Object class identifier for the detector.
    pub object_class: u32,
}

/// Result of a successful grasp process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraspOutcome {
    /// The realized grasp transform, base frame to grasped object.
    pub actual_grasp_pose: FrameTransform,
}

/// A pre-composed approach/grasp/retreat sequence with a gripper command,
/// executed as one unit by the grasp driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraspPlan {
    /// Approach pose in the base frame.
    pub approach_pose: Pose,
    /// Grasp (or release) pose in the base frame.
    pub grasp_pose: Pose,
    /// Retreat pose in the base frame.
    pub retreat_pose: Pose,
    /// Gripper command issued at the grasp pose.
    pub grasp_command: GripperCommand,
    /// Whether to reset the arm's payload estimate afterwards.
    pub reset_load: bool,
}

/// Transform lookup failures.
#[derive(Error, Debug)]
pub enum TransformError {
    /// No transform between the frames was available within the deadline.
    #[error("transform from {parent} to {child} not found")]
    NotFound {
        /// Requested parent frame.
        parent: String,
        /// Requested child frame.
        child: String,
    },

    /// A transform was found but its stamp exceeded the allowed age.
    #[error("transform from {parent} to {child} is stale ({age_ms} ms old)")]
    Stale {
        /// Requested parent frame.
        parent: String,
        /// Requested child frame.
        child: String,
        /// Observed age in milliseconds.
        age_ms: i64,
    },

    /// The transform carried a non-normalized rotation.
    #[error("transform from {parent} to {child} carries a non-normalized rotation")]
    NotNormalized {
        /// Requested parent frame.
        parent: String,
        /// Requested child frame.
        child: String,
    },

    /// The transform service could not be reached.
    #[error("transform service unreachable: {0}")]
    Unreachable(String),
}

/// Motion planning and execution failures.
#[derive(Error, Debug)]
pub enum MotionError {
    /// The planner could not produce a trajectory for the goal.
    #[error("planning failed: {0}")]
    Planning(String),

    /// A planned trajectory failed during execution.
    #[error("trajectory execution failed: {0}")]
    Execution(String),

    /// The motion service could not be reached.
    #[error("motion service unreachable: {0}")]
    Unreachable(String),
}

/// Grasp process and grasp plan failures.
#[derive(Error, Debug)]
pub enum GraspError {
    /// Detection or grasping failed.
    #[error("grasp failed: {0}")]
    Failed(String),

    /// The grasp service could not be reached.
    #[error("grasp service unreachable: {0}")]
    Unreachable(String),
}

/// Delay service failures.
#[derive(Error, Debug)]
pub enum DelayError {
    /// The delay service could not be reached.
    #[error("delay service unreachable: {0}")]
    Unreachable(String),
}

/// Resolves a named child frame's pose relative to a parent frame.
#[async_trait]
pub trait FrameTransformProvider: Send + Sync {
    /// Look up the latest transform mapping `child_frame` into `parent_frame`.
    async fn lookup(
        &self,
        parent_frame: &str,
        child_frame: &str,
    ) -> Result<FrameTransform, TransformError>;
}

/// Plans and executes arm motion.
#[async_trait]
pub trait MotionPlanningGateway: Send + Sync {
    /// Plan a joint-space motion to the given joint targets.
    async fn plan_joints(&self, targets: &[JointTarget]) -> Result<Trajectory, MotionError>;

    /// Plan a motion bringing the end effector to the given pose.
    async fn plan_pose(&self, goal: &Pose) -> Result<Trajectory, MotionError>;

    /// Plan a Cartesian path through the given waypoint sequence.
    async fn plan_cartesian(&self, waypoints: &[Pose]) -> Result<Trajectory, MotionError>;

    /// Execute a planned trajectory. Resolves only once the motion has
    /// physically completed; implementations must not acknowledge dispatch.
    async fn execute(&self, trajectory: Trajectory) -> Result<(), MotionError>;

    /// Current end-effector pose in the base frame.
    async fn end_effector_pose(&self) -> Result<Pose, MotionError>;
}

/// Runs a full detect-and-grasp process.
#[async_trait]
pub trait GraspGateway: Send + Sync {
    /// Localize the object and grasp it, returning the realized grasp pose.
    async fn grasp(&self, request: GraspRequest) -> Result<GraspOutcome, GraspError>;
}

/// Executes a pre-composed grasp plan (used for releasing as well).
#[async_trait]
pub trait GraspPlanExecutor: Send + Sync {
    /// Run the approach/grasp/retreat sequence to completion.
    async fn execute_plan(&self, plan: GraspPlan) -> Result<(), GraspError>;
}

/// Timed pauses between motion phases.
#[async_trait]
pub trait DelayService: Send + Sync {
    /// Wait for the given duration on the driver side.
    async fn wait(&self, duration: Duration) -> Result<(), DelayError>;

    /// Whether the service is reachable. Probed at startup.
    async fn ready(&self) -> bool {
        true
    }
}

/// Deadline and freshness policy applied to transform lookups.
#[derive(Debug, Clone, Copy)]
pub struct TransformPolicy {
    /// Bounded wait before a lookup is declared failed.
    pub deadline: Duration,
    /// Maximum accepted transform age.
    pub max_age: Duration,
}

/// Look up a transform under a bounded deadline and reject stale or
/// non-normalized results.
///
/// A lookup that outlives the deadline reports `NotFound`: the caller only
/// cares that the frame could not be resolved in time.
pub async fn lookup_bounded(
    provider: &dyn FrameTransformProvider,
    parent_frame: &str,
    child_frame: &str,
    policy: TransformPolicy,
) -> Result<FrameTransform, TransformError> {
    let lookup = provider.lookup(parent_frame, child_frame);
    let transform = match tokio::time::timeout(policy.deadline, lookup).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(TransformError::NotFound {
                parent: parent_frame.to_string(),
                child: child_frame.to_string(),
            })
        }
    };

    if transform.rotation.validate().is_err() {
        return Err(TransformError::NotNormalized {
            parent: parent_frame.to_string(),
            child: child_frame.to_string(),
        });
    }

    let age_ms = transform.age_ms(Utc::now());
    if age_ms > policy.max_age.as_millis() as i64 {
        return Err(TransformError::Stale {
            parent: parent_frame.to_string(),
            child: child_frame.to_string(),
            age_ms,
        });
    }

    Ok(transform)
}
