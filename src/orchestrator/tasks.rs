//! Task orchestration state machines.
//!
//! The three top-level operations (pick, place, pour) are each a short
//! sequential pipeline of suspending steps: transform lookups, gateway
//! invocations, the nested spiral-pour sub-action, and settle pauses. The
//! physical arm is a single exclusive resource, so every operation claims
//! the arm mutex up front and rejects concurrent motion with `RobotBusy`.
//! A cancellation token is observed at every suspension point.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;

use crate::config::FrameConfig;
use crate::error::TaskError;
use crate::feedback::FeedbackSink;
use crate::gateways::{
    lookup_bounded, DelayService, FrameTransformProvider, GraspEpsilon, GraspGateway,
    GraspPlan, GraspPlanExecutor, GraspRequest, GripperCommand, JointTarget,
    MotionPlanningGateway, TransformPolicy,
};
use crate::geometry::{FrameTransform, Pose, Quat, Vec3};
use crate::orchestrator::session::{GraspRecord, TaskSession};
use crate::orchestrator::ArmMutex;
use crate::pour::{PourMotionService, PourRequest};

/// Home configuration the arm returns to before observing the kettle.
static HOME_JOINTS: Lazy<Vec<JointTarget>> = Lazy::new(|| {
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};
    let positions = [
        0.0,
        -FRAC_PI_4,
        0.0,
        -3.0 * FRAC_PI_4,
        0.0,
        FRAC_PI_2,
        FRAC_PI_4,
    ];
    positions
        .iter()
        .enumerate()
        .map(|(i, &position)| JointTarget {
            name: format!("panda_joint{}", i + 1),
            position,
        })
        .collect()
});

// Observation pose over the kettle tag, camera facing down.
const OBSERVE_OFFSET: Pose = Pose::new(Vec3::new(0.0, 0.0, 0.40), Quat::new(1.0, 0.0, 0.0, 0.0));
const REFINEMENT_OFFSET: Pose = Pose::new(Vec3::new(0.0, 0.0, -0.15), Quat::IDENTITY);

// Grasp points in the handle frame; the grasp driver finalizes them against
// its own detection.
const GRASP_APPROACH_OFFSET: Pose = Pose::new(Vec3::new(0.0, 0.0, -0.10), Quat::IDENTITY);
const GRASP_OFFSET: Pose = Pose::new(Vec3::new(0.03, 0.0, 0.0), Quat::IDENTITY);
const GRASP_RETREAT_OFFSET: Pose = Pose::new(Vec3::new(0.03, 0.0, -0.10), Quat::IDENTITY);

// Place points composed through the recorded grasp transform.
const PLACE_APPROACH_OFFSET: Pose = Pose::new(Vec3::new(0.0, 0.0, -0.10), Quat::IDENTITY);
const PLACE_RELEASE_OFFSET: Pose = Pose::new(Vec3::new(0.0, 0.0, -0.02), Quat::IDENTITY);
const PLACE_RETREAT_OFFSET: Pose = Pose::new(Vec3::new(0.0, 0.0, -0.10), Quat::IDENTITY);

// Pour poses relative to the kettle spout, composed through the spout offset
// and then the pour-target transform.
const SPOUT_TRANSLATION: Vec3 = Vec3::new(-0.23, 0.0, 0.02);
const POUR_APPROACH_OFFSET: Pose =
    Pose::new(Vec3::new(-0.01, 0.0, 0.20), Quat::new(1.0, 0.0, 0.0, 0.0));
const POUR_TIP_OFFSET: Pose = Pose::new(
    Vec3::new(0.01, -0.005, 0.17),
    Quat::new(0.9452608, 0.0, -0.3150869, -0.0848662),
);

const KETTLE_GRASP_WIDTH: f64 = 0.03;
const KETTLE_GRASP_FORCE: f64 = 50.0;
const KETTLE_GRASP_SPEED: f64 = 0.05;
const KETTLE_GRASP_EPSILON: GraspEpsilon = GraspEpsilon {
    inner: 0.01,
    outer: 0.01,
};
const KETTLE_OBJECT_CLASS: u32 = 1;

// Open wider than the grasp width to release the kettle.
const RELEASE_COMMAND: GripperCommand = GripperCommand {
    width: 0.04,
    force: 50.0,
    speed: 0.2,
};

const POUR_PASSES: u32 = 4;
const POUR_POINTS: u32 = 100;
const POUR_RADIUS: f64 = 0.02;
const POUR_LOOPS: f64 = 2.0;
const SETTLE_PAUSE: Duration = Duration::from_secs(1);

/// Bookkeeping for one spiral pass within a pour operation.
#[derive(Debug, Clone, Copy)]
struct PourCycle {
    pass: u32,
    start_outside: bool,
    settle_after: bool,
}

/// The fixed pass schedule: the first pass clears the center winding inward
/// from the outer radius, the remaining passes sweep outward again. Liquid
/// settles for a beat between passes, not after the last one.
fn pour_schedule() -> [PourCycle; POUR_PASSES as usize] {
    std::array::from_fn(|i| {
        let pass = i as u32 + 1;
        PourCycle {
            pass,
            start_outside: pass == 1,
            settle_after: pass < POUR_PASSES,
        }
    })
}

/// Coordinates the pick → pour → place task pipeline.
pub struct TaskOrchestrator {
    transforms: Arc<dyn FrameTransformProvider>,
    motion: Arc<dyn MotionPlanningGateway>,
    grasp: Arc<dyn GraspGateway>,
    grasp_executor: Arc<dyn GraspPlanExecutor>,
    delay: Arc<dyn DelayService>,
    pour_service: Arc<PourMotionService>,
    session: TaskSession,
    arm: ArmMutex,
    frames: FrameConfig,
    transform_policy: TransformPolicy,
}

impl TaskOrchestrator {
    /// Wire an orchestrator against the given gateways.
    ///
    /// `arm` is the shared exclusivity mutex; every motion-issuing entry
    /// point (including standalone pours handled outside the orchestrator)
    /// must claim it.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transforms: Arc<dyn FrameTransformProvider>,
        motion: Arc<dyn MotionPlanningGateway>,
        grasp: Arc<dyn GraspGateway>,
        grasp_executor: Arc<dyn GraspPlanExecutor>,
        delay: Arc<dyn DelayService>,
        pour_service: Arc<PourMotionService>,
        arm: ArmMutex,
        frames: FrameConfig,
        transform_policy: TransformPolicy,
    ) -> Self {
        Self {
            transforms,
            motion,
            grasp,
            grasp_executor,
            delay,
            pour_service,
            session: TaskSession::new(),
            arm,
            frames,
            transform_policy,
        }
    }

    /// Pick the kettle up from its stand.
    ///
    /// Homes the arm, resolves the kettle's fiducial frame, composes the
    /// observation pose, and hands the grasp process to the grasp driver.
    /// The realized grasp pose is stored in the session for the next place.
    pub async fn pick(
        &self,
        feedback: &FeedbackSink,
        cancel: &CancellationToken,
    ) -> Result<(), TaskError> {
        let _claim = self.claim_arm()?;
        tracing::info!("Pick started");

        feedback.stage("Homing arm").await;
        let trajectory = self
            .run_step(cancel, self.motion.plan_joints(&HOME_JOINTS))
            .await?;
        self.run_step(cancel, self.motion.execute(trajectory))
            .await?;

        feedback.stage("Locating kettle").await;
        let tag = self.lookup(cancel, &self.frames.kettle_tag).await?;
        let observe_pose = tag.transform_pose(&OBSERVE_OFFSET);

        let request = GraspRequest {
            observe_pose,
            refinement_pose: REFINEMENT_OFFSET,
            approach_pose: GRASP_APPROACH_OFFSET,
            grasp_pose: GRASP_OFFSET,
            retreat_pose: GRASP_RETREAT_OFFSET,
            width: KETTLE_GRASP_WIDTH,
            force: KETTLE_GRASP_FORCE,
            speed: KETTLE_GRASP_SPEED,
            epsilon: KETTLE_GRASP_EPSILON,
            object_class: KETTLE_OBJECT_CLASS,
        };

        feedback.stage("Requesting grasp").await;
        let outcome = self.run_step(cancel, self.grasp.grasp(request)).await?;
        outcome.actual_grasp_pose.rotation.validate().map_err(|_| {
            TaskError::GraspFailed("grasp driver returned a non-normalized grasp pose".to_string())
        })?;

        self.session
            .store(GraspRecord::new(outcome.actual_grasp_pose))
            .await;
        tracing::info!("Pick completed");
        Ok(())
    }

    /// Place the kettle back on its stand.
    ///
    /// Requires the grasp record from a prior successful [`pick`]; calling
    /// without one is a precondition violation raised before any motion.
    ///
    /// [`pick`]: TaskOrchestrator::pick
    pub async fn place(
        &self,
        feedback: &FeedbackSink,
        cancel: &CancellationToken,
    ) -> Result<(), TaskError> {
        let _claim = self.claim_arm()?;

        let record = self.session.take().await.ok_or_else(|| {
            TaskError::PreconditionViolated(
                "place requires a grasp record from a prior successful pick".to_string(),
            )
        })?;
        tracing::info!(grasped_at = %record.grasped_at, "Place started");

        let approach_pose = record.grasp.transform_pose(&PLACE_APPROACH_OFFSET);
        let grasp_pose = record.grasp.transform_pose(&PLACE_RELEASE_OFFSET);
        let retreat_pose = record.grasp.transform_pose(&PLACE_RETREAT_OFFSET);

        let plan = GraspPlan {
            approach_pose,
            grasp_pose,
            retreat_pose,
            grasp_command: RELEASE_COMMAND,
            reset_load: true,
        };

        feedback.stage("Releasing kettle").await;
        self.run_step(cancel, self.grasp_executor.execute_plan(plan))
            .await?;
        tracing::info!("Place completed");
        Ok(())
    }

    /// Pour from the kettle over the pour target in spiral passes.
    ///
    /// Resolves the pour-target frame before any motion, composes approach
    /// and pour poses through the spout offset and the target transform,
    /// then runs the fixed pass schedule with a settle pause between passes.
    pub async fn pour(
        &self,
        feedback: &FeedbackSink,
        cancel: &CancellationToken,
    ) -> Result<(), TaskError> {
        let _claim = self.claim_arm()?;

        feedback.stage("Locating pour target").await;
        let pot = self.lookup(cancel, &self.frames.pot_top).await?;
        tracing::info!(pot_frame = %self.frames.pot_top, "Pour started");

        let spout = FrameTransform::fixed(
            self.frames.base.clone(),
            "kettle_spout",
            SPOUT_TRANSLATION,
            Quat::IDENTITY,
        );
        let approach_pose = pot.transform_pose(&spout.transform_pose(&POUR_APPROACH_OFFSET));
        let pour_pose = pot.transform_pose(&spout.transform_pose(&POUR_TIP_OFFSET));

        for cycle in pour_schedule() {
            feedback
                .stage(format!("Pour pass {} of {}", cycle.pass, POUR_PASSES))
                .await;

            self.move_to(&approach_pose, cancel).await?;
            self.move_to(&pour_pose, cancel).await?;

            let request = PourRequest {
                target_frame: self.frames.end_effector.clone(),
                num_points: POUR_POINTS,
                spiral_radius: POUR_RADIUS,
                num_loops: POUR_LOOPS,
                start_outside: cycle.start_outside,
            };
            self.pour_service.pour(&request, feedback, cancel).await?;

            self.move_to(&approach_pose, cancel).await?;

            if cycle.settle_after {
                feedback.stage("Settling").await;
                // Fixed-length settle pause; the pause itself runs to
                // completion and cancellation is observed right after.
                self.delay.wait(SETTLE_PAUSE).await?;
                if cancel.is_cancelled() {
                    return Err(TaskError::Cancelled);
                }
            }
        }

        tracing::info!("Pour completed");
        Ok(())
    }

    /// Claim exclusive ownership of the arm without waiting.
    fn claim_arm(&self) -> Result<OwnedMutexGuard<()>, TaskError> {
        self.arm
            .clone()
            .try_lock_owned()
            .map_err(|_| TaskError::RobotBusy)
    }

    /// Resolve base → `child` under the configured lookup policy.
    async fn lookup(
        &self,
        cancel: &CancellationToken,
        child: &str,
    ) -> Result<FrameTransform, TaskError> {
        self.run_step(
            cancel,
            lookup_bounded(
                self.transforms.as_ref(),
                &self.frames.base,
                child,
                self.transform_policy,
            ),
        )
        .await
    }

    /// Plan to `goal` and execute the trajectory to completion.
    async fn move_to(&self, goal: &Pose, cancel: &CancellationToken) -> Result<(), TaskError> {
        let trajectory = self.run_step(cancel, self.motion.plan_pose(goal)).await?;
        self.run_step(cancel, self.motion.execute(trajectory)).await
    }

    /// Race one suspending step against cancellation.
    async fn run_step<T, E>(
        &self,
        cancel: &CancellationToken,
        fut: impl Future<Output = Result<T, E>>,
    ) -> Result<T, TaskError>
    where
        TaskError: From<E>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TaskError::Cancelled),
            result = fut => result.map_err(TaskError::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pour_schedule_matches_the_fixed_pass_pattern() {
        let schedule = pour_schedule();
        assert_eq!(schedule.len(), 4);

        let flags: Vec<bool> = schedule.iter().map(|c| c.start_outside).collect();
        assert_eq!(flags, vec![true, false, false, false]);

        let settles: Vec<bool> = schedule.iter().map(|c| c.settle_after).collect();
        assert_eq!(settles, vec![true, true, true, false]);
    }

    #[test]
    fn home_configuration_covers_all_seven_joints() {
        assert_eq!(HOME_JOINTS.len(), 7);
        assert_eq!(HOME_JOINTS[0].name, "panda_joint1");
        assert_eq!(HOME_JOINTS[6].name, "panda_joint7");
        assert!((HOME_JOINTS[3].position + 3.0 * std::f64::consts::FRAC_PI_4).abs() < 1e-12);
    }
}
