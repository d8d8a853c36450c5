//! Integration tests for the task orchestration pipelines
//!
//! These tests drive the real orchestrator against recording mock gateways
//! and verify the sequencing contracts: what motion is requested, in what
//! order, with which direction flags, and that failures abort before any
//! further motion is issued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use barista_backend::config::FrameConfig;
use barista_backend::error::TaskError;
use barista_backend::feedback::FeedbackSink;
use barista_backend::gateways::{
    DelayError, DelayService, FrameTransformProvider, GraspError, GraspGateway, GraspOutcome,
    GraspPlan, GraspPlanExecutor, GraspRequest, JointTarget, MotionError, MotionPlanningGateway,
    Trajectory, TransformError, TransformPolicy,
};
use barista_backend::geometry::{FrameTransform, Pose, Quat, Vec3};
use barista_backend::orchestrator::{arm_mutex, TaskOrchestrator};
use barista_backend::pour::PourMotionService;

/// Everything the mock drivers were asked to do, in order.
#[derive(Debug, Clone, PartialEq)]
enum Event {
    Lookup(String),
    PlanJoints(usize),
    PlanPose,
    PlanCartesian {
        num_points: usize,
        started_outside: bool,
    },
    Execute,
    EndEffector,
    Grasp,
    GraspPlan,
    Delay(u128),
}

/// Position every mock transform lookup reports; the spiral center detection
/// below compares waypoints against it.
const LOOKUP_POS: Vec3 = Vec3::new(0.4, 0.0, 0.2);

/// One mock standing in for all five driver services.
#[derive(Default)]
struct MockDriver {
    events: Mutex<Vec<Event>>,
    /// Child frame whose lookup fails with `NotFound`.
    fail_frame: Mutex<Option<String>>,
    fail_cartesian: AtomicBool,
    /// When set, `plan_joints` blocks until notified.
    joints_gate: Mutex<Option<Arc<Notify>>>,
    last_grasp_plan: Mutex<Option<GraspPlan>>,
}

impl MockDriver {
    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn fail_frame(&self, frame: &str) {
        *self.fail_frame.lock().unwrap() = Some(frame.to_string());
    }

    fn gate_joints(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.joints_gate.lock().unwrap() = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl FrameTransformProvider for MockDriver {
    async fn lookup(
        &self,
        parent_frame: &str,
        child_frame: &str,
    ) -> Result<FrameTransform, TransformError> {
        self.record(Event::Lookup(child_frame.to_string()));
        let failing = self.fail_frame.lock().unwrap().clone();
        if failing.as_deref() == Some(child_frame) {
            return Err(TransformError::NotFound {
                parent: parent_frame.to_string(),
                child: child_frame.to_string(),
            });
        }
        Ok(FrameTransform::fixed(
            parent_frame,
            child_frame,
            LOOKUP_POS,
            Quat::IDENTITY,
        ))
    }
}

#[async_trait]
impl MotionPlanningGateway for MockDriver {
    async fn plan_joints(&self, targets: &[JointTarget]) -> Result<Trajectory, MotionError> {
        self.record(Event::PlanJoints(targets.len()));
        let gate = self.joints_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(Trajectory {
            id: "joints".to_string(),
        })
    }

    async fn plan_pose(&self, _goal: &Pose) -> Result<Trajectory, MotionError> {
        self.record(Event::PlanPose);
        Ok(Trajectory {
            id: "pose".to_string(),
        })
    }

    async fn plan_cartesian(&self, waypoints: &[Pose]) -> Result<Trajectory, MotionError> {
        let started_outside = waypoints
            .first()
            .map(|w| w.position.distance(&LOOKUP_POS) > 1e-4)
            .unwrap_or(false);
        self.record(Event::PlanCartesian {
            num_points: waypoints.len(),
            started_outside,
        });
        if self.fail_cartesian.load(Ordering::SeqCst) {
            return Err(MotionError::Planning("no path".to_string()));
        }
        Ok(Trajectory {
            id: "cartesian".to_string(),
        })
    }

    async fn execute(&self, _trajectory: Trajectory) -> Result<(), MotionError> {
        self.record(Event::Execute);
        Ok(())
    }

    async fn end_effector_pose(&self) -> Result<Pose, MotionError> {
        self.record(Event::EndEffector);
        Ok(Pose::new(Vec3::new(0.3, 0.0, 0.5), Quat::IDENTITY))
    }
}

#[async_trait]
impl GraspGateway for MockDriver {
    async fn grasp(&self, _request: GraspRequest) -> Result<GraspOutcome, GraspError> {
        self.record(Event::Grasp);
        Ok(GraspOutcome {
            actual_grasp_pose: FrameTransform::fixed(
                "panda_link0",
                "kettle",
                Vec3::new(0.5, 0.1, 0.1),
                Quat::IDENTITY,
            ),
        })
    }
}

#[async_trait]
impl GraspPlanExecutor for MockDriver {
    async fn execute_plan(&self, plan: GraspPlan) -> Result<(), GraspError> {
        self.record(Event::GraspPlan);
        *self.last_grasp_plan.lock().unwrap() = Some(plan);
        Ok(())
    }
}

#[async_trait]
impl DelayService for MockDriver {
    async fn wait(&self, duration: Duration) -> Result<(), DelayError> {
        self.record(Event::Delay(duration.as_millis()));
        Ok(())
    }
}

fn frames() -> FrameConfig {
    FrameConfig {
        base: "panda_link0".to_string(),
        kettle_tag: "filtered_kettle_tag".to_string(),
        pot_top: "pot_top".to_string(),
        end_effector: "panda_hand_tcp".to_string(),
    }
}

fn policy() -> TransformPolicy {
    TransformPolicy {
        deadline: Duration::from_millis(200),
        max_age: Duration::from_secs(10),
    }
}

fn build_orchestrator(mock: Arc<MockDriver>) -> TaskOrchestrator {
    let pour_service = Arc::new(PourMotionService::new(
        mock.clone(),
        mock.clone(),
        "panda_link0",
        policy(),
    ));
    TaskOrchestrator::new(
        mock.clone(),
        mock.clone(),
        mock.clone(),
        mock.clone(),
        mock,
        pour_service,
        arm_mutex(),
        frames(),
        policy(),
    )
}

fn motion_events(events: &[Event]) -> Vec<&Event> {
    events
        .iter()
        .filter(|e| {
            matches!(
                e,
                Event::PlanJoints(_)
                    | Event::PlanPose
                    | Event::PlanCartesian { .. }
                    | Event::Execute
                    | Event::Grasp
                    | Event::GraspPlan
            )
        })
        .collect()
}

#[tokio::test]
async fn pick_homes_locates_and_grasps() {
    let mock = Arc::new(MockDriver::default());
    let orchestrator = build_orchestrator(mock.clone());

    let result = orchestrator
        .pick(&FeedbackSink::disabled(), &CancellationToken::new())
        .await;
    assert!(result.is_ok(), "pick failed: {:?}", result.err());

    let events = mock.events();
    assert_eq!(
        events,
        vec![
            Event::PlanJoints(7),
            Event::Execute,
            Event::Lookup("filtered_kettle_tag".to_string()),
            Event::Grasp,
        ]
    );
}

#[tokio::test]
async fn pick_aborts_after_homing_when_tag_is_missing() {
    let mock = Arc::new(MockDriver::default());
    mock.fail_frame("filtered_kettle_tag");
    let orchestrator = build_orchestrator(mock.clone());

    let result = orchestrator
        .pick(&FeedbackSink::disabled(), &CancellationToken::new())
        .await;
    match result {
        Err(TaskError::TransformNotFound(frame)) => assert_eq!(frame, "filtered_kettle_tag"),
        other => panic!("expected TransformNotFound, got {other:?}"),
    }

    // homing ran, but nothing after the failed lookup
    let events = mock.events();
    assert_eq!(
        events,
        vec![
            Event::PlanJoints(7),
            Event::Execute,
            Event::Lookup("filtered_kettle_tag".to_string()),
        ]
    );
}

#[tokio::test]
async fn place_without_pick_violates_precondition_and_issues_no_motion() {
    let mock = Arc::new(MockDriver::default());
    let orchestrator = build_orchestrator(mock.clone());

    let result = orchestrator
        .place(&FeedbackSink::disabled(), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(TaskError::PreconditionViolated(_))));
    assert!(mock.events().is_empty(), "no driver call may be issued");
}

#[tokio::test]
async fn place_consumes_the_grasp_record_exactly_once() {
    let mock = Arc::new(MockDriver::default());
    let orchestrator = build_orchestrator(mock.clone());
    let feedback = FeedbackSink::disabled();
    let cancel = CancellationToken::new();

    orchestrator.pick(&feedback, &cancel).await.unwrap();
    orchestrator.place(&feedback, &cancel).await.unwrap();

    let plan = mock.last_grasp_plan.lock().unwrap().clone().unwrap();
    // wider than the 0.03 pick grasp, to let go
    assert!((plan.grasp_command.width - 0.04).abs() < 1e-9);
    assert!(plan.reset_load);
    // approach and retreat offsets coincide, composed through the grasp
    // transform recorded at (0.5, 0.1, 0.1)
    assert!(plan.approach_pose.position.distance(&Vec3::new(0.5, 0.1, 0.0)) < 1e-9);
    assert_eq!(plan.approach_pose, plan.retreat_pose);
    assert!(plan.grasp_pose.position.distance(&Vec3::new(0.5, 0.1, 0.08)) < 1e-9);

    // the record is gone now
    let again = orchestrator.place(&feedback, &cancel).await;
    assert!(matches!(again, Err(TaskError::PreconditionViolated(_))));
}

#[tokio::test]
async fn pour_runs_four_passes_with_settles_after_the_first_three() {
    let mock = Arc::new(MockDriver::default());
    let orchestrator = build_orchestrator(mock.clone());

    let result = orchestrator
        .pour(&FeedbackSink::disabled(), &CancellationToken::new())
        .await;
    assert!(result.is_ok(), "pour failed: {:?}", result.err());

    let events = mock.events();

    // exactly 4 spiral sub-requests, first pass outside-in, rest inside-out,
    // with a settle pause after passes 1-3 only
    let pattern: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            Event::PlanCartesian {
                started_outside, ..
            } => Some(format!("spiral({started_outside})")),
            Event::Delay(ms) => Some(format!("delay({ms})")),
            _ => None,
        })
        .collect();
    assert_eq!(
        pattern,
        vec![
            "spiral(true)",
            "delay(1000)",
            "spiral(false)",
            "delay(1000)",
            "spiral(false)",
            "delay(1000)",
            "spiral(false)",
        ]
    );

    // every spiral request carries the fixed 100-point parameterization
    let sizes: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            Event::PlanCartesian { num_points, .. } => Some(*num_points),
            _ => None,
        })
        .collect();
    assert_eq!(sizes, vec![100, 100, 100, 100]);

    // each pass: approach, pour pose, spiral, back to approach -> 3 pose
    // plans per pass
    let pose_plans = events.iter().filter(|e| matches!(e, Event::PlanPose)).count();
    assert_eq!(pose_plans, 12);

    // no trailing settle after the last pass
    assert!(!matches!(events.last(), Some(Event::Delay(_))));
}

#[tokio::test]
async fn pour_aborts_before_any_motion_when_pot_frame_is_missing() {
    let mock = Arc::new(MockDriver::default());
    mock.fail_frame("pot_top");
    let orchestrator = build_orchestrator(mock.clone());

    let result = orchestrator
        .pour(&FeedbackSink::disabled(), &CancellationToken::new())
        .await;
    match result {
        Err(TaskError::TransformNotFound(frame)) => assert_eq!(frame, "pot_top"),
        other => panic!("expected TransformNotFound, got {other:?}"),
    }

    let events = mock.events();
    assert!(motion_events(&events).is_empty(), "no motion may be issued");
    assert_eq!(events, vec![Event::Lookup("pot_top".to_string())]);
}

#[tokio::test]
async fn concurrent_operation_is_rejected_and_cancellation_releases_the_arm() {
    let mock = Arc::new(MockDriver::default());
    let gate = mock.gate_joints();
    let orchestrator = Arc::new(build_orchestrator(mock.clone()));

    let cancel = CancellationToken::new();
    let pick_cancel = cancel.clone();
    let pick_orchestrator = orchestrator.clone();
    let pick = tokio::spawn(async move {
        pick_orchestrator
            .pick(&FeedbackSink::disabled(), &pick_cancel)
            .await
    });

    // let the pick reach the gated planning call
    tokio::time::sleep(Duration::from_millis(50)).await;

    // the arm is owned; a second operation is rejected, not queued
    let busy = orchestrator
        .place(&FeedbackSink::disabled(), &CancellationToken::new())
        .await;
    assert!(matches!(busy, Err(TaskError::RobotBusy)));

    // cancel the pick mid-suspension
    cancel.cancel();
    let result = pick.await.unwrap();
    assert!(matches!(result, Err(TaskError::Cancelled)));

    // the claim was released: the next place fails on its precondition, not
    // on arm ownership
    let after = orchestrator
        .place(&FeedbackSink::disabled(), &CancellationToken::new())
        .await;
    assert!(matches!(after, Err(TaskError::PreconditionViolated(_))));

    gate.notify_one();
}

#[tokio::test]
async fn full_pipeline_runs_pick_pour_place() {
    let mock = Arc::new(MockDriver::default());
    let orchestrator = build_orchestrator(mock.clone());
    let feedback = FeedbackSink::disabled();
    let cancel = CancellationToken::new();

    orchestrator.pick(&feedback, &cancel).await.unwrap();
    orchestrator.pour(&feedback, &cancel).await.unwrap();
    orchestrator.place(&feedback, &cancel).await.unwrap();

    let events = mock.events();
    assert!(events.contains(&Event::Grasp));
    assert!(events.contains(&Event::GraspPlan));
    let spirals = events
        .iter()
        .filter(|e| matches!(e, Event::PlanCartesian { .. }))
        .count();
    assert_eq!(spirals, 4);
}
