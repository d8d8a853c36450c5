//! HTTP implementations of the driver gateway contracts.
//!
//! Each driver service exposes a small JSON API; these clients are thin
//! wrappers that map transport and status errors into the typed gateway
//! errors. A shared [`reqwest::Client`] is cloned into every gateway for
//! connection pooling.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::gateways::{
    DelayError, DelayService, FrameTransformProvider, GraspError, GraspGateway, GraspOutcome,
    GraspPlan, GraspPlanExecutor, GraspRequest, JointTarget, MotionError, MotionPlanningGateway,
    Trajectory, TransformError,
};
use crate::geometry::{FrameTransform, Pose};

#[derive(Debug, Serialize)]
struct LookupRequest<'a> {
    parent_frame: &'a str,
    child_frame: &'a str,
}

#[derive(Debug, Deserialize)]
struct DelayAck {
    #[allow(dead_code)]
    done: bool,
}

async fn error_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error body".to_string())
}

/// Transform lookup over HTTP.
pub struct HttpFrameTransformProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFrameTransformProvider {
    /// Create a provider addressing the transform service at `base_url`.
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl FrameTransformProvider for HttpFrameTransformProvider {
    async fn lookup(
        &self,
        parent_frame: &str,
        child_frame: &str,
    ) -> Result<FrameTransform, TransformError> {
        let url = format!("{}/api/transform/lookup", self.base_url);
        tracing::debug!(parent = %parent_frame, child = %child_frame, "Looking up transform");

        let response = self
            .client
            .post(&url)
            .json(&LookupRequest {
                parent_frame,
                child_frame,
            })
            .send()
            .await
            .map_err(|e| TransformError::Unreachable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(TransformError::NotFound {
                parent: parent_frame.to_string(),
                child: child_frame.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(TransformError::Unreachable(error_body(response).await));
        }

        response
            .json::<FrameTransform>()
            .await
            .map_err(|e| TransformError::Unreachable(format!("invalid transform payload: {e}")))
    }
}

/// Motion planning and execution over HTTP.
pub struct HttpMotionGateway {
    client: reqwest::Client,
    base_url: String,
    execution_timeout: Duration,
}

impl HttpMotionGateway {
    /// Create a gateway addressing the motion service at `base_url`.
    ///
    /// `execution_timeout` bounds the blocking execute call, which the
    /// driver holds open until the motion physically completes.
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        execution_timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            execution_timeout,
        }
    }

    async fn plan<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<Trajectory, MotionError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| MotionError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MotionError::Planning(error_body(response).await));
        }

        response
            .json::<Trajectory>()
            .await
            .map_err(|e| MotionError::Unreachable(format!("invalid trajectory payload: {e}")))
    }
}

#[async_trait]
impl MotionPlanningGateway for HttpMotionGateway {
    async fn plan_joints(&self, targets: &[JointTarget]) -> Result<Trajectory, MotionError> {
        self.plan("/api/plan/joints", targets).await
    }

    async fn plan_pose(&self, goal: &Pose) -> Result<Trajectory, MotionError> {
        self.plan("/api/plan/pose", goal).await
    }

    async fn plan_cartesian(&self, waypoints: &[Pose]) -> Result<Trajectory, MotionError> {
        self.plan("/api/plan/cartesian", waypoints).await
    }

    async fn execute(&self, trajectory: Trajectory) -> Result<(), MotionError> {
        let url = format!("{}/api/execute", self.base_url);
        tracing::debug!(trajectory_id = %trajectory.id, "Executing trajectory");

        // The driver answers only after the motion finishes, so this request
        // gets the long execution timeout rather than the client default.
        let response = self
            .client
            .post(&url)
            .timeout(self.execution_timeout)
            .json(&trajectory)
            .send()
            .await
            .map_err(|e| MotionError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MotionError::Execution(error_body(response).await));
        }
        Ok(())
    }

    async fn end_effector_pose(&self) -> Result<Pose, MotionError> {
        let url = format!("{}/api/end_effector", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| MotionError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MotionError::Unreachable(error_body(response).await));
        }

        response
            .json::<Pose>()
            .await
            .map_err(|e| MotionError::Unreachable(format!("invalid pose payload: {e}")))
    }
}

/// Grasp process and grasp plan execution over HTTP.
///
/// The grasp driver serves both the detect-and-grasp process and the
/// pre-composed plan executor, so one client implements both traits.
pub struct HttpGraspGateway {
    client: reqwest::Client,
    base_url: String,
    execution_timeout: Duration,
}

impl HttpGraspGateway {
    /// Create a gateway addressing the grasp service at `base_url`.
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        execution_timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            execution_timeout,
        }
    }
}

#[async_trait]
impl GraspGateway for HttpGraspGateway {
    async fn grasp(&self, request: GraspRequest) -> Result<GraspOutcome, GraspError> {
        let url = format!("{}/api/grasp_process", self.base_url);
        tracing::debug!(object_class = request.object_class, "Requesting grasp process");

        let response = self
            .client
            .post(&url)
            .timeout(self.execution_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| GraspError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GraspError::Failed(error_body(response).await));
        }

        response
            .json::<GraspOutcome>()
            .await
            .map_err(|e| GraspError::Unreachable(format!("invalid grasp payload: {e}")))
    }
}

#[async_trait]
impl GraspPlanExecutor for HttpGraspGateway {
    async fn execute_plan(&self, plan: GraspPlan) -> Result<(), GraspError> {
        let url = format!("{}/api/grasp_plan", self.base_url);

        let response = self
            .client
            .post(&url)
            .timeout(self.execution_timeout)
            .json(&plan)
            .send()
            .await
            .map_err(|e| GraspError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GraspError::Failed(error_body(response).await));
        }
        Ok(())
    }
}

/// Delay timer over HTTP.
pub struct HttpDelayService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDelayService {
    /// Create a client addressing the delay service at `base_url`.
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl DelayService for HttpDelayService {
    async fn wait(&self, duration: Duration) -> Result<(), DelayError> {
        let url = format!("{}/api/delay", self.base_url);
        let seconds = duration.as_secs_f64();

        let response = self
            .client
            .post(&url)
            // the driver holds the request open for the full delay
            .timeout(duration + Duration::from_secs(5))
            .json(&json!({ "seconds": seconds }))
            .send()
            .await
            .map_err(|e| DelayError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DelayError::Unreachable(error_body(response).await));
        }

        // Acknowledge payload is advisory; a 2xx is the contract.
        let _ = response.json::<DelayAck>().await;
        Ok(())
    }

    async fn ready(&self) -> bool {
        let url = format!("{}/api/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
