//! Barista Backend
//!
//! An HTTP service that sequences the kettle manipulation pipeline (pick,
//! spiral pour, place) over a fleet of robot driver services: motion
//! planning, grasping, transform lookup, and timed delays. Task progress is
//! streamed to callers as Server-Sent Events.

mod api;
mod config;
mod error;
mod feedback;
mod gateways;
mod geometry;
mod orchestrator;
mod pour;
mod spiral;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::Request,
    middleware::Next,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::sync::RwLock;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use config::Config;
use gateways::http::{
    HttpDelayService, HttpFrameTransformProvider, HttpGraspGateway, HttpMotionGateway,
};
use gateways::{DelayService, TransformPolicy};
use orchestrator::{arm_mutex, TaskOrchestrator};
use pour::PourMotionService;
use state::AppState;

#[derive(Serialize)]
struct HelloResponse {
    message: String,
    status: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    message: String,
}

/// Request ID middleware - adds unique ID to each request for tracing
async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        uri = %uri,
    );

    let response = next.run(request).instrument(span).await;

    let duration = start.elapsed();
    info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %response.status().as_u16(),
        duration_ms = duration.as_millis(),
        "Request completed"
    );

    response
}

/// Probe the delay driver until it answers, warning while it doesn't.
///
/// The pipeline cannot settle between pour passes without it, so startup
/// makes its absence loud. After a bounded number of attempts the server
/// starts anyway and the first pour reports the failure properly.
async fn wait_for_delay_service(delay: &dyn DelayService) {
    const ATTEMPTS: u32 = 15;
    for attempt in 1..=ATTEMPTS {
        if delay.ready().await {
            info!("Delay service is ready");
            return;
        }
        warn!(attempt, "Waiting for delay service");
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
    warn!("Delay service still unreachable; starting anyway");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load configuration
    let config = Config::from_env();
    info!("Configuration loaded: {:?}", config);

    // Shared HTTP client for all driver gateways (connection pooling)
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.drivers.request_timeout_secs))
        .build()?;
    let execution_timeout = Duration::from_secs(config.drivers.execution_timeout_secs);

    let transforms = Arc::new(HttpFrameTransformProvider::new(
        client.clone(),
        config.drivers.transform_url.clone(),
    ));
    let motion = Arc::new(HttpMotionGateway::new(
        client.clone(),
        config.drivers.motion_url.clone(),
        execution_timeout,
    ));
    let grasp = Arc::new(HttpGraspGateway::new(
        client.clone(),
        config.drivers.grasp_url.clone(),
        execution_timeout,
    ));
    let delay = Arc::new(HttpDelayService::new(
        client.clone(),
        config.drivers.delay_url.clone(),
    ));

    wait_for_delay_service(delay.as_ref()).await;

    let transform_policy = TransformPolicy {
        deadline: config.transforms.lookup_timeout(),
        max_age: config.transforms.max_age(),
    };

    let pour_service = Arc::new(PourMotionService::new(
        transforms.clone(),
        motion.clone(),
        config.frames.base.clone(),
        transform_policy,
    ));

    let arm = arm_mutex();
    let orchestrator = Arc::new(TaskOrchestrator::new(
        transforms,
        motion,
        grasp.clone(),
        grasp,
        delay,
        pour_service.clone(),
        arm.clone(),
        config.frames.clone(),
        transform_policy,
    ));

    // Initialize application state
    let app_state = Arc::new(RwLock::new(AppState::new(orchestrator, pour_service, arm)));

    // Build our application with routes
    let app = Router::new()
        // Health check and hello world
        .route("/", get(hello_world))
        .route("/api/health", get(health_check))
        // Kettle task API
        .route("/api/kettle/pick", post(api::tasks::pick_kettle))
        .route("/api/kettle/place", post(api::tasks::place_kettle))
        .route("/api/kettle/pour", post(api::tasks::pour_kettle))
        .route("/api/task/cancel", post(api::tasks::cancel_task))
        // Standalone spiral-pour action
        .route("/api/pour", post(api::pour::pour_action))
        // Middleware (order matters - request_id should be first)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(CorsLayer::permissive()) // Allow CORS for development
        .with_state(app_state);

    // Bind to address from config
    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {}", e))?;

    info!("🤖 Server running on http://{}", addr);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // Setup graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Handle graceful shutdown signals (Ctrl+C, SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}

async fn hello_world() -> Json<HelloResponse> {
    Json(HelloResponse {
        message: "Hello from Barista Backend!".to_string(),
        status: "ok".to_string(),
    })
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        message: "Backend is healthy".to_string(),
    })
}
