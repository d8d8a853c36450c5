//! API module
//!
//! HTTP request handlers for the kettle task endpoints and the standalone
//! spiral-pour action. Long-running operations stream stage feedback as
//! Server-Sent Events; every stream ends with one terminal result event
//! followed by a `[DONE]` marker.

pub mod pour;
pub mod tasks;

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
};
use futures_util::StreamExt;

use crate::error::TaskError;

/// Helper function to format a stream into SSE (Server-Sent Events) format
///
/// Takes a stream of `Result<String, axum::Error>` and converts it to SSE
/// format where each item is formatted as "data: <content>\n\n"
fn format_sse_stream(
    stream: impl futures_util::Stream<Item = Result<String, axum::Error>> + Send + 'static,
) -> impl futures_util::Stream<Item = Result<String, std::io::Error>> {
    stream.map(|event_result| {
        let sse_text = match event_result {
            Ok(data) => format!("data: {}\n\n", data),
            Err(e) => format!("data: [ERROR] {}\n\n", e),
        };
        Ok::<_, std::io::Error>(sse_text)
    })
}

/// Wrap an event stream in an SSE response.
fn sse_response(
    stream: impl futures_util::Stream<Item = Result<String, axum::Error>> + Send + 'static,
) -> Result<Response, TaskError> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(format_sse_stream(stream)))
        .map_err(|e| TaskError::Internal(anyhow::anyhow!("Failed to build response: {}", e)))
}
