//! HTTP surface of the ingestion endpoint.

use crate::error::IngestError;
use crate::service::{BatchRequest, IngestReport, IngestService};
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use logship_telemetry::{RequestInfo, RequestTracer, TraceStatus};
use serde_json::{json, Value};
use std::sync::Arc;

/// Correlation header read from requests and echoed on responses.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Routes: `POST /api/logs/batch`, `GET /healthz`, and the browser routes
/// `POST /api/frontend-logs` and `POST /api/frontend-logs/batch`.
pub fn router(service: Arc<IngestService>) -> Router {
    let body_limit = service.config().max_body_bytes;
    Router::new()
        .route("/api/logs/batch", post(ingest_batch))
        .route("/api/frontend-logs", post(ingest_frontend_batch))
        .route("/api/frontend-logs/batch", post(ingest_frontend_batch))
        .route("/healthz", get(healthz))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(service)
}

/// Record every request through `tracer`.
pub fn traced(router: Router, tracer: Arc<RequestTracer>) -> Router {
    router.layer(middleware::from_fn_with_state(tracer, trace_request))
}

async fn ingest_batch(
    State(service): State<Arc<IngestService>>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<IngestReport>, IngestError> {
    service.ingest(request).await.map(Json)
}

/// Browser clients do not name a source; their events are client events.
async fn ingest_frontend_batch(
    State(service): State<Arc<IngestService>>,
    Json(mut request): Json<BatchRequest>,
) -> Result<Json<IngestReport>, IngestError> {
    for event in &mut request.events {
        if let Some(fields) = event.as_object_mut() {
            fields
                .entry("source")
                .or_insert_with(|| Value::from("client-event"));
        }
    }
    service.ingest(request).await.map(Json)
}

async fn healthz(State(service): State<Arc<IngestService>>) -> Json<serde_json::Value> {
    Json(json!({"status": "ok", "ingest": service.stats()}))
}

async fn trace_request(
    State(tracer): State<Arc<RequestTracer>>,
    request: Request,
    next: Next,
) -> Response {
    let mut info = RequestInfo::new(request.method().as_str(), request.uri().path());
    if let Some(id) = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        info = info.with_request_id(id);
    }

    let trace = tracer.start(info);
    let request_id = HeaderValue::from_str(trace.request_id()).ok();
    let mut response = next.run(request).await;
    trace.finish(TraceStatus::Http(response.status().as_u16()));

    if let Some(id) = request_id {
        response.headers_mut().insert(REQUEST_ID_HEADER, id);
    }
    response
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        match self {
            IngestError::Backpressure => (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, "1")],
                Json(json!({"error": "backpressure"})),
            )
                .into_response(),
            IngestError::Store(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::RETRY_AFTER, "1")],
                Json(json!({"error": "store_unavailable"})),
            )
                .into_response(),
            IngestError::TooLarge { count, max } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({
                    "error": "batch_too_large",
                    "count": count,
                    "max": max,
                })),
            )
                .into_response(),
            IngestError::Validation(reason) => (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "invalid_batch", "reason": reason})),
            )
                .into_response(),
        }
    }
}
