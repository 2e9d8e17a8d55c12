//! HTTP surface: one `/bookings` resource plus `/bookings/verify` and
//! `/health`, all JSON, all carrying the CORS headers the hosted client needs.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State, rejection::QueryRejection},
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::observability::{REQUEST_DURATION_SECONDS, REQUESTS_TOTAL};
use crate::service::*;

pub const ALLOWED_HEADERS: &str = "Content-Type";
pub const ALLOWED_METHODS: &str = "GET, POST, DELETE, OPTIONS";

/// Shared application state
pub struct AppState {
    pub service: BookingService,
}

type SharedState = Arc<AppState>;

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Auth(_) => StatusCode::UNAUTHORIZED,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error_response(status, self.message())
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Build the application router. `allowed_origin` is echoed in
/// `Access-Control-Allow-Origin` on every response.
pub fn router(service: BookingService, allowed_origin: HeaderValue) -> Router {
    let state = Arc::new(AppState { service });

    Router::new()
        .route(
            "/health",
            get(health).options(preflight).fallback(method_not_allowed),
        )
        .route(
            "/bookings",
            get(list_bookings)
                .post(create_booking)
                .delete(cancel_booking)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .route(
            "/bookings/verify",
            get(verify_credentials)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .fallback(unknown_path)
        .with_state(state)
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            allowed_origin,
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        ))
        .layer(TraceLayer::new_for_http())
}

/// Run one operation, recording its outcome and latency.
async fn observe<T>(
    operation: Operation,
    fut: impl Future<Output = Result<T, ServiceError>>,
) -> Result<T, ServiceError> {
    let start = Instant::now();
    let result = fut.await;
    let status = match &result {
        Ok(_) => "ok",
        Err(e) => e.label(),
    };
    metrics::counter!(REQUESTS_TOTAL, "operation" => operation.label(), "status" => status)
        .increment(1);
    metrics::histogram!(REQUEST_DURATION_SECONDS, "operation" => operation.label())
        .record(start.elapsed().as_secs_f64());
    result
}

fn bad_query(rejection: QueryRejection) -> ServiceError {
    debug!("rejected query string: {rejection}");
    ServiceError::Validation("Invalid query parameters".to_string())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "service": "rangebook" }))
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn method_not_allowed() -> Response {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

async fn unknown_path(method: Method) -> Response {
    if method == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn list_bookings(
    State(state): State<SharedState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(q)) => q,
        Err(rejection) => return bad_query(rejection).into_response(),
    };
    match observe(query.operation(), state.service.list(&query)).await {
        Ok(bookings) => Json(bookings).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn verify_credentials(
    State(state): State<SharedState>,
    query: Result<Query<VerifyRequest>, QueryRejection>,
) -> Response {
    let req = match query {
        Ok(Query(q)) => q,
        Err(rejection) => return bad_query(rejection).into_response(),
    };
    match observe(
        Operation::VerifyCredentials,
        state.service.verify_credentials(&req),
    )
    .await
    {
        Ok(bookings) => Json(bookings).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn create_booking(State(state): State<SharedState>, body: Bytes) -> Response {
    // An empty body reads as an empty object so it reports missing fields.
    let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        &body
    };
    let req: CreateBookingRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            debug!("unparsable booking body: {e}");
            return error_response(StatusCode::BAD_REQUEST, "Invalid request body");
        }
    };
    match observe(Operation::CreateBooking, state.service.create_booking(req)).await {
        Ok(booking) => (StatusCode::CREATED, Json(booking)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn cancel_booking(
    State(state): State<SharedState>,
    query: Result<Query<CancelBookingRequest>, QueryRejection>,
) -> Response {
    let req = match query {
        Ok(Query(q)) => q,
        Err(rejection) => return bad_query(rejection).into_response(),
    };
    match observe(Operation::CancelBooking, state.service.cancel_booking(&req)).await {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(e) => e.into_response(),
    }
}
