//! Civic Reports HTTP server
//!
//! JSON/multipart surface over the submission pipeline, report reads, and the
//! leaderboard. Rendering and authentication live elsewhere; the submitter
//! identity arrives as a header, with a fixed fallback for unauthenticated
//! flows.

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::error::SubmitError;
use crate::leaderboard::LeaderboardService;
use crate::models::{validate_coordinates, validate_description, ImageUpload, NewSubmission};
use crate::storage::{DateSort, ReportQuery, ReportStore};
use crate::submit::SubmitService;

/// Submitter identifier used when no identity header is present.
pub const FALLBACK_USER_ID: &str = "user-guid-001";

/// Multipart bodies may exceed the 5 MB artifact bound; the artifact store is
/// the one that rejects oversized files with a proper message.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub struct AppState {
    pub submit: SubmitService,
    pub leaderboard: LeaderboardService,
    pub store: Arc<dyn ReportStore>,
    pub started_at: std::time::Instant,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/reports",
            post(submit_handler).get(latest_reports_handler),
        )
        .route("/api/reports/:id", get(report_handler))
        .route("/api/leaderboard", get(leaderboard_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "healthy": true,
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn submit_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> (StatusCode, Json<Value>) {
    let mut description = String::new();
    let mut latitude = None;
    let mut longitude = None;
    let mut photo: Option<ImageUpload> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return bad_request(format!("Malformed form data: {e}")),
        };

        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "description" => match field.text().await {
                Ok(text) => description = text,
                Err(e) => return bad_request(format!("Malformed form data: {e}")),
            },
            "latitude" => match parse_coordinate(field.text().await) {
                Ok(value) => latitude = value.or(latitude),
                Err(_) => return bad_request("Latitude must be a number.".to_string()),
            },
            "longitude" => match parse_coordinate(field.text().await) {
                Ok(value) => longitude = value.or(longitude),
                Err(_) => return bad_request("Longitude must be a number.".to_string()),
            },
            "photo" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                match field.bytes().await {
                    Ok(bytes) => {
                        photo = Some(ImageUpload {
                            file_name,
                            bytes: bytes.to_vec(),
                        })
                    }
                    Err(e) => return bad_request(format!("Upload failed: {e}")),
                }
            }
            _ => {}
        }
    }

    if let Err(message) = validate_description(&description) {
        return bad_request(message);
    }
    if let Err(message) = validate_coordinates(latitude, longitude) {
        return bad_request(message);
    }

    let user_id = headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .unwrap_or(FALLBACK_USER_ID)
        .to_string();

    let submission = NewSubmission {
        description,
        latitude,
        longitude,
        user_id,
        photo,
    };

    match state.submit.submit(submission).await {
        Ok(report_id) => {
            info!(report_id, "report submitted");
            (
                StatusCode::CREATED,
                Json(json!({
                    "report_id": report_id,
                    "message": format!("XP gained! +{} points awarded.", state.submit.reward()),
                })),
            )
        }
        Err(e) => submit_error_response(e),
    }
}

fn bad_request(message: String) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

/// An absent or blank coordinate field is "no coordinate"; anything else must
/// parse as a number.
fn parse_coordinate(
    text: Result<String, axum::extract::multipart::MultipartError>,
) -> Result<Option<f64>, ()> {
    let text = text.map_err(|_| ())?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    text.parse::<f64>().map(Some).map_err(|_| ())
}

/// Map each pipeline outcome to a distinct status code and user-visible
/// message; raw collaborator faults never reach the response body.
fn submit_error_response(e: SubmitError) -> (StatusCode, Json<Value>) {
    let status = match &e {
        SubmitError::ContentRejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        SubmitError::ModerationUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        SubmitError::ArtifactInvalid(_) => StatusCode::BAD_REQUEST,
        SubmitError::PersistenceFailed => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let mut body = json!({
        "outcome": e.outcome(),
        "error": e.to_string(),
    });
    if let SubmitError::ContentRejected {
        category: Some(category),
    } = &e
    {
        body["category"] = json!(category);
    }

    (status, Json(body))
}

#[derive(Debug, Deserialize)]
pub struct LatestReportsParams {
    pub keyword: Option<String>,
    pub sort: Option<String>,
}

async fn latest_reports_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LatestReportsParams>,
) -> (StatusCode, Json<Value>) {
    let sort = match params.sort.as_deref() {
        Some("oldest") => DateSort::OldestFirst,
        _ => DateSort::NewestFirst,
    };
    let query = ReportQuery {
        keyword: params.keyword.filter(|kw| !kw.trim().is_empty()),
        sort,
        ..ReportQuery::public()
    };

    match state.store.latest_reports(query).await {
        Ok(reports) => (StatusCode::OK, Json(json!({ "reports": reports }))),
        Err(e) => {
            error!("Failed to list reports: {}", e);
            internal_error()
        }
    }
}

async fn report_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> (StatusCode, Json<Value>) {
    match state.store.report(id).await {
        Ok(Some(report)) => (StatusCode::OK, Json(json!(report))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Report not found." })),
        ),
        Err(e) => {
            error!("Failed to load report {}: {}", id, e);
            internal_error()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardParams {
    pub n: Option<i64>,
}

async fn leaderboard_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LeaderboardParams>,
) -> (StatusCode, Json<Value>) {
    match state.leaderboard.top(params.n.unwrap_or(0)).await {
        Ok(entries) => (StatusCode::OK, Json(json!({ "leaderboard": entries }))),
        Err(e) => {
            error!("Failed to build leaderboard: {}", e);
            internal_error()
        }
    }
}

fn internal_error() -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Something went wrong. Please try again." })),
    )
}

/// Run the server
pub async fn run_server(host: &str, port: u16, state: AppState) -> anyhow::Result<()> {
    let app = create_router(Arc::new(state));
    let addr = format!("{}:{}", host, port);

    info!("Starting Civic Reports server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
