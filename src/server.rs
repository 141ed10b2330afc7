//! Thin HTTP surface over [`PortalClient`].

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::client::PortalClient;
use crate::error::PortalError;
use crate::models::{Credentials, Scorecard, ScorecardId, ScorecardSummary, SessionToken};

const SESSION_HEADER: &str = "session-cookie";
const ASI_HEADER: &str = "asi";

/// Shared server state.
pub struct AppState {
    client: PortalClient,
}

impl AppState {
    pub fn new(client: PortalClient) -> Self {
        Self { client }
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignInResponse {
    pub message: String,
    pub user_display_name: String,
    pub session_cookie: String,
    pub asi: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionStatus {
    pub is_valid: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScorecardIdsResponse {
    pub scorecard_ids: Vec<ScorecardSummary>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScorecardResponse {
    #[serde(flatten)]
    pub scorecard: Scorecard,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ScorecardParams {
    pub scorecard_id: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn map_portal_error(e: PortalError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &e {
        PortalError::InvalidCredentials | PortalError::InvalidSession => StatusCode::UNAUTHORIZED,
        PortalError::NotFound(_) => StatusCode::NOT_FOUND,
        PortalError::UnexpectedPortalResponse(_) => StatusCode::BAD_GATEWAY,
        PortalError::PortalUnreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
        PortalError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            detail: e.to_string(),
        }),
    )
}

fn bad_request(detail: String) -> (StatusCode, Json<ErrorResponse>) {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { detail }))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Reads the session token from the request headers. `asi` is required for
/// scorecard pages only.
fn session_from_headers(
    headers: &HeaderMap,
    require_asi: bool,
) -> Result<SessionToken, (StatusCode, Json<ErrorResponse>)> {
    let value = header_value(headers, SESSION_HEADER)
        .ok_or_else(|| bad_request(format!("missing {} header", SESSION_HEADER)))?;
    let token = SessionToken::new(value);

    match header_value(headers, ASI_HEADER) {
        Some(asi) => Ok(token.with_asi(asi)),
        None if require_asi => Err(bad_request(format!("missing {} header", ASI_HEADER))),
        None => Ok(token),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> &'static str {
    "ok"
}

/// POST /signin  { username, password }
async fn sign_in(
    State(state): State<Arc<AppState>>,
    Json(credentials): Json<Credentials>,
) -> ApiResult<SignInResponse> {
    let details = state
        .client
        .sign_in_details(credentials)
        .await
        .map_err(map_portal_error)?;

    Ok(Json(SignInResponse {
        message: "Successfully signed in".to_string(),
        user_display_name: details.user_display_name,
        session_cookie: details.token.value().to_string(),
        asi: details.token.asi().unwrap_or_default().to_string(),
    }))
}

/// GET /check_session
async fn check_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<SessionStatus> {
    let token = session_from_headers(&headers, false)?;
    let is_valid = state
        .client
        .check_session(&token)
        .await
        .map_err(map_portal_error)?;

    let message = if is_valid {
        "Session is valid"
    } else {
        "Session is invalid"
    };
    Ok(Json(SessionStatus {
        is_valid,
        message: message.to_string(),
    }))
}

/// GET /scorecard_ids
async fn scorecard_ids(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<ScorecardIdsResponse> {
    let token = session_from_headers(&headers, true)?;
    let scorecard_ids = state
        .client
        .list_scorecards(&token)
        .await
        .map_err(map_portal_error)?;

    Ok(Json(ScorecardIdsResponse {
        scorecard_ids,
        message: "Successfully retrieved scorecard IDs".to_string(),
    }))
}

/// GET /scorecard?scorecard_id=...
async fn scorecard(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ScorecardParams>,
) -> ApiResult<ScorecardResponse> {
    let token = session_from_headers(&headers, true)?;
    let id = ScorecardId::new(params.scorecard_id);
    let scorecard = state
        .client
        .get_scorecard(&token, &id)
        .await
        .map_err(map_portal_error)?;

    Ok(Json(ScorecardResponse {
        scorecard,
        message: "Successfully retrieved scorecard".to_string(),
    }))
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/signin", post(sign_in))
        .route("/check_session", get(check_session))
        .route("/scorecard_ids", get(scorecard_ids))
        .route("/scorecard", get(scorecard))
        .with_state(state)
}
