//! HTTP API surface.
//!
//! Room-hash-scoped POST endpoints under `/api`, mirroring the admission
//! protocol one-to-one. The bearer token travels in the dedicated
//! `X-Chat-Token` header, never a cookie or query parameter.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use ephemere_shared::constants::TOKEN_HEADER;
use ephemere_shared::{EncryptedPayload, RoomHash};

use crate::admission::Admission;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::registry::RegistryOutcome;

#[derive(Clone)]
pub struct AppState {
    pub admission: Arc<Admission>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/rooms", post(create_room))
        .route("/api/rooms/:hash/knock", post(knock))
        .route("/api/rooms/:hash/approve", post(approve))
        .route("/api/rooms/:hash/reject", post(reject))
        .route("/api/rooms/:hash/message", post(message))
        .route("/api/rooms/:hash/presence", post(presence))
        .route("/api/rooms/:hash/disband", post(disband))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    instance: String,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        instance: state.config.instance_name.clone(),
    })
}

#[derive(Deserialize)]
struct CreateRoomRequest {
    room_hash: Option<String>,
}

#[derive(Serialize)]
struct CreateRoomResponse {
    status: &'static str,
    has_participants: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    participant_token: Option<String>,
}

async fn create_room(
    State(state): State<AppState>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let hash = req
        .room_hash
        .as_deref()
        .and_then(|h| RoomHash::parse(h).ok())
        .ok_or(ServerError::InvalidRoomHash)?;

    match state.admission.register_or_inspect(hash.as_str())? {
        RegistryOutcome::Created { participant_token } => {
            info!(room = %hash, "room registered");
            Ok((
                StatusCode::CREATED,
                Json(CreateRoomResponse {
                    status: "created",
                    has_participants: true,
                    participant_token: Some(participant_token),
                }),
            ))
        }
        RegistryOutcome::Exists { has_participants } => Ok((
            StatusCode::OK,
            Json(CreateRoomResponse {
                status: "exists",
                has_participants,
                participant_token: None,
            }),
        )),
    }
}

#[derive(Deserialize, Default)]
struct KnockRequest {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize)]
struct OkResponse {
    status: &'static str,
}

const OK: OkResponse = OkResponse { status: "ok" };

async fn knock(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    Json(req): Json<KnockRequest>,
) -> Result<Json<OkResponse>, ServerError> {
    state.admission.knock(&hash, req.message).await?;
    Ok(Json(OK))
}

#[derive(Serialize)]
struct ApproveResponse {
    new_participant_token: String,
}

async fn approve(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ApproveResponse>, ServerError> {
    let new_participant_token = state
        .admission
        .approve(&hash, bearer_token(&headers))
        .await?;
    Ok(Json(ApproveResponse {
        new_participant_token,
    }))
}

async fn reject(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    headers: HeaderMap,
    Json(req): Json<KnockRequest>,
) -> Result<Json<OkResponse>, ServerError> {
    state
        .admission
        .reject(&hash, bearer_token(&headers), req.message)
        .await?;
    Ok(Json(OK))
}

#[derive(Deserialize)]
struct MessageRequest {
    #[serde(default)]
    msg_id: Option<String>,
    #[serde(default)]
    encrypted_payload: Option<EncryptedPayload>,
}

async fn message(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    headers: HeaderMap,
    Json(req): Json<MessageRequest>,
) -> Result<Json<OkResponse>, ServerError> {
    let msg_id = req.msg_id.ok_or(ServerError::MissingPayload)?;
    let payload = req.encrypted_payload.ok_or(ServerError::MissingPayload)?;

    state
        .admission
        .relay_message(&hash, bearer_token(&headers), msg_id, payload)
        .await?;
    Ok(Json(OK))
}

#[derive(Serialize)]
struct PresenceResponse {
    status: &'static str,
    active_participants: i64,
}

async fn presence(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    headers: HeaderMap,
) -> Result<Json<PresenceResponse>, ServerError> {
    let active_participants = state.admission.heartbeat(&hash, bearer_token(&headers))?;
    Ok(Json(PresenceResponse {
        status: "ok",
        active_participants,
    }))
}

async fn disband(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    headers: HeaderMap,
) -> Result<Json<OkResponse>, ServerError> {
    state
        .admission
        .disband(&hash, bearer_token(&headers))
        .await?;
    Ok(Json(OK))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
