use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use draw_core::DrawError;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

pub mod config;
pub mod roster;
pub mod state;

use state::{DrawStore, ParticipantStatus, StoreError};

#[derive(Clone)]
pub struct AppState {
    store: Arc<RwLock<DrawStore>>,
    admin_password: Arc<str>,
}

impl AppState {
    pub fn new(store: DrawStore, admin_password: impl Into<String>) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
            admin_password: admin_password.into().into(),
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/participants", get(list_participants))
        .route("/reveal", post(reveal))
        .route("/status", get(status))
        .route("/reset", post(reset))
        .with_state(state)
}

#[derive(Serialize)]
struct ParticipantsResponse {
    participants: Vec<ParticipantStatus>,
}

#[derive(Deserialize)]
struct RevealRequest {
    name: String,
}

#[derive(Deserialize)]
struct ResetParams {
    seed: Option<u64>,
}

#[derive(Serialize)]
struct ResetResponse {
    draw_id: String,
    epoch: u64,
    participants: usize,
}

async fn list_participants(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.store.read().await;
    Json(ParticipantsResponse {
        participants: store.status().participants,
    })
}

async fn reveal(State(state): State<AppState>, Json(payload): Json<RevealRequest>) -> Response {
    let name = payload.name.trim();
    if name.is_empty() {
        return (StatusCode::BAD_REQUEST, "name required").into_response();
    }

    let mut store = state.store.write().await;
    match store.reveal(name).await {
        Ok(reveal) => (StatusCode::OK, Json(reveal)).into_response(),
        Err(err) => store_error_response(&err),
    }
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.store.read().await;
    Json(store.status())
}

async fn reset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ResetParams>,
) -> Response {
    let provided = headers
        .get("x-admin-password")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if provided != &*state.admin_password {
        return (StatusCode::UNAUTHORIZED, "invalid admin password").into_response();
    }

    let mut rng = params
        .seed
        .map(ChaCha8Rng::seed_from_u64)
        .unwrap_or_else(ChaCha8Rng::from_entropy);

    // Generation runs inline under the write lock; bounded by max_attempts.
    let mut store = state.store.write().await;
    let participants = store.roster().participants().len();
    match store.reset(&mut rng).await {
        Ok(record) => (
            StatusCode::OK,
            Json(ResetResponse {
                draw_id: record.draw_id.clone(),
                epoch: record.epoch,
                participants,
            }),
        )
            .into_response(),
        Err(err) => store_error_response(&err),
    }
}

fn store_error_response(err: &StoreError) -> Response {
    match err {
        StoreError::UnknownParticipant(_) => {
            (StatusCode::NOT_FOUND, "participant not found").into_response()
        }
        StoreError::Draw(DrawError::Infeasible { .. }) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "no valid draw exists; loosen the exclusions or change the roster",
        )
            .into_response(),
        StoreError::Draw(DrawError::InvalidRoster(reason)) => {
            (StatusCode::UNPROCESSABLE_ENTITY, reason.to_string()).into_response()
        }
        StoreError::Io(_) | StoreError::Json(_) => {
            tracing::error!(%err, "persist error");
            (StatusCode::INTERNAL_SERVER_ERROR, "could not save draw state").into_response()
        }
    }
}
