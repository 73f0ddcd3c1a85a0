use axum::{
    extract::{Path, State},
    Extension, Json,
};
use cofound_shared::api::{ApproveRequest, Notice, RejectRequest};
use cofound_shared::{AdminStats, ConnectionRequest, PendingReview, User};

use crate::auth::Session;
use crate::error::AppError;
use crate::routes::AppState;

pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(state.profiles().list_all().await?))
}

pub async fn pending_reviews(
    State(state): State<AppState>,
) -> Result<Json<Vec<PendingReview>>, AppError> {
    Ok(Json(state.moderation().pending_reviews().await?))
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<AdminStats>, AppError> {
    Ok(Json(state.moderation().stats().await?))
}

pub async fn list_connections(
    State(state): State<AppState>,
) -> Result<Json<Vec<ConnectionRequest>>, AppError> {
    Ok(Json(state.relationships().list_all().await?))
}

pub async fn approve(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(username): Path<String>,
    Json(req): Json<ApproveRequest>,
) -> Result<Json<Notice>, AppError> {
    tracing::debug!("{} approving {} of {}", session.username, req.kind, username);
    Ok(Json(state.moderation().approve(&username, req.kind).await?))
}

pub async fn reject(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(username): Path<String>,
    Json(req): Json<RejectRequest>,
) -> Result<Json<Notice>, AppError> {
    tracing::debug!("{} rejecting {} of {}", session.username, req.kind, username);
    Ok(Json(
        state
            .moderation()
            .reject(&username, req.kind, req.reason.as_deref())
            .await?,
    ))
}
