use axum::{
    extract::{Path, State},
    Extension, Json,
};
use cofound_shared::api::{MarkReadResponse, SendMessageRequest, ThreadResponse, UnreadCounts};
use cofound_shared::Message;

use crate::auth::Session;
use crate::error::AppError;
use crate::routes::AppState;

pub async fn unread_counts(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<UnreadCounts>, AppError> {
    Ok(Json(state.messaging().unread_counts(&session.username).await?))
}

pub async fn thread(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(partner): Path<String>,
) -> Result<Json<ThreadResponse>, AppError> {
    let messages = state.messaging().thread(&session.username, &partner).await?;
    Ok(Json(ThreadResponse { partner, messages }))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(partner): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<Message>, AppError> {
    Ok(Json(
        state
            .messaging()
            .send(&session, &partner, &req.text)
            .await?,
    ))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(partner): Path<String>,
) -> Result<Json<MarkReadResponse>, AppError> {
    let marked = state
        .messaging()
        .mark_read(&session.username, &partner)
        .await?;
    Ok(Json(MarkReadResponse { marked }))
}
