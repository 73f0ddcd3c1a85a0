use axum::{
    extract::{Path, State},
    Extension, Json,
};
use cofound_shared::api::{
    ConnectionsResponse, Notice, SendConnectionRequest, UpdateConnectionRequest,
};
use cofound_shared::RequestBook;
use uuid::Uuid;

use crate::auth::Session;
use crate::error::AppError;
use crate::routes::AppState;

pub async fn list_connections(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<ConnectionsResponse>, AppError> {
    let requests = state
        .relationships()
        .list_requests(&session.username)
        .await?;
    let book = RequestBook::partition(&session.username, &requests);

    Ok(Json(ConnectionsResponse {
        accepted_count: book.matches.len(),
        requests,
        book,
    }))
}

pub async fn send_request(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<SendConnectionRequest>,
) -> Result<Json<Notice>, AppError> {
    Ok(Json(
        state
            .relationships()
            .send_request(&session.username, &req.to)
            .await?,
    ))
}

pub async fn update_request(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateConnectionRequest>,
) -> Result<Json<Notice>, AppError> {
    Ok(Json(
        state
            .relationships()
            .update_status(&session, id, req.status)
            .await?,
    ))
}
