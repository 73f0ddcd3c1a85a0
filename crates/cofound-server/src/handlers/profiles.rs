use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap},
    Extension, Json,
};
use cofound_shared::api::{DashboardResponse, Notice, UpdateProfileRequest, UploadResponse};
use cofound_shared::{ConnectionStatus, ProfileCompletion, PublicProfile, RelationshipStatus, User};
use serde::Serialize;

use crate::auth::Session;
use crate::error::AppError;
use crate::routes::AppState;
use crate::services::UploadKind;

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<User>, AppError> {
    Ok(Json(state.profiles().get(session.user_id).await?))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<Notice>, AppError> {
    Ok(Json(state.profiles().save(&session.username, req).await?))
}

pub async fn completion(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<ProfileCompletion>, AppError> {
    let user = state.profiles().get(session.user_id).await?;
    Ok(Json(user.completion()))
}

fn content_type(headers: &HeaderMap) -> &str {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
}

async fn upload(
    state: &AppState,
    session: &Session,
    kind: UploadKind,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Json<UploadResponse>, AppError> {
    let url = state
        .profiles()
        .upload(
            state.objects.as_ref(),
            &session.username,
            kind,
            body.to_vec(),
            content_type(headers),
        )
        .await?;

    let message = match kind {
        UploadKind::Certificate => "Certificate uploaded. It will be reviewed by an admin.",
        UploadKind::ProfilePicture => "Profile picture updated",
    };
    Ok(Json(UploadResponse {
        url,
        message: message.to_string(),
    }))
}

pub async fn upload_certificate(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UploadResponse>, AppError> {
    upload(&state, &session, UploadKind::Certificate, &headers, body).await
}

pub async fn upload_picture(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UploadResponse>, AppError> {
    upload(&state, &session, UploadKind::ProfilePicture, &headers, body).await
}

#[derive(Debug, Serialize)]
pub struct UserView {
    pub profile: PublicProfile,
    pub relationship: RelationshipStatus,
}

pub async fn view_user(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(username): Path<String>,
) -> Result<Json<UserView>, AppError> {
    let (profile, relationship) = state.directory().view_profile(&session, &username).await?;
    Ok(Json(UserView {
        profile,
        relationship,
    }))
}

pub async fn dashboard(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<DashboardResponse>, AppError> {
    let profiles = state.profiles();
    let relationships = state.relationships();
    let messaging = state.messaging();

    let (user, requests, unread) = tokio::try_join!(
        profiles.get(session.user_id),
        relationships.list_requests(&session.username),
        messaging.unread_counts(&session.username),
    )?;

    let accepted_matches = requests
        .iter()
        .filter(|r| r.status == ConnectionStatus::Accepted)
        .count();
    let pending_requests = requests
        .iter()
        .filter(|r| r.status == ConnectionStatus::Pending && r.to == session.username)
        .count();

    Ok(Json(DashboardResponse {
        username: user.username.clone(),
        accepted_matches,
        pending_requests,
        unread_messages: unread.total,
        completion: user.completion(),
        certificate_approved: user.certificate_approved,
    }))
}
