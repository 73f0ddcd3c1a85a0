use axum::{extract::State, Extension, Json};
use cofound_shared::api::{
    AuthResponse, LoginRequest, Notice, RefreshRequest, RegisterRequest, RegisterResponse,
    ResendVerificationRequest, VerifyEmailRequest,
};
use cofound_shared::{Role, User};
use serde_json::json;
use uuid::Uuid;

use crate::auth::{consume_refresh_token, issue_tokens, normalize_email, Session, TokenSubject};
use crate::db::store::fields;
use crate::error::AppError;
use crate::routes::AppState;
use crate::services::profiles::validate_username;

const MIN_PASSWORD_LEN: usize = 8;

async fn token_response(state: &AppState, user: &User) -> Result<Json<AuthResponse>, AppError> {
    let subject = TokenSubject {
        user_id: user.id,
        email: &user.email,
        username: &user.username,
        role: user.role,
    };
    let tokens = issue_tokens(state.db.as_ref(), &state.config, subject).await?;

    Ok(Json(AuthResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        user_id: user.id,
        username: user.username.clone(),
        role: user.role,
    }))
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, AppError> {
    let username = req.username.trim();
    let email = normalize_email(&req.email);

    // Validate input
    if username.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(AppError::validation("All fields are required"));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    validate_username(username)?;

    let mut role = match req.role {
        Some(role) if !role.is_self_assignable() => {
            return Err(AppError::validation("Role must be Founder or Co-Founder"));
        }
        Some(role) => role,
        None => Role::User,
    };
    if state.config.is_admin_email(&email) {
        role = Role::Admin;
    }

    let profiles = state.profiles();
    if profiles.find_by_username(username).await?.is_some() {
        return Err(AppError::Conflict("Username already taken".to_string()));
    }

    let user_id = state.identity.create_identity(&email, &req.password).await?;
    let user = match finish_signup(&state, user_id, username, &email, role).await {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!("Signup for {} failed, rolling back: {}", email, e);
            undo_signup(&state, user_id).await;
            return Err(e);
        }
    };

    Ok(Json(RegisterResponse {
        user_id,
        username: user.username,
        email: user.email,
        message: "Account created. Check your email for the verification code.".to_string(),
    }))
}

async fn finish_signup(
    state: &AppState,
    user_id: Uuid,
    username: &str,
    email: &str,
    role: Role,
) -> Result<User, AppError> {
    let user = state.profiles().create(user_id, username, email, role).await?;
    state.identity.send_verification_challenge(user_id).await?;
    Ok(user)
}

/// Best effort: leftovers are logged, the original error is what the caller sees.
async fn undo_signup(state: &AppState, user_id: Uuid) {
    if let Err(e) = state.profiles().remove(user_id).await {
        tracing::warn!("Could not remove profile {}: {}", user_id, e);
    }
    if let Err(e) = state.identity.delete_identity(user_id).await {
        tracing::warn!("Could not remove identity {}: {}", user_id, e);
    }
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let user_id = state.identity.authenticate(&req.email, &req.password).await?;

    if state.config.require_email_verification
        && !state.identity.is_challenge_satisfied(user_id).await?
    {
        return Err(AppError::EmailNotVerified);
    }

    let user = state.profiles().get(user_id).await?;
    tracing::info!("{} logged in", user.username);
    token_response(&state, &user).await
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let user_id = consume_refresh_token(state.db.as_ref(), &state.config, &req.refresh_token).await?;
    let user = state.profiles().get(user_id).await?;
    token_response(&state, &user).await
}

pub async fn verify_email(
    State(state): State<AppState>,
    Json(req): Json<VerifyEmailRequest>,
) -> Result<Json<Notice>, AppError> {
    let user_id = state.identity.confirm_challenge(&req.email, &req.code).await?;
    state
        .profiles()
        .set_fields(user_id, fields([("verified", json!(true))]))
        .await?;

    Ok(Json(Notice::new("Email verified")))
}

pub async fn resend_verification(
    State(state): State<AppState>,
    Json(req): Json<ResendVerificationRequest>,
) -> Result<Json<Notice>, AppError> {
    match state.identity.find_by_email(&req.email).await? {
        Some(id) => state.identity.send_verification_challenge(id).await?,
        None => tracing::debug!("Verification resend for unknown email"),
    }

    Ok(Json(Notice::new(
        "If the account exists, a new verification code has been sent",
    )))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<Notice>, AppError> {
    state.identity.destroy_session(session.user_id).await?;
    tracing::info!("{} logged out", session.username);
    Ok(Json(Notice::new("Logged out")))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<User>, AppError> {
    Ok(Json(state.profiles().get(session.user_id).await?))
}
