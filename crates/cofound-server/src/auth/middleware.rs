use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use cofound_shared::Role;
use uuid::Uuid;

use crate::{error::AppError, routes::AppState};

use super::jwt::verify_access_token;

/// The authenticated caller, attached to every protected request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AppError::Unauthorized)?;

    let claims = verify_access_token(token, &state.config.jwt_secret)?;

    let session = Session {
        user_id: claims.sub,
        username: claims.username,
        email: claims.email,
        role: claims.role,
    };

    request.extensions_mut().insert(session);

    Ok(next.run(request).await)
}

/// Runs after [`auth_middleware`]; lets only admins through.
pub async fn admin_middleware(request: Request, next: Next) -> Result<Response, AppError> {
    let session = request
        .extensions()
        .get::<Session>()
        .ok_or(AppError::Unauthorized)?;

    if !session.is_admin() {
        tracing::debug!("Non-admin {} tried an admin route", session.username);
        return Err(AppError::Forbidden);
    }

    Ok(next.run(request).await)
}
