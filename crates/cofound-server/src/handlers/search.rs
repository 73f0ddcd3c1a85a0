use axum::{
    extract::{Query, State},
    Extension, Json,
};
use cofound_shared::api::{SearchParams, SearchResponse};

use crate::auth::Session;
use crate::error::AppError;
use crate::routes::AppState;

pub async fn search(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, AppError> {
    Ok(Json(state.directory().search(&session, &params).await?))
}
