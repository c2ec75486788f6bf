use std::sync::Arc;

use axum::Json;
use axum::extract::State;

use benford_core::{Job, User};

use super::{ApiError, blocking};
use crate::state::AppState;

pub async fn users(State(state): State<Arc<AppState>>) -> Result<Json<Vec<User>>, ApiError> {
    let users = blocking(move || Ok(state.jobs.users()?)).await?;
    Ok(Json(users))
}

pub async fn jobs(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Job>>, ApiError> {
    let jobs = blocking(move || Ok(state.jobs.jobs()?)).await?;
    Ok(Json(jobs))
}
