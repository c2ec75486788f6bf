use std::sync::Arc;

use axum::Json;
use axum::extract::State;

use super::{ApiError, blocking};
use crate::state::AppState;

/// Delete every job and every object under the key prefix. Users are kept.
pub async fn reset(State(state): State<Arc<AppState>>) -> Result<Json<&'static str>, ApiError> {
    let removed = blocking(move || {
        state.jobs.reset()?;
        let prefix = format!("{}/", state.config.key_prefix);
        Ok(state.objects.delete_prefix(&prefix)?)
    })
    .await?;
    tracing::info!(objects_removed = removed, "service reset");
    Ok(Json("success"))
}
