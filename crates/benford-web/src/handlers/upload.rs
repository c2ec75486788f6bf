use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use benford_core::{AnalysisKind, CoreError, JobId, Submission, UserId, submit_document};

use super::{ApiError, blocking};
use crate::models::UploadRequest;
use crate::state::AppState;

/// `POST /pdf/{userid}/{jobtype}`: store the document, create its job, and
/// queue it for analysis. Responds with the new job id as a string.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    Path((userid, jobtype)): Path<(String, String)>,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<Json<String>, ApiError> {
    let Json(req) =
        payload.map_err(|e| CoreError::InvalidInput(format!("invalid request body: {}", e)))?;
    let user_id: UserId = userid.parse()?;
    let kind: AnalysisKind = jobtype.parse()?;
    let data = BASE64
        .decode(req.data.trim())
        .map_err(|e| CoreError::InvalidInput(format!("data is not valid base64: {}", e)))?;

    let submission = Submission {
        user_id,
        kind,
        filename: req.filename,
        data,
    };
    let store_state = Arc::clone(&state);
    let (job_id, data_key): (JobId, String) = blocking(move || {
        submit_document(
            store_state.jobs.as_ref(),
            store_state.objects.as_ref(),
            &store_state.config,
            &submission,
        )
    })
    .await?;

    if state.dispatch.send(data_key).await.is_err() {
        // The job stays `uploaded`; it is not picked up until resubmitted.
        tracing::error!(%job_id, "worker pool is closed");
    }
    Ok(Json(job_id.to_string()))
}
