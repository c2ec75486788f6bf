use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use benford_core::{JobId, ResultsResponse, query_results};

use super::{ApiError, blocking};
use crate::state::AppState;

/// `GET /results/{jobid}`.
///
/// A finished job answers 200 with its artifact, base64-encoded. Anything else
/// answers 400 with the status text (`uploaded`, `processing - ...`, or
/// `error: <message>`), which is how polling clients learn the job state. An
/// unrecognized status is reported as an error message too.
pub async fn results(
    State(state): State<Arc<AppState>>,
    Path(jobid): Path<String>,
) -> Result<(StatusCode, Json<String>), ApiError> {
    let job_id: JobId = jobid.parse()?;
    let response =
        blocking(move || query_results(state.jobs.as_ref(), state.objects.as_ref(), job_id))
            .await?;

    Ok(match response {
        ResultsResponse::Completed { contents, .. } => {
            (StatusCode::OK, Json(BASE64.encode(contents)))
        }
        other => (StatusCode::BAD_REQUEST, Json(other.status_text())),
    })
}
