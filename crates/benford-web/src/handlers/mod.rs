use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use benford_core::CoreError;

pub mod listing;
pub mod reset;
pub mod results;
pub mod upload;

/// A failed request. Rendered as a JSON string body: 400 for caller mistakes,
/// 500 for everything else.
#[derive(Debug)]
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            tracing::debug!(error = %self.0, "request rejected");
            StatusCode::BAD_REQUEST
        } else {
            tracing::error!(error = %self.0, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(self.0.to_string())).into_response()
    }
}

/// Run store work on the blocking pool.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, CoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError(CoreError::Internal(format!("task failed: {}", e))))?
        .map_err(ApiError)
}
