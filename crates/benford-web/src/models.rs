use serde::{Deserialize, Serialize};

/// Body of `POST /pdf/{userid}/{jobtype}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRequest {
    pub filename: String,
    /// Document bytes, standard base64.
    pub data: String,
}
