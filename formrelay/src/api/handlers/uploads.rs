use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartRejection},
};
use tracing::{debug, info, instrument};

use crate::{
    AppState,
    api::models::uploads::{UploadForm, UploadResponse},
    errors::{Error, ErrorBody, Result},
    staging::StagedUpload,
};

/// Name of the multipart part carrying the file
const FILE_FIELD: &str = "file";

#[utoipa::path(
    post,
    path = "/upload-cv",
    tag = "uploads",
    summary = "Upload a file",
    description = "Stores a single file with the media provider and returns its public URL.",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File stored", body = UploadResponse),
        (status = 400, description = "No file part, or malformed multipart body", body = ErrorBody),
        (status = 413, description = "File exceeds the configured size limit", body = ErrorBody),
        (status = 500, description = "Storage provider or staging failure", body = ErrorBody)
    )
)]
#[instrument(skip_all)]
pub async fn upload_cv(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>> {
    let mut multipart = multipart?;
    let mut staged: Option<StagedUpload> = None;

    // Drain the whole body so the client sees a response rather than a reset connection
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        // Only file parts count; a text field that happens to be called `file` is not an upload
        if name != FILE_FIELD || staged.is_some() || field.file_name().is_none() {
            debug!(field = %name, "Ignoring multipart field");
            continue;
        }

        let candidate = state.stager.stage(field).await?;
        if candidate.is_blank() {
            debug!("Ignoring empty file part");
        } else {
            staged = Some(candidate);
        }
    }

    let Some(staged) = staged else {
        return Err(Error::BadRequest {
            message: "No file uploaded".to_string(),
        });
    };

    info!(
        file_name = ?staged.file_name,
        size_bytes = staged.size_bytes,
        strategy = ?state.stager.strategy(),
        "Forwarding upload"
    );

    let result = state.media_store.upload(&staged).await;
    staged.release();

    Ok(Json(result?.into()))
}
