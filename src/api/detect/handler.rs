// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detect endpoint handler

use axum::{
    extract::{Query, State},
    Json,
};
use axum_extra::extract::multipart::{Multipart, MultipartRejection};
use tempfile::TempPath;
use tracing::{debug, info};

use super::request::{temp_upload_path, DetectForm, DetectQuery};
use super::response::DetectResponse;
use crate::api::errors::ApiError;
use crate::api::http_server::AppState;
use crate::pipeline::ProcessRequest;

/// POST /detect - Detect defects on an uploaded board image
///
/// Multipart fields: `file` (required, `image/*`), `board_code` and `note`
/// (optional text). The upload is copied to a temp file for the detector
/// and removed afterwards whatever the outcome, including when the request
/// future is dropped mid-pipeline.
pub async fn detect_handler(
    State(state): State<AppState>,
    Query(query): Query<DetectQuery>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DetectResponse>, ApiError> {
    let multipart = multipart
        .map_err(|e| ApiError::InvalidRequest(format!("expected multipart/form-data: {}", e)))?;
    let form = DetectForm::from_multipart(multipart).await?;

    if let Err(e) = form.validate() {
        info!(
            "Rejected upload {:?} with content type {:?}",
            form.file_name, form.content_type
        );
        return Err(e);
    }

    let DetectForm {
        file_name,
        bytes,
        board_code,
        note,
        ..
    } = form;
    let bytes = bytes.unwrap_or_default();

    // Deleted on drop if the request is cancelled before `remove_temp_upload`
    let temp = TempPath::from_path(temp_upload_path(
        &state.config.upload_dir,
        file_name.as_deref(),
    ));
    debug!("Writing {} byte upload to {}", bytes.len(), temp.display());

    if let Err(e) = tokio::fs::write(&temp, &bytes).await {
        remove_temp_upload(temp);
        return Err(ApiError::InternalError(format!(
            "failed to store upload: {}",
            e
        )));
    }

    let request = ProcessRequest::new(temp.to_path_buf(), &state.config.detector.model_path)
        .with_board_code(board_code.clone())
        .with_note(note.clone())
        .with_original_filename(file_name.clone());

    let outcome = state.pipeline.process(request).await;
    remove_temp_upload(temp);
    let payload = outcome?;

    info!(
        "Processed {:?}: main image {} with {} crops",
        file_name,
        payload.main_image.id,
        payload.crops.len()
    );

    let response = DetectResponse::new(board_code, note, file_name);
    if query.wants_full_result() {
        return Ok(Json(response.with_result(payload)));
    }
    Ok(Json(response))
}

/// Best-effort removal; failures are logged and swallowed
fn remove_temp_upload(temp: TempPath) {
    let path = temp.to_path_buf();
    match temp.close() {
        Ok(()) => debug!("Removed temp upload {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => debug!("Could not remove temp upload {}: {}", path.display(), e),
    }
}
