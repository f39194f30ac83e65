// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detect request parsing and validation

use axum_extra::extract::Multipart;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::api::errors::ApiError;

/// Multipart field carrying the board image
pub const FILE_FIELD: &str = "file";

/// Query string of `POST /detect`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetectQuery {
    /// `full` adds the persisted records to the response
    #[serde(default)]
    pub detail: Option<String>,
}

impl DetectQuery {
    pub fn wants_full_result(&self) -> bool {
        self.detail
            .as_deref()
            .map(|d| d.eq_ignore_ascii_case("full"))
            .unwrap_or(false)
    }
}

/// Parsed multipart upload
#[derive(Debug, Clone, Default)]
pub struct DetectForm {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Option<Vec<u8>>,
    pub board_code: Option<String>,
    pub note: Option<String>,
}

impl DetectForm {
    /// Read every field of the upload; unknown fields are ignored
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = DetectForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::InvalidRequest(format!("malformed multipart body: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                FILE_FIELD => {
                    form.file_name = field.file_name().map(str::to_string);
                    form.content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await.map_err(|e| {
                        ApiError::InvalidRequest(format!("failed to read upload: {}", e))
                    })?;
                    form.bytes = Some(bytes.to_vec());
                }
                "board_code" => form.board_code = Some(read_text(field).await?),
                "note" => form.note = Some(read_text(field).await?),
                _ => {}
            }
        }

        Ok(form)
    }

    /// Validate the upload is present and declared as an image
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.bytes.is_none() {
            return Err(ApiError::ValidationError {
                field: FILE_FIELD.to_string(),
                message: "file is required".to_string(),
            });
        }

        let is_image = self
            .content_type
            .as_deref()
            .map(|ct| ct.trim().to_ascii_lowercase().starts_with("image/"))
            .unwrap_or(false);
        if !is_image {
            return Err(ApiError::ValidationError {
                field: FILE_FIELD.to_string(),
                message: "Please upload an image file".to_string(),
            });
        }

        Ok(())
    }
}

async fn read_text(field: axum_extra::extract::multipart::Field) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::InvalidRequest(format!("failed to read form field: {}", e)))
}

/// Strip directories and unsafe characters from a client file name
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Unique temp path for one upload: `{dir}/{uuid}_{name}`
pub fn temp_upload_path(dir: &Path, file_name: Option<&str>) -> PathBuf {
    let name = sanitize_filename(file_name.unwrap_or_default());
    dir.join(format!("{}_{}", Uuid::new_v4().simple(), name))
}
