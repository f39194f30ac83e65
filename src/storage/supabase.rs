// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use super::{validate_path, ObjectStore, UploadError};
use crate::backend::SupabaseClient;

/// Supabase Storage bucket
#[derive(Debug, Clone)]
pub struct SupabaseObjectStore {
    client: SupabaseClient,
}

impl SupabaseObjectStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for SupabaseObjectStore {
    async fn put_object(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), UploadError> {
        validate_path(path)?;

        let url = self.client.object_url(path);
        debug!("Uploading {} bytes to {}", bytes.len(), url);

        let response = self
            .client
            .request(reqwest::Method::POST, &url)
            .header("Content-Type", content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => UploadError::Unauthorized(message),
            StatusCode::PAYLOAD_TOO_LARGE | StatusCode::INSUFFICIENT_STORAGE => {
                UploadError::QuotaExceeded
            }
            _ => UploadError::Rejected {
                status: status.as_u16(),
                message,
            },
        })
    }

    fn public_url(&self, path: &str) -> String {
        self.client.public_url(path)
    }
}
