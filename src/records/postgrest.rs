// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, info};

use super::{
    NewDefectCrop, NewMainImage, PersistenceError, RecordId, RecordStore, DEFECT_CROPS_TABLE,
    MAIN_IMAGES_TABLE,
};
use crate::backend::SupabaseClient;

/// Supabase PostgREST tables
#[derive(Debug, Clone)]
pub struct PostgrestRecordStore {
    client: SupabaseClient,
}

impl PostgrestRecordStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    async fn insert<T: Serialize + Sync>(
        &self,
        table: &str,
        row: &T,
    ) -> Result<RecordId, PersistenceError> {
        let url = self.client.table_url(table);
        debug!("Inserting into {}", table);

        let response = self
            .client
            .request(reqwest::Method::POST, &url)
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await
            .map_err(|e| PersistenceError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    PersistenceError::Unauthorized(message)
                }
                s if s.is_server_error() => {
                    PersistenceError::Transport(format!("Server error {}: {}", s, message))
                }
                _ => PersistenceError::Constraint(message),
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;

        // return=representation yields an array of inserted rows
        let id_value = match &body {
            serde_json::Value::Array(rows) => rows.first().and_then(|r| r.get("id")),
            other => other.get("id"),
        }
        .cloned()
        .ok_or_else(|| PersistenceError::MissingId(table.to_string()))?;

        let id: RecordId = serde_json::from_value(id_value)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;

        info!("Inserted {} row {}", table, id);
        Ok(id)
    }
}

#[async_trait]
impl RecordStore for PostgrestRecordStore {
    async fn insert_main(&self, row: &NewMainImage) -> Result<RecordId, PersistenceError> {
        self.insert(MAIN_IMAGES_TABLE, row).await
    }

    async fn insert_crop(&self, row: &NewDefectCrop) -> Result<RecordId, PersistenceError> {
        self.insert(DEFECT_CROPS_TABLE, row).await
    }
}
