// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{NewDefectCrop, NewMainImage, PersistenceError, RecordId, RecordStore};

#[derive(Debug, Clone)]
pub struct StoredRow<T> {
    pub id: RecordId,
    pub created_at: DateTime<Utc>,
    pub fields: T,
}

#[derive(Debug, Default)]
struct Tables {
    main_images: Vec<StoredRow<NewMainImage>>,
    defect_crops: Vec<StoredRow<NewDefectCrop>>,
    next_id: i64,
}

#[derive(Debug)]
struct InjectedError {
    remaining: usize,
    error: PersistenceError,
}

/// Process-local record store for development and tests
///
/// Ids are sequential integers shared across both tables. Clones share
/// the same rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    tables: Arc<Mutex<Tables>>,
    injected_error: Arc<Mutex<Option<InjectedError>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next insert with `error`
    pub async fn inject_error(&self, error: PersistenceError) {
        self.fail_after(0, error).await;
    }

    /// Let `successes` more inserts through, then fail one with `error`
    pub async fn fail_after(&self, successes: usize, error: PersistenceError) {
        *self.injected_error.lock().await = Some(InjectedError {
            remaining: successes,
            error,
        });
    }

    pub async fn main_images(&self) -> Vec<StoredRow<NewMainImage>> {
        self.tables.lock().await.main_images.clone()
    }

    pub async fn defect_crops(&self) -> Vec<StoredRow<NewDefectCrop>> {
        self.tables.lock().await.defect_crops.clone()
    }

    async fn check_injected_error(&self) -> Result<(), PersistenceError> {
        let mut slot = self.injected_error.lock().await;
        if let Some(injected) = slot.as_mut() {
            if injected.remaining > 0 {
                injected.remaining -= 1;
                return Ok(());
            }
        }
        match slot.take() {
            Some(injected) => Err(injected.error),
            None => Ok(()),
        }
    }
}

impl Tables {
    fn allocate_id(&mut self) -> RecordId {
        self.next_id += 1;
        RecordId::Int(self.next_id)
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert_main(&self, row: &NewMainImage) -> Result<RecordId, PersistenceError> {
        self.check_injected_error().await?;

        let mut tables = self.tables.lock().await;
        let id = tables.allocate_id();
        tables.main_images.push(StoredRow {
            id: id.clone(),
            created_at: Utc::now(),
            fields: row.clone(),
        });
        Ok(id)
    }

    async fn insert_crop(&self, row: &NewDefectCrop) -> Result<RecordId, PersistenceError> {
        self.check_injected_error().await?;

        let mut tables = self.tables.lock().await;
        if !tables.main_images.iter().any(|m| m.id == row.main_image_id) {
            return Err(PersistenceError::Constraint(format!(
                "main_image_id {} does not reference a main image",
                row.main_image_id
            )));
        }

        let id = tables.allocate_id();
        tables.defect_crops.push(StoredRow {
            id: id.clone(),
            created_at: Utc::now(),
            fields: row.clone(),
        });
        Ok(id)
    }
}
