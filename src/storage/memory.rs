// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{validate_path, ObjectStore, UploadError};

#[derive(Debug, Clone)]
pub struct MemoryObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug)]
struct InjectedError {
    /// Successful puts still allowed before the error fires
    remaining: usize,
    error: UploadError,
}

/// Process-local object store for development and tests
///
/// Clones share the same contents.
#[derive(Debug, Clone)]
pub struct MemoryObjectStore {
    bucket: String,
    objects: Arc<Mutex<HashMap<String, MemoryObject>>>,
    injected_error: Arc<Mutex<Option<InjectedError>>>,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new("pcb-images")
    }
}

impl MemoryObjectStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            objects: Arc::new(Mutex::new(HashMap::new())),
            injected_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Fail the next put with `error`
    pub async fn inject_error(&self, error: UploadError) {
        self.fail_after(0, error).await;
    }

    /// Let `successes` more puts through, then fail one with `error`
    pub async fn fail_after(&self, successes: usize, error: UploadError) {
        *self.injected_error.lock().await = Some(InjectedError {
            remaining: successes,
            error,
        });
    }

    pub async fn get(&self, path: &str) -> Option<MemoryObject> {
        self.objects.lock().await.get(path).cloned()
    }

    pub async fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.objects.lock().await.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn check_injected_error(&self) -> Result<(), UploadError> {
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

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), UploadError> {
        self.check_injected_error().await?;
        validate_path(path)?;

        self.objects.lock().await.insert(
            path.to_string(),
            MemoryObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("memory://{}/{}", self.bucket, path)
    }
}
