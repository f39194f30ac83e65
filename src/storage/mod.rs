// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Object storage for annotated images and defect crops

pub mod memory;
pub mod supabase;
pub mod uploader;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryObjectStore;
pub use supabase::SupabaseObjectStore;
pub use uploader::{object_name, StorageUploader, StoredObject};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Network error: {0}")]
    Transport(String),
    #[error("Authentication error: {0}")]
    Unauthorized(String),
    #[error("Quota exceeded")]
    QuotaExceeded,
    #[error("Upload rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// Write-only object store with public reads
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `bytes` under `path` with the given content type
    async fn put_object(&self, path: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<(), UploadError>;

    /// URL that resolves `path` without credentials
    fn public_url(&self, path: &str) -> String;
}

pub(crate) fn validate_path(path: &str) -> Result<(), UploadError> {
    if path.is_empty() {
        return Err(UploadError::InvalidPath("Empty path".to_string()));
    }

    if path.starts_with('/') {
        return Err(UploadError::InvalidPath(
            "Path cannot start with /".to_string(),
        ));
    }

    if path.split('/').any(|segment| segment == "..") {
        return Err(UploadError::InvalidPath(
            "Path traversal not allowed".to_string(),
        ));
    }

    Ok(())
}
