// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{ObjectStore, UploadError};
use crate::vision::image_utils::content_type_for_extension;

/// Where an upload landed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    /// Object path inside the bucket
    pub stored_path: String,
    pub public_url: String,
}

/// Unique object path: `{folder}/{uuid}.{ext}`
pub fn object_name(folder: &str, extension: &str) -> String {
    let folder = folder.trim_matches('/');
    let ext = extension.trim_start_matches('.').to_lowercase();
    let name = Uuid::new_v4().simple().to_string();
    if folder.is_empty() {
        format!("{}.{}", name, ext)
    } else {
        format!("{}/{}.{}", folder, name, ext)
    }
}

#[derive(Clone)]
pub struct StorageUploader {
    store: Arc<dyn ObjectStore>,
}

impl StorageUploader {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Upload `bytes` under a fresh name in `folder`
    pub async fn upload(
        &self,
        bytes: Vec<u8>,
        folder: &str,
        extension: &str,
    ) -> Result<StoredObject, UploadError> {
        let stored_path = object_name(folder, extension);
        let content_type = content_type_for_extension(extension.trim_start_matches('.'));
        let size = bytes.len();

        self.store
            .put_object(&stored_path, bytes, &content_type)
            .await?;

        info!("Uploaded {} ({} bytes)", stored_path, size);

        Ok(StoredObject {
            public_url: self.store.public_url(&stored_path),
            stored_path,
        })
    }
}
