// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use pcb_defect_node::storage::{MemoryObjectStore, StorageUploader, UploadError};
use std::collections::HashSet;
use std::sync::Arc;

fn uploader() -> (StorageUploader, MemoryObjectStore) {
    let store = MemoryObjectStore::new("boards");
    (StorageUploader::new(Arc::new(store.clone())), store)
}

#[tokio::test]
async fn test_many_uploads_never_collide() {
    let (uploader, store) = uploader();

    let mut paths = HashSet::new();
    for i in 0..200u32 {
        let stored = uploader
            .upload(i.to_le_bytes().to_vec(), "pcb/crops", "png")
            .await
            .unwrap();
        assert!(paths.insert(stored.stored_path));
    }

    assert_eq!(store.len().await, 200);
}

#[tokio::test]
async fn test_content_type_follows_extension() {
    let (uploader, store) = uploader();

    for (ext, expected) in [("png", "image/png"), ("jpg", "image/jpeg"), ("webp", "image/webp")] {
        let stored = uploader.upload(vec![0], "pcb/main", ext).await.unwrap();
        assert!(stored.stored_path.ends_with(&format!(".{}", ext)));
        assert_eq!(store.get(&stored.stored_path).await.unwrap().content_type, expected);
        assert_eq!(
            stored.public_url,
            format!("memory://boards/{}", stored.stored_path)
        );
    }
}

#[tokio::test]
async fn test_bytes_are_stored_unchanged() {
    let (uploader, store) = uploader();
    let bytes: Vec<u8> = (0..=255).collect();

    let stored = uploader.upload(bytes.clone(), "pcb/main", "png").await.unwrap();

    assert_eq!(store.get(&stored.stored_path).await.unwrap().bytes, bytes);
}

#[tokio::test]
async fn test_failure_is_not_retried() {
    let (uploader, store) = uploader();
    store
        .inject_error(UploadError::Transport("timed out".to_string()))
        .await;

    let result = uploader.upload(vec![1], "pcb/main", "png").await;

    assert!(matches!(result, Err(UploadError::Transport(_))));
    assert!(store.is_empty().await);
}
