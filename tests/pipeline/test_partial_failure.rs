// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Mid-run failures leave earlier rows in place
//!
//! For N crops, an upload failure at crop k leaves exactly one main image
//! row and k - 1 crop rows.

use pcb_defect_node::pipeline::{PipelineError, ProcessRequest};
use pcb_defect_node::records::PersistenceError;
use pcb_defect_node::storage::UploadError;
use std::sync::Arc;

use crate::common::{detection, png_bytes, FixedDetector, TestBackend};

const CROPS: usize = 4;

async fn run_with_crop_upload_failure(k: usize) -> (TestBackend, PipelineError) {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("board.png");
    std::fs::write(&image, png_bytes(200, 50)).unwrap();

    let detections = (0..CROPS)
        .map(|i| detection("spur", 4, 0.9 - i as f32 * 0.1, (i as f32 * 40.0, 5.0, 20.0, 20.0)))
        .collect();
    let backend = TestBackend::new();
    let pipeline = backend.pipeline(Arc::new(FixedDetector { detections }));

    // The annotated image is upload #1, crop k is upload #(k + 1)
    backend
        .objects
        .fail_after(k, UploadError::Transport("connection reset".to_string()))
        .await;

    let err = pipeline
        .process(ProcessRequest::new(&image, "m.onnx"))
        .await
        .unwrap_err();
    (backend, err)
}

#[tokio::test]
async fn test_crop_upload_failure_at_each_position() {
    for k in 1..=CROPS {
        let (backend, err) = run_with_crop_upload_failure(k).await;

        assert!(matches!(err, PipelineError::Upload(_)), "k={}: {:?}", k, err);
        assert_eq!(backend.records.main_images().await.len(), 1, "k={}", k);
        assert_eq!(backend.records.defect_crops().await.len(), k - 1, "k={}", k);
        // Uploaded objects are not cleaned up either
        assert_eq!(backend.objects.len().await, k, "k={}", k);
    }
}

#[tokio::test]
async fn test_main_upload_failure_writes_no_rows() {
    let (backend, err) = run_with_crop_upload_failure(0).await;

    assert_eq!(err.kind(), "upload_error");
    assert!(backend.records.main_images().await.is_empty());
    assert!(backend.objects.is_empty().await);
}

#[tokio::test]
async fn test_crop_insert_failure_keeps_main_row() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("board.png");
    std::fs::write(&image, png_bytes(100, 100)).unwrap();

    let backend = TestBackend::new();
    let pipeline = backend.pipeline(Arc::new(FixedDetector {
        detections: vec![
            detection("short", 3, 0.9, (0.0, 0.0, 10.0, 10.0)),
            detection("spur", 4, 0.8, (50.0, 50.0, 10.0, 10.0)),
        ],
    }));
    // Main insert and first crop insert succeed
    backend
        .records
        .fail_after(2, PersistenceError::Constraint("duplicate key".to_string()))
        .await;

    let err = pipeline
        .process(ProcessRequest::new(&image, "m.onnx"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "persistence_error");
    assert_eq!(backend.records.main_images().await.len(), 1);
    assert_eq!(backend.records.defect_crops().await.len(), 1);
    // Second crop was uploaded before its insert failed
    assert_eq!(backend.objects.len().await, 3);
}
