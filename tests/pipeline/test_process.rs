// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use pcb_defect_node::pipeline::{ProcessRequest, CROP_FOLDER, MAIN_IMAGE_FOLDER};
use std::sync::Arc;

use crate::common::{detection, png_bytes, two_defects, FixedDetector, TestBackend};

fn write_board(dir: &std::path::Path, width: u32, height: u32) -> std::path::PathBuf {
    let path = dir.join("board_17.png");
    std::fs::write(&path, png_bytes(width, height)).unwrap();
    path
}

#[tokio::test]
async fn test_n_crops_give_one_main_and_n_crop_rows() {
    let dir = tempfile::tempdir().unwrap();
    let image = write_board(dir.path(), 320, 240);
    let detections = vec![
        detection("spur", 4, 0.55, (5.0, 5.0, 10.0, 10.0)),
        detection("short", 3, 0.95, (50.0, 50.0, 12.0, 8.0)),
        detection("open_circuit", 2, 0.65, (200.0, 100.0, 30.0, 30.0)),
    ];
    let backend = TestBackend::new();
    let pipeline = backend.pipeline(Arc::new(FixedDetector { detections }));

    let payload = pipeline
        .process(ProcessRequest::new(&image, "pcb_model/best.onnx"))
        .await
        .unwrap();

    let mains = backend.records.main_images().await;
    let crops = backend.records.defect_crops().await;
    assert_eq!(mains.len(), 1);
    assert_eq!(crops.len(), 3);
    assert!(crops.iter().all(|c| c.fields.main_image_id == mains[0].id));
    // Inserted strictly in sequence: main row first, then crops in order
    assert!(crops[0].created_at >= mains[0].created_at);
    assert!(crops.windows(2).all(|w| w[0].created_at <= w[1].created_at));

    // Crops follow detector order, which is descending confidence
    let labels: Vec<&str> = payload.crops.iter().map(|c| c.prediction.as_str()).collect();
    assert_eq!(labels, vec!["short", "open_circuit", "spur"]);

    assert_eq!(payload.main_image.id, mains[0].id);
    assert_eq!((payload.main_image.width, payload.main_image.height), (320, 240));
    assert_eq!(payload.main_image.original_filename.as_deref(), Some("board_17.png"));
    assert!(payload
        .main_image
        .storage_path
        .starts_with(&format!("{}/", MAIN_IMAGE_FOLDER)));

    for (record, row) in payload.crops.iter().zip(crops.iter()) {
        assert_eq!(record.id, row.id);
        assert!(record.crop_storage_path.starts_with(&format!("{}/", CROP_FOLDER)));
        assert!(record.crop_storage_path.ends_with(".png"));
        assert_eq!(record.crop_public_url, backend_url(&record.crop_storage_path));
        let bbox = record.bbox.expect("detector crops carry a bbox");
        assert_eq!((record.width, record.height), (bbox.width, bbox.height));
    }
}

fn backend_url(path: &str) -> String {
    format!("memory://pcb-images/{}", path)
}

#[tokio::test]
async fn test_board_code_and_note_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let image = write_board(dir.path(), 64, 64);
    let backend = TestBackend::new();
    let pipeline = backend.pipeline(Arc::new(FixedDetector {
        detections: two_defects(),
    }));

    let board_code = "PCB-ÄÖ-42 ".to_string();
    let note = "reflow #2\nsecond line".to_string();
    let payload = pipeline
        .process(
            ProcessRequest::new(&image, "m.onnx")
                .with_board_code(Some(board_code.clone()))
                .with_note(Some(note.clone())),
        )
        .await
        .unwrap();

    assert_eq!(payload.main_image.board_code.as_deref(), Some(board_code.as_str()));
    assert_eq!(payload.main_image.note.as_deref(), Some(note.as_str()));

    let row = &backend.records.main_images().await[0].fields;
    assert_eq!(row.board_code.as_deref(), Some(board_code.as_str()));
    assert_eq!(row.note.as_deref(), Some(note.as_str()));
}

#[tokio::test]
async fn test_detections_outside_image_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let image = write_board(dir.path(), 64, 64);
    let backend = TestBackend::new();
    let pipeline = backend.pipeline(Arc::new(FixedDetector {
        detections: vec![
            detection("spur", 4, 0.5, (500.0, 500.0, 10.0, 10.0)),
            detection("short", 3, 0.4, (60.0, 60.0, 10.0, 10.0)),
        ],
    }));

    let payload = pipeline
        .process(ProcessRequest::new(&image, "m.onnx"))
        .await
        .unwrap();

    assert_eq!(payload.crops.len(), 1);
    let crop = &payload.crops[0];
    assert_eq!(crop.prediction, "short");
    assert_eq!((crop.width, crop.height), (4, 4));
}

#[tokio::test]
async fn test_unreadable_image_is_detection_error() {
    let backend = TestBackend::new();
    let pipeline = backend.pipeline(Arc::new(FixedDetector {
        detections: two_defects(),
    }));

    let err = pipeline
        .process(ProcessRequest::new("/nonexistent/board.png", "m.onnx"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "detection_error");
    assert!(backend.objects.is_empty().await);
    assert!(backend.records.main_images().await.is_empty());
}
