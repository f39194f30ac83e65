// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection pipeline: detect, upload, record
//!
//! One [`DetectionPipeline::process`] call runs strictly in sequence:
//! detection, the annotated image upload, the main image insert, then an
//! upload and insert per crop. Any failure aborts the run. Rows already
//! written stay written.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::backend::SupabaseClient;
use crate::config::NodeConfig;
use crate::records::{
    MemoryRecordStore, NewDefectCrop, NewMainImage, PersistenceError, PostgrestRecordStore,
    RecordId, RecordStore,
};
use crate::storage::{
    MemoryObjectStore, ObjectStore, StorageUploader, SupabaseObjectStore, UploadError,
};
use crate::vision::{BoundingBox, DefectDetector, DetectionError};

/// Folder for annotated board images
pub const MAIN_IMAGE_FOLDER: &str = "pcb/main";
/// Folder for defect crops
pub const CROP_FOLDER: &str = "pcb/crops";
/// Every stored image is lossless PNG
pub const IMAGE_EXTENSION: &str = "png";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Detection failed: {0}")]
    Detection(#[from] DetectionError),
    #[error("Upload failed: {0}")]
    Upload(#[from] UploadError),
    #[error("Database insert failed: {0}")]
    Persistence(#[from] PersistenceError),
}

impl PipelineError {
    /// Stable discriminator reported to API clients
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Detection(_) => "detection_error",
            PipelineError::Upload(_) => "upload_error",
            PipelineError::Persistence(_) => "persistence_error",
        }
    }
}

/// Input of one pipeline run
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub image_path: PathBuf,
    pub model_path: PathBuf,
    pub board_code: Option<String>,
    pub note: Option<String>,
    /// Client-side file name; defaults to the image path's file name
    pub original_filename: Option<String>,
}

impl ProcessRequest {
    pub fn new(image_path: impl Into<PathBuf>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            image_path: image_path.into(),
            model_path: model_path.into(),
            board_code: None,
            note: None,
            original_filename: None,
        }
    }

    pub fn with_board_code(mut self, board_code: Option<String>) -> Self {
        self.board_code = board_code;
        self
    }

    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }

    pub fn with_original_filename(mut self, original_filename: Option<String>) -> Self {
        self.original_filename = original_filename;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainImageRecord {
    pub id: RecordId,
    pub storage_path: String,
    pub public_url: String,
    pub width: u32,
    pub height: u32,
    pub original_filename: Option<String>,
    pub board_code: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefectCropRecord {
    pub id: RecordId,
    pub crop_storage_path: String,
    pub crop_public_url: String,
    pub width: u32,
    pub height: u32,
    pub prediction: String,
    pub confidence: f32,
    pub bbox: Option<BoundingBox>,
}

/// Everything persisted by one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPayload {
    pub main_image: MainImageRecord,
    /// In detection order
    pub crops: Vec<DefectCropRecord>,
}

#[derive(Clone)]
pub struct DetectionPipeline {
    detector: Arc<dyn DefectDetector>,
    uploader: StorageUploader,
    records: Arc<dyn RecordStore>,
}

impl DetectionPipeline {
    pub fn new(
        detector: Arc<dyn DefectDetector>,
        objects: Arc<dyn ObjectStore>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            detector,
            uploader: StorageUploader::new(objects),
            records,
        }
    }

    /// Wire the detector to the backend named in `config`
    pub fn from_config(
        config: &NodeConfig,
        detector: Arc<dyn DefectDetector>,
    ) -> Result<Self, reqwest::Error> {
        let (objects, records): (Arc<dyn ObjectStore>, Arc<dyn RecordStore>) =
            match SupabaseClient::from_config(config)? {
                Some(client) => (
                    Arc::new(SupabaseObjectStore::new(client.clone())),
                    Arc::new(PostgrestRecordStore::new(client)),
                ),
                None => (
                    Arc::new(MemoryObjectStore::new(&config.bucket_name)),
                    Arc::new(MemoryRecordStore::new()),
                ),
            };
        Ok(Self::new(detector, objects, records))
    }

    pub async fn process(&self, request: ProcessRequest) -> Result<ResultPayload, PipelineError> {
        let detector = Arc::clone(&self.detector);
        let image_path = request.image_path.clone();
        let model_path = request.model_path.clone();

        let detection = tokio::task::spawn_blocking(move || detector.detect(&image_path, &model_path))
            .await
            .map_err(|e| DetectionError::Interrupted(e.to_string()))??;

        info!(
            "Detected {} defects in {}",
            detection.crops.len(),
            request.image_path.display()
        );

        let annotated = detection.annotated;
        let (width, height) = (annotated.width, annotated.height);
        let original_filename = request.original_filename.or(annotated.original_filename);

        let main_upload = self
            .uploader
            .upload(annotated.bytes, MAIN_IMAGE_FOLDER, IMAGE_EXTENSION)
            .await?;

        let main_row = NewMainImage {
            storage_path: main_upload.stored_path,
            public_url: main_upload.public_url,
            width,
            height,
            original_filename,
            board_code: request.board_code,
            note: request.note,
        };
        let main_id = self.records.insert_main(&main_row).await?;
        debug!("Main image row {}", main_id);

        let mut crops = Vec::with_capacity(detection.crops.len());
        for crop in detection.crops {
            let uploaded = self
                .uploader
                .upload(crop.bytes, CROP_FOLDER, IMAGE_EXTENSION)
                .await?;

            let row = NewDefectCrop {
                main_image_id: main_id.clone(),
                crop_storage_path: uploaded.stored_path,
                crop_public_url: uploaded.public_url,
                crop_width: crop.width,
                crop_height: crop.height,
                prediction: crop.prediction,
                confidence: crop.confidence,
                bbox: crop.bbox.into(),
            };
            let id = self.records.insert_crop(&row).await?;

            crops.push(DefectCropRecord {
                id,
                crop_storage_path: row.crop_storage_path,
                crop_public_url: row.crop_public_url,
                width: row.crop_width,
                height: row.crop_height,
                prediction: row.prediction,
                confidence: row.confidence,
                bbox: crop.bbox,
            });
        }

        Ok(ResultPayload {
            main_image: MainImageRecord {
                id: main_id,
                storage_path: main_row.storage_path,
                public_url: main_row.public_url,
                width: main_row.width,
                height: main_row.height,
                original_filename: main_row.original_filename,
                board_code: main_row.board_code,
                note: main_row.note,
            },
            crops,
        })
    }
}
