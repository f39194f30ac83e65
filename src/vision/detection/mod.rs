// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! PCB defect detection
//!
//! Wraps the exported YOLO model behind [`DefectDetector`]. A detection run
//! reads one image from disk and produces a [`DetectionResult`]: the source
//! image with every defect boxed, plus one PNG crop per defect.

pub mod annotate;
pub mod preprocessing;
pub mod yolo;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::DetectorConfig;
use crate::vision::image_utils::{load_image_file, ImageError};

pub use annotate::build_detection_result;
pub use yolo::{Detection, YoloModel};

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("image could not be read: {0}")]
    ImageRead(String),
    #[error("image could not be decoded: {0}")]
    ImageDecode(String),
    #[error("model artifact not found: {}", .0.display())]
    ModelNotFound(PathBuf),
    #[error("model could not be loaded: {0}")]
    ModelLoad(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("failed to encode output image: {0}")]
    Encode(String),
    #[error("detection task did not complete: {0}")]
    Interrupted(String),
}

impl From<ImageError> for DetectionError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::Io(e) => DetectionError::ImageRead(e.to_string()),
            ImageError::EncodeFailed(msg) => DetectionError::Encode(msg),
            other => DetectionError::ImageDecode(other.to_string()),
        }
    }
}

/// Bounding box in source-image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// The source image with all detections drawn on it, PNG encoded
#[derive(Debug, Clone, Serialize)]
pub struct AnnotatedImage {
    #[serde(skip_serializing)]
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// File name of the image the detector was run on
    pub original_filename: Option<String>,
}

/// One detected defect region, PNG encoded
#[derive(Debug, Clone, Serialize)]
pub struct DefectCropImage {
    #[serde(skip_serializing)]
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Predicted class label
    pub prediction: String,
    /// Confidence score (0.0-1.0)
    pub confidence: f32,
    pub bbox: Option<BoundingBox>,
}

/// Output of one detection run, consumed once by the pipeline
#[derive(Debug, Clone, Serialize)]
pub struct DetectionResult {
    pub annotated: AnnotatedImage,
    /// Crops in descending confidence order
    pub crops: Vec<DefectCropImage>,
}

/// Detection capability used by the pipeline
///
/// Implementations are synchronous and CPU-bound; async callers should run
/// them on a blocking thread.
pub trait DefectDetector: Send + Sync {
    fn detect(&self, image_path: &Path, model_path: &Path) -> Result<DetectionResult, DetectionError>;
}

/// Run detection on one image with the model at `model_path`
///
/// Loads the model for this call only, using default detector tuning.
pub fn run_detection(image_path: &Path, model_path: &Path) -> Result<DetectionResult, DetectionError> {
    let config = DetectorConfig {
        model_path: model_path.to_path_buf(),
        ..DetectorConfig::default()
    };
    let (image, _) = load_image_file(image_path)?;
    let model = YoloModel::load(model_path, &config)?;
    detect_with_model(&model, &image, file_name_of(image_path))
}

/// Run an already-loaded model on a decoded image
pub fn detect_with_model(
    model: &YoloModel,
    image: &image::DynamicImage,
    original_filename: Option<String>,
) -> Result<DetectionResult, DetectionError> {
    let detections = model.detect(image)?;
    debug!("{} detections after NMS", detections.len());
    build_detection_result(image, &detections, original_filename)
}

fn file_name_of(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

/// ONNX-backed detector holding the configured model for the process lifetime
pub struct OnnxDefectDetector {
    config: DetectorConfig,
    default_model: Arc<YoloModel>,
}

impl std::fmt::Debug for OnnxDefectDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxDefectDetector")
            .field("model_path", &self.config.model_path)
            .finish_non_exhaustive()
    }
}

impl OnnxDefectDetector {
    /// Load the configured model
    pub fn new(config: DetectorConfig) -> Result<Self, DetectionError> {
        let model = YoloModel::load(&config.model_path, &config)?;
        info!(
            "✅ PCB defect model ready ({} classes) from {}",
            config.class_names.len(),
            config.model_path.display()
        );
        Ok(Self {
            config,
            default_model: Arc::new(model),
        })
    }

    pub fn model_path(&self) -> &Path {
        &self.config.model_path
    }
}

impl DefectDetector for OnnxDefectDetector {
    fn detect(&self, image_path: &Path, model_path: &Path) -> Result<DetectionResult, DetectionError> {
        let (image, info) = load_image_file(image_path)?;
        debug!(
            "Decoded {}: {}x{}, {} bytes",
            image_path.display(),
            info.width,
            info.height,
            info.size_bytes
        );

        if model_path == self.config.model_path.as_path() {
            return detect_with_model(&self.default_model, &image, file_name_of(image_path));
        }

        // Non-default artifact: load for this call only
        let config = DetectorConfig {
            model_path: model_path.to_path_buf(),
            ..self.config.clone()
        };
        let model = YoloModel::load(model_path, &config)?;
        detect_with_model(&model, &image, file_name_of(image_path))
    }
}
