// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! YOLO defect detection model
//!
//! Runs an Ultralytics-style YOLO export through ONNX Runtime. The model
//! emits one `[4 + num_classes]` vector per anchor (`cx, cy, w, h` in
//! letterboxed input pixels followed by per-class scores), either as
//! `[1, C, N]` or transposed `[1, N, C]`.

use image::DynamicImage;
use ndarray::{ArrayViewD, IxDyn};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::preprocessing::{preprocess_for_detection, Letterbox};
use super::DetectionError;
use crate::config::DetectorConfig;

/// A decoded detection in source-image pixel space
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// X coordinate of top-left corner
    pub x: f32,
    /// Y coordinate of top-left corner
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Class confidence score (0.0-1.0)
    pub confidence: f32,
    pub class_id: usize,
    pub class_name: String,
}

impl Detection {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Loaded YOLO session plus the tuning it runs with
#[derive(Clone)]
pub struct YoloModel {
    /// ONNX Runtime session (thread-safe)
    session: Arc<Mutex<Session>>,
    input_name: String,
    model_path: PathBuf,
    confidence_threshold: f32,
    iou_threshold: f32,
    input_size: u32,
    class_names: Vec<String>,
}

impl std::fmt::Debug for YoloModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YoloModel")
            .field("model_path", &self.model_path)
            .field("input_name", &self.input_name)
            .field("confidence_threshold", &self.confidence_threshold)
            .field("iou_threshold", &self.iou_threshold)
            .field("input_size", &self.input_size)
            .finish_non_exhaustive()
    }
}

impl YoloModel {
    /// Load the ONNX model artifact
    ///
    /// # Errors
    /// - `ModelNotFound` if the file does not exist
    /// - `ModelLoad` if ONNX Runtime rejects the artifact
    pub fn load(model_path: &Path, config: &DetectorConfig) -> Result<Self, DetectionError> {
        if !model_path.exists() {
            return Err(DetectionError::ModelNotFound(model_path.to_path_buf()));
        }

        info!("Loading PCB defect model from {}", model_path.display());

        let session = Session::builder()
            .map_err(load_err)?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .map_err(load_err)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(load_err)?
            .with_intra_threads(4)
            .map_err(load_err)?
            .commit_from_file(model_path)
            .map_err(load_err)?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "images".to_string());

        debug!("Defect model input: {}", input_name);

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
            model_path: model_path.to_path_buf(),
            confidence_threshold: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
            input_size: config.input_size,
            class_names: config.class_names.clone(),
        })
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Detect defects in a decoded image
    ///
    /// Returned boxes are in source-image pixels, sorted by descending
    /// confidence, with same-class overlaps suppressed.
    pub fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>, DetectionError> {
        let (input, letterbox) = preprocess_for_detection(image, self.input_size);

        let input_value =
            Value::from_array(input).map_err(|e| DetectionError::Inference(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| DetectionError::Inference("model session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![&self.input_name => input_value])
            .map_err(|e| DetectionError::Inference(e.to_string()))?;

        let output = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| DetectionError::Inference(e.to_string()))?;

        debug!("Defect model output shape: {:?}", output.shape());

        let candidates = decode_output(
            output.view(),
            &letterbox,
            (image.width(), image.height()),
            self.confidence_threshold,
            &self.class_names,
        )?;

        Ok(non_max_suppression(candidates, self.iou_threshold))
    }
}

/// Decode raw model output into source-space detections above `threshold`
pub fn decode_output(
    output: ArrayViewD<f32>,
    letterbox: &Letterbox,
    source_size: (u32, u32),
    threshold: f32,
    class_names: &[String],
) -> Result<Vec<Detection>, DetectionError> {
    let shape = output.shape();
    if shape.len() != 3 || shape[0] != 1 {
        return Err(DetectionError::Inference(format!(
            "unexpected output shape {:?}, expected [1, C, N] or [1, N, C]",
            shape
        )));
    }

    // Prefer the layout matching the configured class count; otherwise
    // assume anchors outnumber channels, which holds for every YOLO export
    let expected_channels = 4 + class_names.len();
    let channels_first = if shape[1] == expected_channels {
        true
    } else if shape[2] == expected_channels {
        false
    } else {
        shape[1] <= shape[2]
    };
    let (channels, anchors) = if channels_first {
        (shape[1], shape[2])
    } else {
        (shape[2], shape[1])
    };
    if channels < 5 {
        return Err(DetectionError::Inference(format!(
            "output has {} channels, need at least 5",
            channels
        )));
    }
    let num_classes = channels - 4;

    let at = |c: usize, i: usize| -> f32 {
        if channels_first {
            output[IxDyn(&[0, c, i])]
        } else {
            output[IxDyn(&[0, i, c])]
        }
    };

    let (src_w, src_h) = (source_size.0 as f32, source_size.1 as f32);
    let mut detections = Vec::new();

    for i in 0..anchors {
        let (class_id, score) = (0..num_classes)
            .map(|c| (c, at(4 + c, i)))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

        if score < threshold {
            continue;
        }

        let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
        let (x1, y1) = letterbox.to_source(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.to_source(cx + w / 2.0, cy + h / 2.0);

        let x1 = x1.clamp(0.0, src_w);
        let y1 = y1.clamp(0.0, src_h);
        let x2 = x2.clamp(0.0, src_w);
        let y2 = y2.clamp(0.0, src_h);

        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        detections.push(Detection {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: score.clamp(0.0, 1.0),
            class_id,
            class_name: class_names
                .get(class_id)
                .cloned()
                .unwrap_or_else(|| format!("class_{}", class_id)),
        });
    }

    Ok(detections)
}

fn load_err<E: std::fmt::Display>(e: E) -> DetectionError {
    DetectionError::ModelLoad(e.to_string())
}

/// Per-class non-maximum suppression
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::new();
    for det in detections {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == det.class_id && iou(k, &det) > iou_threshold);
        if !suppressed {
            kept.push(det);
        }
    }
    kept
}

/// Intersection over union of two boxes
pub fn iou(a: &Detection, b: &Detection) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.area() + b.area() - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
