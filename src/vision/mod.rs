// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision processing module for PCB inspection
//!
//! This module provides:
//! - Image loading and PNG encoding
//! - YOLO defect detection via ONNX Runtime (CPU)

pub mod detection;
pub mod image_utils;

pub use detection::{
    AnnotatedImage, BoundingBox, DefectCropImage, DefectDetector, DetectionError, DetectionResult,
    OnnxDefectDetector,
};
pub use image_utils::{decode_image_bytes, detect_format, ImageError, ImageInfo};
