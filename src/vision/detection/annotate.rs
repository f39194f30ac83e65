// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Annotated image and defect crop rendering

use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use super::yolo::Detection;
use super::{AnnotatedImage, BoundingBox, DefectCropImage, DetectionError, DetectionResult};
use crate::vision::image_utils::encode_png;

/// Box outline thickness in pixels
const BOX_THICKNESS: u32 = 3;

const PALETTE: [[u8; 3]; 6] = [
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 31],
    [255, 178, 29],
    [72, 249, 10],
    [0, 194, 255],
];

fn class_color(class_id: usize) -> Rgb<u8> {
    Rgb(PALETTE[class_id % PALETTE.len()])
}

/// Snap a float detection to whole pixels inside a `width` x `height` image
///
/// Returns `None` when nothing of the box lies inside the image.
pub fn pixel_bbox(det: &Detection, width: u32, height: u32) -> Option<BoundingBox> {
    let x0 = (det.x.floor().max(0.0) as u32).min(width);
    let y0 = (det.y.floor().max(0.0) as u32).min(height);
    let x1 = ((det.x + det.width).ceil().max(0.0) as u32).min(width);
    let y1 = ((det.y + det.height).ceil().max(0.0) as u32).min(height);

    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    Some(BoundingBox {
        x: x0,
        y: y0,
        width: x1 - x0,
        height: y1 - y0,
    })
}

fn draw_box(canvas: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
    for inset in 0..BOX_THICKNESS {
        let w = bbox.width.saturating_sub(2 * inset);
        let h = bbox.height.saturating_sub(2 * inset);
        if w == 0 || h == 0 {
            break;
        }
        let rect = Rect::at((bbox.x + inset) as i32, (bbox.y + inset) as i32).of_size(w, h);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}

/// Render the detection output for one image
///
/// Crops are cut from the unannotated source and ordered by descending
/// confidence. Detections that fall entirely outside the image are dropped.
pub fn build_detection_result(
    image: &DynamicImage,
    detections: &[Detection],
    original_filename: Option<String>,
) -> Result<DetectionResult, DetectionError> {
    let (width, height) = image.dimensions();

    let mut ordered: Vec<&Detection> = detections.iter().collect();
    ordered.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut canvas = image.to_rgb8();
    let mut crops = Vec::with_capacity(ordered.len());

    for det in ordered {
        let Some(bbox) = pixel_bbox(det, width, height) else {
            continue;
        };

        draw_box(&mut canvas, &bbox, class_color(det.class_id));

        let crop = image.crop_imm(bbox.x, bbox.y, bbox.width, bbox.height);
        crops.push(DefectCropImage {
            bytes: encode_png(&crop)?,
            width: bbox.width,
            height: bbox.height,
            prediction: det.class_name.clone(),
            confidence: det.confidence,
            bbox: Some(bbox),
        });
    }

    let annotated = AnnotatedImage {
        bytes: encode_png(&DynamicImage::ImageRgb8(canvas))?,
        width,
        height,
        original_filename,
    };

    Ok(DetectionResult { annotated, crops })
}
