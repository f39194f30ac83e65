// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image preprocessing for the YOLO defect model

use image::{imageops, DynamicImage, GenericImageView, Rgb, RgbImage};
use ndarray::Array4;

/// Gray used for letterbox padding (YOLO training convention)
pub const LETTERBOX_FILL: u8 = 114;

/// Geometry of a letterbox transform, used to map model-space boxes back
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Uniform scale applied to the source image
    pub scale: f32,
    /// Horizontal padding on the left, in model pixels
    pub pad_x: f32,
    /// Vertical padding on the top, in model pixels
    pub pad_y: f32,
}

impl Letterbox {
    /// Map a point from model input space to source-image space
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Preprocess an image for detection
///
/// Steps:
/// 1. Letterbox to `target_size` x `target_size`
/// 2. Scale pixels to [0, 1]
/// 3. Convert to NCHW tensor format [1, 3, H, W]
pub fn preprocess_for_detection(image: &DynamicImage, target_size: u32) -> (Array4<f32>, Letterbox) {
    let (canvas, letterbox) = letterbox(image, target_size);
    (to_nchw_tensor(&canvas), letterbox)
}

/// Resize with aspect ratio preservation and center padding
pub fn letterbox(image: &DynamicImage, target_size: u32) -> (RgbImage, Letterbox) {
    let (orig_w, orig_h) = image.dimensions();
    let mut canvas = RgbImage::from_pixel(target_size, target_size, Rgb([LETTERBOX_FILL; 3]));

    if orig_w == 0 || orig_h == 0 {
        return (
            canvas,
            Letterbox {
                scale: 1.0,
                pad_x: 0.0,
                pad_y: 0.0,
            },
        );
    }

    let scale = (target_size as f32 / orig_w as f32).min(target_size as f32 / orig_h as f32);
    let new_w = ((orig_w as f32 * scale).round() as u32).clamp(1, target_size);
    let new_h = ((orig_h as f32 * scale).round() as u32).clamp(1, target_size);

    let resized = imageops::resize(&image.to_rgb8(), new_w, new_h, imageops::FilterType::Triangle);

    let offset_x = (target_size - new_w) / 2;
    let offset_y = (target_size - new_h) / 2;
    imageops::overlay(&mut canvas, &resized, offset_x as i64, offset_y as i64);

    (
        canvas,
        Letterbox {
            scale,
            pad_x: offset_x as f32,
            pad_y: offset_y as f32,
        },
    )
}

/// Convert an RGB image to a normalized NCHW tensor
pub fn to_nchw_tensor(rgb: &RgbImage) -> Array4<f32> {
    let (width, height) = rgb.dimensions();
    let mut tensor = Array4::zeros((1, 3, height as usize, width as usize));

    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }

    tensor
}
