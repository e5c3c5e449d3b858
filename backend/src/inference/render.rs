use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::io::Cursor;

use crate::model::Detection;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const MASK_COLOR: [u8; 3] = [0, 255, 0];
const IMAGE_WEIGHT: f32 = 0.8;
const MASK_WEIGHT: f32 = 0.5;

/// Draws a 3 px green rectangle per box onto a copy of `img`. Coordinates are
/// clamped to the image, truncated to whole pixels, and the stroke is centred
/// on the box edge.
pub fn draw_boxes(img: &RgbImage, boxes: &[Detection]) -> RgbImage {
    let mut annotated = img.clone();
    let (img_w, img_h) = img.dimensions();
    // NaN casts to 0
    let clamp = |v: f32, hi: u32| v.clamp(0.0, hi as f32) as i32;
    for det in boxes {
        let (x1, y1) = (clamp(det.bbox.x1, img_w), clamp(det.bbox.y1, img_h));
        let (x2, y2) = (clamp(det.bbox.x2, img_w), clamp(det.bbox.y2, img_h));
        for t in -1..=1 {
            let w = (x2 - x1 - 2 * t + 1).max(1) as u32;
            let h = (y2 - y1 - 2 * t + 1).max(1) as u32;
            draw_hollow_rect_mut(&mut annotated, Rect::at(x1 + t, y1 + t).of_size(w, h), BOX_COLOR);
        }
    }
    annotated
}

/// Resizes every mask to the image size and merges them with an element-wise max.
pub fn merge_masks(masks: &[GrayImage], width: u32, height: u32) -> GrayImage {
    let mut combined = GrayImage::new(width, height);
    for mask in masks {
        let resized = imageops::resize(mask, width, height, FilterType::Nearest);
        for (dst, src) in combined.pixels_mut().zip(resized.pixels()) {
            dst[0] = dst[0].max(src[0]);
        }
    }
    combined
}

/// Colours the merged mask green and blends it over the image with weights
/// 0.8 / 0.5 (saturating, not normalised).
pub fn overlay_masks(img: &RgbImage, masks: &[GrayImage]) -> RgbImage {
    let (w, h) = img.dimensions();
    let combined = merge_masks(masks, w, h);
    let mut blended = img.clone();
    for (pixel, mask) in blended.pixels_mut().zip(combined.pixels()) {
        let on = mask[0] > 0;
        for c in 0..3 {
            let overlay = if on { MASK_COLOR[c] as f32 } else { 0.0 };
            let v = IMAGE_WEIGHT * pixel[c] as f32 + MASK_WEIGHT * overlay;
            pixel[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    blended
}

pub fn encode_png_base64(img: &RgbImage) -> Result<String, image::ImageError> {
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(STANDARD.encode(buffer.into_inner()))
}
