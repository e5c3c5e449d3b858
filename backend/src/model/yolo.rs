//! Pre- and post-processing for YOLOv8 style exports.
//!
//! Detection heads emit `[1, 4 + nc + nm, anchors]` where the first four rows
//! are `cx, cy, w, h` in letterboxed input pixels, followed by `nc` class
//! scores and `nm` mask coefficients (segmentation only). Segmentation models
//! also emit prototypes shaped `[1, nm, mh, mw]`.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};
use ndarray::{Array1, Array4, ArrayView2, ArrayView3, ArrayViewD, Axis, Ix2, Ix3};

use super::{BoundingBox, Detection, ModelError, Probs};

const PAD_VALUE: f32 = 114.0 / 255.0;
const MAX_DETECTIONS: usize = 300;

/// Aspect preserving resize onto a square canvas, and its inverse for boxes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub size: u32,
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub new_w: u32,
    pub new_h: u32,
    pub orig_w: u32,
    pub orig_h: u32,
}

impl Letterbox {
    pub fn new(orig_w: u32, orig_h: u32, size: u32) -> Self {
        let scale = (size as f32 / orig_w as f32).min(size as f32 / orig_h as f32);
        let new_w = ((orig_w as f32 * scale).round() as u32).clamp(1, size);
        let new_h = ((orig_h as f32 * scale).round() as u32).clamp(1, size);
        Self {
            size,
            scale,
            pad_x: (size - new_w) / 2,
            pad_y: (size - new_h) / 2,
            new_w,
            new_h,
            orig_w,
            orig_h,
        }
    }

    /// NCHW float input in `[0, 1]`, grey padded.
    pub fn input(&self, img: &RgbImage) -> Array4<f32> {
        let resized = imageops::resize(img, self.new_w, self.new_h, FilterType::Triangle);
        let size = self.size as usize;
        let mut input = Array4::from_elem((1, 3, size, size), PAD_VALUE);
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (ix, iy) = ((x + self.pad_x) as usize, (y + self.pad_y) as usize);
            for c in 0..3 {
                input[[0, c, iy, ix]] = pixel[c] as f32 / 255.0;
            }
        }
        input
    }

    /// Maps a box from letterboxed input pixels back onto the original image.
    pub fn to_original(&self, bbox: &BoundingBox) -> BoundingBox {
        let (w, h) = (self.orig_w as f32, self.orig_h as f32);
        let unmap_x = |v: f32| ((v - self.pad_x as f32) / self.scale).clamp(0.0, w);
        let unmap_y = |v: f32| ((v - self.pad_y as f32) / self.scale).clamp(0.0, h);
        BoundingBox {
            x1: unmap_x(bbox.x1),
            y1: unmap_y(bbox.y1),
            x2: unmap_x(bbox.x2),
            y2: unmap_y(bbox.y2),
        }
    }
}

/// Shorter side resized to `size`, then centre cropped to `size x size`.
pub fn classify_input(img: &RgbImage, size: u32) -> Array4<f32> {
    let (w, h) = img.dimensions();
    let scale = size as f32 / w.min(h).max(1) as f32;
    let rw = ((w as f32 * scale).round() as u32).max(size);
    let rh = ((h as f32 * scale).round() as u32).max(size);
    let resized = imageops::resize(img, rw, rh, FilterType::Triangle);
    let cropped = imageops::crop_imm(&resized, (rw - size) / 2, (rh - size) / 2, size, size).to_image();

    let size = size as usize;
    let mut input = Array4::zeros((1, 3, size, size));
    for (x, y, pixel) in cropped.enumerate_pixels() {
        for c in 0..3 {
            input[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }
    input
}

/// A decoded anchor before it is mapped back to the original image.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub bbox: BoundingBox,
    pub class_id: usize,
    pub confidence: f32,
    pub coeffs: Vec<f32>,
}

pub fn decode_predictions(
    output: ArrayView2<f32>,
    mask_dim: usize,
    confidence: f32,
) -> Result<Vec<Candidate>, ModelError> {
    let rows = output.nrows();
    if rows <= 4 + mask_dim {
        return Err(ModelError::Output(format!(
            "expected more than {} rows in detection output, got {}",
            4 + mask_dim,
            rows
        )));
    }
    let num_classes = rows - 4 - mask_dim;

    let mut candidates = Vec::new();
    for anchor in output.axis_iter(Axis(1)) {
        let (class_id, score) = anchor
            .iter()
            .skip(4)
            .take(num_classes)
            .copied()
            .enumerate()
            .reduce(|best, cur| if cur.1 > best.1 { cur } else { best })
            .unwrap_or((0, 0.0));
        if score < confidence {
            continue;
        }
        let (cx, cy, w, h) = (anchor[0], anchor[1], anchor[2], anchor[3]);
        candidates.push(Candidate {
            bbox: BoundingBox {
                x1: cx - w / 2.0,
                y1: cy - h / 2.0,
                x2: cx + w / 2.0,
                y2: cy + h / 2.0,
            },
            class_id,
            confidence: score,
            coeffs: anchor.iter().skip(4 + num_classes).copied().collect(),
        });
    }
    Ok(candidates)
}

/// Class-aware NMS, highest confidence first.
pub fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if kept.len() == MAX_DETECTIONS {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) >= iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

/// Assembles one binary mask per candidate from the prototypes. Masks are
/// returned at prototype resolution with the letterbox padding cut away.
pub fn process_masks(
    protos: ArrayView3<f32>,
    candidates: &[Candidate],
    letterbox: &Letterbox,
) -> Result<Vec<GrayImage>, ModelError> {
    let (nm, mh, mw) = protos.dim();
    let flat = protos
        .to_shape((nm, mh * mw))
        .map_err(|e| ModelError::Output(e.to_string()))?;

    let sx = mw as f32 / letterbox.size as f32;
    let sy = mh as f32 / letterbox.size as f32;
    let crop_x = (letterbox.pad_x as f32 * sx).floor() as u32;
    let crop_y = (letterbox.pad_y as f32 * sy).floor() as u32;
    let crop_w = ((letterbox.new_w as f32 * sx).round() as u32).clamp(1, mw as u32 - crop_x);
    let crop_h = ((letterbox.new_h as f32 * sy).round() as u32).clamp(1, mh as u32 - crop_y);

    let mut masks = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if candidate.coeffs.len() != nm {
            return Err(ModelError::Output(format!(
                "expected {} mask coefficients, got {}",
                nm,
                candidate.coeffs.len()
            )));
        }
        let coeffs = Array1::from(candidate.coeffs.clone());
        let logits = coeffs.dot(&flat);

        let bx1 = candidate.bbox.x1 * sx;
        let by1 = candidate.bbox.y1 * sy;
        let bx2 = candidate.bbox.x2 * sx;
        let by2 = candidate.bbox.y2 * sy;

        // sigmoid(v) > 0.5 exactly when v > 0
        let full = GrayImage::from_fn(mw as u32, mh as u32, |x, y| {
            let (fx, fy) = (x as f32, y as f32);
            let inside = fx >= bx1 && fx < bx2 && fy >= by1 && fy < by2;
            let on = inside && logits[y as usize * mw + x as usize] > 0.0;
            Luma([if on { 255 } else { 0 }])
        });
        masks.push(imageops::crop_imm(&full, crop_x, crop_y, crop_w, crop_h).to_image());
    }
    Ok(masks)
}

fn first_batch<D: ndarray::Dimension>(
    output: ArrayViewD<'_, f32>,
) -> Result<ndarray::ArrayView<'_, f32, D>, ModelError> {
    if output.ndim() == 0 || output.shape()[0] == 0 {
        return Err(ModelError::Output("empty model output".into()));
    }
    output
        .index_axis_move(Axis(0), 0)
        .into_dimensionality::<D>()
        .map_err(|e| ModelError::Output(e.to_string()))
}

pub fn postprocess_detect(
    output: ArrayViewD<f32>,
    letterbox: &Letterbox,
    confidence: f32,
    iou_threshold: f32,
) -> Result<Vec<Detection>, ModelError> {
    let preds = first_batch::<Ix2>(output)?;
    let kept = non_max_suppression(decode_predictions(preds, 0, confidence)?, iou_threshold);
    Ok(to_detections(&kept, letterbox))
}

pub fn postprocess_segment(
    output: ArrayViewD<f32>,
    protos: ArrayViewD<f32>,
    letterbox: &Letterbox,
    confidence: f32,
    iou_threshold: f32,
) -> Result<(Vec<Detection>, Vec<GrayImage>), ModelError> {
    let preds = first_batch::<Ix2>(output)?;
    let protos = first_batch::<Ix3>(protos)?;
    let mask_dim = protos.dim().0;
    let kept = non_max_suppression(decode_predictions(preds, mask_dim, confidence)?, iou_threshold);
    let masks = process_masks(protos, &kept, letterbox)?;
    Ok((to_detections(&kept, letterbox), masks))
}

pub fn postprocess_classify(output: ArrayViewD<f32>) -> Result<Probs, ModelError> {
    let scores: Vec<f32> = output.iter().copied().collect();
    if scores.is_empty() {
        return Err(ModelError::Output("empty classification output".into()));
    }
    Ok(Probs::new(scores))
}

fn to_detections(candidates: &[Candidate], letterbox: &Letterbox) -> Vec<Detection> {
    candidates
        .iter()
        .map(|c| Detection {
            bbox: letterbox.to_original(&c.bbox),
            class_id: c.class_id,
            confidence: c.confidence,
        })
        .collect()
}
