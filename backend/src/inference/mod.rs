pub mod render;
pub mod upload;

use shared::{ClassificationResponse, DetectionResponse, SegmentationResponse};

use crate::error::ApiError;
use crate::model::{ModelContext, ModelError};
use upload::Upload;

/// Reported by the skin model when nothing was segmented.
pub const HEALTHY_LABEL: &str = "healthy_skin";
/// Reported by the category model when the top-1 score is below the accept threshold.
pub const NOT_A_MEMBER_LABEL: &str = "not_a_fish";

/// Detection: green boxes on the original image plus the distinct class names
/// in first-seen order.
pub fn detect_disease(ctx: &ModelContext, upload: &Upload) -> Result<DetectionResponse, ApiError> {
    let path = upload::save(&ctx.upload_dir, upload)?;
    let prediction = ctx.detector.predict(&path, ctx.thresholds.detection)?;

    let annotated = render::draw_boxes(&prediction.orig_img, &prediction.boxes);

    let mut class_names: Vec<String> = Vec::new();
    for det in &prediction.boxes {
        let name = prediction.class_name(det.class_id)?;
        if !class_names.iter().any(|n| n == name) {
            class_names.push(name.to_string());
        }
    }

    log::info!("{}: {} boxes, classes {:?}", upload.filename, prediction.boxes.len(), class_names);
    Ok(DetectionResponse {
        image: render::encode_png_base64(&annotated)?,
        class_names,
    })
}

/// Segmentation: merged masks blended over the image. Only the first class
/// name is returned.
pub fn segment_skin(ctx: &ModelContext, upload: &Upload) -> Result<SegmentationResponse, ApiError> {
    let path = upload::save(&ctx.upload_dir, upload)?;
    let prediction = ctx.segmenter.predict(&path, ctx.thresholds.segmentation)?;

    let image = match prediction.masks.as_deref() {
        Some(masks) if !masks.is_empty() => {
            log::info!("{}: diseased skin detected ({} masks)", upload.filename, masks.len());
            render::overlay_masks(&prediction.orig_img, masks)
        }
        _ => prediction.orig_img.clone(),
    };

    let class_names = match prediction.boxes.first() {
        Some(det) => prediction.class_name(det.class_id)?.to_string(),
        None => HEALTHY_LABEL.to_string(),
    };

    Ok(SegmentationResponse {
        image: render::encode_png_base64(&image)?,
        class_names,
    })
}

/// Classification: the top-1 label if its score clears the accept threshold.
pub fn classify_category(
    ctx: &ModelContext,
    upload: &Upload,
) -> Result<ClassificationResponse, ApiError> {
    let path = upload::save(&ctx.upload_dir, upload)?;
    let prediction = ctx.classifier.predict(&path, ctx.thresholds.classification)?;

    let (top1, confidence) = prediction
        .probs
        .as_ref()
        .and_then(|probs| probs.top1())
        .ok_or_else(|| ModelError::Output("classification model returned no probabilities".into()))?;

    if confidence < ctx.thresholds.classification_accept {
        log::info!(
            "{}: top-1 confidence {:.3} below {}, rejecting",
            upload.filename,
            confidence,
            ctx.thresholds.classification_accept
        );
        return Ok(ClassificationResponse::Rejected {
            class_name: NOT_A_MEMBER_LABEL.to_string(),
        });
    }

    Ok(ClassificationResponse::Accepted {
        class_names: prediction.class_name(top1)?.to_string(),
    })
}
