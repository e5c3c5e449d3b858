//! In-process stand-ins for the pretrained models.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{GrayImage, RgbImage};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::inference::render::encode_png_base64;
use crate::inference::upload::Upload;
use crate::model::{Detection, ModelContext, ModelError, Prediction, Probs, Thresholds, VisionModel};

/// Loads the uploaded file like a real model would and returns canned results.
#[derive(Default)]
pub struct FakeModel {
    pub names: Vec<String>,
    pub boxes: Vec<Detection>,
    pub masks: Option<Vec<GrayImage>>,
    pub probs: Option<Probs>,
    pub failure: Option<String>,
    pub seen_confidence: Arc<Mutex<Option<f32>>>,
}

impl VisionModel for FakeModel {
    fn predict(&self, source: &Path, confidence: f32) -> Result<Prediction, ModelError> {
        *self.seen_confidence.lock().unwrap() = Some(confidence);
        if let Some(message) = &self.failure {
            return Err(ModelError::Runtime(message.clone()));
        }
        let mut prediction = Prediction::new(image::open(source)?.to_rgb8(), self.names.clone());
        prediction.boxes = self.boxes.clone();
        prediction.masks = self.masks.clone();
        prediction.probs = self.probs.clone();
        Ok(prediction)
    }
}

pub fn context(
    upload_dir: &Path,
    detector: FakeModel,
    segmenter: FakeModel,
    classifier: FakeModel,
) -> ModelContext {
    ModelContext {
        detector: Arc::new(detector),
        segmenter: Arc::new(segmenter),
        classifier: Arc::new(classifier),
        thresholds: Thresholds::default(),
        upload_dir: upload_dir.to_path_buf(),
    }
}

pub fn upload_for(img: &RgbImage, filename: &str) -> Upload {
    Upload {
        image: encode_png_base64(img).unwrap(),
        filename: filename.to_string(),
    }
}

pub fn decode_png(encoded: &str) -> RgbImage {
    let bytes = STANDARD.decode(encoded).unwrap();
    image::load_from_memory(&bytes).unwrap().to_rgb8()
}
