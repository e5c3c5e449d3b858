#[cfg_attr(not(feature = "torch"), allow(dead_code))]
pub mod yolo;

#[cfg(feature = "torch")]
pub mod torch;

use image::{GrayImage, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{ModelSpec, ServiceConfig};

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Model runtime error: {0}")]
    Runtime(String),
    #[error("Unexpected model output: {0}")]
    Output(String),
    #[error("Unknown class id {0}")]
    UnknownClass(usize),
    #[error("Model backend unavailable: {0}")]
    BackendUnavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter = BoundingBox {
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
            x2: self.x2.min(other.x2),
            y2: self.y2.min(other.y2),
        }
        .area();
        if inter <= 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter + f32::EPSILON)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub class_id: usize,
    pub confidence: f32,
}

/// Whole-image class scores.
#[derive(Debug, Clone, PartialEq)]
pub struct Probs {
    pub scores: Vec<f32>,
}

impl Probs {
    pub fn new(scores: Vec<f32>) -> Self {
        Self { scores }
    }

    /// Index and score of the best class, `None` for an empty score vector.
    pub fn top1(&self) -> Option<(usize, f32)> {
        self.scores
            .iter()
            .copied()
            .enumerate()
            .reduce(|best, cur| if cur.1 > best.1 { cur } else { best })
    }
}

/// Output of a single `predict` call.
///
/// `boxes` are in original image pixels. `masks`, when present, hold one
/// binary mask per box at the model's output resolution (255 = foreground).
#[derive(Debug, Clone)]
pub struct Prediction {
    pub orig_img: RgbImage,
    pub names: Vec<String>,
    pub boxes: Vec<Detection>,
    pub masks: Option<Vec<GrayImage>>,
    pub probs: Option<Probs>,
}

impl Prediction {
    pub fn new(orig_img: RgbImage, names: Vec<String>) -> Self {
        Self {
            orig_img,
            names,
            boxes: Vec::new(),
            masks: None,
            probs: None,
        }
    }

    pub fn class_name(&self, class_id: usize) -> Result<&str, ModelError> {
        self.names
            .get(class_id)
            .map(String::as_str)
            .ok_or(ModelError::UnknownClass(class_id))
    }
}

/// A pretrained model that reads an image from disk and predicts on it.
pub trait VisionModel: Send + Sync {
    fn predict(&self, source: &Path, confidence: f32) -> Result<Prediction, ModelError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub detection: f32,
    pub segmentation: f32,
    pub classification: f32,
    pub classification_accept: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            detection: 0.7,
            segmentation: 0.7,
            classification: 0.5,
            classification_accept: 0.7,
        }
    }
}

/// The three preloaded models shared read-only by every request.
#[derive(Clone)]
pub struct ModelContext {
    pub detector: Arc<dyn VisionModel>,
    pub segmenter: Arc<dyn VisionModel>,
    pub classifier: Arc<dyn VisionModel>,
    pub thresholds: Thresholds,
    pub upload_dir: PathBuf,
}

impl ModelContext {
    pub fn load(config: &ServiceConfig) -> Result<Self, ModelError> {
        let models = &config.models;
        Ok(Self {
            detector: load_model(&models.disease)?,
            segmenter: load_model(&models.skin)?,
            classifier: load_model(&models.category.model)?,
            thresholds: Thresholds {
                detection: models.disease.confidence,
                segmentation: models.skin.confidence,
                classification: models.category.model.confidence,
                classification_accept: models.category.accept_threshold,
            },
            upload_dir: config.server.upload_dir.clone(),
        })
    }
}

#[cfg(feature = "torch")]
fn load_model(spec: &ModelSpec) -> Result<Arc<dyn VisionModel>, ModelError> {
    log::info!("Loading {:?} model from {}", spec.task, spec.path.display());
    Ok(Arc::new(torch::TorchModel::load(spec)?))
}

#[cfg(not(feature = "torch"))]
fn load_model(spec: &ModelSpec) -> Result<Arc<dyn VisionModel>, ModelError> {
    Err(ModelError::BackendUnavailable(format!(
        "cannot load {:?} model {}: built without the `torch` feature",
        spec.task,
        spec.path.display()
    )))
}
