use ndarray::{ArrayD, IxDyn};
use std::path::Path;
use std::sync::Mutex;
use tch::{CModule, Device, IValue, Kind, Tensor};

use super::yolo::{self, Letterbox};
use super::{ModelError, Prediction, VisionModel};
use crate::config::{ModelSpec, ModelTask};

impl From<tch::TchError> for ModelError {
    fn from(err: tch::TchError) -> Self {
        ModelError::Runtime(err.to_string())
    }
}

/// A TorchScript export of a YOLOv8 detect, segment or classify model.
pub struct TorchModel {
    module: Mutex<CModule>,
    device: Device,
    task: ModelTask,
    names: Vec<String>,
    image_size: u32,
    iou: f32,
}

impl TorchModel {
    pub fn load(spec: &ModelSpec) -> Result<Self, ModelError> {
        let device = Device::cuda_if_available();
        let mut module = CModule::load_on_device(&spec.path, device)?;
        module.set_eval();
        log::info!(
            "Loaded {} on {:?} ({} classes)",
            spec.path.display(),
            device,
            spec.names.len()
        );
        Ok(Self {
            module: Mutex::new(module),
            device,
            task: spec.task,
            names: spec.names.clone(),
            image_size: spec.image_size,
            iou: spec.iou,
        })
    }

    fn forward(&self, input: ndarray::Array4<f32>) -> Result<Vec<ArrayD<f32>>, ModelError> {
        let shape: Vec<i64> = input.shape().iter().map(|d| *d as i64).collect();
        let data = input
            .as_slice()
            .ok_or_else(|| ModelError::Runtime("input tensor is not contiguous".into()))?;
        let tensor = Tensor::from_slice(data).reshape(shape.as_slice()).to_device(self.device);

        let output = {
            let guard = self
                .module
                .lock()
                .map_err(|_| ModelError::Runtime("model mutex poisoned".into()))?;
            tch::no_grad(|| guard.forward_is(&[IValue::Tensor(tensor)]))?
        };

        let tensors = match output {
            IValue::Tensor(t) => vec![t],
            IValue::Tuple(items) | IValue::GenericList(items) => items
                .into_iter()
                .filter_map(|v| match v {
                    IValue::Tensor(t) => Some(t),
                    _ => None,
                })
                .collect(),
            other => {
                return Err(ModelError::Output(format!(
                    "model did not return tensors: {other:?}"
                )));
            }
        };
        tensors.iter().map(to_ndarray).collect()
    }
}

fn to_ndarray(tensor: &Tensor) -> Result<ArrayD<f32>, ModelError> {
    let shape: Vec<usize> = tensor.size().iter().map(|d| *d as usize).collect();
    let flat = tensor
        .to_device(Device::Cpu)
        .to_kind(Kind::Float)
        .flatten(0, -1);
    let data = Vec::<f32>::try_from(&flat)?;
    ArrayD::from_shape_vec(IxDyn(&shape), data).map_err(|e| ModelError::Output(e.to_string()))
}

impl VisionModel for TorchModel {
    fn predict(&self, source: &Path, confidence: f32) -> Result<Prediction, ModelError> {
        let orig_img = image::open(source)?.to_rgb8();
        let (w, h) = orig_img.dimensions();
        let mut prediction = Prediction::new(orig_img, self.names.clone());

        match self.task {
            ModelTask::Classify => {
                let outputs = self.forward(yolo::classify_input(&prediction.orig_img, self.image_size))?;
                let first = outputs
                    .first()
                    .ok_or_else(|| ModelError::Output("no classification output".into()))?;
                prediction.probs = Some(yolo::postprocess_classify(first.view())?);
            }
            ModelTask::Detect => {
                let letterbox = Letterbox::new(w, h, self.image_size);
                let outputs = self.forward(letterbox.input(&prediction.orig_img))?;
                let preds = outputs
                    .first()
                    .ok_or_else(|| ModelError::Output("no detection output".into()))?;
                prediction.boxes =
                    yolo::postprocess_detect(preds.view(), &letterbox, confidence, self.iou)?;
            }
            ModelTask::Segment => {
                let letterbox = Letterbox::new(w, h, self.image_size);
                let outputs = self.forward(letterbox.input(&prediction.orig_img))?;
                let (preds, protos) = match outputs.as_slice() {
                    [preds, protos, ..] => (preds, protos),
                    _ => {
                        return Err(ModelError::Output(
                            "segmentation model must return predictions and prototypes".into(),
                        ));
                    }
                };
                let (boxes, masks) = yolo::postprocess_segment(
                    preds.view(),
                    protos.view(),
                    &letterbox,
                    confidence,
                    self.iou,
                )?;
                prediction.boxes = boxes;
                if !masks.is_empty() {
                    prediction.masks = Some(masks);
                }
            }
        }

        log::debug!(
            "{} -> {} boxes, probs: {}",
            source.display(),
            prediction.boxes.len(),
            prediction.probs.is_some()
        );
        Ok(prediction)
    }
}
