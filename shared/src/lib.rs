use serde::{Deserialize, Serialize};

/// Body accepted by every inference endpoint.
///
/// Both fields are optional on the wire so a missing one can be reported as a
/// client error instead of a deserialisation failure.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UploadRequest {
    pub image: Option<String>,
    pub filename: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DetectionResponse {
    pub image: String,
    pub class_names: Vec<String>,
}

/// Only the first class name is reported, even when several instances are found.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SegmentationResponse {
    pub image: String,
    pub class_names: String,
}

/// An accepted label is sent as `class_names`; the rejection sentinel goes out
/// under `class_name`. Existing clients key on both.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum ClassificationResponse {
    Accepted { class_names: String },
    Rejected { class_name: String },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}
