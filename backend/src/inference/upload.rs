use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use shared::UploadRequest;
use std::path::{Path, PathBuf};

use crate::error::ApiError;

/// A request that carried both required fields.
#[derive(Debug, Clone)]
pub struct Upload {
    pub image: String,
    pub filename: String,
}

impl TryFrom<UploadRequest> for Upload {
    type Error = ApiError;

    fn try_from(req: UploadRequest) -> Result<Self, Self::Error> {
        match (req.image, req.filename) {
            (Some(image), Some(filename)) => {
                if Path::new(&filename).file_name().is_none() {
                    return Err(ApiError::InvalidFilename(filename));
                }
                Ok(Self { image, filename })
            }
            _ => Err(ApiError::MissingField),
        }
    }
}

/// Decodes the image and writes it into `upload_dir`, keeping only the final
/// component of the client supplied name. An existing file of the same name is
/// overwritten.
pub fn save(upload_dir: &Path, upload: &Upload) -> Result<PathBuf, ApiError> {
    let bytes = decode_image(&upload.image)?;
    let name = Path::new(&upload.filename)
        .file_name()
        .ok_or_else(|| ApiError::InvalidFilename(upload.filename.clone()))?;
    let file_path = upload_dir.join(name);
    std::fs::write(&file_path, &bytes)?;
    log::debug!("Wrote {} bytes to {}", bytes.len(), file_path.display());
    Ok(file_path)
}

/// Standard base64, ignoring the line breaks MIME-style encoders insert.
fn decode_image(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: Vec<u8> = encoded
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD.decode(compact)
}
