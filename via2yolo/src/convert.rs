use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::via::{ImageRecord, ViaProject};

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("Image '{name}' not found in '{dir}'")]
    ImageNotFound { name: String, dir: String },
    #[error("Unable to load image at {path}: {source}")]
    Unreadable {
        path: String,
        source: image::ImageError,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid annotation file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Label string to YOLO class id. Labels missing from the table are dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassMap(HashMap<String, u32>);

impl Default for ClassMap {
    fn default() -> Self {
        Self(HashMap::from([("disease_detected".to_string(), 0)]))
    }
}

impl ClassMap {
    pub fn with_overrides(overrides: impl IntoIterator<Item = (String, u32)>) -> Self {
        let mut map = Self::default();
        map.0.extend(overrides);
        map
    }

    pub fn get(&self, label: &str) -> Option<u32> {
        self.0.get(label).copied()
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Summary {
    pub images_written: usize,
    pub images_skipped: usize,
    pub regions_written: usize,
}

/// Walks `search_dir` for a file named exactly `name` and reads its size.
pub fn find_image_dimensions(name: &str, search_dir: &Path) -> Result<(u32, u32), ConvertError> {
    let found = WalkDir::new(search_dir)
        .into_iter()
        .filter_map(Result::ok)
        .find(|e| e.file_type().is_file() && e.file_name() == name);

    match found {
        Some(entry) => image::image_dimensions(entry.path()).map_err(|source| ConvertError::Unreadable {
            path: entry.path().display().to_string(),
            source,
        }),
        None => Err(ConvertError::ImageNotFound {
            name: name.to_string(),
            dir: search_dir.display().to_string(),
        }),
    }
}

/// Interleaves the polygon into `x1 y1 x2 y2 ...` scaled to the unit square.
pub fn normalize_polygon(xs: &[f64], ys: &[f64], width: u32, height: u32) -> Vec<f64> {
    xs.iter()
        .zip(ys)
        .flat_map(|(x, y)| [x / width as f64, y / height as f64])
        .collect()
}

pub fn format_line(class_id: u32, points: &[f64]) -> String {
    let mut line = class_id.to_string();
    for p in points {
        let _ = write!(line, " {:.6}", p);
    }
    line
}

/// Writes `<output_dir>/<stem>.txt` for one record and returns the number of
/// regions written. The file is created even when no region survives.
pub fn convert_record(
    record: &ImageRecord,
    search_dir: &Path,
    output_dir: &Path,
    classes: &ClassMap,
) -> Result<usize, ConvertError> {
    let (width, height) = find_image_dimensions(&record.filename, search_dir)?;

    let mut contents = String::new();
    let mut written = 0;
    for region in &record.regions {
        let Some(label) = region.region_attributes.names.as_deref() else {
            log::warn!("{}: region without a label, skipping", record.filename);
            continue;
        };
        let Some(class_id) = classes.get(label) else {
            log::debug!("{}: unknown label {:?} dropped", record.filename, label);
            continue;
        };
        let shape = &region.shape_attributes;
        if shape.all_points_x.len() != shape.all_points_y.len() || shape.all_points_x.len() < 3 {
            log::warn!(
                "{}: {} region is not a polygon ({} x / {} y points), skipping",
                record.filename,
                shape.name.as_deref().unwrap_or("unnamed"),
                shape.all_points_x.len(),
                shape.all_points_y.len()
            );
            continue;
        }
        let points = normalize_polygon(&shape.all_points_x, &shape.all_points_y, width, height);
        contents.push_str(&format_line(class_id, &points));
        contents.push('\n');
        written += 1;
    }

    std::fs::write(label_path(output_dir, &record.filename), contents)?;
    Ok(written)
}

fn label_path(output_dir: &Path, image_name: &str) -> PathBuf {
    let stem = Path::new(image_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| image_name.to_string());
    output_dir.join(format!("{}.txt", stem))
}

/// Converts every record of a VIA export. Records whose image cannot be found
/// or read are reported and skipped.
pub fn convert(
    annotations: &Path,
    search_dir: &Path,
    output_dir: &Path,
    classes: &ClassMap,
) -> Result<Summary, ConvertError> {
    std::fs::create_dir_all(output_dir)?;
    let project: ViaProject = serde_json::from_str(&std::fs::read_to_string(annotations)?)?;

    let mut summary = Summary::default();
    for (id, record) in &project {
        match convert_record(record, search_dir, output_dir, classes) {
            Ok(regions) => {
                log::debug!("{}: {} regions", id, regions);
                summary.images_written += 1;
                summary.regions_written += regions;
            }
            Err(e @ (ConvertError::ImageNotFound { .. } | ConvertError::Unreadable { .. })) => {
                log::warn!("{}", e);
                summary.images_skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(summary)
}
