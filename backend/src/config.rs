use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_PATH: &str = "config/service.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid value for {0}: {1}")]
    InvalidEnv(&'static str, String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub models: ModelsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Largest accepted JSON request body. Base64 photos run to several MB.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub disease: ModelSpec,
    pub skin: ModelSpec,
    pub category: CategorySpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTask {
    Detect,
    Segment,
    Classify,
}

#[cfg_attr(not(feature = "torch"), allow(dead_code))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub path: PathBuf,
    pub task: ModelTask,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default = "default_image_size")]
    pub image_size: u32,
    #[serde(default = "default_iou")]
    pub iou: f32,
}

/// Classification entry: the invocation threshold lives in `model.confidence`,
/// `accept_threshold` is the cutoff applied to the top-1 score afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySpec {
    #[serde(flatten)]
    pub model: ModelSpec,
    #[serde(default = "default_accept_threshold")]
    pub accept_threshold: f32,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_max_body_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_confidence() -> f32 {
    0.7
}

fn default_image_size() -> u32 {
    640
}

fn default_iou() -> f32 {
    0.45
}

fn default_accept_threshold() -> f32 {
    0.7
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            upload_dir: default_upload_dir(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ServiceConfig {
    /// Reads the YAML file named by `SERVICE_CONFIG` (or the default path) and
    /// applies the `PORT` / `UPLOAD_DIR` environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("SERVICE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_file(Path::new(&path))?;

        if let Ok(port) = std::env::var("PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidEnv("PORT", port.clone()))?;
        }
        if let Ok(dir) = std::env::var("UPLOAD_DIR") {
            config.server.upload_dir = PathBuf::from(dir);
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&config_str)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
