use anyhow::{Context, Result};
use facenorm_vision::MultiFacePolicy;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("FACENORM_CONFIG_PATH").unwrap_or("/usr/local/etc/facenorm/config.toml"))
});

pub static MODEL_PREFIX: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("FACENORM_MODEL_PREFIX").unwrap_or("/usr/local/share/facenorm"))
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub detector_model: PathBuf,
    pub landmark_model: PathBuf,
    pub score_threshold: f32,
    pub nms_threshold: f32,
    /// Side of the square crop fed to the landmark model.
    pub landmark_input_size: u32,
    pub multi_face: MultiFacePolicy,
    pub background_points: bool,
    pub resize_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            detector_model: MODEL_PREFIX.join("face_detection_yunet_2023mar.onnx"),
            landmark_model: MODEL_PREFIX.join("face_landmarks_68.onnx"),
            score_threshold: 0.6,
            nms_threshold: 0.3,
            landmark_input_size: 112,
            multi_face: MultiFacePolicy::Largest,
            background_points: true,
            resize_filter: "triangle".to_string(),
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
