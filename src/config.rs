use anyhow::{Context, Result};
use facegate_vision::{DetectionModel, ModelPaths};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub static CONFIG_PATH: Lazy<&'static Path> =
    Lazy::new(|| Path::new(option_env!("FACEGATE_CONFIG_PATH").unwrap_or("facegate.toml")));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `<training_dir>/<identity>/<image>`
    pub training_dir: PathBuf,
    pub output_dir: PathBuf,
    pub validation_dir: PathBuf,
    pub encodings_path: PathBuf,
    pub detection_model: DetectionModel,
    /// Keep the encoding database in memory between requests, reloading it
    /// when the file's modification time changes.
    pub cache_encodings: bool,
    pub models: ModelPaths,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            training_dir: PathBuf::from("training"),
            output_dir: PathBuf::from("output"),
            validation_dir: PathBuf::from("validation"),
            encodings_path: PathBuf::from("output/encodings.bin"),
            detection_model: DetectionModel::Fast,
            cache_encodings: false,
            models: ModelPaths::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5055,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        log::debug!("no config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data).with_context(|| format!("writing config {}", path.display()))?;
    Ok(())
}
