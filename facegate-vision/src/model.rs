use std::path::{Path, PathBuf};

use ort::{
    ep::{self, ExecutionProvider},
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session,
    },
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VisionError};

pub const DEFAULT_DETECTOR_MODEL: &str = "models/face_detection_yunet_2023mar.onnx";
pub const DEFAULT_RECOGNIZER_MODEL: &str = "models/face_recognition_sface_2021dec.onnx";

/// Locations of the ONNX files on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPaths {
    pub detector: PathBuf,
    pub recognizer: PathBuf,
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            detector: PathBuf::from(DEFAULT_DETECTOR_MODEL),
            recognizer: PathBuf::from(DEFAULT_RECOGNIZER_MODEL),
        }
    }
}

impl ModelPaths {
    /// Both model files exist.
    pub fn available(&self) -> bool {
        self.detector.is_file() && self.recognizer.is_file()
    }
}

pub fn session_builder() -> Result<SessionBuilder> {
    #[allow(unused_mut)]
    let mut builder =
        Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;

    #[cfg(feature = "openvino")]
    {
        let ep = ep::OpenVINO::default();
        if ep.is_available()? {
            ep.register(&mut builder).map_err(ort::Error::from)?;
        } else {
            log::warn!("openvino feature is enabled, onnx runtime not compiled with openvino")
        }
    }

    #[cfg(feature = "cuda")]
    {
        let ep = ep::CUDA::default();
        if ep.is_available()? {
            ep.register(&mut builder).map_err(ort::Error::from)?;
        } else {
            log::warn!("cuda feature is enabled, onnx runtime not compiled with cuda")
        }
    }

    Ok(builder)
}

fn load_session(path: &Path, what: &str) -> Result<Session> {
    if !path.is_file() {
        return Err(VisionError::ModelNotFound(path.to_path_buf()));
    }
    log::debug!("loading {what} model from {}", path.display());
    Ok(session_builder()?.commit_from_file(path)?)
}

pub fn detector_session(paths: &ModelPaths) -> Result<Session> {
    load_session(&paths.detector, "detector")
}

pub fn recognizer_session(paths: &ModelPaths) -> Result<Session> {
    load_session(&paths.recognizer, "recognizer")
}
