use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VisionError>;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("onnx runtime: {0}")]
    Ort(#[from] ort::Error),

    #[error("tensor shape: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("image: {0}")]
    Image(#[from] image::ImageError),

    /// The model produced tensors that do not fit the expected layout.
    #[error("unexpected model output: {0}")]
    UnexpectedOutput(String),
}
