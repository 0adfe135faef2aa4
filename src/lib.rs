pub mod config;
pub mod enroll;
pub mod error;
pub mod matcher;
pub mod recognize;
pub mod server;
pub mod storage;

pub use error::{Error, Result};
pub use facegate_vision::{
    face, pipeline, Detection, DetectionModel, Embedding, FaceEngine, ModelPaths, Pipeline,
};
