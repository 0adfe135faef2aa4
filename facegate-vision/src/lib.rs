pub mod error;
pub mod face;
pub mod model;
pub mod pipeline;
pub mod yunet;

pub use error::VisionError;
pub use face::{compare_faces, Detection, Embedding, MATCH_THRESHOLD};
pub use model::ModelPaths;
pub use pipeline::{DetectionModel, FaceEngine, Pipeline};
