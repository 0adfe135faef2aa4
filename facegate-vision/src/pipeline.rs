use std::fmt;
use std::str::FromStr;

use image::{DynamicImage, GenericImageView};
use ort::session::Session;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::face::{self, Detection, Embedding, ALIGNED_SIZE, DETECTOR_INPUT};
use crate::model::{self, ModelPaths};

pub const SCORE_THRESHOLD: f32 = 0.6;
pub const NMS_THRESHOLD: f32 = 0.3;

/// Tile side as a percentage of the image side in [`DetectionModel::Accurate`].
/// Anything above 50 overlaps neighbouring tiles.
const TILE_PERCENT: u32 = 60;

/// Detector strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionModel {
    /// One letterboxed pass over the whole image.
    #[default]
    Fast,
    /// Whole image plus a 2x2 grid of overlapping tiles, merged with NMS.
    /// Finds small faces in large photos at roughly five times the cost.
    Accurate,
}

impl fmt::Display for DetectionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionModel::Fast => f.write_str("fast"),
            DetectionModel::Accurate => f.write_str("accurate"),
        }
    }
}

impl FromStr for DetectionModel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(DetectionModel::Fast),
            "accurate" => Ok(DetectionModel::Accurate),
            other => Err(format!(
                "unknown detection model '{other}', expected 'fast' or 'accurate'"
            )),
        }
    }
}

/// Face detection and embedding, as consumed by enrollment and recognition.
pub trait FaceEngine {
    fn detect_faces(&mut self, img: &DynamicImage, model: DetectionModel)
        -> Result<Vec<Detection>>;

    /// One embedding per entry of `faces`, in the same order.
    fn compute_embeddings(
        &mut self,
        img: &DynamicImage,
        faces: &[Detection],
    ) -> Result<Vec<Embedding>>;
}

/// ONNX pipeline: YuNet detect, align, SFace encode.
pub struct Pipeline {
    detector: Session,
    encoder: Session,
}

impl Pipeline {
    pub fn load(paths: &ModelPaths) -> Result<Self> {
        Ok(Self {
            detector: model::detector_session(paths)?,
            encoder: model::recognizer_session(paths)?,
        })
    }

    fn detect_tiled(&mut self, img: &DynamicImage) -> Result<Vec<Detection>> {
        let mut all = face::detect_faces(&mut self.detector, img, SCORE_THRESHOLD, 1.0)?;

        let (width, height) = img.dimensions();
        for (x, y, w, h) in tile_regions(width, height) {
            let tile = img.crop_imm(x, y, w, h);
            let found = face::detect_faces(&mut self.detector, &tile, SCORE_THRESHOLD, 1.0)?;
            log::debug!("tile {x},{y} {w}x{h}: {} candidates", found.len());
            all.extend(
                found
                    .into_iter()
                    .map(|d| d.translate(x as f32, y as f32)),
            );
        }

        Ok(face::nms(&all, NMS_THRESHOLD))
    }
}

impl FaceEngine for Pipeline {
    fn detect_faces(
        &mut self,
        img: &DynamicImage,
        model: DetectionModel,
    ) -> Result<Vec<Detection>> {
        match model {
            DetectionModel::Fast => {
                face::detect_faces(&mut self.detector, img, SCORE_THRESHOLD, NMS_THRESHOLD)
            }
            DetectionModel::Accurate => self.detect_tiled(img),
        }
    }

    fn compute_embeddings(
        &mut self,
        img: &DynamicImage,
        faces: &[Detection],
    ) -> Result<Vec<Embedding>> {
        faces
            .iter()
            .map(|detection| {
                let aligned = face::align_face(img, detection, ALIGNED_SIZE)?;
                face::encode_face(&mut self.encoder, &aligned)
            })
            .collect()
    }
}

/// Overlapping 2x2 tiles as `(x, y, w, h)`. Images that already fit the
/// detector input are not tiled.
pub fn tile_regions(width: u32, height: u32) -> Vec<(u32, u32, u32, u32)> {
    if width.max(height) <= DETECTOR_INPUT {
        return Vec::new();
    }

    let tile_w = (width * TILE_PERCENT).div_ceil(100).min(width);
    let tile_h = (height * TILE_PERCENT).div_ceil(100).min(height);

    let mut tiles = Vec::with_capacity(4);
    for y in [0, height - tile_h] {
        for x in [0, width - tile_w] {
            tiles.push((x, y, tile_w, tile_h));
        }
    }
    tiles
}
