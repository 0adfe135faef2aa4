#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use facegate::{Detection, DetectionModel, Embedding, FaceEngine};
use facegate_vision::error::Result as VisionResult;
use image::{DynamicImage, GenericImageView, ImageFormat, RgbImage};

/// Fake engine keyed on image dimensions: every photo of a given size has
/// the same scripted faces.
#[derive(Default)]
pub struct ScriptedEngine {
    faces: HashMap<(u32, u32), Vec<(Detection, Embedding)>>,
    crash_on: Option<(u32, u32)>,
}

impl ScriptedEngine {
    pub fn with_face(mut self, size: (u32, u32), bbox: [f32; 4], vector: &[f32]) -> Self {
        self.faces.entry(size).or_default().push((
            Detection {
                bbox,
                score: 0.9,
                landmarks: [0.0; 10],
            },
            Embedding::normalized(vector.to_vec()),
        ));
        self
    }

    /// Panics when asked to detect faces in an image of `size`.
    pub fn crashing_on(mut self, size: (u32, u32)) -> Self {
        self.crash_on = Some(size);
        self
    }
}

impl FaceEngine for ScriptedEngine {
    fn detect_faces(
        &mut self,
        img: &DynamicImage,
        _model: DetectionModel,
    ) -> VisionResult<Vec<Detection>> {
        if self.crash_on == Some(img.dimensions()) {
            panic!("scripted engine crash");
        }
        Ok(self
            .faces
            .get(&img.dimensions())
            .map(|faces| faces.iter().map(|(d, _)| d.clone()).collect())
            .unwrap_or_default())
    }

    fn compute_embeddings(
        &mut self,
        img: &DynamicImage,
        faces: &[Detection],
    ) -> VisionResult<Vec<Embedding>> {
        let scripted = self.faces.get(&img.dimensions());
        Ok(faces
            .iter()
            .filter_map(|face| {
                scripted?
                    .iter()
                    .find(|(d, _)| d == face)
                    .map(|(_, e)| e.clone())
            })
            .collect())
    }
}

// Sizes double as identities for the scripted engine.
pub const ALICE: (u32, u32) = (40, 30);
pub const BOB: (u32, u32) = (44, 30);
pub const NOBODY: (u32, u32) = (48, 30);
pub const STRANGER: (u32, u32) = (52, 30);
pub const GROUP: (u32, u32) = (56, 30);
pub const CRASH: (u32, u32) = (60, 30);

pub const ALICE_VEC: [f32; 4] = [1.0, 0.0, 0.0, 0.0];
pub const BOB_VEC: [f32; 4] = [0.0, 1.0, 0.0, 0.0];
pub const STRANGER_VEC: [f32; 4] = [0.0, 0.0, 1.0, 0.0];

/// Alice and Bob have one face each, NOBODY has none, STRANGER is unknown,
/// GROUP shows a small Bob and a large Alice.
pub fn engine() -> ScriptedEngine {
    ScriptedEngine::default()
        .with_face(ALICE, [5.0, 5.0, 20.0, 20.0], &ALICE_VEC)
        .with_face(BOB, [5.0, 5.0, 20.0, 20.0], &BOB_VEC)
        .with_face(STRANGER, [5.0, 5.0, 20.0, 20.0], &STRANGER_VEC)
        .with_face(GROUP, [0.0, 0.0, 8.0, 8.0], &[0.05, 1.0, 0.0, 0.0])
        .with_face(GROUP, [20.0, 2.0, 25.0, 25.0], &[1.0, 0.05, 0.0, 0.0])
}

pub fn blank(size: (u32, u32)) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::new(size.0, size.1))
}

pub fn write_png(path: &Path, size: (u32, u32)) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    blank(size).save_with_format(path, ImageFormat::Png).unwrap();
}

pub fn png_base64(size: (u32, u32)) -> String {
    let mut buf = Vec::new();
    blank(size)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    STANDARD.encode(buf)
}

/// Scratch directory removed on drop.
pub struct TempDir(PathBuf);

impl TempDir {
    pub fn new() -> Self {
        let path = std::env::temp_dir().join(format!("facegate-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&path).unwrap();
        Self(path)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}
