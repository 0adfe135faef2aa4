use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use facegate_vision::{Detection, DetectionModel, FaceEngine};
use image::DynamicImage;
use log::{debug, info};

use crate::error::{Error, Result};
use crate::matcher;
use crate::storage::EncodingSource;

/// Label returned by the file-path entry point when no enrolled face matches.
pub const UNKNOWN: &str = "Unknown";

/// Label returned by the base64 entry point when no enrolled face matches.
pub const NOT_RECOGNIZED: &str = "not recognized";

pub fn load_image_file(path: &Path) -> Result<DynamicImage> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    Ok(image::load_from_memory(&bytes)?)
}

/// Decodes a base64 image, ignoring line breaks and other ASCII whitespace.
pub fn decode_base64_image(payload: &str) -> Result<DynamicImage> {
    let compact: Vec<u8> = payload
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD.decode(compact)?;
    Ok(image::load_from_memory(&bytes)?)
}

/// The face a photo is about: the largest box, then the higher score, then
/// the earlier detection.
pub fn subject_face(faces: &[Detection]) -> Option<&Detection> {
    faces.iter().reduce(|best, face| {
        let by_area = face.area().total_cmp(&best.area());
        match by_area.then(face.score.total_cmp(&best.score)) {
            Ordering::Greater => face,
            _ => best,
        }
    })
}

/// Output of a validation pass, one per file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationEntry {
    pub path: PathBuf,
    pub label: String,
}

/// Runs probe images through detection and the identity matcher.
#[derive(Debug)]
pub struct Recognizer {
    encodings: EncodingSource,
    model: DetectionModel,
}

impl Recognizer {
    pub fn new(encodings: EncodingSource, model: DetectionModel) -> Self {
        Self { encodings, model }
    }

    pub fn encodings(&self) -> &EncodingSource {
        &self.encodings
    }

    /// Identity of the subject face in `img`, or `None` when there is no face
    /// or it matches nobody.
    pub fn identify(
        &self,
        engine: &mut dyn FaceEngine,
        img: &DynamicImage,
    ) -> Result<Option<String>> {
        let db = self.encodings.load()?;

        let faces = engine.detect_faces(img, self.model)?;
        let Some(subject) = subject_face(&faces) else {
            debug!("no face detected");
            return Ok(None);
        };
        if faces.len() > 1 {
            debug!(
                "{} faces detected, matching the largest (area {:.0})",
                faces.len(),
                subject.area()
            );
        }

        let embeddings = engine.compute_embeddings(img, std::slice::from_ref(subject))?;
        Ok(embeddings
            .first()
            .and_then(|probe| matcher::identify(&db, probe))
            .map(str::to_string))
    }

    pub fn recognize_path(&self, engine: &mut dyn FaceEngine, path: &Path) -> Result<String> {
        let img = load_image_file(path)?;
        let label = self
            .identify(engine, &img)?
            .unwrap_or_else(|| UNKNOWN.to_string());
        debug!("{} -> {label}", path.display());
        Ok(label)
    }

    pub fn recognize_base64(&self, engine: &mut dyn FaceEngine, payload: &str) -> Result<String> {
        let img = decode_base64_image(payload)?;
        let label = self
            .identify(engine, &img)?
            .unwrap_or_else(|| NOT_RECOGNIZED.to_string());
        info!("Query resolved to {label}");
        Ok(label)
    }

    /// Recognizes every file below `dir`. A missing directory yields nothing.
    pub fn validate(
        &self,
        engine: &mut dyn FaceEngine,
        dir: &Path,
    ) -> Result<Vec<ValidationEntry>> {
        let mut files = Vec::new();
        if dir.is_dir() {
            collect_files(dir, &mut files)?;
        }
        files.sort();

        let mut results = Vec::with_capacity(files.len());
        for path in files {
            let label = self.recognize_path(engine, &path)?;
            info!("{} -> {label}", path.display());
            results.push(ValidationEntry { path, label });
        }
        Ok(results)
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| Error::io(&path, e))?;
        if file_type.is_dir() {
            collect_files(&path, out)?;
        } else if file_type.is_file() {
            out.push(path);
        }
    }
    Ok(())
}
