use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use facegate_vision::{DetectionModel, FaceEngine};
use log::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::recognize::load_image_file;
use crate::storage::{self, EncodingDatabase};

/// Counts from one enrollment run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrollSummary {
    pub identities: usize,
    pub images: usize,
    pub faces: usize,
}

/// Creates the training, output and validation directories if missing.
pub fn ensure_layout(cfg: &Config) -> Result<()> {
    let mut dirs = vec![
        cfg.training_dir.as_path(),
        cfg.output_dir.as_path(),
        cfg.validation_dir.as_path(),
    ];
    if let Some(parent) = cfg.encodings_path.parent() {
        if !parent.as_os_str().is_empty() {
            dirs.push(parent);
        }
    }
    for dir in dirs {
        fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    }
    Ok(())
}

/// Checks that a training folder name is usable as an identity label.
pub fn validate_identity_name(raw: &OsStr) -> Result<String> {
    let name = raw
        .to_str()
        .ok_or_else(|| Error::InvalidIdentity(raw.to_string_lossy().into_owned()))?;

    let bad = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);
    if bad {
        return Err(Error::InvalidIdentity(name.to_string()));
    }
    Ok(name.to_string())
}

fn is_hidden(name: &OsStr) -> bool {
    name.to_str().map_or(false, |s| s.starts_with('.'))
}

/// Directory entries sorted by file name.
fn sorted_entries(dir: &Path) -> Result<Vec<fs::DirEntry>> {
    let mut entries = fs::read_dir(dir)
        .map_err(|e| Error::io(dir, e))?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| Error::io(dir, e))?;
    entries.sort_by_key(|e| e.file_name());
    Ok(entries)
}

/// Encodes every face under `training_dir/<identity>/`.
///
/// Any unreadable directory or image aborts the whole scan.
pub fn build_database(
    engine: &mut dyn FaceEngine,
    training_dir: &Path,
    model: DetectionModel,
) -> Result<(EncodingDatabase, EnrollSummary)> {
    let mut db = EncodingDatabase::new();
    let mut summary = EnrollSummary::default();

    for entry in sorted_entries(training_dir)? {
        let file_name = entry.file_name();
        if is_hidden(&file_name) {
            debug!("skipping hidden entry {}", entry.path().display());
            continue;
        }
        let file_type = entry.file_type().map_err(|e| Error::io(entry.path(), e))?;
        if !file_type.is_dir() {
            warn!(
                "{} is not an identity folder, skipping",
                entry.path().display()
            );
            continue;
        }

        let name = validate_identity_name(&file_name)?;
        let before = db.len();
        for image_path in identity_images(&entry.path())? {
            let img = load_image_file(&image_path)?;
            let faces = engine.detect_faces(&img, model)?;
            let embeddings = engine.compute_embeddings(&img, &faces)?;
            debug!(
                "{}: {} face(s)",
                image_path.display(),
                embeddings.len()
            );

            summary.images += 1;
            summary.faces += embeddings.len();
            for embedding in embeddings {
                db.push(name.as_str(), embedding);
            }
        }

        if db.len() > before {
            summary.identities += 1;
        } else {
            warn!("no faces enrolled for {name}");
        }
    }

    Ok((db, summary))
}

fn identity_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in sorted_entries(dir)? {
        if is_hidden(&entry.file_name()) {
            continue;
        }
        let file_type = entry.file_type().map_err(|e| Error::io(entry.path(), e))?;
        if file_type.is_dir() {
            warn!(
                "{} is a nested folder, skipping",
                entry.path().display()
            );
            continue;
        }
        images.push(entry.path());
    }
    Ok(images)
}

/// Rebuilds the encoding database from the training folder and writes it to
/// `cfg.encodings_path`, replacing the previous one.
pub fn enroll(
    engine: &mut dyn FaceEngine,
    cfg: &Config,
    model: DetectionModel,
) -> Result<EnrollSummary> {
    ensure_layout(cfg)?;

    info!(
        "Encoding faces under {} ({model} detector)",
        cfg.training_dir.display()
    );
    let (db, summary) = build_database(engine, &cfg.training_dir, model)?;
    storage::save_database(&db, &cfg.encodings_path)?;

    info!(
        "✓ Enrolled {} face(s) of {} identit{} from {} image(s) into {}",
        summary.faces,
        summary.identities,
        if summary.identities == 1 { "y" } else { "ies" },
        summary.images,
        cfg.encodings_path.display()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_are_accepted() {
        for name in ["alice", "Bob Smith", "josé", "o'neil", "user.2"] {
            assert_eq!(validate_identity_name(OsStr::new(name)).unwrap(), name);
        }
    }

    #[test]
    fn unsafe_names_are_rejected() {
        for name in ["", "   ", ".", "..", "a/b", "..\\evil", "tab\there", "nul\0"] {
            assert!(
                matches!(
                    validate_identity_name(OsStr::new(name)),
                    Err(Error::InvalidIdentity(_))
                ),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn hidden_entries() {
        assert!(is_hidden(OsStr::new(".DS_Store")));
        assert!(!is_hidden(OsStr::new("alice")));
    }
}
