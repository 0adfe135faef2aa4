use anyhow::Result;
use facegate_vision::{
    compare_faces, DetectionModel, FaceEngine, ModelPaths, Pipeline, MATCH_THRESHOLD,
};
use image::DynamicImage;
use std::path::Path;

fn models() -> Option<ModelPaths> {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("..");
    let paths = ModelPaths {
        detector: root.join(facegate_vision::model::DEFAULT_DETECTOR_MODEL),
        recognizer: root.join(facegate_vision::model::DEFAULT_RECOGNIZER_MODEL),
    };
    if paths.available() {
        Some(paths)
    } else {
        eprintln!("Skipping: ONNX models not found under {}", root.display());
        None
    }
}

#[test]
fn test_blank_image_has_no_faces() -> Result<()> {
    env_logger::try_init().ok();
    let Some(paths) = models() else {
        return Ok(());
    };
    let mut pipeline = Pipeline::load(&paths)?;

    let blank = DynamicImage::new_rgb8(320, 240);
    for model in [DetectionModel::Fast, DetectionModel::Accurate] {
        let faces = pipeline.detect_faces(&blank, model)?;
        assert!(faces.is_empty(), "{model}: found {} faces", faces.len());
    }
    println!("✓ No faces on a blank frame");
    Ok(())
}

#[test]
fn test_same_photo_matches_itself() -> Result<()> {
    env_logger::try_init().ok();
    let Some(paths) = models() else {
        return Ok(());
    };
    let mut pipeline = Pipeline::load(&paths)?;

    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("test_faces");
    if !dir.is_dir() {
        eprintln!("Skipping: no fixture photos in {}", dir.display());
        return Ok(());
    }

    for entry in std::fs::read_dir(&dir)? {
        let path = entry?.path();
        let Ok(img) = image::open(&path) else {
            continue;
        };
        let faces = pipeline.detect_faces(&img, DetectionModel::Fast)?;
        if faces.is_empty() {
            eprintln!("Skipping {}: no face", path.display());
            continue;
        }
        let embeddings = pipeline.compute_embeddings(&img, &faces)?;
        assert_eq!(embeddings.len(), faces.len());

        let norm: f32 = embeddings[0].vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
        assert_eq!(
            compare_faces(&embeddings[..1], &embeddings[0], MATCH_THRESHOLD),
            vec![true]
        );
        println!("✓ {} matches itself", path.display());
    }
    Ok(())
}
