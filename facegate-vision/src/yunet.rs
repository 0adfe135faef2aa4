//! YuNet post-processing.
//!
//! YuNet is anchor-free: every grid cell of each stride (8, 16, 32) predicts
//! one candidate. The network emits twelve tensors in this order:
//!
//! `cls_8, cls_16, cls_32, obj_8, obj_16, obj_32, bbox_8, bbox_16, bbox_32, kps_8, kps_16, kps_32`
//!
//! with shapes `[1, H*W, 1]` for cls/obj, `[1, H*W, 4]` for bbox deltas and
//! `[1, H*W, 10]` for the five landmark deltas. A cell at row `i`, column `j`
//! decodes to
//!
//! ```text
//! cx = (j + dx) * stride      cy = (i + dy) * stride
//! w  = dw * stride            h  = dh * stride
//! ```
//!
//! and everything is returned normalized to the square input size.

use ndarray::Array2;

use crate::error::{Result, VisionError};

pub const STRIDES: [usize; 3] = [8, 16, 32];

/// Candidate in normalized `[0, 1]` coordinates of the square model input.
#[derive(Debug, Clone)]
pub struct RawDetection {
    pub bbox: [f32; 4],
    pub score: f32,
    pub landmarks: [f32; 10],
}

/// Per-stride tensors, one entry per element of [`STRIDES`].
#[derive(Debug, Default)]
pub struct YunetHeads {
    pub scores: Vec<Array2<f32>>,
    pub bboxes: Vec<Array2<f32>>,
    pub landmarks: Vec<Array2<f32>>,
}

fn grid_cells(input_size: usize, stride: usize) -> usize {
    let side = input_size / stride;
    side * side
}

/// Reads the head at `index` and checks it is `[1, cells, width]`.
fn take_head(
    outputs: &[(&[i64], &[f32])],
    index: usize,
    cells: usize,
    width: usize,
    label: &str,
) -> Result<Array2<f32>> {
    let (shape, data) = outputs.get(index).ok_or_else(|| {
        VisionError::UnexpectedOutput(format!("missing {label} output at index {index}"))
    })?;

    let expected = [1, cells as i64, width as i64];
    if *shape != expected {
        return Err(VisionError::UnexpectedOutput(format!(
            "{label} output {index} has shape {shape:?}, expected {expected:?}"
        )));
    }

    Ok(Array2::from_shape_vec((cells, width), data.to_vec())?)
}

/// Splits the twelve raw outputs into per-stride heads. Scores are the
/// product of the classification and objectness heads.
pub fn parse_outputs(outputs: &[(&[i64], &[f32])], input_size: usize) -> Result<YunetHeads> {
    let mut heads = YunetHeads::default();
    let n = STRIDES.len();

    for (level, &stride) in STRIDES.iter().enumerate() {
        let cells = grid_cells(input_size, stride);

        let cls = take_head(outputs, level, cells, 1, "cls")?;
        let obj = take_head(outputs, level + n, cells, 1, "obj")?;
        heads.scores.push(cls * obj);
        heads
            .bboxes
            .push(take_head(outputs, level + 2 * n, cells, 4, "bbox")?);
        heads
            .landmarks
            .push(take_head(outputs, level + 3 * n, cells, 10, "kps")?);
    }

    Ok(heads)
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

pub fn apply_sigmoid(heads: &mut YunetHeads) {
    for scores in &mut heads.scores {
        scores.mapv_inplace(sigmoid);
    }
}

/// Turns grid predictions into candidates scoring at least `score_threshold`.
pub fn decode(
    heads: &YunetHeads,
    score_threshold: f32,
    input_size: usize,
) -> Result<Vec<RawDetection>> {
    if heads.scores.len() != STRIDES.len()
        || heads.bboxes.len() != STRIDES.len()
        || heads.landmarks.len() != STRIDES.len()
    {
        return Err(VisionError::UnexpectedOutput(format!(
            "expected {} levels per head",
            STRIDES.len()
        )));
    }

    let size = input_size as f32;
    let mut detections = Vec::new();

    for (level, &stride) in STRIDES.iter().enumerate() {
        let scores = &heads.scores[level];
        let bboxes = &heads.bboxes[level];
        let kps = &heads.landmarks[level];

        let side = input_size / stride;
        if scores.nrows() != side * side {
            return Err(VisionError::UnexpectedOutput(format!(
                "stride {stride} expects a {side}x{side} grid, got {} cells",
                scores.nrows()
            )));
        }

        let step = stride as f32;
        for row in 0..side {
            for col in 0..side {
                let idx = row * side + col;
                let score = scores[[idx, 0]];
                if score < score_threshold {
                    continue;
                }

                let cx = (col as f32 + bboxes[[idx, 0]]) * step / size;
                let cy = (row as f32 + bboxes[[idx, 1]]) * step / size;
                let w = bboxes[[idx, 2]] * step / size;
                let h = bboxes[[idx, 3]] * step / size;

                let mut landmarks = [0.0f32; 10];
                for point in 0..5 {
                    landmarks[point * 2] = (col as f32 + kps[[idx, point * 2]]) * step / size;
                    landmarks[point * 2 + 1] =
                        (row as f32 + kps[[idx, point * 2 + 1]]) * step / size;
                }

                detections.push(RawDetection {
                    bbox: [cx - w / 2.0, cy - h / 2.0, w, h],
                    score,
                    landmarks,
                });
            }
        }
    }

    Ok(detections)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_heads(input_size: usize) -> YunetHeads {
        let mut heads = YunetHeads::default();
        for &stride in &STRIDES {
            let cells = grid_cells(input_size, stride);
            heads.scores.push(Array2::zeros((cells, 1)));
            heads.bboxes.push(Array2::zeros((cells, 4)));
            heads.landmarks.push(Array2::zeros((cells, 10)));
        }
        heads
    }

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
    }

    #[test]
    fn test_decode_single_cell() {
        let input_size = 640;
        let mut heads = empty_heads(input_size);

        // stride 32, cell (10, 10)
        let idx = 10 * 20 + 10;
        heads.scores[2][[idx, 0]] = 0.9;
        heads.bboxes[2][[idx, 0]] = 0.5;
        heads.bboxes[2][[idx, 1]] = 0.3;
        heads.bboxes[2][[idx, 2]] = 4.0;
        heads.bboxes[2][[idx, 3]] = 4.0;

        let detections = decode(&heads, 0.5, input_size).unwrap();
        assert_eq!(detections.len(), 1);
        let det = &detections[0];

        // cx = 10.5 * 32 / 640 = 0.525, cy = 10.3 * 32 / 640 = 0.515, w = h = 0.2
        assert!((det.bbox[0] - 0.425).abs() < 1e-5);
        assert!((det.bbox[1] - 0.415).abs() < 1e-5);
        assert!((det.bbox[2] - 0.2).abs() < 1e-5);
        assert!((det.bbox[3] - 0.2).abs() < 1e-5);
        assert!((det.score - 0.9).abs() < 1e-5);
        assert!((det.landmarks[0] - 0.5).abs() < 1e-5);
        assert!((det.landmarks[1] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_decode_rejects_wrong_grid() {
        let mut heads = empty_heads(640);
        heads.scores[0] = Array2::zeros((10, 1));
        assert!(decode(&heads, 0.5, 640).is_err());
    }

    #[test]
    fn test_parse_outputs_combines_cls_and_obj() {
        let input_size = 64;
        let shapes: Vec<Vec<i64>> = [1usize, 1, 1, 1, 1, 1, 4, 4, 4, 10, 10, 10]
            .iter()
            .enumerate()
            .map(|(i, &w)| vec![1, grid_cells(input_size, STRIDES[i % 3]) as i64, w as i64])
            .collect();
        let data: Vec<Vec<f32>> = shapes
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let fill = match i {
                    0..=2 => 0.5,
                    3..=5 => 0.4,
                    _ => 0.0,
                };
                vec![fill; (s[1] * s[2]) as usize]
            })
            .collect();
        let outputs: Vec<(&[i64], &[f32])> = shapes
            .iter()
            .zip(&data)
            .map(|(s, d)| (s.as_slice(), d.as_slice()))
            .collect();

        let heads = parse_outputs(&outputs, input_size).unwrap();
        assert_eq!(heads.scores.len(), 3);
        assert_eq!(heads.scores[0].nrows(), 64);
        assert!((heads.scores[1][[0, 0]] - 0.2).abs() < 1e-6);

        assert!(parse_outputs(&outputs[..11], input_size).is_err());
    }
}
