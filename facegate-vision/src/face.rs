use image::{imageops::FilterType, DynamicImage, GenericImageView, RgbImage};
use ndarray::Array4;
use ort::{session::Session, value::Value};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VisionError};
use crate::yunet;

/// YuNet is exported with a fixed `[1, 3, 640, 640]` input.
pub const DETECTOR_INPUT: u32 = 640;

/// SFace input side.
pub const ALIGNED_SIZE: u32 = 112;

/// Cosine similarity at or above which two SFace embeddings are the same person.
pub const MATCH_THRESHOLD: f32 = 0.363;

/// Face found by the detector, in source image pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub landmarks: [f32; 10], // x1,y1,...,x5,y5: eyes, nose, mouth corners
}

impl Detection {
    pub fn area(&self) -> f32 {
        self.bbox[2].max(0.0) * self.bbox[3].max(0.0)
    }

    /// Shifts the box and landmarks by `(dx, dy)`.
    pub fn translate(mut self, dx: f32, dy: f32) -> Self {
        self.bbox[0] += dx;
        self.bbox[1] += dy;
        for point in self.landmarks.chunks_exact_mut(2) {
            point[0] += dx;
            point[1] += dy;
        }
        self
    }
}

/// L2-normalized SFace embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub vector: Vec<f32>,
}

impl Embedding {
    /// Normalizes `vector` to unit length. A zero vector is kept as is.
    pub fn normalized(mut vector: Vec<f32>) -> Self {
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Self { vector }
    }

    pub fn len(&self) -> usize {
        self.vector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vector.is_empty()
    }
}

/// How a square model input maps back onto the source image.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    offset_x: f32,
    offset_y: f32,
}

impl Letterbox {
    fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.offset_x) / self.scale, (y - self.offset_y) / self.scale)
    }
}

/// Resizes `img` into a black `side x side` square, keeping its aspect ratio.
fn letterbox(img: &DynamicImage, side: u32) -> (RgbImage, Letterbox) {
    let (width, height) = img.dimensions();
    let scale = side as f32 / width.max(height) as f32;
    let new_width = ((width as f32 * scale) as u32).clamp(1, side);
    let new_height = ((height as f32 * scale) as u32).clamp(1, side);

    let resized = img
        .resize_exact(new_width, new_height, FilterType::Triangle)
        .to_rgb8();
    let offset_x = (side - new_width) / 2;
    let offset_y = (side - new_height) / 2;

    let mut canvas = RgbImage::new(side, side);
    image::imageops::overlay(&mut canvas, &resized, offset_x as i64, offset_y as i64);

    (
        canvas,
        Letterbox {
            scale,
            offset_x: offset_x as f32,
            offset_y: offset_y as f32,
        },
    )
}

/// Packs an RGB image into a `[1, 3, H, W]` BGR tensor with values in `[0, 255]`.
fn bgr_tensor(rgb: &RgbImage) -> Result<Array4<f32>> {
    let (width, height) = rgb.dimensions();
    let plane = (width * height) as usize;
    let mut data = vec![0.0f32; 3 * plane];

    let (b, rest) = data.split_at_mut(plane);
    let (g, r) = rest.split_at_mut(plane);
    for (i, px) in rgb.pixels().enumerate() {
        r[i] = px[0] as f32;
        g[i] = px[1] as f32;
        b[i] = px[2] as f32;
    }

    Ok(Array4::from_shape_vec(
        (1, 3, height as usize, width as usize),
        data,
    )?)
}

/// Runs YuNet on `img` and returns faces in source coordinates.
///
/// `nms_threshold >= 1.0` disables suppression.
pub fn detect_faces(
    session: &mut Session,
    img: &DynamicImage,
    score_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<Detection>> {
    let side = DETECTOR_INPUT;
    let (canvas, lb) = letterbox(img, side);

    let input = Value::from_array(bgr_tensor(&canvas)?)?;
    let outputs = session.run(ort::inputs![input])?;

    let mut raw = Vec::new();
    for (_name, output) in outputs.iter() {
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        raw.push((shape.iter().copied().collect::<Vec<i64>>(), data.to_vec()));
    }
    let views: Vec<(&[i64], &[f32])> = raw
        .iter()
        .map(|(s, d)| (s.as_slice(), d.as_slice()))
        .collect();

    let mut heads = yunet::parse_outputs(&views, side as usize)?;
    yunet::apply_sigmoid(&mut heads);
    let candidates = yunet::decode(&heads, score_threshold, side as usize)?;

    let px = side as f32;
    let detections: Vec<Detection> = candidates
        .into_iter()
        .map(|c| {
            let (x, y) = lb.to_source(c.bbox[0] * px, c.bbox[1] * px);
            let mut landmarks = [0.0f32; 10];
            for (dst, src) in landmarks
                .chunks_exact_mut(2)
                .zip(c.landmarks.chunks_exact(2))
            {
                let (lx, ly) = lb.to_source(src[0] * px, src[1] * px);
                dst[0] = lx;
                dst[1] = ly;
            }
            Detection {
                bbox: [x, y, c.bbox[2] * px / lb.scale, c.bbox[3] * px / lb.scale],
                score: c.score,
                landmarks,
            }
        })
        .collect();

    if nms_threshold < 1.0 {
        Ok(nms(&detections, nms_threshold))
    } else {
        Ok(detections)
    }
}

/// Greedy non-maximum suppression, highest score first.
pub fn nms(detections: &[Detection], iou_threshold: f32) -> Vec<Detection> {
    let mut sorted = detections.to_vec();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::new();
    for candidate in sorted {
        if keep
            .iter()
            .all(|kept| compute_iou(&kept.bbox, &candidate.bbox) <= iou_threshold)
        {
            keep.push(candidate);
        }
    }
    keep
}

fn compute_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = (a[0] + a[2]).min(b[0] + b[2]);
    let y2 = (a[1] + a[3]).min(b[1] + b[3]);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let inter = (x2 - x1) * (y2 - y1);
    inter / (a[2] * a[3] + b[2] * b[3] - inter)
}

fn sample_bilinear(img: &DynamicImage, x: f32, y: f32) -> Option<image::Rgb<u8>> {
    let (w, h) = img.dimensions();
    if x < 0.0 || y < 0.0 || x >= w as f32 || y >= h as f32 {
        return None;
    }

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let weights = [
        ((x0, y0), (1.0 - fx) * (1.0 - fy)),
        ((x1, y0), fx * (1.0 - fy)),
        ((x0, y1), (1.0 - fx) * fy),
        ((x1, y1), fx * fy),
    ];

    let mut acc = [0.0f32; 3];
    for ((px, py), weight) in weights {
        let p = img.get_pixel(px, py);
        for c in 0..3 {
            acc[c] += p[c] as f32 * weight;
        }
    }
    Some(image::Rgb(acc.map(|v| v.clamp(0.0, 255.0) as u8)))
}

/// Rotates and scales the face so the eyes land on the ArcFace reference
/// positions of a `size x size` crop.
pub fn align_face(img: &DynamicImage, detection: &Detection, size: u32) -> Result<DynamicImage> {
    const REF_LEFT_EYE: (f32, f32) = (38.3, 51.7);
    const REF_RIGHT_EYE: (f32, f32) = (73.5, 51.5);

    let left = (detection.landmarks[0], detection.landmarks[1]);
    let right = (detection.landmarks[2], detection.landmarks[3]);
    let (dx, dy) = (right.0 - left.0, right.1 - left.1);
    let eye_dist = (dx * dx + dy * dy).sqrt();
    if !eye_dist.is_finite() || eye_dist <= f32::EPSILON {
        return Err(VisionError::UnexpectedOutput(
            "degenerate eye landmarks".to_string(),
        ));
    }

    let ratio = size as f32 / ALIGNED_SIZE as f32;
    let ref_dist = ((REF_RIGHT_EYE.0 - REF_LEFT_EYE.0).powi(2)
        + (REF_RIGHT_EYE.1 - REF_LEFT_EYE.1).powi(2))
    .sqrt();
    let scale = ratio * ref_dist / eye_dist;
    let angle = dy.atan2(dx);

    let center = ((left.0 + right.0) / 2.0, (left.1 + right.1) / 2.0);
    let target = (
        (REF_LEFT_EYE.0 + REF_RIGHT_EYE.0) / 2.0 * ratio,
        (REF_LEFT_EYE.1 + REF_RIGHT_EYE.1) / 2.0 * ratio,
    );

    // out = [a b; c d] * in + t
    let (a, b) = (scale * angle.cos(), scale * angle.sin());
    let (c, d) = (-b, a);
    let tx = target.0 - (a * center.0 + b * center.1);
    let ty = target.1 - (c * center.0 + d * center.1);
    let det = a * d - b * c;

    let mut output = RgbImage::new(size, size);
    for (out_x, out_y, pixel) in output.enumerate_pixels_mut() {
        let ox = out_x as f32 - tx;
        let oy = out_y as f32 - ty;
        let in_x = (d * ox - b * oy) / det;
        let in_y = (-c * ox + a * oy) / det;
        if let Some(sampled) = sample_bilinear(img, in_x, in_y) {
            *pixel = sampled;
        }
    }

    Ok(DynamicImage::ImageRgb8(output))
}

/// Runs SFace on an aligned crop.
pub fn encode_face(session: &mut Session, face: &DynamicImage) -> Result<Embedding> {
    let rgb = face
        .resize_exact(ALIGNED_SIZE, ALIGNED_SIZE, FilterType::Triangle)
        .to_rgb8();
    let input = Value::from_array(bgr_tensor(&rgb)?)?;

    let outputs = session.run(ort::inputs![input])?;
    let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;

    // [1, 128]
    let dim = match shape.len() {
        2 => shape[1] as usize,
        _ => data.len(),
    };
    if dim == 0 || dim > data.len() {
        return Err(VisionError::UnexpectedOutput(format!(
            "embedding output shape {:?}",
            shape.iter().collect::<Vec<_>>()
        )));
    }

    Ok(Embedding::normalized(data[..dim].to_vec()))
}

/// Cosine similarity of two normalized embeddings, clamped to `[-1, 1]`.
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> f32 {
    let dot: f32 = a
        .vector
        .iter()
        .zip(&b.vector)
        .map(|(x, y)| x * y)
        .sum();
    dot.clamp(-1.0, 1.0)
}

/// One same-person decision per entry of `known`, in order.
pub fn compare_faces(known: &[Embedding], probe: &Embedding, threshold: f32) -> Vec<bool> {
    known
        .iter()
        .map(|k| k.len() == probe.len() && cosine_similarity(k, probe) >= threshold)
        .collect()
}
