//! YuNet detector post-processing.
//!
//! The network emits twelve tensors, four heads per stride (8, 16, 32):
//! `cls_8, cls_16, cls_32, obj_8, obj_16, obj_32, bbox_8, bbox_16, bbox_32,
//! kps_8, kps_16, kps_32`. Each has shape `[1, G*G, C]` where `G` is the
//! input size divided by the stride.
//!
//! Decoding is anchor-free, per grid cell `(row, col)`:
//! score = sqrt(cls * obj), cx = (col + dx) * stride, cy = (row + dy) * stride,
//! w = exp(dw) * stride, h = exp(dh) * stride.

use anyhow::Result;

pub const STRIDES: [usize; 3] = [8, 16, 32];

/// A face box in network input pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
}

/// Borrowed score and box heads for one stride.
struct Level<'a> {
    stride: usize,
    grid: usize,
    cls: &'a [f32],
    obj: &'a [f32],
    bbox: &'a [f32],
}

fn head<'a>(
    outputs: &'a [(Vec<i64>, Vec<f32>)],
    idx: usize,
    cells: usize,
    channels: usize,
) -> Result<&'a [f32]> {
    let Some((shape, data)) = outputs.get(idx) else {
        anyhow::bail!("Missing YuNet output at index {}", idx);
    };
    let expected = [1, cells as i64, channels as i64];
    if shape.as_slice() != expected || data.len() != cells * channels {
        anyhow::bail!(
            "Unexpected shape at index {}: {:?}, expected {:?}",
            idx,
            shape,
            expected
        );
    }
    Ok(data)
}

fn levels(outputs: &[(Vec<i64>, Vec<f32>)], input_size: usize) -> Result<Vec<Level<'_>>> {
    let mut levels = Vec::with_capacity(STRIDES.len());
    for (i, &stride) in STRIDES.iter().enumerate() {
        let grid = input_size / stride;
        let cells = grid * grid;
        levels.push(Level {
            stride,
            grid,
            cls: head(outputs, i, cells, 1)?,
            obj: head(outputs, i + 3, cells, 1)?,
            bbox: head(outputs, i + 6, cells, 4)?,
        });
    }
    Ok(levels)
}

/// Decode raw YuNet outputs into boxes scoring at least `score_threshold`.
pub fn decode(
    outputs: &[(Vec<i64>, Vec<f32>)],
    input_size: usize,
    score_threshold: f32,
) -> Result<Vec<RawDetection>> {
    let mut detections = Vec::new();

    for level in levels(outputs, input_size)? {
        let stride = level.stride as f32;
        for row in 0..level.grid {
            for col in 0..level.grid {
                let idx = row * level.grid + col;
                let score =
                    (level.cls[idx].clamp(0.0, 1.0) * level.obj[idx].clamp(0.0, 1.0)).sqrt();
                if score < score_threshold {
                    continue;
                }

                let d = &level.bbox[idx * 4..idx * 4 + 4];
                let cx = (col as f32 + d[0]) * stride;
                let cy = (row as f32 + d[1]) * stride;
                let w = d[2].exp() * stride;
                let h = d[3].exp() * stride;

                detections.push(RawDetection {
                    bbox: [cx - w / 2.0, cy - h / 2.0, w, h],
                    score,
                });
            }
        }
    }

    Ok(detections)
}

/// Intersection over union of two `[x, y, w, h]` boxes.
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
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

/// Greedy non-maximum suppression, highest score first.
pub fn nms(mut detections: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<RawDetection> = Vec::new();
    for det in detections {
        if keep.iter().all(|k| iou(&k.bbox, &det.bbox) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}
