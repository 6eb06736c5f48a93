use std::path::Path;

use anyhow::{Context, Result};
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use log::debug;
use ort::{session::Session, value::Value};

use crate::landmarks::{FaceDetector, FaceRegion};
use crate::model::{self, ChannelOrder};
use crate::yunet;

/// YuNet expects a fixed `[1, 3, 640, 640]` BGR input.
pub const YUNET_INPUT_SIZE: u32 = 640;

/// Face detector backed by a YuNet ONNX session.
pub struct YunetDetector {
    session: Session,
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

/// Placement of the source image on the square network canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub offset_x: u32,
    pub offset_y: u32,
    pub width: u32,
    pub height: u32,
}

impl Letterbox {
    pub fn fit(width: u32, height: u32, target: u32) -> Self {
        let scale = target as f32 / width.max(height).max(1) as f32;
        let new_width = ((width as f32 * scale) as u32).clamp(1, target);
        let new_height = ((height as f32 * scale) as u32).clamp(1, target);
        Self {
            scale,
            offset_x: (target - new_width) / 2,
            offset_y: (target - new_height) / 2,
            width: new_width,
            height: new_height,
        }
    }

    /// Map a canvas box back to source image pixels.
    pub fn unmap(&self, bbox: [f32; 4]) -> [f32; 4] {
        [
            (bbox[0] - self.offset_x as f32) / self.scale,
            (bbox[1] - self.offset_y as f32) / self.scale,
            bbox[2] / self.scale,
            bbox[3] / self.scale,
        ]
    }
}

impl YunetDetector {
    pub fn new(model_path: &Path, score_threshold: f32, nms_threshold: f32) -> Result<Self> {
        Ok(Self {
            session: model::load_session(model_path).context("load detector model")?,
            score_threshold,
            nms_threshold,
        })
    }
}

impl FaceDetector for YunetDetector {
    fn detect(&mut self, img: &DynamicImage) -> Result<Vec<FaceRegion>> {
        let target = YUNET_INPUT_SIZE;
        let (orig_width, orig_height) = img.dimensions();
        let letterbox = Letterbox::fit(orig_width, orig_height, target);

        // Pad to square to avoid distortion
        let resized = img.resize_exact(letterbox.width, letterbox.height, FilterType::Triangle);
        let mut canvas = DynamicImage::new_rgb8(target, target);
        image::imageops::overlay(
            &mut canvas,
            &resized,
            letterbox.offset_x as i64,
            letterbox.offset_y as i64,
        );

        let input = model::planar_tensor(&canvas.to_rgb8(), ChannelOrder::Bgr, 1.0)?;
        let input_tensor = Value::from_array(input)?;
        let outputs = self.session.run(ort::inputs![input_tensor])?;

        let mut output_data: Vec<(Vec<i64>, Vec<f32>)> = Vec::new();
        for (_name, output) in outputs.iter() {
            let (shape, data) = output.try_extract_tensor::<f32>()?;
            output_data.push((shape.iter().copied().collect(), data.to_vec()));
        }

        let raw = yunet::decode(&output_data, target as usize, self.score_threshold)?;
        let kept = if self.nms_threshold < 1.0 {
            yunet::nms(raw, self.nms_threshold)
        } else {
            raw
        };
        debug!(
            "YuNet: {} face(s) in {}x{} image",
            kept.len(),
            orig_width,
            orig_height
        );

        // boxes in the letterbox padding map outside the source image
        Ok(kept
            .into_iter()
            .filter_map(|d| {
                let [x, y, width, height] = letterbox.unmap(d.bbox);
                FaceRegion {
                    x,
                    y,
                    width,
                    height,
                    score: d.score,
                }
                .clip(orig_width, orig_height)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letterbox_landscape() {
        let lb = Letterbox::fit(1280, 720, 640);
        assert_eq!(lb.scale, 0.5);
        assert_eq!((lb.width, lb.height), (640, 360));
        assert_eq!((lb.offset_x, lb.offset_y), (0, 140));

        let back = lb.unmap([100.0, 240.0, 50.0, 60.0]);
        assert_eq!(back, [200.0, 200.0, 100.0, 120.0]);
    }

    #[test]
    fn test_letterbox_portrait_upscale() {
        let lb = Letterbox::fit(160, 320, 640);
        assert_eq!(lb.scale, 2.0);
        assert_eq!((lb.width, lb.height), (320, 640));
        assert_eq!((lb.offset_x, lb.offset_y), (160, 0));
    }
}
