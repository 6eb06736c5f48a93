use std::path::Path;

use anyhow::{Context, Result};
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ort::{session::Session, value::Value};

use crate::geometry::Point;
use crate::landmarks::{FaceRegion, LandmarkPredictor, LANDMARK_COUNT};
use crate::model::{self, ChannelOrder};

/// 68-point landmark regressor backed by an ONNX session.
///
/// The model takes a square RGB face crop `[1, 3, S, S]` scaled to `[0, 1]`
/// and returns `2 * 68` values, `x0, y0, x1, y1, ...`, normalized to the crop.
pub struct OnnxLandmarkPredictor {
    session: Session,
    input_size: u32,
}

/// Face crop in source pixels, clamped to the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crop {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Crop {
    pub fn clamped(region: &FaceRegion, image_width: u32, image_height: u32) -> Option<Self> {
        let x0 = region.x.floor().max(0.0) as u32;
        let y0 = region.y.floor().max(0.0) as u32;
        let x1 = ((region.x + region.width).ceil().max(0.0) as u32).min(image_width);
        let y1 = ((region.y + region.height).ceil().max(0.0) as u32).min(image_height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Self {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }

    /// Map normalized crop coordinates to the nearest source pixel.
    pub fn to_pixel(&self, nx: f32, ny: f32) -> Point {
        Point::new(
            (self.x as f32 + nx * self.width as f32).round() as i32,
            (self.y as f32 + ny * self.height as f32).round() as i32,
        )
    }
}

impl OnnxLandmarkPredictor {
    pub fn new(model_path: &Path, input_size: u32) -> Result<Self> {
        if input_size == 0 {
            anyhow::bail!("landmark input size must be > 0");
        }
        Ok(Self {
            session: model::load_session(model_path).context("load landmark model")?,
            input_size,
        })
    }
}

/// Turn a flat `[x0, y0, x1, y1, ...]` output into pixel landmarks.
pub fn decode_landmarks(data: &[f32], crop: &Crop) -> Result<Vec<Point>> {
    if data.len() < LANDMARK_COUNT * 2 {
        anyhow::bail!(
            "Expected {} landmark values, got {}",
            LANDMARK_COUNT * 2,
            data.len()
        );
    }
    Ok(data[..LANDMARK_COUNT * 2]
        .chunks_exact(2)
        .map(|xy| crop.to_pixel(xy[0], xy[1]))
        .collect())
}

impl LandmarkPredictor for OnnxLandmarkPredictor {
    fn predict(&mut self, img: &DynamicImage, region: &FaceRegion) -> Result<Vec<Point>> {
        let (width, height) = img.dimensions();
        let Some(crop) = Crop::clamped(region, width, height) else {
            anyhow::bail!(
                "face region {:?} lies outside the {}x{} image",
                region,
                width,
                height
            );
        };

        let face = img
            .crop_imm(crop.x, crop.y, crop.width, crop.height)
            .resize_exact(self.input_size, self.input_size, FilterType::Triangle);
        let input = model::planar_tensor(&face.to_rgb8(), ChannelOrder::Rgb, 1.0 / 255.0)?;
        let input_tensor = Value::from_array(input)?;

        let outputs = self.session.run(ort::inputs![input_tensor])?;
        let (_shape, data) = outputs[0].try_extract_tensor::<f32>()?;

        decode_landmarks(data, &crop)
    }
}
