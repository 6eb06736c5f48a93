#![allow(dead_code)]

use anyhow::Result;
use facenorm_vision::{
    FaceDetector, FaceRegion, ImageResizer, LandmarkPredictor, Pipeline, PipelineOptions, Point,
    LANDMARK_COUNT,
};
use image::{imageops::FilterType, DynamicImage, RgbImage};

/// "Detects" the bounding box of every bright pixel as a single face.
pub struct BrightBoxDetector;

impl FaceDetector for BrightBoxDetector {
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<FaceRegion>> {
        let gray = image.to_luma8();
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (x, y, px) in gray.enumerate_pixels() {
            if px.0[0] > 127 {
                bounds = Some(match bounds {
                    None => (x, y, x, y),
                    Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
                });
            }
        }

        Ok(bounds
            .map(|(x0, y0, x1, y1)| FaceRegion {
                x: x0 as f32,
                y: y0 as f32,
                width: (x1 - x0 + 1) as f32,
                height: (y1 - y0 + 1) as f32,
                score: 1.0,
            })
            .into_iter()
            .collect())
    }
}

/// Spreads 68 points over a 17x4 grid touching the region's corners.
pub struct GridPredictor;

impl LandmarkPredictor for GridPredictor {
    fn predict(&mut self, _image: &DynamicImage, region: &FaceRegion) -> Result<Vec<Point>> {
        let (x, y) = (region.x, region.y);
        let (w, h) = (region.width - 1.0, region.height - 1.0);
        Ok((0..LANDMARK_COUNT)
            .map(|i| {
                let col = (i % 17) as f32;
                let row = (i / 17) as f32;
                Point::new(
                    (x + col * w / 16.0).round() as i32,
                    (y + row * h / 3.0).round() as i32,
                )
            })
            .collect())
    }
}

/// Black image with a white `(x, y, w, h)` box.
pub fn face_image(width: u32, height: u32, face: (u32, u32, u32, u32)) -> DynamicImage {
    let (fx, fy, fw, fh) = face;
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        if x >= fx && x < fx + fw && y >= fy && y < fy + fh {
            image::Rgb([255, 255, 255])
        } else {
            image::Rgb([0, 0, 0])
        }
    }))
}

pub fn blank_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::new_rgb8(width, height)
}

pub fn pipeline(options: PipelineOptions) -> Pipeline<BrightBoxDetector, GridPredictor> {
    Pipeline::new(
        BrightBoxDetector,
        GridPredictor,
        ImageResizer {
            filter: FilterType::Nearest,
        },
        options,
    )
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
