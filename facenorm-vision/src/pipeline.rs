use std::path::Path;

use anyhow::{Context, Result};
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use log::info;

use crate::detector::YunetDetector;
use crate::error::Outcome;
use crate::geometry::{bounding_rect, bounding_rects, BoundingRect, PointSet};
use crate::landmarks::{
    extract_indexed, extract_landmarks, FaceDetector, LandmarkPredictor, MultiFacePolicy,
};
use crate::predictor::OnnxLandmarkPredictor;
use crate::scale::{normalize_scale, ImageResizer, Resizer, ScaledFace};

/// Knobs shared by both extraction passes.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub multi_face: MultiFacePolicy,
    /// Append the eight frame anchors to every point set.
    pub background_points: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            multi_face: MultiFacePolicy::default(),
            background_points: true,
        }
    }
}

/// Model settings for the ONNX-backed pipeline.
#[derive(Debug, Clone)]
pub struct ModelPaths<'a> {
    pub detector: &'a Path,
    pub landmarks: &'a Path,
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub landmark_input_size: u32,
}

/// Landmarks and face boxes of a batch, index-aligned with its images.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub point_sets: Vec<Outcome<PointSet>>,
    pub rects: Vec<Outcome<BoundingRect>>,
}

/// Full pipeline: detect -> landmarks -> rectangles -> scale matching.
///
/// Detector and predictor are built once and reused for every image of both
/// passes.
pub struct Pipeline<D, P, R = ImageResizer> {
    pub detector: D,
    pub predictor: P,
    pub resizer: R,
    pub options: PipelineOptions,
}

impl Pipeline<YunetDetector, OnnxLandmarkPredictor, ImageResizer> {
    pub fn from_models(
        models: &ModelPaths<'_>,
        filter: FilterType,
        options: PipelineOptions,
    ) -> Result<Self> {
        Ok(Self {
            detector: YunetDetector::new(
                models.detector,
                models.score_threshold,
                models.nms_threshold,
            )?,
            predictor: OnnxLandmarkPredictor::new(models.landmarks, models.landmark_input_size)?,
            resizer: ImageResizer { filter },
            options,
        })
    }
}

impl<D, P, R> Pipeline<D, P, R>
where
    D: FaceDetector,
    P: LandmarkPredictor,
    R: Resizer,
{
    pub fn new(detector: D, predictor: P, resizer: R, options: PipelineOptions) -> Self {
        Self {
            detector,
            predictor,
            resizer,
            options,
        }
    }

    /// Landmarks (plus frame anchors when enabled) and face rectangles.
    pub fn extract(&mut self, images: &[DynamicImage]) -> Result<Extraction> {
        let mut point_sets = extract_landmarks(
            &mut self.detector,
            &mut self.predictor,
            images,
            self.options.multi_face,
        )?;

        if self.options.background_points {
            for (set, image) in point_sets.iter_mut().zip(images) {
                if let Ok(points) = set {
                    let (width, height) = image.dimensions();
                    *points = std::mem::take(points).with_background(height, width);
                }
            }
        }

        let rects = bounding_rects(&point_sets);
        Ok(Extraction { point_sets, rects })
    }

    /// Rescale `images` against `rects` and extract again on the result.
    pub fn normalize(
        &mut self,
        rects: &[Outcome<BoundingRect>],
        images: &[DynamicImage],
    ) -> Result<Vec<Outcome<ScaledFace>>> {
        let Self {
            detector,
            predictor,
            resizer,
            options,
        } = self;

        normalize_scale(&*resizer, rects, images, |positions, resized| {
            let sets = extract_indexed(
                &mut *detector,
                &mut *predictor,
                positions.iter().copied().zip(resized),
                options.multi_face,
            )
            .context("re-extracting landmarks on rescaled images")?;

            Ok(sets
                .into_iter()
                .zip(resized)
                .map(|(set, image)| {
                    set.map(|points| {
                        let rect = bounding_rect(points.facial());
                        let points = if options.background_points {
                            let (width, height) = image.dimensions();
                            points.with_background(height, width)
                        } else {
                            points
                        };
                        (points, rect)
                    })
                })
                .collect())
        })
    }

    /// Both passes in one call.
    pub fn run(&mut self, images: &[DynamicImage]) -> Result<Vec<Outcome<ScaledFace>>> {
        let first = self.extract(images).context("first extraction pass")?;
        let found = first.rects.iter().filter(|r| r.is_ok()).count();
        info!("Faces found in {} of {} image(s)", found, images.len());

        self.normalize(&first.rects, images)
    }
}
