//! JSON summaries written by the CLI.

use facenorm_vision::{
    centroid, BoundingRect, Centroid, Extraction, Outcome, Point, PointSet, ScaledFace,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Excluded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageReport {
    pub source: PathBuf,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<(u32, u32)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rect: Option<BoundingRect>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub centroid: Option<Centroid>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub landmarks: Vec<Point>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub background: Vec<Point>,
}

impl ImageReport {
    fn excluded(source: &Path, error: String) -> Self {
        Self {
            source: source.to_path_buf(),
            status: Status::Excluded,
            error: Some(error),
            output: None,
            scale: None,
            size: None,
            rect: None,
            centroid: None,
            landmarks: Vec::new(),
            background: Vec::new(),
        }
    }

    fn found(source: &Path, points: &PointSet, rect: BoundingRect) -> Self {
        Self {
            source: source.to_path_buf(),
            status: Status::Ok,
            error: None,
            output: None,
            scale: None,
            size: None,
            rect: Some(rect),
            centroid: Some(centroid(&rect)),
            landmarks: points.facial().to_vec(),
            background: points.background().to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub processed: usize,
    pub excluded: usize,
    pub images: Vec<ImageReport>,
}

impl BatchReport {
    fn from_images(images: Vec<ImageReport>) -> Self {
        let excluded = images
            .iter()
            .filter(|i| i.status == Status::Excluded)
            .count();
        Self {
            processed: images.len() - excluded,
            excluded,
            images,
        }
    }

    /// Report for a single extraction pass.
    pub fn from_extraction(sources: &[PathBuf], extraction: &Extraction) -> Self {
        let images = sources
            .iter()
            .zip(extraction.point_sets.iter().zip(&extraction.rects))
            .map(|(source, (points, rect))| match (points, rect) {
                (Ok(points), Ok(rect)) => ImageReport::found(source, points, *rect),
                (Err(e), _) | (_, Err(e)) => ImageReport::excluded(source, e.to_string()),
            })
            .collect();
        Self::from_images(images)
    }

    /// Report for a normalized batch; `outputs` holds the written file of
    /// every successful image.
    pub fn from_scaled(
        sources: &[PathBuf],
        scaled: &[Outcome<ScaledFace>],
        outputs: &[Option<PathBuf>],
    ) -> Self {
        let images = sources
            .iter()
            .zip(scaled.iter().zip(outputs))
            .map(|(source, (face, output))| match face {
                Ok(face) => {
                    let summary = face.summary();
                    ImageReport {
                        output: output.clone(),
                        scale: Some(summary.scale),
                        size: Some((summary.width, summary.height)),
                        ..ImageReport::found(source, &face.points, face.rect)
                    }
                }
                Err(e) => ImageReport::excluded(source, e.to_string()),
            })
            .collect();
        Self::from_images(images)
    }
}
