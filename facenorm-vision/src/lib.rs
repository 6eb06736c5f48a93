pub mod background;
pub mod detector;
pub mod error;
pub mod geometry;
pub mod landmarks;
pub mod model;
pub mod pipeline;
pub mod predictor;
pub mod scale;
pub mod yunet;

// Re-export commonly used types
pub use background::background_points;
pub use error::{FaceError, Outcome};
pub use geometry::{
    bounding_rect, bounding_rects, centroid, BoundingRect, Centroid, Point, PointSet,
};
pub use landmarks::{
    extract_indexed, extract_landmarks, FaceDetector, FaceRegion, LandmarkPredictor,
    MultiFacePolicy, LANDMARK_COUNT,
};
pub use pipeline::{Extraction, Pipeline, PipelineOptions};
pub use scale::{normalize_scale, scale_factors, ImageResizer, Resizer, ScaledFace};
