pub mod config;
pub mod report;

// Re-export vision types for convenience
pub use facenorm_vision::{
    background_points, bounding_rect, centroid, pipeline, scale, BoundingRect, Centroid,
    FaceError, MultiFacePolicy, Outcome, Pipeline, PipelineOptions, Point, PointSet, ScaledFace,
};
