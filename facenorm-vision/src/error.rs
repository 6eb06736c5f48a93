use thiserror::Error;

/// Per-image failure. These exclude one image from the batch and never
/// abort the pipeline; fatal problems travel as `anyhow::Error` instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FaceError {
    #[error("no face found in image")]
    NoFaceFound,

    #[error("{count} faces found and the multi-face policy rejects ambiguous images")]
    MultipleFacesAmbiguous { count: usize },

    #[error("degenerate face rectangle {width}x{height}")]
    DegenerateRectangle { width: i32, height: i32 },
}

/// Result of processing a single image of a batch.
pub type Outcome<T> = std::result::Result<T, FaceError>;
