use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignMatchError {
    #[error("failed to read detector {path}: {source}")]
    ModelIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed detector {path}: {source}")]
    ModelFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid detector: {0}")]
    InvalidDetector(String),

    #[error("failed to read image {path}: {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to parse dataset {path}: {message}")]
    Dataset { path: PathBuf, message: String },

    #[error("invalid training options: {0}")]
    InvalidOptions(String),

    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SignMatchError>;

impl SignMatchError {
    /// Errors that concern one input image and not the batch as a whole
    pub fn is_unreadable_image(&self) -> bool {
        matches!(self, Self::ImageRead { .. } | Self::Decode { .. })
    }
}
