pub mod detection;
pub mod error;
pub mod files;
pub mod link;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod training;

pub use detection::ObjectDetector;
pub use error::{Result, SignMatchError};
pub use models::{Detection, FileOutcome, LinkKind, Linked, Rect};
pub use pipeline::{Pipeline, ScanContext, process_file};
pub use training::{TestResults, Trainer, TrainingOptions};
