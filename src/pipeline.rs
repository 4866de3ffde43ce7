use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::detection::{ObjectDetector, draw_detections, preprocessing};
use crate::error::Result;
use crate::link;
use crate::models::FileOutcome;

/// Settings every per-file task reads. Built once from the command line and
/// shared read-only by all workers.
#[derive(Clone, Debug)]
pub struct ScanContext {
    pub verbose: bool,
    /// Matches are linked into this directory
    pub link_dir: Option<PathBuf>,
    /// Copies of matches with their detections outlined go here
    pub annotate_dir: Option<PathBuf>,
    /// Number of 2x upsamplings before scanning
    pub upsample: u32,
    /// Added to the detector's decision threshold
    pub threshold: f32,
    /// Treat unreadable or undecodable images as non-matches instead of
    /// failing the batch
    pub keep_going: bool,
}

impl Default for ScanContext {
    fn default() -> Self {
        Self {
            verbose: false,
            link_dir: None,
            annotate_dir: None,
            upsample: 1,
            threshold: 0.0,
            keep_going: false,
        }
    }
}

/// Default worker count: half the CPUs, at least one
pub fn default_workers() -> usize {
    (num_cpus::get() / 2).max(1)
}

/// Run the detector over one file.
///
/// A path that does not exist yields an empty outcome. Link failures are
/// logged and never hide the detections.
pub fn process_file(path: &Path, detector: &ObjectDetector, context: &ScanContext) -> Result<FileOutcome> {
    if !path.exists() {
        return Ok(FileOutcome::empty(path.to_path_buf()));
    }

    let image = match preprocessing::load_image(path) {
        Ok(image) => image,
        Err(e) if context.keep_going && e.is_unreadable_image() => {
            warn!("{}", e);
            return Ok(FileOutcome::empty(path.to_path_buf()));
        }
        Err(e) => return Err(e),
    };
    let gray = preprocessing::to_grayscale(&image);

    let detections = detector.detect_with_threshold(&gray, context.upsample, context.threshold);
    let mut outcome = FileOutcome {
        path: path.to_path_buf(),
        detections,
        link: None,
    };

    if context.verbose {
        info!("{}", outcome.summary());
    }
    if !outcome.is_match() {
        return Ok(outcome);
    }

    if let Some(dir) = &context.link_dir {
        match link::link_into(path, dir) {
            Ok(linked) => {
                if context.verbose {
                    info!("Linked {} ({:?})", linked.path.display(), linked.kind);
                }
                outcome.link = Some(linked);
            }
            Err(e) => warn!("Could not link {} into {}: {}", path.display(), dir.display(), e),
        }
    }

    if let Some(dir) = &context.annotate_dir {
        if let Err(e) = save_annotated(path, &image, &outcome, dir) {
            warn!("Could not annotate {}: {}", path.display(), e);
        }
    }

    Ok(outcome)
}

fn save_annotated(
    path: &Path,
    image: &image::DynamicImage,
    outcome: &FileOutcome,
    dir: &Path,
) -> anyhow::Result<()> {
    link::ensure_dir(dir)?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let target = link::target_path(Path::new(&format!("{stem}.png")), dir)?;
    draw_detections(image, &outcome.detections)
        .save(&target)
        .map_err(|e| anyhow::anyhow!("Failed to save annotated image: {}", e))?;
    Ok(())
}

/// Batch scanner: one detector, one context, a fixed-size worker pool
pub struct Pipeline<'a> {
    detector: &'a ObjectDetector,
    context: ScanContext,
    workers: usize,
}

impl<'a> Pipeline<'a> {
    pub fn new(detector: &'a ObjectDetector) -> Self {
        Self {
            detector,
            context: ScanContext::default(),
            workers: default_workers(),
        }
    }

    pub fn with_context(mut self, context: ScanContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Scan every file on the worker pool. Outcomes come back in input
    /// order; the first failing task aborts the batch.
    pub fn run(&self, files: &[PathBuf]) -> Result<Vec<FileOutcome>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()?;

        if self.context.verbose {
            info!("Scanning {} files with {} workers", files.len(), self.workers);
        }

        pool.install(|| {
            files
                .par_iter()
                .map(|path| process_file(path, self.detector, &self.context))
                .collect()
        })
    }
}
