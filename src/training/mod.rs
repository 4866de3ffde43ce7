pub mod dataset;
pub mod evaluation;
pub mod svm;

use image::GrayImage;
use rayon::prelude::*;
use std::path::Path;
use tracing::info;

use crate::detection::hog::{FEATURES_PER_CELL, HogGrid};
use crate::detection::{ObjectDetector, preprocessing, pyramid};
use crate::error::{Result, SignMatchError};
use crate::models::Rect;
use dataset::Dataset;
pub use evaluation::{TestResults, test_detector};
use svm::{Sample, SvmParams};

/// Windows overlapping a labeled box more than this are never negatives
const NEGATIVE_MAX_IOU: f32 = 0.3;

/// Windows scoring above this are margin violators worth mining
const MINING_MARGIN: f32 = -1.0;

/// Trainer settings
#[derive(Debug, Clone)]
pub struct TrainingOptions {
    /// SVM regularization: larger values fit the training data harder
    pub c: f32,
    /// Target detection window area in pixels
    pub detection_window_size: u32,
    /// Also train on mirrored copies of every positive
    pub add_left_right_image_flips: bool,
    pub num_threads: usize,
    pub be_verbose: bool,
    /// Solver stopping tolerance
    pub epsilon: f32,
    pub cell_size: u32,
    /// Hard negative mining passes after the first solve
    pub mining_rounds: usize,
    /// Background windows sampled per image before mining
    pub negatives_per_image: usize,
    /// Mined windows kept per image per round
    pub mined_per_image: usize,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            c: 1.0,
            detection_window_size: 80 * 80,
            add_left_right_image_flips: false,
            num_threads: 4,
            be_verbose: false,
            epsilon: 0.01,
            cell_size: 8,
            mining_rounds: 3,
            negatives_per_image: 30,
            mined_per_image: 20,
        }
    }
}

impl TrainingOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.c > 0.0) {
            return Err(SignMatchError::InvalidOptions(format!("C must be positive, got {}", self.c)));
        }
        if !(self.epsilon > 0.0) {
            return Err(SignMatchError::InvalidOptions(format!(
                "epsilon must be positive, got {}",
                self.epsilon
            )));
        }
        if self.cell_size == 0 {
            return Err(SignMatchError::InvalidOptions("cell size must be positive".to_string()));
        }
        if self.num_threads == 0 {
            return Err(SignMatchError::InvalidOptions("need at least one thread".to_string()));
        }
        Ok(())
    }
}

/// Window size in cells: the requested area at the mean box aspect ratio
pub fn window_geometry(dataset: &Dataset, options: &TrainingOptions) -> Result<(u32, u32)> {
    let aspects: Vec<f32> = dataset
        .images
        .iter()
        .flat_map(|image| image.truth())
        .filter(|r| !r.is_empty())
        .map(|r| r.aspect_ratio())
        .collect();
    if aspects.is_empty() {
        return Err(SignMatchError::InvalidOptions("dataset has no usable boxes".to_string()));
    }
    let aspect = aspects.iter().sum::<f32>() / aspects.len() as f32;

    let area = options.detection_window_size as f32;
    let cell = options.cell_size as f32;
    let cells_wide = ((area * aspect).sqrt() / cell).round() as u32;
    let cells_high = ((area / aspect).sqrt() / cell).round() as u32;

    if cells_wide < 2 || cells_high < 2 {
        return Err(SignMatchError::InvalidOptions(format!(
            "detection window of {} px is smaller than 2x2 cells of {} px",
            options.detection_window_size, options.cell_size
        )));
    }
    Ok((cells_wide, cells_high))
}

/// Trains a sliding-window HOG detector from labeled images
pub struct Trainer {
    options: TrainingOptions,
}

struct Geometry {
    cells_wide: usize,
    cells_high: usize,
    cell_size: u32,
}

impl Geometry {
    fn width_px(&self) -> u32 {
        self.cells_wide as u32 * self.cell_size
    }

    fn height_px(&self) -> u32 {
        self.cells_high as u32 * self.cell_size
    }
}

impl Trainer {
    pub fn new(options: TrainingOptions) -> Self {
        Self { options }
    }

    /// Train on an imglab XML dataset and save the detector to `output`
    pub fn train_from_xml(&self, xml_path: &Path, output: &Path) -> Result<ObjectDetector> {
        let dataset = Dataset::load(xml_path)?;
        let detector = self.train(&dataset)?;
        detector.save(output)?;
        if self.options.be_verbose {
            info!("Saved detector to {}", output.display());
        }
        Ok(detector)
    }

    pub fn train(&self, dataset: &Dataset) -> Result<ObjectDetector> {
        self.options.validate()?;
        if dataset.is_empty() {
            return Err(SignMatchError::InvalidOptions("dataset has no images".to_string()));
        }
        if dataset.truth_count() == 0 {
            return Err(SignMatchError::InvalidOptions("dataset has no positive boxes".to_string()));
        }

        let (cells_wide, cells_high) = window_geometry(dataset, &self.options)?;
        let geometry = Geometry {
            cells_wide: cells_wide as usize,
            cells_high: cells_high as usize,
            cell_size: self.options.cell_size,
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.num_threads)
            .build()?;

        pool.install(|| self.train_in_pool(dataset, &geometry))
    }

    fn train_in_pool(&self, dataset: &Dataset, geometry: &Geometry) -> Result<ObjectDetector> {
        let verbose = self.options.be_verbose;
        if verbose {
            info!(
                "Training with C: {}, epsilon: {}, window: {}x{} px, flips: {}, threads: {}",
                self.options.c,
                self.options.epsilon,
                geometry.width_px(),
                geometry.height_px(),
                self.options.add_left_right_image_flips,
                self.options.num_threads
            );
        }

        let images: Vec<GrayImage> = dataset
            .images
            .par_iter()
            .map(|image| preprocessing::load_grayscale(&image.path))
            .collect::<Result<_>>()?;

        let mut samples: Vec<Sample> = dataset
            .images
            .par_iter()
            .zip(&images)
            .flat_map_iter(|(labeled, gray)| {
                labeled
                    .truth()
                    .flat_map(|rect| self.positive_features(gray, rect, geometry))
                    .collect::<Vec<_>>()
            })
            .map(|features| Sample { features, label: 1.0 })
            .collect();
        let positives = samples.len();

        samples.par_extend(
            dataset
                .images
                .par_iter()
                .zip(&images)
                .flat_map_iter(|(labeled, gray)| {
                    let boxes: Vec<Rect> = labeled.boxes.iter().map(|b| b.rect).collect();
                    sample_negatives(gray, &boxes, geometry, self.options.negatives_per_image)
                })
                .map(|features| Sample { features, label: -1.0 }),
        );

        if verbose {
            info!(
                "Extracted {} positive and {} negative windows",
                positives,
                samples.len() - positives
            );
        }

        let dims = geometry.cells_wide * geometry.cells_high * FEATURES_PER_CELL;
        let params = SvmParams {
            c: self.options.c,
            epsilon: self.options.epsilon,
            ..Default::default()
        };

        let mut detector = self.solve(&samples, dims, params, geometry)?;

        for round in 0..self.options.mining_rounds {
            let mined: Vec<Sample> = dataset
                .images
                .par_iter()
                .zip(&images)
                .flat_map_iter(|(labeled, gray)| {
                    let boxes: Vec<Rect> = labeled.boxes.iter().map(|b| b.rect).collect();
                    hard_negatives(&detector, gray, &boxes, self.options.mined_per_image)
                })
                .map(|features| Sample { features, label: -1.0 })
                .collect();

            if verbose {
                info!("Mining round {}: {} hard negatives", round + 1, mined.len());
            }
            if mined.is_empty() {
                break;
            }

            samples.extend(mined);
            detector = self.solve(&samples, dims, params, geometry)?;
        }

        Ok(detector)
    }

    fn solve(
        &self,
        samples: &[Sample],
        dims: usize,
        params: SvmParams,
        geometry: &Geometry,
    ) -> Result<ObjectDetector> {
        let model = svm::train(samples, dims, params);
        ObjectDetector::new(
            geometry.cell_size,
            geometry.cells_wide as u32,
            geometry.cells_high as u32,
            model.weights,
            model.bias,
        )
    }

    /// Window features for one labeled box, plus its mirror when enabled
    fn positive_features(&self, gray: &GrayImage, rect: &Rect, geometry: &Geometry) -> Vec<Vec<f32>> {
        let patch = window_patch(gray, rect, geometry);
        let mut out = vec![patch_features(&patch, geometry)];
        if self.options.add_left_right_image_flips {
            let mirrored = image::imageops::flip_horizontal(&patch);
            out.push(patch_features(&mirrored, geometry));
        }
        out
    }
}

/// Crop `rect` stretched to the window's aspect ratio, with one cell of
/// context on every side, resized so the window is exactly window sized.
fn window_patch(gray: &GrayImage, rect: &Rect, geometry: &Geometry) -> GrayImage {
    let window_aspect = geometry.cells_wide as f32 / geometry.cells_high as f32;
    let (cx, cy) = rect.center();
    // Pixel i spans [i, i + 1)
    let (cx, cy) = (cx + 0.5, cy + 0.5);

    let mut w = rect.width().max(1) as f32;
    let mut h = rect.height().max(1) as f32;
    if w / h < window_aspect {
        w = h * window_aspect;
    } else {
        h = w / window_aspect;
    }

    let source_per_window_px = w / geometry.width_px() as f32;
    let pad_x = geometry.cell_size as f32 * source_per_window_px;
    let pad_y = geometry.cell_size as f32 * (h / geometry.height_px() as f32);

    preprocessing::extract_patch(
        gray,
        cx - w / 2.0 - pad_x,
        cy - h / 2.0 - pad_y,
        w + 2.0 * pad_x,
        h + 2.0 * pad_y,
        geometry.width_px() + 2 * geometry.cell_size,
        geometry.height_px() + 2 * geometry.cell_size,
    )
}

fn patch_features(patch: &GrayImage, geometry: &Geometry) -> Vec<f32> {
    HogGrid::compute(patch, geometry.cell_size).window_features(
        1,
        1,
        geometry.cells_wide,
        geometry.cells_high,
    )
}

fn clear_of(window: &Rect, boxes: &[Rect]) -> bool {
    boxes.iter().all(|b| window.iou(b) < NEGATIVE_MAX_IOU)
}

/// Map a window at cell (cx, cy) of a pyramid level back to base pixels
fn window_rect(level: &pyramid::PyramidLevel, cx: usize, cy: usize, geometry: &Geometry) -> Rect {
    let cell = geometry.cell_size as f32;
    let (left, top) = level.to_base(cx as f32 * cell, cy as f32 * cell);
    let (right, bottom) = level.to_base(
        (cx + geometry.cells_wide) as f32 * cell,
        (cy + geometry.cells_high) as f32 * cell,
    );
    Rect::new(
        left.round() as i32,
        top.round() as i32,
        right.round() as i32 - 1,
        bottom.round() as i32 - 1,
    )
}

/// Evenly spread background windows across the pyramid of one image
fn sample_negatives(gray: &GrayImage, boxes: &[Rect], geometry: &Geometry, count: usize) -> Vec<Vec<f32>> {
    if count == 0 {
        return Vec::new();
    }

    let levels = pyramid::build(gray, pyramid::DEFAULT_DOWNSCALE, geometry.width_px(), geometry.height_px());
    let grids: Vec<HogGrid> = levels
        .iter()
        .map(|level| HogGrid::compute(&level.image, geometry.cell_size))
        .collect();
    let step = (geometry.cells_wide.min(geometry.cells_high) / 2).max(1);

    let mut candidates = Vec::new();
    for (index, (level, grid)) in levels.iter().zip(&grids).enumerate() {
        if !grid.fits(0, 0, geometry.cells_wide, geometry.cells_high) {
            continue;
        }
        for cy in (0..=grid.cells_high() - geometry.cells_high).step_by(step) {
            for cx in (0..=grid.cells_wide() - geometry.cells_wide).step_by(step) {
                if clear_of(&window_rect(level, cx, cy, geometry), boxes) {
                    candidates.push((index, cx, cy));
                }
            }
        }
    }

    let stride = (candidates.len() / count).max(1);
    candidates
        .into_iter()
        .step_by(stride)
        .take(count)
        .map(|(index, cx, cy)| {
            grids[index].window_features(cx, cy, geometry.cells_wide, geometry.cells_high)
        })
        .collect()
}

/// Background windows the current detector scores inside the margin,
/// highest scoring first.
fn hard_negatives(detector: &ObjectDetector, gray: &GrayImage, boxes: &[Rect], limit: usize) -> Vec<Vec<f32>> {
    let geometry = Geometry {
        cells_wide: detector.window_cells_wide as usize,
        cells_high: detector.window_cells_high as usize,
        cell_size: detector.cell_size,
    };

    let mut found: Vec<(f32, Vec<f32>)> = Vec::new();
    let levels = pyramid::build(gray, detector.pyramid_downscale, geometry.width_px(), geometry.height_px());
    for level in &levels {
        let grid = HogGrid::compute(&level.image, geometry.cell_size);
        if !grid.fits(0, 0, geometry.cells_wide, geometry.cells_high) {
            continue;
        }
        for cy in 0..=grid.cells_high() - geometry.cells_high {
            for cx in 0..=grid.cells_wide() - geometry.cells_wide {
                let score = grid.score_window(cx, cy, geometry.cells_wide, geometry.cells_high, &detector.weights)
                    + detector.bias;
                if score <= MINING_MARGIN {
                    continue;
                }
                if clear_of(&window_rect(level, cx, cy, &geometry), boxes) {
                    found.push((
                        score,
                        grid.window_features(cx, cy, geometry.cells_wide, geometry.cells_high),
                    ));
                }
            }
        }
    }

    found.sort_by(|a, b| b.0.total_cmp(&a.0));
    found.truncate(limit);
    found.into_iter().map(|(_, features)| features).collect()
}
