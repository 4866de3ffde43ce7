pub mod hog;
pub mod nms;
pub mod preprocessing;
pub mod pyramid;

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::path::Path;
use tracing::debug;

use crate::error::{Result, SignMatchError};
use crate::models::{Detection, Rect};
use hog::{FEATURES_PER_CELL, HogGrid, ORIENTATIONS};

/// Default overlap above which NMS drops the weaker of two detections
pub const DEFAULT_OVERLAP_THRESHOLD: f32 = 0.5;

fn default_downscale() -> f32 {
    pyramid::DEFAULT_DOWNSCALE
}

fn default_overlap() -> f32 {
    DEFAULT_OVERLAP_THRESHOLD
}

/// Trained sliding-window HOG detector.
///
/// A linear filter over a fixed window of HOG cells, scanned across an image
/// pyramid. Loaded once and shared read-only between workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectDetector {
    pub cell_size: u32,
    pub window_cells_wide: u32,
    pub window_cells_high: u32,
    /// Row-major cell weights, `FEATURES_PER_CELL` per cell
    pub weights: Vec<f32>,
    pub bias: f32,
    #[serde(default = "default_downscale")]
    pub pyramid_downscale: f32,
    #[serde(default = "default_overlap")]
    pub overlap_threshold: f32,
}

impl ObjectDetector {
    pub fn new(
        cell_size: u32,
        window_cells_wide: u32,
        window_cells_high: u32,
        weights: Vec<f32>,
        bias: f32,
    ) -> Result<Self> {
        let detector = Self {
            cell_size,
            window_cells_wide,
            window_cells_high,
            weights,
            bias,
            pyramid_downscale: pyramid::DEFAULT_DOWNSCALE,
            overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
        };
        detector.validate()?;
        Ok(detector)
    }

    /// Number of weights a window of this geometry needs
    pub fn feature_len(&self) -> usize {
        self.window_cells_wide as usize * self.window_cells_high as usize * FEATURES_PER_CELL
    }

    pub fn window_width(&self) -> u32 {
        self.window_cells_wide * self.cell_size
    }

    pub fn window_height(&self) -> u32 {
        self.window_cells_high * self.cell_size
    }

    pub fn validate(&self) -> Result<()> {
        if self.cell_size == 0 || self.window_cells_wide == 0 || self.window_cells_high == 0 {
            return Err(SignMatchError::InvalidDetector(format!(
                "degenerate window {}x{} cells of {} px",
                self.window_cells_wide, self.window_cells_high, self.cell_size
            )));
        }
        if self.weights.len() != self.feature_len() {
            return Err(SignMatchError::InvalidDetector(format!(
                "expected {} weights for a {}x{} cell window, found {}",
                self.feature_len(),
                self.window_cells_wide,
                self.window_cells_high,
                self.weights.len()
            )));
        }
        if !(self.pyramid_downscale > 0.0 && self.pyramid_downscale < 1.0) {
            return Err(SignMatchError::InvalidDetector(format!(
                "pyramid downscale {} outside (0, 1)",
                self.pyramid_downscale
            )));
        }
        if self.weights.iter().any(|w| !w.is_finite()) || !self.bias.is_finite() {
            return Err(SignMatchError::InvalidDetector("non-finite weights".to_string()));
        }
        Ok(())
    }

    /// Load a detector from disk
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| SignMatchError::ModelIo {
            path: path.to_path_buf(),
            source,
        })?;
        let detector: Self =
            serde_json::from_str(&contents).map_err(|source| SignMatchError::ModelFormat {
                path: path.to_path_buf(),
                source,
            })?;
        detector.validate()?;
        debug!(
            path = %path.display(),
            window_width = detector.window_width(),
            window_height = detector.window_height(),
            "loaded detector"
        );
        Ok(detector)
    }

    /// Write the detector to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string(self).map_err(|source| SignMatchError::ModelFormat {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, contents).map_err(|source| SignMatchError::ModelIo {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Run the detector after upsampling the image `upsample` times
    pub fn detect(&self, img: &GrayImage, upsample: u32) -> Vec<Detection> {
        self.detect_with_threshold(img, upsample, 0.0)
    }

    /// Like `detect`, reporting windows scoring above `adjust_threshold`
    pub fn detect_with_threshold(
        &self,
        img: &GrayImage,
        upsample: u32,
        adjust_threshold: f32,
    ) -> Vec<Detection> {
        let scanned = preprocessing::upsample(img, upsample);
        let factor = 2f32.powi(upsample as i32);

        let raw: Vec<Detection> = self
            .scan(&scanned, adjust_threshold)
            .into_iter()
            .map(|d| Detection {
                rect: scale_rect(&d.rect, 1.0 / factor),
                score: d.score,
            })
            .collect();

        nms::nms(raw, self.overlap_threshold)
    }

    /// Every window above `threshold` across the pyramid, before NMS, in
    /// `img` coordinates.
    pub fn scan(&self, img: &GrayImage, threshold: f32) -> Vec<Detection> {
        let window_w = self.window_cells_wide as usize;
        let window_h = self.window_cells_high as usize;
        let cell = self.cell_size as f32;
        let mut detections = Vec::new();

        let levels = pyramid::build(img, self.pyramid_downscale, self.window_width(), self.window_height());
        for level in &levels {
            let grid = HogGrid::compute(&level.image, self.cell_size);
            if !grid.fits(0, 0, window_w, window_h) {
                continue;
            }
            for cy in 0..=grid.cells_high() - window_h {
                for cx in 0..=grid.cells_wide() - window_w {
                    let score =
                        grid.score_window(cx, cy, window_w, window_h, &self.weights) + self.bias;
                    if score <= threshold {
                        continue;
                    }
                    let (left, top) = level.to_base(cx as f32 * cell, cy as f32 * cell);
                    let (right, bottom) = level.to_base(
                        (cx + window_w) as f32 * cell,
                        (cy + window_h) as f32 * cell,
                    );
                    detections.push(Detection {
                        rect: Rect::new(
                            left.round() as i32,
                            top.round() as i32,
                            right.round() as i32 - 1,
                            bottom.round() as i32 - 1,
                        ),
                        score,
                    });
                }
            }
        }

        detections
    }

    /// Render the learned filter as orientation glyphs, `cell_px` pixels per
    /// cell. Brighter strokes carry more positive weight.
    pub fn render_filter(&self, cell_px: u32) -> GrayImage {
        let cell_px = cell_px.max(4);
        let mut canvas = GrayImage::new(
            self.window_cells_wide * cell_px,
            self.window_cells_high * cell_px,
        );

        let max_weight = self
            .weights
            .chunks_exact(FEATURES_PER_CELL)
            .flat_map(|cell| cell[..ORIENTATIONS].iter().copied())
            .fold(0.0f32, f32::max);
        if max_weight <= 0.0 {
            return canvas;
        }

        let half = cell_px as f32 / 2.0;
        for (index, cell) in self.weights.chunks_exact(FEATURES_PER_CELL).enumerate() {
            let cx = (index as u32 % self.window_cells_wide) * cell_px;
            let cy = (index as u32 / self.window_cells_wide) * cell_px;
            let (center_x, center_y) = (cx as f32 + half, cy as f32 + half);

            let mut bins: Vec<(usize, f32)> = cell[..ORIENTATIONS]
                .iter()
                .copied()
                .enumerate()
                .filter(|(_, w)| *w > 0.0)
                .collect();
            // Strongest stroke drawn last
            bins.sort_by(|a, b| a.1.total_cmp(&b.1));

            for (bin, weight) in bins {
                let gradient = (bin as f32 + 0.5) * PI / ORIENTATIONS as f32;
                let edge = gradient + PI / 2.0;
                let (dx, dy) = (edge.cos() * (half - 0.5), edge.sin() * (half - 0.5));
                let level = (weight / max_weight * 255.0).round() as u8;
                draw_line_segment_mut(
                    &mut canvas,
                    (center_x - dx, center_y - dy),
                    (center_x + dx, center_y + dy),
                    Luma([level]),
                );
            }
        }

        canvas
    }
}

fn scale_rect(rect: &Rect, factor: f32) -> Rect {
    let scale = |v: i32| (v as f32 * factor).round() as i32;
    Rect::new(
        scale(rect.left),
        scale(rect.top),
        scale(rect.right + 1) - 1,
        scale(rect.bottom + 1) - 1,
    )
}

/// Copy of `img` with each detection outlined
pub fn draw_detections(img: &DynamicImage, detections: &[Detection]) -> RgbImage {
    let mut canvas = img.to_rgb8();
    for detection in detections {
        let r = &detection.rect;
        if r.is_empty() {
            continue;
        }
        let outline = imageproc::rect::Rect::at(r.left, r.top).of_size(r.width(), r.height());
        draw_hollow_rect_mut(&mut canvas, outline, Rgb([255, 0, 0]));
    }
    canvas
}
