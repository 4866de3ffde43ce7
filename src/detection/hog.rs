use image::GrayImage;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use std::f32::consts::PI;

/// Unsigned orientation bins per cell
pub const ORIENTATIONS: usize = 9;

/// Features per cell: orientation sums plus one texture energy per block
pub const FEATURES_PER_CELL: usize = ORIENTATIONS + 4;

const TRUNCATION: f32 = 0.2;
const TEXTURE_SCALE: f32 = 0.2357;
const EPSILON: f32 = 1e-4;

/// Dense grid of normalized HOG cell features for one image.
///
/// Cells are laid out row-major, each cell holding `FEATURES_PER_CELL`
/// contiguous values, so a window row is one contiguous slice.
#[derive(Debug, Clone)]
pub struct HogGrid {
    cells_wide: usize,
    cells_high: usize,
    data: Vec<f32>,
}

impl HogGrid {
    /// Extract features from every full cell of the image
    pub fn compute(image: &GrayImage, cell_size: u32) -> Self {
        let cell = cell_size.max(1) as usize;
        let (width, height) = image.dimensions();
        let cells_wide = width as usize / cell;
        let cells_high = height as usize / cell;

        if cells_wide == 0 || cells_high == 0 {
            return Self {
                cells_wide,
                cells_high,
                data: Vec::new(),
            };
        }

        let histograms = orientation_histograms(image, cell, cells_wide, cells_high);
        let data = normalize(&histograms, cells_wide, cells_high);

        Self {
            cells_wide,
            cells_high,
            data,
        }
    }

    pub fn cells_wide(&self) -> usize {
        self.cells_wide
    }

    pub fn cells_high(&self) -> usize {
        self.cells_high
    }

    pub fn cell(&self, cx: usize, cy: usize) -> &[f32] {
        let start = (cy * self.cells_wide + cx) * FEATURES_PER_CELL;
        &self.data[start..start + FEATURES_PER_CELL]
    }

    /// Whether a window of `window_w` x `window_h` cells fits at (cx, cy)
    pub fn fits(&self, cx: usize, cy: usize, window_w: usize, window_h: usize) -> bool {
        cx + window_w <= self.cells_wide && cy + window_h <= self.cells_high
    }

    /// Copy a window's features into a flat vector (row-major cells)
    pub fn window_features(&self, cx: usize, cy: usize, window_w: usize, window_h: usize) -> Vec<f32> {
        let row_len = window_w * FEATURES_PER_CELL;
        let mut out = Vec::with_capacity(row_len * window_h);
        for ry in 0..window_h {
            let start = ((cy + ry) * self.cells_wide + cx) * FEATURES_PER_CELL;
            out.extend_from_slice(&self.data[start..start + row_len]);
        }
        out
    }

    /// Dot product of a window's features with `weights`
    pub fn score_window(
        &self,
        cx: usize,
        cy: usize,
        window_w: usize,
        window_h: usize,
        weights: &[f32],
    ) -> f32 {
        let row_len = window_w * FEATURES_PER_CELL;
        let mut score = 0.0;
        for ry in 0..window_h {
            let start = ((cy + ry) * self.cells_wide + cx) * FEATURES_PER_CELL;
            let features = &self.data[start..start + row_len];
            let w = &weights[ry * row_len..(ry + 1) * row_len];
            score += features.iter().zip(w).map(|(a, b)| a * b).sum::<f32>();
        }
        score
    }
}

/// Magnitude-weighted orientation histograms, linearly split between the
/// two nearest bins.
fn orientation_histograms(
    image: &GrayImage,
    cell: usize,
    cells_wide: usize,
    cells_high: usize,
) -> Vec<f32> {
    let gx = horizontal_sobel(image);
    let gy = vertical_sobel(image);
    let bin_width = PI / ORIENTATIONS as f32;
    let mut hist = vec![0.0f32; cells_wide * cells_high * ORIENTATIONS];

    for y in 0..cells_high * cell {
        for x in 0..cells_wide * cell {
            let dx = gx.get_pixel(x as u32, y as u32)[0] as f32;
            let dy = gy.get_pixel(x as u32, y as u32)[0] as f32;
            let magnitude = (dx * dx + dy * dy).sqrt();
            if magnitude == 0.0 {
                continue;
            }

            let mut angle = dy.atan2(dx);
            if angle < 0.0 {
                angle += PI;
            }
            if angle >= PI {
                angle -= PI;
            }

            let position = angle / bin_width - 0.5;
            let lower = position.floor();
            let frac = position - lower;
            let b0 = (lower as i32).rem_euclid(ORIENTATIONS as i32) as usize;
            let b1 = (b0 + 1) % ORIENTATIONS;

            let base = ((y / cell) * cells_wide + x / cell) * ORIENTATIONS;
            hist[base + b0] += magnitude * (1.0 - frac);
            hist[base + b1] += magnitude * frac;
        }
    }

    hist
}

/// Normalize each cell against the four 2x2 blocks that contain it and
/// project to orientation sums plus texture energies.
fn normalize(hist: &[f32], cells_wide: usize, cells_high: usize) -> Vec<f32> {
    let energy: Vec<f32> = hist
        .chunks_exact(ORIENTATIONS)
        .map(|h| h.iter().map(|v| v * v).sum())
        .collect();

    let energy_at = |cx: i64, cy: i64| -> f32 {
        if cx < 0 || cy < 0 || cx >= cells_wide as i64 || cy >= cells_high as i64 {
            0.0
        } else {
            energy[cy as usize * cells_wide + cx as usize]
        }
    };

    let mut out = vec![0.0f32; cells_wide * cells_high * FEATURES_PER_CELL];

    for cy in 0..cells_high {
        for cx in 0..cells_wide {
            let (x, y) = (cx as i64, cy as i64);
            let mut norms = [0.0f32; 4];
            for (k, (bx, by)) in [(x - 1, y - 1), (x, y - 1), (x - 1, y), (x, y)]
                .into_iter()
                .enumerate()
            {
                let block = energy_at(bx, by)
                    + energy_at(bx + 1, by)
                    + energy_at(bx, by + 1)
                    + energy_at(bx + 1, by + 1);
                norms[k] = 1.0 / (block + EPSILON).sqrt();
            }

            let index = cy * cells_wide + cx;
            let h = &hist[index * ORIENTATIONS..(index + 1) * ORIENTATIONS];
            let cell_out = &mut out[index * FEATURES_PER_CELL..(index + 1) * FEATURES_PER_CELL];

            for (k, n) in norms.iter().enumerate() {
                let mut texture = 0.0;
                for (i, v) in h.iter().enumerate() {
                    let clipped = (v * n).min(TRUNCATION);
                    cell_out[i] += 0.5 * clipped;
                    texture += clipped;
                }
                cell_out[ORIENTATIONS + k] = TEXTURE_SCALE * texture;
            }
        }
    }

    out
}
