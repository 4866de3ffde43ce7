use image::GrayImage;

use super::preprocessing::scale_to;

/// Default downscale factor between pyramid levels
pub const DEFAULT_DOWNSCALE: f32 = 5.0 / 6.0;

const MAX_LEVELS: usize = 64;

/// One scaled copy of the scanned image
pub struct PyramidLevel {
    pub image: GrayImage,
    /// Level width divided by base width
    pub scale_x: f32,
    /// Level height divided by base height
    pub scale_y: f32,
}

impl PyramidLevel {
    /// Map a level coordinate back to base image coordinates
    pub fn to_base(&self, x: f32, y: f32) -> (f32, f32) {
        (x / self.scale_x, y / self.scale_y)
    }
}

/// Build a pyramid starting at `base`, shrinking by `downscale` until the
/// level is smaller than `min_width` x `min_height`.
pub fn build(base: &GrayImage, downscale: f32, min_width: u32, min_height: u32) -> Vec<PyramidLevel> {
    let (base_w, base_h) = base.dimensions();
    let mut levels = Vec::new();

    if base_w < min_width || base_h < min_height {
        return levels;
    }

    levels.push(PyramidLevel {
        image: base.clone(),
        scale_x: 1.0,
        scale_y: 1.0,
    });

    let downscale = downscale.clamp(0.1, 0.99);
    let mut factor = downscale;
    while levels.len() < MAX_LEVELS {
        let w = (base_w as f32 * factor).round() as u32;
        let h = (base_h as f32 * factor).round() as u32;
        if w < min_width || h < min_height {
            break;
        }
        levels.push(PyramidLevel {
            image: scale_to(base, w, h),
            scale_x: w as f32 / base_w as f32,
            scale_y: h as f32 / base_h as f32,
        });
        factor *= downscale;
    }

    levels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_when_window_no_longer_fits() {
        let base = GrayImage::new(120, 100);
        let levels = build(&base, 0.5, 30, 30);
        let sizes: Vec<_> = levels.iter().map(|l| l.image.dimensions()).collect();
        assert_eq!(sizes, vec![(120, 100), (60, 50)]);
    }

    #[test]
    fn base_smaller_than_window_has_no_levels() {
        let base = GrayImage::new(20, 20);
        assert!(build(&base, DEFAULT_DOWNSCALE, 40, 40).is_empty());
    }

    #[test]
    fn level_coordinates_map_back_to_base() {
        let base = GrayImage::new(100, 100);
        let levels = build(&base, 0.5, 10, 10);
        let (x, y) = levels[1].to_base(10.0, 20.0);
        assert!((x - 20.0).abs() < 1e-4);
        assert!((y - 40.0).abs() < 1e-4);
    }
}
