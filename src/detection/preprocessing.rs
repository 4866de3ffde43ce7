use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageReader, Luma};
use std::path::Path;

use crate::error::{Result, SignMatchError};

/// Convert image to 8-bit grayscale
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Decode an image file
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    let read_err = |source| SignMatchError::ImageRead {
        path: path.to_path_buf(),
        source,
    };
    ImageReader::open(path)
        .map_err(read_err)?
        .with_guessed_format()
        .map_err(read_err)?
        .decode()
        .map_err(|source| SignMatchError::Decode {
            path: path.to_path_buf(),
            source,
        })
}

/// Decode an image file straight to 8-bit grayscale
pub fn load_grayscale(path: &Path) -> Result<GrayImage> {
    Ok(to_grayscale(&load_image(path)?))
}

/// Double the image size `times` times
pub fn upsample(img: &GrayImage, times: u32) -> GrayImage {
    let mut current = img.clone();
    for _ in 0..times {
        let (w, h) = current.dimensions();
        current = image::imageops::resize(&current, w * 2, h * 2, FilterType::Triangle);
    }
    current
}

/// Resize to an exact size
pub fn scale_to(img: &GrayImage, width: u32, height: u32) -> GrayImage {
    image::imageops::resize(img, width.max(1), height.max(1), FilterType::Triangle)
}

/// Sample an arbitrary (possibly out of bounds) region of `img` into a
/// `width` x `height` patch with bilinear interpolation. Edge pixels are
/// replicated outside the image.
pub fn extract_patch(
    img: &GrayImage,
    left: f32,
    top: f32,
    region_width: f32,
    region_height: f32,
    width: u32,
    height: u32,
) -> GrayImage {
    let (img_w, img_h) = img.dimensions();
    let sx = region_width / width as f32;
    let sy = region_height / height as f32;
    let max_x = img_w as f32 - 1.0;
    let max_y = img_h as f32 - 1.0;

    GrayImage::from_fn(width, height, |x, y| {
        let fx = (left + (x as f32 + 0.5) * sx - 0.5).clamp(0.0, max_x);
        let fy = (top + (y as f32 + 0.5) * sy - 0.5).clamp(0.0, max_y);
        let x0 = fx.floor() as u32;
        let y0 = fy.floor() as u32;
        let x1 = (x0 + 1).min(img_w - 1);
        let y1 = (y0 + 1).min(img_h - 1);
        let ax = fx - x0 as f32;
        let ay = fy - y0 as f32;

        let p = |px: u32, py: u32| img.get_pixel(px, py)[0] as f32;
        let top_row = p(x0, y0) * (1.0 - ax) + p(x1, y0) * ax;
        let bottom_row = p(x0, y1) * (1.0 - ax) + p(x1, y1) * ax;
        let v = top_row * (1.0 - ay) + bottom_row * ay;
        Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsample_doubles_each_time() {
        let img = GrayImage::new(10, 7);
        assert_eq!(upsample(&img, 0).dimensions(), (10, 7));
        assert_eq!(upsample(&img, 2).dimensions(), (40, 28));
    }

    #[test]
    fn patch_inside_image_copies_pixels() {
        let img = GrayImage::from_fn(20, 20, |x, _| Luma([(x * 10) as u8]));
        let patch = extract_patch(&img, 5.0, 5.0, 4.0, 4.0, 4, 4);
        assert_eq!(patch.get_pixel(0, 0)[0], 50);
        assert_eq!(patch.get_pixel(3, 0)[0], 80);
    }

    #[test]
    fn patch_outside_image_replicates_edges() {
        let img = GrayImage::from_pixel(5, 5, Luma([77]));
        let patch = extract_patch(&img, -10.0, -10.0, 30.0, 30.0, 6, 6);
        assert!(patch.pixels().all(|p| p[0] == 77));
    }
}
