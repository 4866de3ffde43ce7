use image::{GrayImage, Luma};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut};
use signmatch::detection::hog::FEATURES_PER_CELL;
use signmatch::{ObjectDetector, Trainer, TrainingOptions};
use std::path::{Path, PathBuf};

/// Side of the square box around a synthetic sign
pub const SIGN_SIZE: u32 = 40;

pub const BACKGROUND: u8 = 90;

/// A plain background image with no sign
pub fn blank_image(width: u32, height: u32) -> GrayImage {
    GrayImage::from_pixel(width, height, Luma([BACKGROUND]))
}

/// Draw a white disc with a dark rim filling the 40x40 box at (left, top).
pub fn draw_sign(img: &mut GrayImage, left: i32, top: i32) {
    let center = (left + SIGN_SIZE as i32 / 2, top + SIGN_SIZE as i32 / 2);
    draw_filled_circle_mut(img, center, 17, Luma([15u8]));
    draw_filled_circle_mut(img, center, 14, Luma([240u8]));
    draw_hollow_circle_mut(img, center, 8, Luma([30u8]));
}

/// 160x120 image with a sign in each of the given boxes
pub fn sign_image(positions: &[(i32, i32)]) -> GrayImage {
    let mut img = blank_image(160, 120);
    for (left, top) in positions {
        draw_sign(&mut img, *left, *top);
    }
    img
}

pub fn save_png(dir: &Path, name: &str, img: &GrayImage) -> PathBuf {
    let path = dir.join(name);
    img.save(&path).expect("Failed to save test image");
    path
}

/// Write an imglab XML dataset; each entry is an image file name and the
/// top-left corners of its sign boxes.
pub fn write_dataset(dir: &Path, entries: &[(&str, Vec<(i32, i32)>)]) -> PathBuf {
    let mut xml = String::from(
        "<?xml version='1.0' encoding='ISO-8859-1'?>\n<dataset>\n<name>synthetic signs</name>\n<images>\n",
    );
    for (file, boxes) in entries {
        xml.push_str(&format!("  <image file='{file}'>\n"));
        for (left, top) in boxes {
            xml.push_str(&format!(
                "    <box top='{top}' left='{left}' width='{SIGN_SIZE}' height='{SIGN_SIZE}'/>\n"
            ));
        }
        xml.push_str("  </image>\n");
    }
    xml.push_str("</images>\n</dataset>\n");

    let path = dir.join("signs.xml");
    std::fs::write(&path, xml).expect("Failed to write dataset");
    path
}

/// Cell-aligned training layout used by the training tests
pub fn training_layout() -> Vec<(&'static str, Vec<(i32, i32)>)> {
    vec![
        ("train0.png", vec![(24, 32)]),
        ("train1.png", vec![(96, 64)]),
        ("train2.png", vec![(16, 16), (104, 56)]),
        ("train3.png", vec![(64, 40)]),
    ]
}

/// Write the synthetic training set into `dir`, returning the XML path
pub fn write_training_set(dir: &Path) -> PathBuf {
    let layout = training_layout();
    for (file, boxes) in &layout {
        save_png(dir, file, &sign_image(boxes));
    }
    write_dataset(dir, &layout)
}

pub fn training_options() -> TrainingOptions {
    TrainingOptions {
        c: 5.0,
        detection_window_size: SIGN_SIZE * SIGN_SIZE,
        num_threads: 2,
        ..Default::default()
    }
}

/// Train a detector for the synthetic sign, saving it as `model.svm`
pub fn train_sign_detector(dir: &Path) -> (ObjectDetector, PathBuf) {
    let xml = write_training_set(dir);
    let model_path = dir.join("model.svm");
    let detector = Trainer::new(training_options())
        .train_from_xml(&xml, &model_path)
        .expect("Training failed");
    (detector, model_path)
}

/// Detector with a 32x32 px window and zero weights: a positive bias fires
/// on every window, a negative one never does.
pub fn constant_detector(bias: f32) -> ObjectDetector {
    ObjectDetector::new(8, 4, 4, vec![0.0; 4 * 4 * FEATURES_PER_CELL], bias)
        .expect("Failed to build detector")
}
