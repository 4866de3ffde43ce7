use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Axis-aligned box with inclusive corners, in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn from_xywh(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            left: x,
            top: y,
            right: x + width as i32 - 1,
            bottom: y + height as i32 - 1,
        }
    }

    pub fn width(&self) -> u32 {
        (self.right - self.left + 1).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.bottom - self.top + 1).max(0) as u32
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.right < self.left || self.bottom < self.top
    }

    pub fn aspect_ratio(&self) -> f32 {
        let h = self.height() as f32;
        if h == 0.0 {
            return 0.0;
        }
        self.width() as f32 / h
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.left + self.right) as f32 / 2.0,
            (self.top + self.bottom) as f32 / 2.0,
        )
    }

    pub fn intersection(&self, other: &Rect) -> Rect {
        Rect {
            left: self.left.max(other.left),
            top: self.top.max(other.top),
            right: self.right.min(other.right),
            bottom: self.bottom.min(other.bottom),
        }
    }

    /// Intersection over union, 0.0 for disjoint boxes.
    pub fn iou(&self, other: &Rect) -> f32 {
        let inner = self.intersection(other);
        if inner.is_empty() {
            return 0.0;
        }
        let inner_area = inner.area() as f32;
        let union = (self.area() + other.area()) as f32 - inner_area;
        if union <= 0.0 {
            return 0.0;
        }
        inner_area / union
    }

    /// Fraction of `self` covered by `other`.
    pub fn covered_by(&self, other: &Rect) -> f32 {
        let inner = self.intersection(other);
        if inner.is_empty() || self.area() == 0 {
            return 0.0;
        }
        inner.area() as f32 / self.area() as f32
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[({}, {}) ({}, {})]", self.left, self.top, self.right, self.bottom)
    }
}

/// One detector hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub rect: Rect,
    pub score: f32,
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.rect.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Hard,
    Symbolic,
}

/// A link created in the destination directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Linked {
    pub path: PathBuf,
    pub kind: LinkKind,
}

/// Result of running the per-file pipeline on one input path.
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub detections: Vec<Detection>,
    pub link: Option<Linked>,
}

impl FileOutcome {
    pub fn empty(path: PathBuf) -> Self {
        Self {
            path,
            detections: Vec::new(),
            link: None,
        }
    }

    pub fn is_match(&self) -> bool {
        !self.detections.is_empty()
    }

    /// Space separated region strings, as logged in verbose mode.
    pub fn regions(&self) -> String {
        self.detections
            .iter()
            .map(|d| d.rect.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Line logged for this file in verbose mode: the path, the detection
    /// count and every region, or a note that nothing was found.
    pub fn summary(&self) -> String {
        if self.is_match() {
            format!(
                "{} {} {}",
                self.path.display(),
                self.detections.len(),
                self.regions()
            )
        } else {
            format!("No signs in {}", self.path.display())
        }
    }
}
