use rayon::prelude::*;
use std::fmt;

use super::dataset::Dataset;
use crate::detection::{ObjectDetector, preprocessing};
use crate::error::Result;
use crate::models::{Detection, Rect};

/// Minimum IoU for a detection to count as finding a truth box
pub const MATCH_IOU: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestResults {
    pub precision: f64,
    pub recall: f64,
    pub average_precision: f64,
}

impl fmt::Display for TestResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "precision: {}, recall: {}, average precision: {}",
            self.precision, self.recall, self.average_precision
        )
    }
}

/// Per-image scoring: each detection's score and whether it hit a truth box.
/// Detections landing on ignored boxes are dropped.
fn score_image(detections: &[Detection], truth: &[Rect], ignored: &[Rect]) -> Vec<(f32, bool)> {
    let mut ordered: Vec<&Detection> = detections.iter().collect();
    ordered.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut claimed = vec![false; truth.len()];
    let mut scored = Vec::with_capacity(ordered.len());

    for detection in ordered {
        let best = truth
            .iter()
            .enumerate()
            .filter(|(i, _)| !claimed[*i])
            .map(|(i, t)| (i, detection.rect.iou(t)))
            .filter(|(_, iou)| *iou >= MATCH_IOU)
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((i, _)) => {
                claimed[i] = true;
                scored.push((detection.score, true));
            }
            None => {
                let on_ignored = ignored.iter().any(|r| detection.rect.iou(r) >= MATCH_IOU);
                if !on_ignored {
                    scored.push((detection.score, false));
                }
            }
        }
    }

    scored
}

/// Precision, recall and average precision from ranked hits
fn summarize(mut scored: Vec<(f32, bool)>, total_truth: usize) -> TestResults {
    let hits = scored.iter().filter(|(_, hit)| *hit).count();
    let precision = if scored.is_empty() {
        1.0
    } else {
        hits as f64 / scored.len() as f64
    };
    let recall = if total_truth == 0 {
        1.0
    } else {
        hits as f64 / total_truth as f64
    };

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    let mut running_hits = 0usize;
    let mut precision_sum = 0.0f64;
    for (rank, (_, hit)) in scored.iter().enumerate() {
        if *hit {
            running_hits += 1;
            precision_sum += running_hits as f64 / (rank + 1) as f64;
        }
    }
    let average_precision = if total_truth == 0 {
        1.0
    } else {
        precision_sum / total_truth as f64
    };

    TestResults {
        precision,
        recall,
        average_precision,
    }
}

/// Run the detector over every image of the dataset, without upsampling,
/// and compare against the labeled boxes.
pub fn test_detector(detector: &ObjectDetector, dataset: &Dataset) -> Result<TestResults> {
    let per_image: Vec<Vec<(f32, bool)>> = dataset
        .images
        .par_iter()
        .map(|image| {
            let gray = preprocessing::load_grayscale(&image.path)?;
            let detections = detector.detect(&gray, 0);
            let truth: Vec<Rect> = image.truth().copied().collect();
            let ignored: Vec<Rect> = image.ignored().copied().collect();
            Ok(score_image(&detections, &truth, &ignored))
        })
        .collect::<Result<_>>()?;

    let scored = per_image.into_iter().flatten().collect();
    Ok(summarize(scored, dataset.truth_count()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: i32, score: f32) -> Detection {
        Detection {
            rect: Rect::from_xywh(x, 0, 10, 10),
            score,
        }
    }

    #[test]
    fn perfect_detections() {
        let truth = vec![Rect::from_xywh(0, 0, 10, 10), Rect::from_xywh(50, 0, 10, 10)];
        let scored = score_image(&[det(0, 1.0), det(50, 2.0)], &truth, &[]);
        let results = summarize(scored, 2);
        assert_eq!(results.precision, 1.0);
        assert_eq!(results.recall, 1.0);
        assert_eq!(results.average_precision, 1.0);
    }

    #[test]
    fn one_truth_box_is_claimed_once() {
        let truth = vec![Rect::from_xywh(0, 0, 10, 10)];
        let scored = score_image(&[det(0, 1.0), det(1, 0.5)], &truth, &[]);
        let results = summarize(scored, 1);
        assert_eq!(results.precision, 0.5);
        assert_eq!(results.recall, 1.0);
    }

    #[test]
    fn detections_on_ignored_boxes_do_not_count() {
        let ignored = vec![Rect::from_xywh(50, 0, 10, 10)];
        let scored = score_image(&[det(50, 1.0)], &[], &ignored);
        assert!(scored.is_empty());
    }

    #[test]
    fn false_positive_ranked_first_lowers_average_precision() {
        let truth = vec![Rect::from_xywh(0, 0, 10, 10)];
        let scored = score_image(&[det(0, 1.0), det(100, 2.0)], &truth, &[]);
        let results = summarize(scored, 1);
        assert_eq!(results.average_precision, 0.5);
    }
}
