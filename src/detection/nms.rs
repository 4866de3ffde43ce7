use crate::models::Detection;

/// Fraction of a box that, once covered by a kept box, suppresses it
const CONTAINMENT: f32 = 0.95;

/// Greedy non-maximum suppression, best score first.
///
/// A detection is dropped when its IoU with a kept detection exceeds
/// `iou_threshold`, or when one of the two boxes lies almost entirely inside
/// the other.
pub fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    if detections.len() < 2 {
        return detections;
    }

    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::new();
    for candidate in detections {
        let suppressed = keep.iter().any(|kept| {
            candidate.rect.iou(&kept.rect) > iou_threshold
                || candidate.rect.covered_by(&kept.rect) >= CONTAINMENT
                || kept.rect.covered_by(&candidate.rect) >= CONTAINMENT
        });
        if !suppressed {
            keep.push(candidate);
        }
    }

    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Rect;

    fn det(x: i32, y: i32, size: u32, score: f32) -> Detection {
        Detection {
            rect: Rect::from_xywh(x, y, size, size),
            score,
        }
    }

    #[test]
    fn keeps_best_of_overlapping_boxes() {
        let kept = nms(vec![det(0, 0, 40, 0.5), det(2, 2, 40, 1.5), det(4, 0, 40, 0.9)], 0.5);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].score, 1.5);
    }

    #[test]
    fn keeps_disjoint_boxes_in_score_order() {
        let kept = nms(vec![det(0, 0, 20, 0.2), det(100, 100, 20, 0.8)], 0.5);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].score, 0.8);
    }

    #[test]
    fn suppresses_box_nested_in_a_better_one() {
        let kept = nms(vec![det(0, 0, 100, 2.0), det(10, 10, 20, 1.0)], 0.5);
        assert_eq!(kept.len(), 1);
    }
}
