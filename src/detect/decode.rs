//! Detector post-processing: thresholded decode and non-maximum suppression.

use super::labels::LabelSet;
use super::result::BoundingBox;
use super::tensor::RawDetectionTensor;

/// Decode every anchor whose best class score exceeds `confidence_threshold`.
///
/// For each anchor the highest class score wins; on equal scores the lowest
/// class index is kept. Candidates with a corner outside [0, 1] (or no area)
/// are dropped silently. Output keeps anchor order.
pub fn decode(
    tensor: &RawDetectionTensor,
    confidence_threshold: f32,
    labels: &LabelSet,
) -> Vec<BoundingBox> {
    let mut boxes = Vec::new();
    let mut rejected_geometry = 0usize;

    for anchor in 0..tensor.num_anchors() {
        let mut best: Option<(usize, f32)> = None;
        for class_index in 0..tensor.num_classes() {
            let score = tensor.score(class_index, anchor);
            if !score.is_finite() {
                continue;
            }
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((class_index, score));
            }
        }

        let Some((class_index, confidence)) = best else {
            continue;
        };
        if confidence <= confidence_threshold {
            continue;
        }

        let [cx, cy, w, h] = tensor.geometry(anchor);
        let candidate =
            BoundingBox::from_center(cx, cy, w, h, confidence, class_index, labels.name(class_index));
        if !candidate.is_normalized() {
            rejected_geometry += 1;
            continue;
        }
        boxes.push(candidate);
    }

    if rejected_geometry > 0 {
        log::trace!(
            "decode: dropped {} candidates with out-of-range geometry",
            rejected_geometry
        );
    }
    boxes
}

/// Greedy non-maximum suppression.
///
/// Boxes are stably sorted by confidence (descending), so equal confidences
/// keep their input order. A box is kept unless it overlaps an already kept box
/// with IoU at or above `iou_threshold`. Applying this twice is a no-op.
pub fn suppress(mut boxes: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<BoundingBox> = Vec::with_capacity(boxes.len());
    for candidate in boxes {
        if kept
            .iter()
            .all(|selected| selected.iou(&candidate) < iou_threshold)
        {
            kept.push(candidate);
        }
    }
    kept
}
