//! Geometric reconciliation of bounding boxes reported by different processors.

use std::cmp::Ordering;

use super::types::BoundingBox;

/// Intersection-over-union of two boxes, `0.0` when either is degenerate.
pub fn overlap_ratio(left: &BoundingBox, right: &BoundingBox) -> f64 {
    let width = left.right().min(right.right()) - left.x.max(right.x);
    let height = left.bottom().min(right.bottom()) - left.y.max(right.y);
    if width <= 0.0 || height <= 0.0 {
        return 0.0;
    }
    let intersection = width * height;
    let union = left.area() + right.area() - intersection;
    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Compare two boxes top-to-bottom, then left-to-right.
pub fn reading_order(left: &BoundingBox, right: &BoundingBox) -> Ordering {
    left.y
        .total_cmp(&right.y)
        .then_with(|| left.x.total_cmp(&right.x))
}

/// Corner-wise arithmetic mean of the supplied boxes (not their union extent).
pub fn mean_box(boxes: &[BoundingBox]) -> Option<BoundingBox> {
    if boxes.is_empty() {
        return None;
    }
    let count = boxes.len() as f64;
    let (mut left, mut top, mut right, mut bottom) = (0.0, 0.0, 0.0, 0.0);
    for bbox in boxes {
        left += bbox.x;
        top += bbox.y;
        right += bbox.right();
        bottom += bbox.bottom();
    }
    let (left, top, right, bottom) = (left / count, top / count, right / count, bottom / count);
    Some(BoundingBox::new(left, top, right - left, bottom - top))
}

#[derive(Debug)]
struct BoxCluster {
    sources: Vec<usize>,
    members: Vec<BoundingBox>,
    mean: BoundingBox,
}

impl BoxCluster {
    fn new(source: usize, bbox: BoundingBox) -> Self {
        Self {
            sources: vec![source],
            members: vec![bbox],
            mean: bbox,
        }
    }

    fn absorb(&mut self, source: usize, bbox: BoundingBox) {
        self.sources.push(source);
        self.members.push(bbox);
        if let Some(mean) = mean_box(&self.members) {
            self.mean = mean;
        }
    }
}

/// Merge boxes from several sources.
///
/// `sources` is visited in order (callers pass highest confidence first). A box joins the
/// existing cluster it overlaps most, provided the overlap reaches `threshold` and the
/// cluster holds no box from the same source; otherwise it starts a new cluster. The
/// resulting boxes are returned in reading order.
pub fn reconcile_boxes(sources: &[&[BoundingBox]], threshold: f64) -> Vec<BoundingBox> {
    let mut clusters: Vec<BoxCluster> = Vec::new();

    for (source, boxes) in sources.iter().enumerate() {
        for bbox in boxes.iter() {
            let candidate = clusters
                .iter()
                .enumerate()
                .filter(|(_, cluster)| !cluster.sources.contains(&source))
                .map(|(index, cluster)| (index, overlap_ratio(&cluster.mean, bbox)))
                .filter(|(_, ratio)| *ratio >= threshold && *ratio > 0.0)
                .fold(None::<(usize, f64)>, |best, (index, ratio)| match best {
                    Some((_, best_ratio)) if best_ratio >= ratio => best,
                    _ => Some((index, ratio)),
                });

            match candidate {
                Some((index, _)) => clusters[index].absorb(source, *bbox),
                None => clusters.push(BoxCluster::new(source, *bbox)),
            }
        }
    }

    let mut merged: Vec<BoundingBox> = clusters.into_iter().map(|cluster| cluster.mean).collect();
    merged.sort_by(reading_order);
    merged
}
