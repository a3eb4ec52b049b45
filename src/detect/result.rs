use serde::Serialize;

/// A labeled detection in normalized [0, 1] image coordinates.
///
/// Both corner form (`x1..y2`) and center form (`cx..h`) are kept because the
/// depth sampler reads the center while NMS and cropping read the corners.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub confidence: f32,
    pub class_index: usize,
    pub class_name: String,
}

impl BoundingBox {
    pub fn from_center(
        cx: f32,
        cy: f32,
        w: f32,
        h: f32,
        confidence: f32,
        class_index: usize,
        class_name: String,
    ) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
            cx,
            cy,
            w,
            h,
            confidence,
            class_index,
            class_name,
        }
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn intersection_area(&self, other: &BoundingBox) -> f32 {
        let left = self.x1.max(other.x1);
        let top = self.y1.max(other.y1);
        let right = self.x2.min(other.x2);
        let bottom = self.y2.min(other.y2);
        (right - left).max(0.0) * (bottom - top).max(0.0)
    }

    /// Intersection-over-Union of the two corner-form boxes.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let intersection = self.intersection_area(other);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            return 0.0;
        }
        intersection / union
    }

    /// True when every corner lies in [0, 1] and the box has positive extent.
    ///
    /// NaN coordinates fail every comparison and are rejected.
    pub fn is_normalized(&self) -> bool {
        let unit = 0.0..=1.0;
        unit.contains(&self.x1)
            && unit.contains(&self.y1)
            && unit.contains(&self.x2)
            && unit.contains(&self.y2)
            && self.x2 > self.x1
            && self.y2 > self.y1
    }
}
