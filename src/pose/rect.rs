use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle used for regions of interest and object boxes.
///
/// Stored in TLWH form: top-left x, top-left y, width, height. Region
/// coordinates are expected in the same space as the keypoints they are
/// tested against (normalized frame coordinates for most detectors).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Top-left x coordinate
    pub x: f64,
    /// Top-left y coordinate
    pub y: f64,
    /// Width of the rectangle
    pub width: f64,
    /// Height of the rectangle
    pub height: f64,
}

impl Rect {
    /// Create a new Rect from top-left coordinates and dimensions (TLWH format).
    #[inline]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a Rect from a detector bbox `[x, y, w, h]`.
    #[inline]
    pub fn from_bbox(bbox: [f64; 4]) -> Self {
        Self::new(bbox[0], bbox[1], bbox[2], bbox[3])
    }

    /// Get the center point of the rectangle.
    #[inline]
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Inclusive point containment.
    #[inline]
    pub fn contains(&self, px: f64, py: f64) -> bool {
        px >= self.x && px <= self.x + self.width && py >= self.y && py <= self.y + self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_center() {
        let rect = Rect::from_bbox([10.0, 20.0, 30.0, 40.0]);
        assert_eq!(rect, Rect::new(10.0, 20.0, 30.0, 40.0));
        assert_eq!(rect.center(), (25.0, 40.0));
    }

    #[test]
    fn test_contains_is_inclusive() {
        let roi = Rect::new(0.2, 0.2, 0.4, 0.4);
        assert!(roi.contains(0.2, 0.2));
        assert!(roi.contains(0.6, 0.6));
        assert!(roi.contains(0.4, 0.3));
        assert!(!roi.contains(0.61, 0.4));
        assert!(!roi.contains(0.4, 0.1));
    }
}
