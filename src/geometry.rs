//! Page-space rectangles.
//!
//! All boxes use PDF points with a **top-left** origin: `y0` is the top edge,
//! `y1` the bottom edge, and `y` grows downwards. Both page sources (lopdf
//! content streams and pdfium text runs) convert into this space at the
//! boundary so every downstream stage compares like with like.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in top-left-origin page points.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    /// Build a rect from two corners in any order.
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// The full page box.
    pub fn page(width: f32, height: f32) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    /// Smallest rect containing all `points`, or `None` when empty.
    pub fn bounding(points: impl IntoIterator<Item = (f32, f32)>) -> Option<Self> {
        let mut it = points.into_iter();
        let (x, y) = it.next()?;
        let mut r = Rect { x0: x, y0: y, x1: x, y1: y };
        for (x, y) in it {
            r.x0 = r.x0.min(x);
            r.y0 = r.y0.min(y);
            r.x1 = r.x1.max(x);
            r.y1 = r.y1.max(y);
        }
        Some(r)
    }

    pub fn width(&self) -> f32 {
        (self.x1 - self.x0).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y1 - self.y0).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let r = Rect {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        };
        (!r.is_empty()).then_some(r)
    }

    /// Intersection over union; 0 for disjoint or degenerate boxes.
    pub fn iou(&self, other: &Rect) -> f32 {
        let inter = self.intersection(other).map(|r| r.area()).unwrap_or(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Width of the shared horizontal span divided by the narrower width.
    pub fn horizontal_overlap_ratio(&self, other: &Rect) -> f32 {
        let overlap = (self.x1.min(other.x1) - self.x0.max(other.x0)).max(0.0);
        let narrower = self.width().min(other.width());
        if narrower <= 0.0 {
            0.0
        } else {
            overlap / narrower
        }
    }

    /// Grow by `margin` on every side.
    pub fn expand(&self, margin: f32) -> Rect {
        Rect {
            x0: self.x0 - margin,
            y0: self.y0 - margin,
            x1: self.x1 + margin,
            y1: self.y1 + margin,
        }
    }

    /// Clamp into `bounds`. The result may be empty.
    pub fn clamp_to(&self, bounds: &Rect) -> Rect {
        Rect {
            x0: self.x0.clamp(bounds.x0, bounds.x1),
            y0: self.y0.clamp(bounds.y0, bounds.y1),
            x1: self.x1.clamp(bounds.x0, bounds.x1),
            y1: self.y1.clamp(bounds.y0, bounds.y1),
        }
    }

    /// Distance between the boxes along both axes; 0 on an axis where they overlap.
    pub fn gap(&self, other: &Rect) -> (f32, f32) {
        let dx = (other.x0 - self.x1).max(self.x0 - other.x1).max(0.0);
        let dy = (other.y0 - self.y1).max(self.y0 - other.y1).max(0.0);
        (dx, dy)
    }

    /// Round to two decimals for stable serialisation.
    pub fn rounded(&self) -> Rect {
        let r = |v: f32| (v * 100.0).round() / 100.0;
        Rect {
            x0: r(self.x0),
            y0: r(self.y0),
            x1: r(self.x1),
            y1: r(self.y1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_normalises_corners() {
        let r = Rect::new(10.0, 50.0, 0.0, 20.0);
        assert_eq!(r, Rect { x0: 0.0, y0: 20.0, x1: 10.0, y1: 50.0 });
        assert_eq!(r.area(), 300.0);
    }

    #[test]
    fn iou_of_identical_and_disjoint() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(20.0, 20.0, 30.0, 30.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn iou_of_half_overlap() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 0.0, 15.0, 10.0);
        // inter 50, union 150
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn horizontal_overlap_uses_narrower_width() {
        let wide = Rect::new(0.0, 0.0, 300.0, 10.0);
        let narrow = Rect::new(100.0, 50.0, 200.0, 60.0);
        assert_eq!(wide.horizontal_overlap_ratio(&narrow), 1.0);
        let other_column = Rect::new(320.0, 0.0, 500.0, 10.0);
        assert_eq!(wide.horizontal_overlap_ratio(&other_column), 0.0);
    }

    #[test]
    fn clamp_and_gap() {
        let page = Rect::page(100.0, 200.0);
        let r = Rect::new(-5.0, 190.0, 50.0, 260.0).clamp_to(&page);
        assert_eq!(r, Rect::new(0.0, 190.0, 50.0, 200.0));

        let above = Rect::new(0.0, 0.0, 10.0, 10.0);
        let below = Rect::new(0.0, 30.0, 10.0, 40.0);
        assert_eq!(above.gap(&below), (0.0, 20.0));
    }

    #[test]
    fn bounding_of_points() {
        assert!(Rect::bounding(std::iter::empty()).is_none());
        let r = Rect::bounding([(3.0, 4.0), (-1.0, 8.0), (2.0, 0.0)]).unwrap();
        assert_eq!(r, Rect::new(-1.0, 0.0, 3.0, 8.0));
    }
}
