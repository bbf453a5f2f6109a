//! Bounding-box normalization: any supported box shape → a pixel rectangle
//! clamped to the image.
//!
//! Boxes reach us from layout models and from hand-written fixtures, so they
//! come in two shapes (origin + size, or two corners) and two unit systems
//! (fractions of the page, or pixels of some rendering). Units are inferred:
//! if every value is ≤ 1 the box is fractional. A genuine sub-pixel box is
//! therefore read as fractional; that ambiguity is accepted.

use serde::{Deserialize, Serialize};

/// Minimum width and height of a normalized rectangle, in pixels.
pub const MIN_REGION_PX: u32 = 10;

/// A bounding box as supplied by the caller. Never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BoundingBox {
    /// Two corner points.
    Corners { x1: f64, y1: f64, x2: f64, y2: f64 },
    /// Origin plus size.
    Origin {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
}

impl BoundingBox {
    pub fn origin(x: f64, y: f64, width: f64, height: f64) -> Self {
        BoundingBox::Origin {
            x,
            y,
            width,
            height,
        }
    }

    pub fn corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        BoundingBox::Corners { x1, y1, x2, y2 }
    }

    /// `(x, y, width, height)` in the box's own units.
    fn as_origin_size(&self) -> (f64, f64, f64, f64) {
        match *self {
            BoundingBox::Origin {
                x,
                y,
                width,
                height,
            } => (x, y, width, height),
            BoundingBox::Corners { x1, y1, x2, y2 } => {
                (x1.min(x2), y1.min(y2), (x2 - x1).abs(), (y2 - y1).abs())
            }
        }
    }
}

/// A rectangle in integer pixels, guaranteed to lie inside its image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CanonicalRect {
    /// True if the rectangle lies entirely within a `width × height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x as u64 + self.width as u64 <= width as u64
            && self.y as u64 + self.height as u64 <= height as u64
    }
}

/// Normalize `bbox` against an image of `image_width × image_height` pixels.
///
/// Steps: corners → origin + size; fractional boxes (all values ≤ 1) are
/// scaled to pixels; the origin is clamped into the image; the size is
/// clamped to the image edge; finally each side is expanded to at least
/// [`MIN_REGION_PX`], moving the origin back when the box sits against the
/// far edge. Images narrower than the floor yield the full image width.
pub fn normalize(bbox: &BoundingBox, image_width: u32, image_height: u32) -> CanonicalRect {
    let (x, y, w, h) = bbox.as_origin_size();
    let (x, y, w, h) = (finite(x), finite(y), finite(w), finite(h));

    let fractional = x <= 1.0 && y <= 1.0 && w <= 1.0 && h <= 1.0;
    let (x, y, w, h) = if fractional {
        let (iw, ih) = (image_width as f64, image_height as f64);
        (x * iw, y * ih, w * iw, h * ih)
    } else {
        (x, y, w, h)
    };

    let (x, width) = clamp_axis(x, w, image_width);
    let (y, height) = clamp_axis(y, h, image_height);
    CanonicalRect {
        x,
        y,
        width,
        height,
    }
}

/// Clamp one axis: origin into `[0, extent]`, length to the edge, then the
/// floor.
fn clamp_axis(origin: f64, length: f64, extent: u32) -> (u32, u32) {
    let extent_f = extent as f64;
    let origin = origin.round().clamp(0.0, extent_f) as u32;
    let length = length.round().clamp(0.0, extent_f) as u32;
    let length = length.min(extent - origin);

    let floored = length.max(MIN_REGION_PX).min(extent);
    let origin = origin.min(extent - floored);
    (origin, floored)
}

fn finite(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractional_box_scales_to_pixels() {
        let r = normalize(&BoundingBox::origin(0.1, 0.2, 0.5, 0.3), 1000, 800);
        assert_eq!(
            r,
            CanonicalRect {
                x: 100,
                y: 160,
                width: 500,
                height: 240
            }
        );
    }

    #[test]
    fn corner_form_is_equivalent() {
        let a = normalize(&BoundingBox::origin(0.1, 0.2, 0.5, 0.3), 1000, 800);
        let b = normalize(&BoundingBox::corners(0.1, 0.2, 0.6, 0.5), 1000, 800);
        assert_eq!(a, b);
    }

    #[test]
    fn swapped_corners_are_reordered() {
        let a = normalize(&BoundingBox::corners(600.0, 400.0, 100.0, 100.0), 1000, 800);
        assert_eq!(
            a,
            CanonicalRect {
                x: 100,
                y: 100,
                width: 500,
                height: 300
            }
        );
    }

    #[test]
    fn pixel_box_passes_through() {
        let r = normalize(&BoundingBox::origin(50.0, 60.0, 200.0, 100.0), 1000, 800);
        assert_eq!(
            r,
            CanonicalRect {
                x: 50,
                y: 60,
                width: 200,
                height: 100
            }
        );
    }

    #[test]
    fn overflowing_box_is_clamped_to_edge() {
        let r = normalize(&BoundingBox::origin(900.0, 700.0, 500.0, 500.0), 1000, 800);
        assert_eq!(r.x + r.width, 1000);
        assert_eq!(r.y + r.height, 800);
        assert_eq!(r.width, 100);
    }

    #[test]
    fn tiny_box_expands_to_floor() {
        let r = normalize(&BoundingBox::origin(10.0, 10.0, 2.0, 3.0), 1000, 800);
        assert_eq!(r.width, MIN_REGION_PX);
        assert_eq!(r.height, MIN_REGION_PX);
        assert_eq!((r.x, r.y), (10, 10));
    }

    #[test]
    fn floor_at_far_edge_moves_origin_back() {
        let r = normalize(&BoundingBox::origin(998.0, 799.0, 50.0, 50.0), 1000, 800);
        assert_eq!(r.width, MIN_REGION_PX);
        assert_eq!(r.height, MIN_REGION_PX);
        assert!(r.fits_within(1000, 800));
    }

    #[test]
    fn sub_pixel_box_is_read_as_fractional() {
        let r = normalize(&BoundingBox::origin(0.0, 0.0, 0.5, 0.5), 1000, 800);
        assert_eq!(r.width, 500);
        assert_eq!(r.height, 400);
    }

    #[test]
    fn rect_invariant_holds_across_inputs() {
        let values = [
            -50.0,
            -0.5,
            0.0,
            0.05,
            0.5,
            1.0,
            1.5,
            9.0,
            250.0,
            999.0,
            5000.0,
            f64::NAN,
            f64::INFINITY,
        ];
        let sizes = [(1000u32, 800u32), (10, 10), (37, 2400)];
        for &(iw, ih) in &sizes {
            for &a in &values {
                for &b in &values {
                    for bbox in [
                        BoundingBox::origin(a, b, b, a),
                        BoundingBox::origin(b, a, a, a),
                        BoundingBox::corners(a, b, b, a),
                    ] {
                        let r = normalize(&bbox, iw, ih);
                        assert!(r.fits_within(iw, ih), "{bbox:?} on {iw}x{ih} → {r:?}");
                        assert!(r.width >= MIN_REGION_PX, "{bbox:?} → {r:?}");
                        assert!(r.height >= MIN_REGION_PX, "{bbox:?} → {r:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn image_smaller_than_floor_uses_full_extent() {
        let r = normalize(&BoundingBox::origin(0.0, 0.0, 1.0, 1.0), 4, 6);
        assert_eq!(
            r,
            CanonicalRect {
                x: 0,
                y: 0,
                width: 4,
                height: 6
            }
        );
    }

    #[test]
    fn deserializes_both_shapes() {
        let a: BoundingBox =
            serde_json::from_str(r#"{"x": 0.1, "y": 0.2, "width": 0.5, "height": 0.3}"#).unwrap();
        let b: BoundingBox =
            serde_json::from_str(r#"{"x1": 0.1, "y1": 0.2, "x2": 0.6, "y2": 0.5}"#).unwrap();
        assert!(matches!(a, BoundingBox::Origin { .. }));
        assert!(matches!(b, BoundingBox::Corners { .. }));
    }
}
