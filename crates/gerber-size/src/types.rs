use serde::{Serialize, Serializer};

use crate::gerber::coord::Units;

const MM_PER_INCH: f64 = 25.4;

/// Round a float to N decimal places.
pub fn round_f64(v: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (v * factor).round() / factor
}

/// Wrapper that rounds f64 to 6 decimal places on serialization.
fn serialize_f64_rounded<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(round_f64(*v, 6))
}

// ─── Points ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Rotate around the origin by the given angle in degrees (counterclockwise).
    pub fn rotate(self, angle_deg: f64) -> Self {
        if angle_deg == 0.0 {
            return self;
        }
        let (sin_a, cos_a) = angle_deg.to_radians().sin_cos();
        Self {
            x: self.x * cos_a - self.y * sin_a,
            y: self.x * sin_a + self.y * cos_a,
        }
    }
}

// ─── Bounding Box ────────────────────────────────────────────────────

/// Axis-aligned box. A box only exists once something contributed to it;
/// "no geometry yet" is `Option::<BoundingBox>::None`, never a zero box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Degenerate box holding a single point.
    pub fn at(p: Point) -> Self {
        Self {
            min_x: p.x,
            max_x: p.x,
            min_y: p.y,
            max_y: p.y,
        }
    }

    pub fn from_points<I: IntoIterator<Item = Point>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let mut bbox = Self::at(iter.next()?);
        for p in iter {
            bbox.include_point(p);
        }
        Some(bbox)
    }

    pub fn include_point(&mut self, p: Point) {
        self.min_x = self.min_x.min(p.x);
        self.max_x = self.max_x.max(p.x);
        self.min_y = self.min_y.min(p.y);
        self.max_y = self.max_y.max(p.y);
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            max_x: self.max_x.max(other.max_x),
            min_y: self.min_y.min(other.min_y),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn translate(self, dx: f64, dy: f64) -> Self {
        Self {
            min_x: self.min_x + dx,
            max_x: self.max_x + dx,
            min_y: self.min_y + dy,
            max_y: self.max_y + dy,
        }
    }

    /// Scale about the origin. A negative factor flips the axis, so min/max are re-sorted.
    pub fn scale(self, factor: f64) -> Self {
        let (x0, x1) = (self.min_x * factor, self.max_x * factor);
        let (y0, y1) = (self.min_y * factor, self.max_y * factor);
        Self {
            min_x: x0.min(x1),
            max_x: x0.max(x1),
            min_y: y0.min(y1),
            max_y: y0.max(y1),
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// Grow `target` by `other`, creating it on first contribution.
pub fn extend(target: &mut Option<BoundingBox>, other: BoundingBox) {
    *target = Some(match *target {
        Some(current) => current.union(other),
        None => other,
    });
}

// ─── Size result ─────────────────────────────────────────────────────

/// Final extent of one Gerber file, in the file's declared units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeResult {
    /// Width.
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub x: f64,
    /// Height.
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub y: f64,
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub min_x: f64,
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub max_x: f64,
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub min_y: f64,
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub max_y: f64,
    pub units: Units,
}

impl SizeResult {
    pub fn to_millimeters(self) -> Self {
        match self.units {
            Units::Millimeters => self,
            Units::Inches => Self {
                x: self.x * MM_PER_INCH,
                y: self.y * MM_PER_INCH,
                min_x: self.min_x * MM_PER_INCH,
                max_x: self.max_x * MM_PER_INCH,
                min_y: self.min_y * MM_PER_INCH,
                max_y: self.max_y * MM_PER_INCH,
                units: Units::Millimeters,
            },
        }
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x,
            max_x: self.max_x,
            min_y: self.min_y,
            max_y: self.max_y,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_round_f64() {
        assert_abs_diff_eq!(round_f64(1.23456789, 6), 1.234568, epsilon = 1e-12);
    }

    #[test]
    fn test_rotate_point_90() {
        let p = Point::new(1.0, 0.0).rotate(90.0);
        assert_abs_diff_eq!(p.x, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.y, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_from_points_empty() {
        assert!(BoundingBox::from_points(Vec::new()).is_none());
    }

    #[test]
    fn test_extend_creates_then_grows() {
        let mut bbox = None;
        extend(&mut bbox, BoundingBox::at(Point::new(1.0, 1.0)));
        extend(&mut bbox, BoundingBox::at(Point::new(-2.0, 3.0)));
        assert_eq!(
            bbox,
            Some(BoundingBox {
                min_x: -2.0,
                max_x: 1.0,
                min_y: 1.0,
                max_y: 3.0,
            })
        );
    }

    #[test]
    fn test_negative_scale_resorts() {
        let b = BoundingBox {
            min_x: 1.0,
            max_x: 2.0,
            min_y: -1.0,
            max_y: 0.5,
        }
        .scale(-2.0);
        assert_eq!(b.min_x, -4.0);
        assert_eq!(b.max_x, -2.0);
        assert_eq!(b.min_y, -1.0);
        assert_eq!(b.max_y, 2.0);
    }

    #[test]
    fn test_inches_to_millimeters() {
        let size = SizeResult {
            x: 1.0,
            y: 2.0,
            min_x: 0.0,
            max_x: 1.0,
            min_y: -1.0,
            max_y: 1.0,
            units: Units::Inches,
        }
        .to_millimeters();
        assert_eq!(size.units, Units::Millimeters);
        assert_abs_diff_eq!(size.x, 25.4, epsilon = 1e-9);
        assert_abs_diff_eq!(size.min_y, -25.4, epsilon = 1e-9);
    }

    #[test]
    fn test_serialize_field_names() {
        let size = SizeResult {
            x: 12.0,
            y: 2.0,
            min_x: -1.0,
            max_x: 11.0,
            min_y: -1.0,
            max_y: 1.0,
            units: Units::Millimeters,
        };
        let json = serde_json::to_string(&size).unwrap();
        assert_eq!(
            json,
            r#"{"x":12.0,"y":2.0,"minX":-1.0,"maxX":11.0,"minY":-1.0,"maxY":1.0,"units":"millimeters"}"#
        );
    }
}
