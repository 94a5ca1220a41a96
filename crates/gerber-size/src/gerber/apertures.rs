use std::collections::HashMap;
use std::rc::Rc;

use log::warn;

use crate::error::SizeError;
use crate::types::{BoundingBox, Point};

use super::commands::Command;
use super::macros::{self, MacroTable};

/// Concrete aperture geometry, positioned about the aperture origin.
#[derive(Debug, Clone, PartialEq)]
pub enum Aperture {
    Circle { radius: f64, center: Point },
    Polygon { points: Vec<Point> },
    Combination { subshapes: Vec<Aperture> },
    /// %AB: the stored commands are replayed each time the block is selected,
    /// under the selecting frame's rotation.
    Block { commands: Vec<Command> },
}

impl Aperture {
    /// Box about the origin after rotating by `rotation_deg` and scaling.
    ///
    /// `None` for blocks, whose box needs the interpreter, and for shapes
    /// with no points.
    pub fn bounds(&self, rotation_deg: f64, scaling: f64) -> Option<BoundingBox> {
        match self {
            Aperture::Circle { radius, center } => {
                let c = center.rotate(rotation_deg);
                let bbox = BoundingBox {
                    min_x: c.x - radius,
                    max_x: c.x + radius,
                    min_y: c.y - radius,
                    max_y: c.y + radius,
                };
                Some(bbox.scale(scaling))
            }
            Aperture::Polygon { points } => {
                BoundingBox::from_points(points.iter().map(|p| p.rotate(rotation_deg)))
                    .map(|b| b.scale(scaling))
            }
            Aperture::Combination { subshapes } => subshapes
                .iter()
                .filter_map(|s| s.bounds(rotation_deg, scaling))
                .reduce(BoundingBox::union),
            Aperture::Block { .. } => None,
        }
    }
}

/// Aperture table built from %AD and %AB commands.
#[derive(Debug, Default)]
pub struct ApertureTable {
    apertures: HashMap<u32, Rc<Aperture>>,
}

impl ApertureTable {
    pub fn define(&mut self, code: u32, aperture: Aperture) {
        self.apertures.insert(code, Rc::new(aperture));
    }

    pub fn get(&self, code: u32) -> Option<Rc<Aperture>> {
        self.apertures.get(&code).cloned()
    }
}

// ─── Builders ────────────────────────────────────────────────────────

/// Build the aperture for an %AD command.
///
/// Standard shapes are C, R, O and P; any other name must be a macro defined
/// earlier. Unknown shapes and missing modifiers are logged and give `Ok(None)`.
/// Arithmetic failures while instantiating a macro are returned.
pub fn build(
    shape: &str,
    modifiers: &[f64],
    macro_table: &MacroTable,
) -> Result<Option<Aperture>, SizeError> {
    let aperture = match (shape, modifiers) {
        ("C", &[diameter, ..]) => Aperture::Circle {
            radius: diameter.abs() / 2.0,
            center: Point::default(),
        },
        ("R", &[width, height, ..]) => rectangle(width / 2.0, height / 2.0),
        ("O", &[width, height, ..]) => obround(width, height),
        ("P", &[diameter, vertices, ref rest @ ..]) => {
            let Some(n) = macros::polygon_vertex_count(vertices) else {
                warn!("Gerber: polygon aperture with {vertices} vertices skipped");
                return Ok(None);
            };
            let rotation = rest.first().copied().unwrap_or(0.0);
            Aperture::Polygon {
                points: macros::regular_polygon(Point::default(), diameter / 2.0, n, rotation),
            }
        }
        ("C" | "R" | "O" | "P", _) => {
            warn!(
                "{}",
                SizeError::MalformedCommand(format!("AD {shape}: missing modifiers {modifiers:?}"))
            );
            return Ok(None);
        }
        (name, _) => match macro_table.get(name) {
            Some(mac) => macros::instantiate(mac, modifiers)?,
            None => {
                warn!("{}", SizeError::UnknownApertureShape(name.to_string()));
                return Ok(None);
            }
        },
    };
    Ok(Some(aperture))
}

fn rectangle(half_w: f64, half_h: f64) -> Aperture {
    Aperture::Polygon {
        points: vec![
            Point::new(half_w, half_h),
            Point::new(half_w, -half_h),
            Point::new(-half_w, -half_h),
            Point::new(-half_w, half_h),
        ],
    }
}

/// Two end circles on the long axis joined by a square, spanning exactly `width` x `height`.
fn obround(width: f64, height: f64) -> Aperture {
    let radius = width.min(height) / 2.0;
    let offset = (width - height).abs() / 2.0;
    let (dx, dy) = if width >= height {
        (offset, 0.0)
    } else {
        (0.0, offset)
    };
    Aperture::Combination {
        subshapes: vec![
            Aperture::Circle {
                radius,
                center: Point::new(dx, dy),
            },
            Aperture::Circle {
                radius,
                center: Point::new(-dx, -dy),
            },
            rectangle(radius, radius),
        ],
    }
}
