use std::f64::consts::{FRAC_PI_2, TAU};
use std::io::Read;

use log::{debug, warn};

use crate::error::SizeError;
use crate::types::{extend, BoundingBox, Point, SizeResult};

use super::apertures::{self, Aperture, ApertureTable};
use super::commands::{Command, Interpolation, Mirror, Parser};
use super::coord::Units;
use super::macros::{ApertureMacro, MacroTable};

/// Limit on nested %SR, %AB and G36 blocks in the parser, and on block
/// apertures selecting other blocks; deeper block chains are treated as cycles.
pub const MAX_BLOCK_DEPTH: usize = 64;

/// Measure the extent of one Gerber stream.
pub fn measure<R: Read>(reader: R) -> Result<SizeResult, SizeError> {
    SizeEngine::default().measure(reader)
}

/// The aperture currently selected in a frame, with its box already
/// transformed by the frame's rotation, scaling and mirroring.
#[derive(Debug, Clone, PartialEq)]
struct SelectedAperture {
    code: u32,
    bounds: Option<BoundingBox>,
}

/// Interpreter state for one nesting level: the file itself, a contour,
/// a step-repeat body, or a block aperture being replayed.
#[derive(Debug, Clone)]
struct Frame {
    pos_x: Option<f64>,
    pos_y: Option<f64>,
    aperture: Option<SelectedAperture>,
    rotation: f64,
    scaling: f64,
    mirror: Mirror,
    interpolation: Interpolation,
    bbox: Option<BoundingBox>,
}

impl Frame {
    fn root() -> Self {
        Self {
            pos_x: Some(0.0),
            pos_y: Some(0.0),
            aperture: None,
            rotation: 0.0,
            scaling: 1.0,
            mirror: Mirror::N,
            interpolation: Interpolation::Linear,
            bbox: None,
        }
    }

    /// Fresh frame that only inherits the selected aperture and the rotation.
    fn child(&self) -> Self {
        Self {
            aperture: self.aperture.clone(),
            rotation: self.rotation,
            ..Self::root()
        }
    }

    /// Current point. An undefined coordinate (after a step-repeat) reads as 0.
    fn position(&self) -> Point {
        if self.pos_x.is_none() || self.pos_y.is_none() {
            warn!("Gerber: current point is undefined, using 0");
        }
        Point::new(self.pos_x.unwrap_or(0.0), self.pos_y.unwrap_or(0.0))
    }

    fn move_to(&mut self, x: Option<f64>, y: Option<f64>) {
        if x.is_some() {
            self.pos_x = x;
        }
        if y.is_some() {
            self.pos_y = y;
        }
    }

    /// Box of the selected aperture placed at `p`. With nothing selected the
    /// point alone counts.
    fn aperture_box_at(&self, p: Point) -> BoundingBox {
        match self.aperture.as_ref().and_then(|a| a.bounds) {
            Some(b) => b.translate(p.x, p.y),
            None => BoundingBox::at(p),
        }
    }

    fn contribute(&mut self, bbox: BoundingBox) {
        extend(&mut self.bbox, bbox);
    }
}

enum Flow {
    Continue,
    Stop,
}

/// Bounding-box interpreter.
///
/// Owns everything that is file-wide: apertures, macros, units and the
/// final %SF / %OF transform. Per-level state lives in [`Frame`].
#[derive(Debug)]
pub struct SizeEngine {
    apertures: ApertureTable,
    macro_table: MacroTable,
    units: Units,
    scale_factor: (f64, f64),
    offset: (f64, f64),
}

impl Default for SizeEngine {
    fn default() -> Self {
        Self {
            apertures: ApertureTable::default(),
            macro_table: MacroTable::default(),
            units: Units::default(),
            scale_factor: (1.0, 1.0),
            offset: (0.0, 0.0),
        }
    }
}

impl SizeEngine {
    /// Run the whole stream and return the final extent.
    pub fn measure<R: Read>(mut self, reader: R) -> Result<SizeResult, SizeError> {
        let mut parser = Parser::new(reader);
        let mut frame = Frame::root();
        while let Some(cmd) = parser.next_command()? {
            if let Flow::Stop = self.execute(&cmd, &mut frame, 0)? {
                debug!("Gerber: end of file command");
                break;
            }
        }
        self.finish(frame.bbox)
    }

    fn finish(&self, bbox: Option<BoundingBox>) -> Result<SizeResult, SizeError> {
        let b = bbox.ok_or(SizeError::NoGeometry)?;
        let (sa, sb) = self.scale_factor;
        let (oa, ob) = self.offset;
        Ok(SizeResult {
            x: b.width() * sa,
            y: b.height() * sb,
            min_x: b.min_x * sa + oa,
            max_x: b.max_x * sa + oa,
            min_y: b.min_y * sb + ob,
            max_y: b.max_y * sb + ob,
            units: self.units,
        })
    }

    fn execute(&mut self, cmd: &Command, frame: &mut Frame, depth: usize) -> Result<Flow, SizeError> {
        match cmd {
            Command::Name(_)
            | Command::Comment(_)
            | Command::Polarity(_)
            | Command::Precision(_)
            | Command::InterpolationMode(_)
            | Command::FileAttribute { .. }
            | Command::ApertureAttribute(_)
            | Command::AttributeDelete(_)
            | Command::ObjectAttribute(_) => {}
            Command::Move { x, y } => frame.move_to(*x, *y),
            Command::Draw { x, y, i, j } => draw(frame, *x, *y, *i, *j),
            Command::Flash { x, y } => {
                frame.move_to(*x, *y);
                let bbox = frame.aperture_box_at(frame.position());
                frame.contribute(bbox);
            }
            Command::DefineAperture { .. } | Command::ApertureMacro { .. } => self.define(cmd)?,
            Command::BlockAperture { dcode, body } => self.define_block(*dcode, body)?,
            Command::ApplyAperture(code) => self.select_aperture(frame, *code, depth)?,
            Command::Repeat { x, y, i, j, body } => {
                let mut child = frame.child();
                self.run_body(body, &mut child, depth)?;
                if let Some(b) = child.bbox {
                    let span = b.translate(
                        x.saturating_sub(1) as f64 * i,
                        y.saturating_sub(1) as f64 * j,
                    );
                    frame.contribute(b.union(span));
                }
                frame.aperture = child.aperture;
                frame.pos_x = None;
                frame.pos_y = None;
            }
            Command::Contour { body } => self.contour(frame, body, depth)?,
            Command::Interpolation(mode) => frame.interpolation = *mode,
            Command::Units(units) => self.units = *units,
            Command::Mirroring(mirror) => {
                frame.mirror = *mirror;
                self.reselect(frame, depth)?;
            }
            Command::Rotation(degrees) => {
                frame.rotation = *degrees;
                self.reselect(frame, depth)?;
            }
            Command::Scaling(factor) => {
                frame.scaling = *factor;
                self.reselect(frame, depth)?;
            }
            Command::ScaleFactor { a, b } => self.scale_factor = (*a, *b),
            Command::Offset { a, b } => self.offset = (*a, *b),
            Command::End => return Ok(Flow::Stop),
        }
        Ok(Flow::Continue)
    }

    fn run_body(&mut self, body: &[Command], frame: &mut Frame, depth: usize) -> Result<(), SizeError> {
        for cmd in body {
            if let Flow::Stop = self.execute(cmd, frame, depth)? {
                break;
            }
        }
        Ok(())
    }

    // ─── Definitions ─────────────────────────────────────────────────

    fn define(&mut self, cmd: &Command) -> Result<(), SizeError> {
        match cmd {
            Command::DefineAperture {
                dcode,
                shape,
                modifiers,
            } => {
                if let Some(aperture) = apertures::build(shape, modifiers, &self.macro_table)? {
                    self.apertures.define(*dcode, aperture);
                }
            }
            Command::ApertureMacro { name, primitives } => {
                self.macro_table.define(
                    name.clone(),
                    ApertureMacro {
                        name: name.clone(),
                        primitives: primitives.clone(),
                    },
                );
            }
            _ => {}
        }
        Ok(())
    }

    /// Register a block aperture. Apertures defined inside it become usable
    /// right away, ahead of the block's first use.
    fn define_block(&mut self, dcode: u32, body: &[Command]) -> Result<(), SizeError> {
        for cmd in body {
            match cmd {
                Command::DefineAperture { .. } | Command::ApertureMacro { .. } => self.define(cmd)?,
                Command::BlockAperture { dcode, body } => self.define_block(*dcode, body)?,
                _ => {}
            }
        }
        self.apertures.define(
            dcode,
            Aperture::Block {
                commands: body.to_vec(),
            },
        );
        Ok(())
    }

    // ─── Aperture selection ──────────────────────────────────────────

    fn select_aperture(&mut self, frame: &mut Frame, code: u32, depth: usize) -> Result<(), SizeError> {
        let aperture = self
            .apertures
            .get(code)
            .ok_or(SizeError::UndefinedAperture(code))?;
        let bounds = match aperture.as_ref() {
            Aperture::Block { commands } => self.block_bounds(commands, frame, depth + 1)?,
            shape => shape.bounds(frame.rotation, frame.scaling),
        };
        frame.aperture = Some(SelectedAperture {
            code,
            bounds: bounds.map(|b| mirrored(b, frame.mirror)),
        });
        Ok(())
    }

    /// Re-derive the selected aperture's box after a transform changed.
    fn reselect(&mut self, frame: &mut Frame, depth: usize) -> Result<(), SizeError> {
        match frame.aperture.as_ref().map(|a| a.code) {
            Some(code) => self.select_aperture(frame, code, depth),
            None => Ok(()),
        }
    }

    /// Replay a block aperture in block-local coordinates, rotated by the
    /// selecting frame's rotation, and return its box scaled by that frame.
    fn block_bounds(
        &mut self,
        commands: &[Command],
        frame: &Frame,
        depth: usize,
    ) -> Result<Option<BoundingBox>, SizeError> {
        if depth > MAX_BLOCK_DEPTH {
            return Err(SizeError::NestingTooDeep(MAX_BLOCK_DEPTH));
        }

        let mut local = frame.child();
        for cmd in commands {
            let rotated = rotate_operation(cmd, &local, frame.rotation);
            if let Flow::Stop = self.execute(rotated.as_ref().unwrap_or(cmd), &mut local, depth)? {
                break;
            }
        }
        Ok(local.bbox.map(|b| b.scale(frame.scaling)))
    }

    fn contour(&mut self, frame: &mut Frame, body: &[Command], depth: usize) -> Result<(), SizeError> {
        // Contour edges have no width: the aperture is kept selected but contributes no extent.
        let mut local = frame.clone();
        local.bbox = None;
        if let Some(selected) = local.aperture.as_mut() {
            selected.bounds = None;
        }

        self.run_body(body, &mut local, depth)?;

        let aperture = frame.aperture.take();
        let outer = frame.bbox;
        *frame = local;
        frame.aperture = aperture;
        if let Some(b) = outer {
            frame.contribute(b);
        }
        Ok(())
    }
}

// ─── Geometry ────────────────────────────────────────────────────────

fn draw(frame: &mut Frame, x: Option<f64>, y: Option<f64>, i: f64, j: f64) {
    let start = frame.position();
    let end = Point::new(x.unwrap_or(start.x), y.unwrap_or(start.y));

    let mut points = vec![start, end];
    let center = Point::new(start.x + i, start.y + j);
    match frame.interpolation {
        Interpolation::Linear => {}
        Interpolation::ClockwiseArc => points.extend(arc_extrema(start, end, center, true)),
        Interpolation::CounterClockwiseArc => {
            points.extend(arc_extrema(start, end, center, false))
        }
    }

    for p in points {
        let bbox = frame.aperture_box_at(p);
        frame.contribute(bbox);
    }
    frame.pos_x = Some(end.x);
    frame.pos_y = Some(end.y);
}

/// Cardinal points (0, 90, 180, 270 degrees) swept by an arc from `start`
/// to `end` about `center`. Equal start and end angles mean a full circle,
/// whatever the quadrant mode (G74/G75).
fn arc_extrema(start: Point, end: Point, center: Point, clockwise: bool) -> Vec<Point> {
    let radius = (start.x - center.x).hypot(start.y - center.y);
    let mut start_angle = (start.y - center.y).atan2(start.x - center.x);
    let mut end_angle = (end.y - center.y).atan2(end.x - center.x);

    if start_angle == end_angle {
        return (0..4).map(|k| cardinal_point(center, radius, k)).collect();
    }

    let (lo, hi) = if clockwise {
        if start_angle < end_angle {
            start_angle += TAU;
        }
        (end_angle, start_angle)
    } else {
        if end_angle < start_angle {
            end_angle += TAU;
        }
        (start_angle, end_angle)
    };

    (-4..=8)
        .filter(|k| {
            let angle = *k as f64 * FRAC_PI_2;
            angle > lo && angle < hi
        })
        .map(|k| cardinal_point(center, radius, k))
        .collect()
}

fn cardinal_point(center: Point, radius: f64, quarter_turns: i32) -> Point {
    match quarter_turns.rem_euclid(4) {
        0 => Point::new(center.x + radius, center.y),
        1 => Point::new(center.x, center.y + radius),
        2 => Point::new(center.x - radius, center.y),
        _ => Point::new(center.x, center.y - radius),
    }
}

/// Mirror an aperture box about the origin.
fn mirrored(b: BoundingBox, mirror: Mirror) -> BoundingBox {
    let flip_x = |b: BoundingBox| BoundingBox {
        min_x: -b.max_x,
        max_x: -b.min_x,
        ..b
    };
    let flip_y = |b: BoundingBox| BoundingBox {
        min_y: -b.max_y,
        max_y: -b.min_y,
        ..b
    };
    match mirror {
        Mirror::N => b,
        Mirror::X => flip_x(b),
        Mirror::Y => flip_y(b),
        Mirror::XY => flip_y(flip_x(b)),
    }
}

/// Rotate a block-local operation into the selecting frame's orientation.
///
/// An omitted coordinate keeps the block-local current point, which is the
/// frame position rotated back. Returns `None` for anything but D01/D02/D03.
fn rotate_operation(cmd: &Command, frame: &Frame, rotation: f64) -> Option<Command> {
    if !matches!(cmd, Command::Move { .. } | Command::Draw { .. } | Command::Flash { .. }) {
        return None;
    }
    let local = frame.position().rotate(-rotation);
    let place = |x: Option<f64>, y: Option<f64>| {
        let p = Point::new(x.unwrap_or(local.x), y.unwrap_or(local.y)).rotate(rotation);
        (Some(p.x), Some(p.y))
    };

    match *cmd {
        Command::Move { x, y } => {
            let (x, y) = place(x, y);
            Some(Command::Move { x, y })
        }
        Command::Flash { x, y } => {
            let (x, y) = place(x, y);
            Some(Command::Flash { x, y })
        }
        Command::Draw { x, y, i, j } => {
            let (x, y) = place(x, y);
            let offset = Point::new(i, j).rotate(rotation);
            Some(Command::Draw {
                x,
                y,
                i: offset.x,
                j: offset.y,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn run(input: &str) -> Result<SizeResult, SizeError> {
        measure(input.as_bytes())
    }

    fn size(input: &str) -> SizeResult {
        run(input).unwrap()
    }

    fn assert_extent(s: &SizeResult, min_x: f64, max_x: f64, min_y: f64, max_y: f64) {
        assert_abs_diff_eq!(s.min_x, min_x, epsilon = 1e-9);
        assert_abs_diff_eq!(s.max_x, max_x, epsilon = 1e-9);
        assert_abs_diff_eq!(s.min_y, min_y, epsilon = 1e-9);
        assert_abs_diff_eq!(s.max_y, max_y, epsilon = 1e-9);
        assert_abs_diff_eq!(s.x, max_x - min_x, epsilon = 1e-9);
        assert_abs_diff_eq!(s.y, max_y - min_y, epsilon = 1e-9);
    }

    const HEADER: &str = "%FSLAX33Y33*%\n%MOMM*%\n";

    #[test]
    fn test_circle_flash() {
        let s = size(&format!("{HEADER}%ADD10C,2*%\nD10*\nX5000Y3000D03*\nM02*\n"));
        assert_extent(&s, 4.0, 6.0, 2.0, 4.0);
        assert_eq!(s.units, Units::Millimeters);
    }

    #[test]
    fn test_flash_keeps_omitted_axis() {
        let s = size(&format!("{HEADER}%ADD10C,1*%\nD10*\nX1000Y1000D02*\nX2000D03*\n"));
        assert_extent(&s, 1.5, 2.5, 0.5, 1.5);
    }

    #[test]
    fn test_linear_draw_unions_both_ends() {
        let s = size(&format!(
            "{HEADER}%ADD10C,1*%\nD10*\nX0Y0D02*\nG01*\nX10000Y5000D01*\n"
        ));
        assert_extent(&s, -0.5, 10.5, -0.5, 5.5);
    }

    #[test]
    fn test_draw_without_aperture_is_bare_line() {
        let s = size(&format!("{HEADER}X1000Y1000D02*\nX3000Y2000D01*\n"));
        assert_extent(&s, 1.0, 3.0, 1.0, 2.0);
    }

    #[test]
    fn test_full_circle_arc_both_directions() {
        for mode in ["G02", "G03"] {
            let s = size(&format!(
                "{HEADER}G75*\nX3000Y2000D02*\n{mode}*\nX3000Y2000I-1000J0D01*\n"
            ));
            // center (2,2), radius 1
            assert_extent(&s, 1.0, 3.0, 1.0, 3.0);
        }
    }

    #[test]
    fn test_quarter_arc_counterclockwise() {
        // From (1,0) to (0,1) about the origin: no cardinal point strictly inside.
        let s = size(&format!("{HEADER}X1000Y0D02*\nG03*\nX0Y1000I-1000J0D01*\n"));
        assert_extent(&s, 0.0, 1.0, 0.0, 1.0);
    }

    #[test]
    fn test_half_arc_clockwise_passes_top() {
        // From (-1,0) to (1,0) clockwise about the origin sweeps through the top.
        let s = size(&format!("{HEADER}X-1000Y0D02*\nG02*\nX1000Y0I1000J0D01*\n"));
        assert_extent(&s, -1.0, 1.0, 0.0, 1.0);
        // Counterclockwise over the same points goes underneath.
        let s = size(&format!("{HEADER}X-1000Y0D02*\nG03*\nX1000Y0I1000J0D01*\n"));
        assert_extent(&s, -1.0, 1.0, -1.0, 0.0);
    }

    #[test]
    fn test_arc_extrema_three_quarters() {
        // (1,0) -> (0,-1) counterclockwise passes 90 and 180 degrees.
        let pts = arc_extrema(Point::new(1.0, 0.0), Point::new(0.0, -1.0), Point::default(), false);
        assert_eq!(pts.len(), 2);
        assert!(pts.contains(&Point::new(0.0, 1.0)));
        assert!(pts.contains(&Point::new(-1.0, 0.0)));
    }

    #[test]
    fn test_mirrored_xy() {
        let b = BoundingBox {
            min_x: 1.0,
            max_x: 3.0,
            min_y: -2.0,
            max_y: 5.0,
        };
        assert_eq!(
            mirrored(b, Mirror::XY),
            BoundingBox {
                min_x: -3.0,
                max_x: -1.0,
                min_y: -5.0,
                max_y: 2.0,
            }
        );
        assert_eq!(mirrored(b, Mirror::N), b);
        assert_eq!(mirrored(b, Mirror::X).min_y, -2.0);
        assert_eq!(mirrored(b, Mirror::Y).min_x, 1.0);
    }

    #[test]
    fn test_mirror_reselects_aperture() {
        // Aperture macro circle offset to +X; mirroring X moves it to -X.
        let s = size(&format!(
            "{HEADER}%AMOFF*1,1,1,2,0*%\n%ADD10OFF*%\nD10*\n%LMX*%\nX0Y0D03*\n"
        ));
        assert_extent(&s, -2.5, -1.5, -0.5, 0.5);
    }

    #[test]
    fn test_rotation_and_scaling_reselect_aperture() {
        let s = size(&format!(
            "{HEADER}%ADD10R,4X2*%\nD10*\n%LR90*%\n%LS0.5*%\nX0Y0D03*\n"
        ));
        assert_extent(&s, -0.5, 0.5, -1.0, 1.0);
    }

    #[test]
    fn test_step_repeat_span() {
        let s = size(&format!(
            "{HEADER}%ADD10C,2*%\nD10*\n%SRX3Y1I10J0*%\nX1000Y1000D03*\n%SR*%\nM02*\n"
        ));
        // body box {0,2,0,2} repeated 3 times on a 10 pitch
        assert_extent(&s, 0.0, 22.0, 0.0, 2.0);
    }

    #[test]
    fn test_step_repeat_inherits_and_propagates_aperture() {
        let s = size(&format!(
            "{HEADER}%ADD10C,2*%\n%ADD11C,4*%\nD10*\n%SRX1Y2I0J5*%\nX0Y0D03*\nD11*\n%SR*%\nX20000Y0D03*\n"
        ));
        // D11 (radius 2) selected inside the repeat is still active afterwards
        assert_extent(&s, -1.0, 22.0, -2.0, 6.0);
    }

    #[test]
    fn test_contour_ignores_aperture_size() {
        let s = size(&format!(
            "{HEADER}%ADD10C,2*%\nD10*\nG36*\nX0Y0D02*\nG01*\nX4000Y0D01*\nX4000Y3000D01*\nX0Y0D01*\nG37*\n"
        ));
        assert_extent(&s, 0.0, 4.0, 0.0, 3.0);
    }

    #[test]
    fn test_contour_restores_aperture() {
        let s = size(&format!(
            "{HEADER}%ADD10C,2*%\nD10*\nG36*\nX0Y0D02*\nX1000Y0D01*\nG37*\nX10000Y0D03*\n"
        ));
        assert_extent(&s, 0.0, 11.0, -1.0, 1.0);
    }

    #[test]
    fn test_single_quadrant_closed_arc_is_full_circle() {
        let s = size(&format!("{HEADER}G74*\nX3000Y2000D02*\nG02*\nX3000Y2000I1000J0D01*\n"));
        // center (4,2), radius 1
        assert_extent(&s, 3.0, 5.0, 1.0, 3.0);
    }

    #[test]
    fn test_block_aperture_flash() {
        let s = size(&format!(
            "{HEADER}%ABD20*%\n%ADD10C,1*%\nD10*\nX1000Y0D03*\nX-1000Y0D03*\n%AB*%\nD20*\nX5000Y5000D03*\n"
        ));
        assert_extent(&s, 3.5, 6.5, 4.5, 5.5);
    }

    #[test]
    fn test_block_aperture_rotated() {
        let s = size(&format!(
            "{HEADER}%ABD20*%\n%ADD10C,1*%\nD10*\nX1000Y0D03*\nX-1000Y0D03*\n%AB*%\n%LR90*%\nD20*\nX0Y0D03*\n"
        ));
        assert_extent(&s, -0.5, 0.5, -1.5, 1.5);
    }

    #[test]
    fn test_block_omitted_coordinate_follows_rotation() {
        // Second flash omits Y: block-local Y stays 1 and is rotated with X.
        let s = size(&format!(
            "{HEADER}%ABD20*%\n%ADD10C,0*%\nD10*\nX0Y1000D03*\nX2000D03*\n%AB*%\n%LR90*%\nD20*\nX0Y0D03*\n"
        ));
        // local (0,1) -> (-1,0); local (2,1) -> (-1,2)
        assert_extent(&s, -1.0, -1.0, 0.0, 2.0);
    }

    #[test]
    fn test_oversized_polygon_aperture_is_not_defined() {
        let err = run(&format!("{HEADER}%ADD10P,1X100000000000*%\nD10*\nX0Y0D03*\n")).unwrap_err();
        assert!(matches!(err, SizeError::UndefinedAperture(10)));
    }

    #[test]
    fn test_runaway_contour_nesting_is_error() {
        let err = run(&"G36*".repeat(200_000)).unwrap_err();
        assert!(matches!(err, SizeError::NestingTooDeep(MAX_BLOCK_DEPTH)));
    }

    #[test]
    fn test_self_referencing_block_is_error() {
        let err = run(&format!("{HEADER}%ABD20*%\nD20*\nX0Y0D03*\n%AB*%\nD20*\n")).unwrap_err();
        assert!(matches!(err, SizeError::NestingTooDeep(_)));
    }

    #[test]
    fn test_undefined_aperture_is_error() {
        let err = run(&format!("{HEADER}D42*\nX0Y0D03*\n")).unwrap_err();
        assert!(matches!(err, SizeError::UndefinedAperture(42)));
    }

    #[test]
    fn test_macro_arithmetic_error_is_fatal() {
        let err = run(&format!("{HEADER}%AMBAD*1,1,$1/0,0,0*%\n%ADD10BAD,1*%\n")).unwrap_err();
        assert!(matches!(err, SizeError::Arithmetic(_)));
    }

    #[test]
    fn test_unknown_shape_then_use_is_error() {
        let err = run(&format!("{HEADER}%ADD10ZZ,1*%\nD10*\n")).unwrap_err();
        assert!(matches!(err, SizeError::UndefinedAperture(10)));
    }

    #[test]
    fn test_no_geometry() {
        assert!(matches!(run(HEADER), Err(SizeError::NoGeometry)));
    }

    #[test]
    fn test_scale_factor_and_offset_applied_last() {
        let s = size(&format!(
            "{HEADER}%SFA2B3*%\n%OFA1B-1*%\n%ADD10C,2*%\nD10*\nX0Y0D03*\n"
        ));
        assert_abs_diff_eq!(s.x, 4.0);
        assert_abs_diff_eq!(s.y, 6.0);
        assert_abs_diff_eq!(s.min_x, -1.0);
        assert_abs_diff_eq!(s.max_x, 3.0);
        assert_abs_diff_eq!(s.min_y, -4.0);
        assert_abs_diff_eq!(s.max_y, 2.0);
    }

    #[test]
    fn test_inch_units_reported() {
        let s = size("%FSLAX24Y24*%\n%MOIN*%\n%ADD10C,0.1*%\nD10*\nX10000Y0D03*\n");
        assert_eq!(s.units, Units::Inches);
        assert_abs_diff_eq!(s.x, 0.1, epsilon = 1e-9);
    }

    #[test]
    fn test_end_stops_interpretation() {
        let s = size(&format!("{HEADER}%ADD10C,2*%\nD10*\nX0Y0D03*\nM02*\nX50000Y0D03*\n"));
        assert_extent(&s, -1.0, 1.0, -1.0, 1.0);
    }

    #[test]
    fn test_undefined_position_after_repeat_reads_as_origin() {
        let s = size(&format!(
            "{HEADER}%SRX1Y1I0J0*%\nX5000Y5000D02*\nX6000Y5000D01*\n%SR*%\nD03*\n"
        ));
        assert_extent(&s, 0.0, 6.0, 0.0, 5.0);
    }
}
