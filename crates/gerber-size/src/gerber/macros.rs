use std::collections::HashMap;

use log::{debug, warn};

use crate::error::SizeError;
use crate::types::Point;

use super::apertures::Aperture;

/// One line of an aperture macro, with its numeric fields left as expressions
/// until the macro is instantiated by an %AD command.
#[derive(Debug, Clone, PartialEq)]
pub enum MacroPrimitiveTemplate {
    /// `$n=<expr>`: overwrite modifier `n` (1-based) for the lines that follow.
    Assign { index: usize, expr: Expr },
    /// Code 1
    Circle {
        exposure: Expr,
        diameter: Expr,
        center_x: Expr,
        center_y: Expr,
        rotation: Expr,
    },
    /// Code 20 (or the older 2)
    VectorLine {
        exposure: Expr,
        width: Expr,
        start_x: Expr,
        start_y: Expr,
        end_x: Expr,
        end_y: Expr,
        rotation: Expr,
    },
    /// Code 21: rectangle given by its center.
    CenterLine {
        exposure: Expr,
        width: Expr,
        height: Expr,
        center_x: Expr,
        center_y: Expr,
        rotation: Expr,
    },
    /// Code 4: closed polygon, start point plus one point per vertex.
    Outline {
        exposure: Expr,
        points: Vec<(Expr, Expr)>,
        rotation: Expr,
    },
    /// Code 5: regular polygon.
    Polygon {
        exposure: Expr,
        vertices: Expr,
        center_x: Expr,
        center_y: Expr,
        diameter: Expr,
        rotation: Expr,
    },
    /// Code 6
    Moire {
        center_x: Expr,
        center_y: Expr,
        outer_diameter: Expr,
        ring_thickness: Expr,
        ring_gap: Expr,
        max_rings: Expr,
        cross_thickness: Expr,
        cross_length: Expr,
        rotation: Expr,
    },
    /// Code 7
    Thermal {
        center_x: Expr,
        center_y: Expr,
        outer_diameter: Expr,
        inner_diameter: Expr,
        gap: Expr,
        rotation: Expr,
    },
}

/// Expression node for macro parameter evaluation.
/// Supports: literals, variable references ($1, $2, ...), and arithmetic.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(f64),
    Variable(usize), // $1 = Variable(1)
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Evaluate against 1-based modifiers. `None` entries are variables that
    /// were never given a value.
    pub fn eval(&self, vars: &[Option<f64>]) -> Result<f64, SizeError> {
        Ok(match self {
            Expr::Literal(v) => *v,
            Expr::Variable(idx) => idx
                .checked_sub(1)
                .and_then(|i| vars.get(i).copied().flatten())
                .ok_or_else(|| SizeError::Arithmetic(format!("${idx} is not defined")))?,
            Expr::Neg(a) => -a.eval(vars)?,
            Expr::Add(a, b) => a.eval(vars)? + b.eval(vars)?,
            Expr::Sub(a, b) => a.eval(vars)? - b.eval(vars)?,
            Expr::Mul(a, b) => a.eval(vars)? * b.eval(vars)?,
            Expr::Div(a, b) => {
                let denom = b.eval(vars)?;
                if denom == 0.0 {
                    return Err(SizeError::Arithmetic(format!("division by zero in {self:?}")));
                }
                a.eval(vars)? / denom
            }
        })
    }
}

/// Parse and evaluate a macro expression against plain modifier values.
pub fn evaluate(expr: &str, modifiers: &[f64]) -> Result<f64, SizeError> {
    let vars: Vec<Option<f64>> = modifiers.iter().copied().map(Some).collect();
    parse_expr(expr)?.eval(&vars)
}

/// An aperture macro definition (from %AM...% blocks).
#[derive(Debug, Clone)]
pub struct ApertureMacro {
    pub name: String,
    pub primitives: Vec<MacroPrimitiveTemplate>,
}

/// Table of macro definitions, keyed by name.
#[derive(Debug, Default)]
pub struct MacroTable {
    macros: HashMap<String, ApertureMacro>,
}

impl MacroTable {
    pub fn define(&mut self, name: String, mac: ApertureMacro) {
        self.macros.insert(name, mac);
    }

    pub fn get(&self, name: &str) -> Option<&ApertureMacro> {
        self.macros.get(name)
    }
}

// ─── Expression Parser ──────────────────────────────────────────────

/// Parse a Gerber macro expression string into an Expr tree.
/// Gerber uses 'x' or 'X' for multiplication (not '*' which is the statement terminator).
pub fn parse_expr(s: &str) -> Result<Expr, SizeError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(Expr::Literal(0.0));
    }
    let tokens = tokenize_expr(s)?;
    let (expr, rest) = parse_add_sub(&tokens)?;
    if !rest.is_empty() {
        return Err(SizeError::MalformedCommand(format!(
            "AM expr: unexpected tokens after expression: {s}"
        )));
    }
    Ok(expr)
}

#[derive(Debug, Clone)]
enum ExprToken {
    Num(f64),
    Var(usize),
    Plus,
    Minus,
    Mul,
    Div,
    LParen,
    RParen,
}

fn tokenize_expr(s: &str) -> Result<Vec<ExprToken>, SizeError> {
    let mut tokens = Vec::new();
    let mut chars = s.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            ' ' | '\t' => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(ExprToken::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(ExprToken::Minus);
            }
            'x' | 'X' => {
                chars.next();
                tokens.push(ExprToken::Mul);
            }
            '/' => {
                chars.next();
                tokens.push(ExprToken::Div);
            }
            '(' => {
                chars.next();
                tokens.push(ExprToken::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(ExprToken::RParen);
            }
            '$' => {
                chars.next();
                let mut num_str = String::new();
                while let Some(c) = chars.next_if(|c| c.is_ascii_digit()) {
                    num_str.push(c);
                }
                let idx: usize = num_str.parse().map_err(|_| {
                    SizeError::MalformedCommand(format!("AM expr: bad variable: ${num_str}"))
                })?;
                tokens.push(ExprToken::Var(idx));
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut num_str = String::new();
                while let Some(c) = chars.next_if(|c| c.is_ascii_digit() || *c == '.') {
                    num_str.push(c);
                }
                let val: f64 = num_str.parse().map_err(|_| {
                    SizeError::MalformedCommand(format!("AM expr: bad number: {num_str}"))
                })?;
                tokens.push(ExprToken::Num(val));
            }
            _ => {
                return Err(SizeError::MalformedCommand(format!(
                    "AM expr: unexpected char '{ch}' in: {s}"
                )));
            }
        }
    }

    Ok(tokens)
}

// Recursive descent: add/sub -> mul/div -> atom
fn parse_add_sub(tokens: &[ExprToken]) -> Result<(Expr, &[ExprToken]), SizeError> {
    let (mut left, mut rest) = parse_mul_div(tokens)?;
    loop {
        match rest.first() {
            Some(ExprToken::Plus) => {
                let (right, r) = parse_mul_div(&rest[1..])?;
                left = Expr::Add(Box::new(left), Box::new(right));
                rest = r;
            }
            Some(ExprToken::Minus) => {
                let (right, r) = parse_mul_div(&rest[1..])?;
                left = Expr::Sub(Box::new(left), Box::new(right));
                rest = r;
            }
            _ => break,
        }
    }
    Ok((left, rest))
}

fn parse_mul_div(tokens: &[ExprToken]) -> Result<(Expr, &[ExprToken]), SizeError> {
    let (mut left, mut rest) = parse_atom(tokens)?;
    loop {
        match rest.first() {
            Some(ExprToken::Mul) => {
                let (right, r) = parse_atom(&rest[1..])?;
                left = Expr::Mul(Box::new(left), Box::new(right));
                rest = r;
            }
            Some(ExprToken::Div) => {
                let (right, r) = parse_atom(&rest[1..])?;
                left = Expr::Div(Box::new(left), Box::new(right));
                rest = r;
            }
            _ => break,
        }
    }
    Ok((left, rest))
}

fn parse_atom(tokens: &[ExprToken]) -> Result<(Expr, &[ExprToken]), SizeError> {
    match tokens.first() {
        Some(ExprToken::Num(v)) => Ok((Expr::Literal(*v), &tokens[1..])),
        Some(ExprToken::Var(idx)) => Ok((Expr::Variable(*idx), &tokens[1..])),
        Some(ExprToken::Minus) => {
            let (inner, rest) = parse_atom(&tokens[1..])?;
            Ok((Expr::Neg(Box::new(inner)), rest))
        }
        Some(ExprToken::Plus) => parse_atom(&tokens[1..]),
        Some(ExprToken::LParen) => {
            let (expr, rest) = parse_add_sub(&tokens[1..])?;
            match rest.first() {
                Some(ExprToken::RParen) => Ok((expr, &rest[1..])),
                _ => Err(SizeError::MalformedCommand(
                    "AM expr: missing closing paren".into(),
                )),
            }
        }
        _ => Err(SizeError::MalformedCommand(
            "AM expr: unexpected end of expression".into(),
        )),
    }
}

// ─── Macro Primitive Parser ─────────────────────────────────────────

/// Largest point count accepted for an outline primitive (code 4).
pub const MAX_OUTLINE_VERTICES: usize = 5000;

/// Largest `$n` a macro may assign.
pub const MAX_VARIABLE_INDEX: usize = 10_000;

/// Parse one macro body line, e.g. `5,1,8,0,0,1.08239X$1,22.5` or `$3=$1x2`.
///
/// Comments (code 0) produce nothing. Unknown codes and lines with missing
/// fields are logged and skipped.
pub fn parse_template(line: &str) -> Option<MacroPrimitiveTemplate> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(assignment) = line.strip_prefix('$') {
        let parsed = assignment.split_once('=').and_then(|(var, expr)| {
            let index = var
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|i| (1..=MAX_VARIABLE_INDEX).contains(i))?;
            Some((index, expr))
        });
        let Some((index, expr)) = parsed else {
            warn!("{}", SizeError::MalformedCommand(line.to_string()));
            return None;
        };
        return match parse_expr(expr) {
            Ok(expr) => Some(MacroPrimitiveTemplate::Assign { index, expr }),
            Err(e) => {
                warn!("{e}");
                None
            }
        };
    }

    let code_end = line
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(line.len());
    let code: u32 = match line[..code_end].parse() {
        Ok(code) => code,
        Err(_) => {
            warn!("{}", SizeError::MalformedCommand(line.to_string()));
            return None;
        }
    };
    if code == 0 {
        debug!("macro comment: {line}");
        return None;
    }

    let fields = line[code_end..]
        .strip_prefix(',')
        .unwrap_or(&line[code_end..])
        .split(',')
        .filter(|f| !f.trim().is_empty())
        .map(parse_expr)
        .collect::<Result<Vec<_>, _>>();
    let fields = match fields {
        Ok(fields) => fields,
        Err(e) => {
            warn!("{e}");
            return None;
        }
    };

    let template = build_template(code, fields);
    if template.is_none() {
        warn!(
            "{}",
            SizeError::MalformedCommand(format!("unsupported macro primitive: {line}"))
        );
    }
    template
}

fn build_template(code: u32, fields: Vec<Expr>) -> Option<MacroPrimitiveTemplate> {
    let mut fields = fields.into_iter();
    let mut next = || fields.next();
    let zero = || Expr::Literal(0.0);

    let template = match code {
        1 => MacroPrimitiveTemplate::Circle {
            exposure: next()?,
            diameter: next()?,
            center_x: next()?,
            center_y: next()?,
            rotation: next().unwrap_or_else(zero),
        },
        2 | 20 => MacroPrimitiveTemplate::VectorLine {
            exposure: next()?,
            width: next()?,
            start_x: next()?,
            start_y: next()?,
            end_x: next()?,
            end_y: next()?,
            rotation: next().unwrap_or_else(zero),
        },
        21 => MacroPrimitiveTemplate::CenterLine {
            exposure: next()?,
            width: next()?,
            height: next()?,
            center_x: next()?,
            center_y: next()?,
            rotation: next().unwrap_or_else(zero),
        },
        4 => {
            let exposure = next()?;
            // The vertex count decides where the points end, so it must be a literal.
            let vertices = match next()? {
                Expr::Literal(n) if (1.0..=MAX_OUTLINE_VERTICES as f64).contains(&n) => n as usize,
                _ => return None,
            };
            let mut points = Vec::with_capacity(vertices + 1);
            for _ in 0..=vertices {
                points.push((next()?, next()?));
            }
            MacroPrimitiveTemplate::Outline {
                exposure,
                points,
                rotation: next().unwrap_or_else(zero),
            }
        }
        5 => MacroPrimitiveTemplate::Polygon {
            exposure: next()?,
            vertices: next()?,
            center_x: next()?,
            center_y: next()?,
            diameter: next()?,
            rotation: next().unwrap_or_else(zero),
        },
        6 => MacroPrimitiveTemplate::Moire {
            center_x: next()?,
            center_y: next()?,
            outer_diameter: next()?,
            ring_thickness: next()?,
            ring_gap: next()?,
            max_rings: next()?,
            cross_thickness: next()?,
            cross_length: next()?,
            rotation: next().unwrap_or_else(zero),
        },
        7 => MacroPrimitiveTemplate::Thermal {
            center_x: next()?,
            center_y: next()?,
            outer_diameter: next()?,
            inner_diameter: next()?,
            gap: next()?,
            rotation: next().unwrap_or_else(zero),
        },
        _ => return None,
    };
    Some(template)
}

// ─── Macro Instantiation ────────────────────────────────────────────

/// Evaluate a macro's primitives against the modifiers of an %AD command.
///
/// Primitives are evaluated in order so assignments feed later lines. Every
/// primitive becomes a circle or polygon about the aperture origin, with its
/// own rotation already applied. Primitives with exposure off are skipped.
pub fn instantiate(mac: &ApertureMacro, modifiers: &[f64]) -> Result<Aperture, SizeError> {
    let mut vars: Vec<Option<f64>> = modifiers.iter().copied().map(Some).collect();
    let mut subshapes = Vec::new();

    for primitive in &mac.primitives {
        match primitive {
            MacroPrimitiveTemplate::Assign { index, expr } => {
                let value = expr.eval(&vars)?;
                if vars.len() < *index {
                    vars.resize(*index, None);
                }
                vars[index - 1] = Some(value);
            }
            MacroPrimitiveTemplate::Circle {
                exposure,
                diameter,
                center_x,
                center_y,
                rotation,
            } => {
                if !exposed(exposure, &vars)? {
                    continue;
                }
                let center = Point::new(center_x.eval(&vars)?, center_y.eval(&vars)?);
                subshapes.push(Aperture::Circle {
                    radius: diameter.eval(&vars)?.abs() / 2.0,
                    center: center.rotate(rotation.eval(&vars)?),
                });
            }
            MacroPrimitiveTemplate::VectorLine {
                exposure,
                width,
                start_x,
                start_y,
                end_x,
                end_y,
                rotation,
            } => {
                if !exposed(exposure, &vars)? {
                    continue;
                }
                let half_width = width.eval(&vars)? / 2.0;
                let start = Point::new(start_x.eval(&vars)?, start_y.eval(&vars)?);
                let end = Point::new(end_x.eval(&vars)?, end_y.eval(&vars)?);
                let (sin_a, cos_a) = (end.y - start.y).atan2(end.x - start.x).sin_cos();
                let (ox, oy) = (-half_width * sin_a, half_width * cos_a);
                let corners = [
                    Point::new(start.x + ox, start.y + oy),
                    Point::new(start.x - ox, start.y - oy),
                    Point::new(end.x - ox, end.y - oy),
                    Point::new(end.x + ox, end.y + oy),
                ];
                subshapes.push(rotated_polygon(&corners, rotation.eval(&vars)?));
            }
            MacroPrimitiveTemplate::CenterLine {
                exposure,
                width,
                height,
                center_x,
                center_y,
                rotation,
            } => {
                if !exposed(exposure, &vars)? {
                    continue;
                }
                let hw = width.eval(&vars)? / 2.0;
                let hh = height.eval(&vars)? / 2.0;
                let cx = center_x.eval(&vars)?;
                let cy = center_y.eval(&vars)?;
                let corners = [
                    Point::new(cx - hw, cy - hh),
                    Point::new(cx + hw, cy - hh),
                    Point::new(cx + hw, cy + hh),
                    Point::new(cx - hw, cy + hh),
                ];
                subshapes.push(rotated_polygon(&corners, rotation.eval(&vars)?));
            }
            MacroPrimitiveTemplate::Outline {
                exposure,
                points,
                rotation,
            } => {
                if !exposed(exposure, &vars)? {
                    continue;
                }
                let pts = points
                    .iter()
                    .map(|(x, y)| -> Result<Point, SizeError> {
                        Ok(Point::new(x.eval(&vars)?, y.eval(&vars)?))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                subshapes.push(rotated_polygon(&pts, rotation.eval(&vars)?));
            }
            MacroPrimitiveTemplate::Polygon {
                exposure,
                vertices,
                center_x,
                center_y,
                diameter,
                rotation,
            } => {
                if !exposed(exposure, &vars)? {
                    continue;
                }
                let count = vertices.eval(&vars)?;
                let Some(n) = polygon_vertex_count(count) else {
                    warn!("macro {}: polygon with {count} vertices skipped", mac.name);
                    continue;
                };
                let center = Point::new(center_x.eval(&vars)?, center_y.eval(&vars)?);
                let pts = regular_polygon(center, diameter.eval(&vars)? / 2.0, n, 0.0);
                subshapes.push(rotated_polygon(&pts, rotation.eval(&vars)?));
            }
            MacroPrimitiveTemplate::Moire {
                center_x,
                center_y,
                outer_diameter,
                cross_thickness,
                cross_length,
                rotation,
                ..
            } => {
                let rot = rotation.eval(&vars)?;
                let cx = center_x.eval(&vars)?;
                let cy = center_y.eval(&vars)?;
                subshapes.push(Aperture::Circle {
                    radius: outer_diameter.eval(&vars)?.abs() / 2.0,
                    center: Point::new(cx, cy).rotate(rot),
                });

                let len = cross_length.eval(&vars)? / 2.0;
                let thick = cross_thickness.eval(&vars)? / 2.0;
                let cross = [
                    Point::new(cx + len, cy + thick),
                    Point::new(cx + len, cy - thick),
                    Point::new(cx - len, cy + thick),
                    Point::new(cx - len, cy - thick),
                    Point::new(cx + thick, cy + len),
                    Point::new(cx + thick, cy - len),
                    Point::new(cx - thick, cy + len),
                    Point::new(cx - thick, cy - len),
                ];
                subshapes.push(rotated_polygon(&cross, rot));
            }
            MacroPrimitiveTemplate::Thermal {
                center_x,
                center_y,
                outer_diameter,
                rotation,
                ..
            } => {
                // Only the outer circle counts; the gaps never reach past it.
                let center = Point::new(center_x.eval(&vars)?, center_y.eval(&vars)?);
                subshapes.push(Aperture::Circle {
                    radius: outer_diameter.eval(&vars)?.abs() / 2.0,
                    center: center.rotate(rotation.eval(&vars)?),
                });
            }
        }
    }

    Ok(Aperture::Combination { subshapes })
}

fn exposed(exposure: &Expr, vars: &[Option<f64>]) -> Result<bool, SizeError> {
    Ok(exposure.eval(vars)? != 0.0)
}

fn rotated_polygon(points: &[Point], rotation_deg: f64) -> Aperture {
    Aperture::Polygon {
        points: points.iter().map(|p| p.rotate(rotation_deg)).collect(),
    }
}

/// Regular polygons have 3 to 12 vertices. `None` for anything else.
pub fn polygon_vertex_count(n: f64) -> Option<usize> {
    let n = n.round();
    (3.0..=12.0).contains(&n).then_some(n as usize)
}

/// Vertices of a regular polygon, the first at `rotation_deg` from the +X axis.
pub fn regular_polygon(center: Point, radius: f64, n: usize, rotation_deg: f64) -> Vec<Point> {
    (0..n)
        .map(|i| {
            let angle = (i as f64 * 360.0 / n as f64 + rotation_deg).to_radians();
            Point::new(center.x + radius * angle.cos(), center.y + radius * angle.sin())
        })
        .collect()
}
