use std::collections::VecDeque;
use std::io::Read;
use std::str::FromStr;

use log::{debug, warn};

use crate::error::SizeError;

use super::coord::{CoordinateResolution, Omission, Units};
use super::interpreter::MAX_BLOCK_DEPTH;
use super::lexer::{Token, Tokenizer};
use super::macros::{self, MacroPrimitiveTemplate};

/// Interpolation state from G01/G02/G03.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Interpolation {
    #[default]
    Linear,
    ClockwiseArc,
    CounterClockwiseArc,
}

/// Arc quadrant mode from G74/G75. Carried through, never changes the box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QuadrantMode {
    SingleQuadrant,
    #[default]
    MultiQuadrant,
}

/// Polarity from %LP (dark/clear) or the deprecated %IP (positive/negative).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Dark,
    Clear,
    Positive,
    Negative,
}

/// Object mirroring from %LM.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mirror {
    #[default]
    N,
    X,
    Y,
    XY,
}

/// A fully parsed Gerber command.
///
/// Coordinates are already decoded with the resolution in force when the
/// command was read. `None` means the axis was omitted and keeps its value.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// D02
    Move { x: Option<f64>, y: Option<f64> },
    /// D01, or coordinates with no D code. Arc offsets default to zero.
    Draw {
        x: Option<f64>,
        y: Option<f64>,
        i: f64,
        j: f64,
    },
    /// D03
    Flash { x: Option<f64>, y: Option<f64> },
    /// Dnn (n >= 10), optionally behind the deprecated G54 prefix.
    ApplyAperture(u32),
    /// %AD. `shape` is C, R, O, P or a macro name.
    DefineAperture {
        dcode: u32,
        shape: String,
        modifiers: Vec<f64>,
    },
    /// %AM
    ApertureMacro {
        name: String,
        primitives: Vec<MacroPrimitiveTemplate>,
    },
    /// %SR block: `body` replicated `x` by `y` times on an (`i`, `j`) pitch.
    Repeat {
        x: u32,
        y: u32,
        i: f64,
        j: f64,
        body: Vec<Command>,
    },
    /// %AB block defining aperture `dcode`.
    BlockAperture { dcode: u32, body: Vec<Command> },
    /// G36 ... G37
    Contour { body: Vec<Command> },
    Interpolation(Interpolation),
    InterpolationMode(QuadrantMode),
    Units(Units),
    Polarity(Polarity),
    /// %LM
    Mirroring(Mirror),
    /// %LR, degrees counterclockwise.
    Rotation(f64),
    /// %LS
    Scaling(f64),
    /// %OF, applied to the final extent.
    Offset { a: f64, b: f64 },
    /// %SF, applied to the final extent.
    ScaleFactor { a: f64, b: f64 },
    /// %LN
    Name(String),
    /// G04
    Comment(String),
    /// %FS, also applied to the parser's resolution as a side effect.
    Precision(CoordinateResolution),
    /// %TF
    FileAttribute { name: String, values: Vec<String> },
    /// %TA
    ApertureAttribute(String),
    /// %TD
    AttributeDelete(String),
    /// %TO
    ObjectAttribute(String),
    /// M02
    End,
}

/// Result of dispatching one token. Block closers never leave the parser.
#[derive(Debug)]
enum Parsed {
    Command(Command),
    RepeatClose,
    BlockClose,
    ContourClose,
}

/// Pull parser turning tokens into commands, one at a time.
///
/// Nested blocks (%SR, %AB, G36) are consumed recursively and returned as a
/// single command holding their body. A step-repeat block may be closed
/// implicitly by the next %SR or by M02; the command that closed it is queued
/// and handed out by the following call.
pub struct Parser<R: Read> {
    tokenizer: Tokenizer<R>,
    resolution: CoordinateResolution,
    pushback: VecDeque<Command>,
    /// Number of %SR, %AB and G36 blocks currently open.
    depth: usize,
}

impl<R: Read> Parser<R> {
    pub fn new(reader: R) -> Self {
        Self {
            tokenizer: Tokenizer::new(reader),
            resolution: CoordinateResolution::default(),
            pushback: VecDeque::new(),
            depth: 0,
        }
    }

    /// Coordinate format currently used to decode coordinates.
    pub fn resolution(&self) -> CoordinateResolution {
        self.resolution
    }

    /// Next top-level command, or `None` at the end of the stream.
    pub fn next_command(&mut self) -> Result<Option<Command>, SizeError> {
        while let Some(parsed) = self.pull()? {
            match parsed {
                Parsed::Command(cmd) => return Ok(Some(cmd)),
                closer => debug!("ignoring unmatched block closer: {closer:?}"),
            }
        }
        Ok(None)
    }

    fn pull(&mut self) -> Result<Option<Parsed>, SizeError> {
        if let Some(cmd) = self.pushback.pop_front() {
            return Ok(Some(Parsed::Command(cmd)));
        }
        while let Some(token) = self.tokenizer.next_token()? {
            let Token::Command(text) = token else {
                continue;
            };
            if text.is_empty() {
                continue;
            }
            if let Some(parsed) = self.dispatch(&text)? {
                return Ok(Some(parsed));
            }
        }
        Ok(None)
    }

    /// Route one command text by its prefix. `Ok(None)` means nothing was produced.
    fn dispatch(&mut self, text: &str) -> Result<Option<Parsed>, SizeError> {
        let command = |cmd: Command| Ok(Some(Parsed::Command(cmd)));

        match text.as_bytes()[0] {
            b'X' | b'Y' | b'I' | b'J' => return Ok(self.coordinates(text).map(Parsed::Command)),
            b'D' => return Ok(self.apply_aperture(text).map(Parsed::Command)),
            _ => {}
        }

        if let Some(prefix) = text.get(..2) {
            let rest = &text[2..];
            match prefix {
                "TF" => return command(file_attribute(rest)),
                "AM" => return command(self.aperture_macro(rest)?),
                "SR" => return self.step_repeat(rest),
                "AB" => return self.aperture_block(rest),
                "TA" => return command(Command::ApertureAttribute(rest.to_string())),
                "TD" => return command(Command::AttributeDelete(rest.to_string())),
                "TO" => return command(Command::ObjectAttribute(rest.to_string())),
                "OF" => {
                    return command(Command::Offset {
                        a: parse_keyed(rest, 'A').unwrap_or(0.0),
                        b: parse_keyed(rest, 'B').unwrap_or(0.0),
                    })
                }
                "SF" => {
                    return command(Command::ScaleFactor {
                        a: parse_keyed(rest, 'A').unwrap_or(1.0),
                        b: parse_keyed(rest, 'B').unwrap_or(1.0),
                    })
                }
                "LN" => return command(Command::Name(rest.to_string())),
                "LM" => return Ok(mirroring(text, rest).map(Parsed::Command)),
                "LR" => return Ok(parse_float(text, rest).map(|v| Parsed::Command(Command::Rotation(v)))),
                "LS" => return Ok(parse_float(text, rest).map(|v| Parsed::Command(Command::Scaling(v)))),
                _ => {}
            }
        }

        if let Some(prefix) = text.get(..3) {
            let rest = &text[3..];
            match prefix {
                "G01" => return command(self.interpolation(Interpolation::Linear, rest)?),
                "G02" => return command(self.interpolation(Interpolation::ClockwiseArc, rest)?),
                "G03" => {
                    return command(self.interpolation(Interpolation::CounterClockwiseArc, rest)?)
                }
                "G04" => return command(Command::Comment(rest.trim().to_string())),
                "G54" => {
                    if rest.starts_with('D') {
                        return Ok(self.apply_aperture(rest).map(Parsed::Command));
                    }
                }
                "ADD" => return Ok(define_aperture(text, rest).map(Parsed::Command)),
                _ => {}
            }
        }

        if let Some(prefix) = text.get(..4) {
            match prefix {
                "FSLA" => return Ok(self.precision(text, Omission::Front).map(Parsed::Command)),
                "FSTA" => return Ok(self.precision(text, Omission::Back).map(Parsed::Command)),
                _ => {}
            }
        }

        match text {
            "MOMM" => command(Command::Units(Units::Millimeters)),
            "MOIN" => command(Command::Units(Units::Inches)),
            "LPD" => command(Command::Polarity(Polarity::Dark)),
            "LPC" => command(Command::Polarity(Polarity::Clear)),
            "IPPOS" => command(Command::Polarity(Polarity::Positive)),
            "IPNEG" => command(Command::Polarity(Polarity::Negative)),
            "G36" => command(self.contour()?),
            "G37" => Ok(Some(Parsed::ContourClose)),
            "G74" => command(Command::InterpolationMode(QuadrantMode::SingleQuadrant)),
            "G75" => command(Command::InterpolationMode(QuadrantMode::MultiQuadrant)),
            "M02" => command(Command::End),
            _ => {
                warn!("{}", SizeError::MalformedCommand(text.to_string()));
                Ok(None)
            }
        }
    }

    // ─── Coordinate data ─────────────────────────────────────────────

    /// Parse `X..Y..I..J..Dnn` with the fields in any order.
    fn coordinates(&self, text: &str) -> Option<Command> {
        let bytes = text.as_bytes();
        let mut x = None;
        let mut y = None;
        let mut i = None;
        let mut j = None;
        let mut d_code: Option<u32> = None;

        let mut pos = 0;
        while pos < bytes.len() {
            let key = bytes[pos];
            pos += 1;
            let start = pos;
            match key {
                b'X' | b'Y' | b'I' | b'J' => {
                    if pos < bytes.len() && (bytes[pos] == b'+' || bytes[pos] == b'-') {
                        pos += 1;
                    }
                    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                        pos += 1;
                    }
                    let value = Some(self.resolution.decode(&text[start..pos]));
                    match key {
                        b'X' => x = value,
                        b'Y' => y = value,
                        b'I' => i = value,
                        _ => j = value,
                    }
                }
                b'D' => {
                    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                        pos += 1;
                    }
                    d_code = Some(text[start..pos].parse().unwrap_or(0));
                }
                other => {
                    debug!("skipping '{}' in coordinate data: {text}", other as char);
                }
            }
        }

        match d_code {
            None | Some(1) => Some(Command::Draw {
                x,
                y,
                i: i.unwrap_or(0.0),
                j: j.unwrap_or(0.0),
            }),
            Some(2) => Some(Command::Move { x, y }),
            Some(3) => Some(Command::Flash { x, y }),
            Some(_) => {
                warn!("{}", SizeError::MalformedCommand(text.to_string()));
                None
            }
        }
    }

    /// `Dnn`: aperture selection for n >= 10, otherwise an operation code.
    fn apply_aperture(&self, text: &str) -> Option<Command> {
        match leading_digits(&text[1..]).parse::<u32>() {
            Ok(code) if code >= 10 => Some(Command::ApplyAperture(code)),
            Ok(_) => self.coordinates(text),
            Err(_) => {
                warn!("{}", SizeError::MalformedCommand(text.to_string()));
                None
            }
        }
    }

    /// G01/G02/G03, possibly followed by coordinate data in the deprecated
    /// combined form. The trailing data is dispatched now and queued.
    fn interpolation(&mut self, mode: Interpolation, rest: &str) -> Result<Command, SizeError> {
        if !rest.is_empty() {
            match self.dispatch(rest)? {
                Some(Parsed::Command(cmd)) => self.pushback.push_back(cmd),
                Some(closer) => debug!("ignoring block closer after G code: {closer:?}"),
                None => {}
            }
        }
        Ok(Command::Interpolation(mode))
    }

    /// `FSLAX<i><d>Y<i><d>`: the X field decides the resolution.
    fn precision(&mut self, text: &str, omission: Omission) -> Option<Command> {
        let digits = text
            .find('X')
            .map(|pos| &text[pos + 1..])
            .map(|s| s.as_bytes());
        match digits {
            Some([int, dec, ..]) if int.is_ascii_digit() && dec.is_ascii_digit() => {
                self.resolution = CoordinateResolution {
                    integer_digits: int - b'0',
                    decimal_digits: dec - b'0',
                    omission,
                };
                Some(Command::Precision(self.resolution))
            }
            _ => {
                warn!("{}", SizeError::MalformedCommand(text.to_string()));
                None
            }
        }
    }

    // ─── Blocks ──────────────────────────────────────────────────────

    /// %AM: primitive lines are read raw until the closing `%`.
    fn aperture_macro(&mut self, name: &str) -> Result<Command, SizeError> {
        let mut primitives = Vec::new();
        while let Some(token) = self.tokenizer.next_token()? {
            match token {
                Token::AttributeEnd => break,
                Token::AttributeStart => {}
                Token::Command(line) => {
                    if let Some(primitive) = macros::parse_template(&line) {
                        primitives.push(primitive);
                    }
                }
            }
        }
        Ok(Command::ApertureMacro {
            name: name.to_string(),
            primitives,
        })
    }

    /// %SR with parameters opens a block; a bare %SR closes it.
    fn step_repeat(&mut self, params: &str) -> Result<Option<Parsed>, SizeError> {
        if params.is_empty() {
            return Ok(Some(Parsed::RepeatClose));
        }

        self.enter_block()?;
        let mut body = Vec::new();
        while let Some(parsed) = self.pull()? {
            match parsed {
                Parsed::Command(cmd @ (Command::Repeat { .. } | Command::End)) => {
                    // Front of the queue: anything a nested block queued comes later in the file.
                    self.pushback.push_front(cmd);
                    break;
                }
                Parsed::RepeatClose => break,
                Parsed::Command(cmd) => body.push(cmd),
                closer => debug!("ignoring {closer:?} inside step-repeat"),
            }
        }
        self.depth -= 1;

        Ok(Some(Parsed::Command(Command::Repeat {
            x: parse_keyed(params, 'X').unwrap_or(1),
            y: parse_keyed(params, 'Y').unwrap_or(1),
            i: parse_keyed(params, 'I').unwrap_or(0.0),
            j: parse_keyed(params, 'J').unwrap_or(0.0),
            body,
        })))
    }

    /// %ABDnn opens an aperture block; a bare %AB closes it.
    fn aperture_block(&mut self, params: &str) -> Result<Option<Parsed>, SizeError> {
        if params.is_empty() {
            return Ok(Some(Parsed::BlockClose));
        }

        self.enter_block()?;
        let mut body = Vec::new();
        while let Some(parsed) = self.pull()? {
            match parsed {
                Parsed::BlockClose => break,
                Parsed::Command(cmd) => body.push(cmd),
                closer => debug!("ignoring {closer:?} inside aperture block"),
            }
        }
        self.depth -= 1;

        let dcode = params
            .strip_prefix('D')
            .and_then(|s| leading_digits(s).parse::<u32>().ok());
        match dcode {
            Some(dcode) => Ok(Some(Parsed::Command(Command::BlockAperture { dcode, body }))),
            None => {
                warn!("{}", SizeError::MalformedCommand(format!("AB{params}")));
                Ok(None)
            }
        }
    }

    /// G36 ... G37
    fn contour(&mut self) -> Result<Command, SizeError> {
        self.enter_block()?;
        let mut body = Vec::new();
        while let Some(parsed) = self.pull()? {
            match parsed {
                Parsed::ContourClose => break,
                Parsed::Command(cmd) => body.push(cmd),
                closer => debug!("ignoring {closer:?} inside contour"),
            }
        }
        self.depth -= 1;
        Ok(Command::Contour { body })
    }

    fn enter_block(&mut self) -> Result<(), SizeError> {
        if self.depth >= MAX_BLOCK_DEPTH {
            return Err(SizeError::NestingTooDeep(MAX_BLOCK_DEPTH));
        }
        self.depth += 1;
        Ok(())
    }
}

impl<R: Read> Iterator for Parser<R> {
    type Item = Result<Command, SizeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_command().transpose()
    }
}

// ─── Parameter helpers ───────────────────────────────────────────────

/// `ADDnn<shape>[,<m1>X<m2>X...]`
fn define_aperture(text: &str, rest: &str) -> Option<Command> {
    let digits = leading_digits(rest);
    let Ok(dcode) = digits.parse::<u32>() else {
        warn!("{}", SizeError::MalformedCommand(text.to_string()));
        return None;
    };

    let (shape, modifier_text) = rest[digits.len()..]
        .split_once(',')
        .unwrap_or((&rest[digits.len()..], ""));

    let modifiers = modifier_text
        .split('X')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::parse::<f64>)
        .collect::<Result<Vec<_>, _>>();

    match modifiers {
        Ok(modifiers) => Some(Command::DefineAperture {
            dcode,
            shape: shape.trim().to_string(),
            modifiers,
        }),
        Err(_) => {
            warn!("{}", SizeError::MalformedCommand(text.to_string()));
            None
        }
    }
}

/// `TF.<name>,<value>,...`
fn file_attribute(rest: &str) -> Command {
    let rest = rest.strip_prefix('.').unwrap_or(rest);
    let mut parts = rest.split(',');
    let name = parts.next().unwrap_or_default().to_string();
    Command::FileAttribute {
        name,
        values: parts.map(str::to_string).collect(),
    }
}

fn mirroring(text: &str, rest: &str) -> Option<Command> {
    let mirror = match rest {
        "N" => Mirror::N,
        "X" => Mirror::X,
        "Y" => Mirror::Y,
        "XY" => Mirror::XY,
        _ => {
            warn!("{}", SizeError::MalformedCommand(text.to_string()));
            return None;
        }
    };
    Some(Command::Mirroring(mirror))
}

fn parse_float(text: &str, rest: &str) -> Option<f64> {
    match rest.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("{}", SizeError::MalformedCommand(text.to_string()));
            None
        }
    }
}

fn leading_digits(s: &str) -> &str {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    &s[..end]
}

/// Value after a key letter in a parameter string such as `X3Y1I10.0J0`
/// or `A1.0B-2`, up to the next letter.
fn parse_keyed<T: FromStr>(s: &str, key: char) -> Option<T> {
    let pos = s.find(key)?;
    let after = &s[pos + 1..];
    let end = after
        .find(|c: char| c.is_alphabetic())
        .unwrap_or(after.len());
    after[..end].parse().ok()
}
