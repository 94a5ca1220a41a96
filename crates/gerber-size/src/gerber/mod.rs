pub mod apertures;
pub mod commands;
pub mod coord;
pub mod interpreter;
pub mod layers;
pub mod lexer;
pub mod macros;

pub use self::coord::Units;
pub use self::interpreter::{measure, SizeEngine};
pub use self::layers::{identify_from_filename, LayerKind};
