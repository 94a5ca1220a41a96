pub mod board;
pub mod error;
pub mod gerber;
pub mod types;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use error::SizeError;
use log::info;
use types::SizeResult;

pub use board::{measure_board, BoardSize, LayerSize};
pub use gerber::{identify_from_filename, LayerKind, Units};

/// Measure a Gerber file on disk.
pub fn measure_file<P: AsRef<Path>>(path: P) -> Result<SizeResult, SizeError> {
    let path = path.as_ref();
    let size = measure_reader(File::open(path)?)?;
    info!(
        "{}: {} x {} {:?}",
        path.display(),
        size.x,
        size.y,
        size.units
    );
    Ok(size)
}

/// Measure a Gerber stream. The reader is consumed lazily, one token at a time.
pub fn measure_reader<R: Read>(reader: R) -> Result<SizeResult, SizeError> {
    gerber::measure(reader)
}

/// Measure Gerber text held in memory.
pub fn measure_str(text: &str) -> Result<SizeResult, SizeError> {
    measure_reader(text.as_bytes())
}
