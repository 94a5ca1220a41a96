use thiserror::Error;

#[derive(Error, Debug)]
pub enum SizeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unrecognized or unparseable directive. Logged, never returned.
    #[error("malformed command: {0}")]
    MalformedCommand(String),

    /// `AD` naming neither a standard shape nor a known macro. Logged, never returned.
    #[error("unknown aperture shape: {0}")]
    UnknownApertureShape(String),

    #[error("aperture D{0} is not defined")]
    UndefinedAperture(u32),

    #[error("arithmetic error in macro expression: {0}")]
    Arithmetic(String),

    #[error("block aperture nesting exceeds {0} levels")]
    NestingTooDeep(usize),

    #[error("file contains no geometry")]
    NoGeometry,
}
