use std::{io, path::PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("truncated input: ran out of bytes reading {what}")]
    Truncated { what: &'static str },

    #[error("cannot open input {path:?}: {source}")]
    InputOpen { path: PathBuf, source: io::Error },

    #[error("cannot create output {path:?}: {source}")]
    OutputCreation { path: PathBuf, source: io::Error },

    #[error("delay of {0} ticks does not fit a MIDI delta-time")]
    DelayTooLong(u32),

    #[error("not a WAD file")]
    NotAWad,

    #[error("lump not found: {0}")]
    LumpNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Map a short read onto `Truncated`, keep every other I/O failure as is.
pub(crate) fn eof_as(what: &'static str) -> impl FnOnce(io::Error) -> Error {
    move |e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::Truncated { what }
        } else {
            Error::Io(e)
        }
    }
}
