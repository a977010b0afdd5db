//! Convert MUS music lumps (the compact score format used by DMX-era DOS games) into
//! Format-0 Standard MIDI Files.
//!
//! The whole conversion is one forward pass: read the header and instrument table, decode
//! events from the song offset until the finish event, and re-encode each one with a MIDI
//! delta-time into a single track.
//!
//! ```no_run
//! let conv = musparser::convert_file("d_e1m1.mus", "e1m1.mid")?;
//! println!("{} instruments", conv.instruments.len());
//! # Ok::<(), musparser::Error>(())
//! ```

pub mod error;
pub mod midi;
pub mod mus;
pub mod wad;

pub use error::{Error, Result};
pub use mus::{Conversion, MusHeader, mus_to_midi};

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

/// Read and convert a MUS file. Nothing is written.
pub fn read_mus_file(path: impl AsRef<Path>) -> Result<Conversion> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| Error::InputOpen {
        path: path.to_path_buf(),
        source,
    })?;
    mus_to_midi(BufReader::new(file))
}

/// Create `path` and write a finished MIDI file to it.
pub fn write_midi_file(path: impl AsRef<Path>, midi: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| Error::OutputCreation {
        path: path.to_path_buf(),
        source,
    })?;
    let mut w = BufWriter::new(file);
    w.write_all(midi)?;
    w.flush()?;
    Ok(())
}

/// Convert `input` to `output`. The output file is only created once decoding succeeded.
pub fn convert_file(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<Conversion> {
    let conversion = read_mus_file(input)?;
    write_midi_file(output, &conversion.midi)?;
    Ok(conversion)
}

/// Convert an in-memory MUS image.
pub fn convert_bytes(mus: &[u8]) -> Result<Vec<u8>> {
    mus_to_midi(std::io::Cursor::new(mus)).map(|c| c.midi)
}
