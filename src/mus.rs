// mus.rs
use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, warn};
use std::io::{Read, Seek, SeekFrom};

use crate::error::{Error, Result, eof_as};
use crate::midi::{self, MidiEvent, TrackWriter};

/// Fixed size of the MUS header in bytes.
const HEADER_LEN: u64 = 16;

const MUS_PERCUSSION: u8 = 15;
pub const MIDI_PERCUSSION: u8 = 9;
const DEFAULT_VELOCITY: u8 = 127;

/// The 16-byte MUS header. All fields little-endian; the signature is not checked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MusHeader {
    pub signature: [u8; 4],
    pub song_len: u16,
    pub song_offset: u16,
    pub primary_channels: u16,
    pub secondary_channels: u16,
    pub instrument_count: u16,
    pub reserved: u16,
}

impl MusHeader {
    pub fn read<R: Read>(r: &mut R) -> Result<Self> {
        let mut signature = [0u8; 4];
        r.read_exact(&mut signature).map_err(eof_as("header"))?;
        let mut field = || r.read_u16::<LittleEndian>().map_err(eof_as("header"));

        Ok(Self {
            signature,
            song_len: field()?,
            song_offset: field()?,
            primary_channels: field()?,
            secondary_channels: field()?,
            instrument_count: field()?,
            reserved: field()?,
        })
    }
}

/// Read the `count` instrument patch numbers that follow the header.
pub fn read_instruments<R: Read>(r: &mut R, count: u16) -> Result<Vec<u16>> {
    (0..count)
        .map(|_| {
            r.read_u16::<LittleEndian>()
                .map_err(eof_as("instrument table"))
        })
        .collect()
}

/// Read a big-endian base-128 number; the high bit of each byte means another follows.
///
/// MUS delays and MIDI delta-times share this layout.
pub fn read_var_len<R: Read>(r: &mut R) -> Result<u32> {
    let mut value: u32 = 0;
    loop {
        let b = r.read_u8().map_err(eof_as("delay"))?;
        if value > u32::MAX >> 7 {
            return Err(Error::DelayTooLong(value));
        }
        value = (value << 7) | (b & 0x7F) as u32;
        if b & 0x80 == 0 {
            return Ok(value);
        }
    }
}

/// Per-MUS-channel state: assigned MIDI channel and last note velocity.
///
/// MUS channel 15 is always percussion (MIDI 9). The others get MIDI channels in
/// first-seen order, stepping over 9.
#[derive(Debug, Default)]
pub struct ChannelMap {
    midi: [Option<u8>; 16],
    velocity: [Option<u8>; 16],
    assigned: u8,
}

impl ChannelMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn midi_channel(&mut self, mus: u8) -> u8 {
        let mus = mus & 0x0F;
        if mus == MUS_PERCUSSION {
            return MIDI_PERCUSSION;
        }
        if let Some(ch) = self.midi[mus as usize] {
            return ch;
        }

        let mut next = self.assigned;
        if next >= MIDI_PERCUSSION {
            next += 1;
        }
        self.assigned += 1;
        self.midi[mus as usize] = Some(next);
        next
    }

    /// Cached velocity, 127 if the channel never set one.
    pub fn velocity(&mut self, mus: u8) -> u8 {
        *self.velocity[(mus & 0x0F) as usize].get_or_insert(DEFAULT_VELOCITY)
    }

    pub fn set_velocity(&mut self, mus: u8, vel: u8) {
        self.velocity[(mus & 0x0F) as usize] = Some(vel);
    }
}

/// MUS system event code to MIDI controller.
fn map_system(code: u8) -> Option<u8> {
    Some(match code {
        10 => 120, // all sounds off
        11 => 123, // all notes off
        12 => 126, // mono
        13 => 127, // poly
        14 => 121, // reset all controllers
        _ => return None,
    })
}

/// MUS controller number to MIDI controller. 0 (program change) is handled by the caller.
fn map_controller(c: u8) -> Option<u8> {
    Some(match c {
        1 => 0,   // bank select
        2 => 1,   // modulation
        3 => 7,   // volume
        4 => 10,  // pan
        5 => 11,  // expression
        6 => 91,  // reverb depth
        7 => 93,  // chorus depth
        8 => 64,  // sustain pedal
        9 => 67,  // soft pedal
        _ => return None,
    })
}

/// Single-pass MUS event decoder feeding a [`TrackWriter`].
pub struct Decoder<R> {
    reader: R,
    channels: ChannelMap,
    track: TrackWriter,
}

impl<R: Read> Decoder<R> {
    /// `reader` must be positioned at the first event.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            channels: ChannelMap::new(),
            track: TrackWriter::new(),
        }
    }

    fn byte(&mut self, what: &'static str) -> Result<u8> {
        self.reader.read_u8().map_err(eof_as(what))
    }

    /// Decode and emit one event. Returns `false` once the finish event has been written.
    pub fn step(&mut self) -> Result<bool> {
        let b = self.byte("event")?;
        let mus = b & 0x0F;
        let action = (b >> 4) & 0x07;
        let channel = self.channels.midi_channel(mus);

        let event = match action {
            0 => {
                let key = self.byte("release note")? & 0x7F;
                Some(MidiEvent::NoteOff { channel, key })
            }
            1 => {
                let note = self.byte("play note")?;
                let vel = if note & 0x80 != 0 {
                    let vel = self.byte("note velocity")?;
                    self.channels.set_velocity(mus, vel);
                    vel
                } else {
                    self.channels.velocity(mus)
                };
                Some(MidiEvent::NoteOn { channel, key: note & 0x7F, vel })
            }
            2 => {
                let bend = u16::from(self.byte("pitch bend")?) * 64;
                Some(MidiEvent::PitchBend { channel, bend })
            }
            3 => {
                let code = self.byte("system event")?;
                let controller = map_system(code).unwrap_or_else(|| {
                    warn!("unknown system event {code} on MUS channel {mus}, using controller 0");
                    0
                });
                Some(MidiEvent::Controller { channel, controller, value: 0 })
            }
            4 => {
                let number = self.byte("controller")?;
                let value = self.byte("controller value")?;
                if number == 0 {
                    Some(MidiEvent::ProgramChange { channel, program: value })
                } else {
                    let controller = map_controller(number).unwrap_or_else(|| {
                        warn!("unknown controller {number} on MUS channel {mus}, using controller 0");
                        0
                    });
                    Some(MidiEvent::Controller { channel, controller, value })
                }
            }
            5 => None, // end of measure
            6 => {
                self.track.push(MidiEvent::EndOfTrack)?;
                debug!("finish after {} events", self.track.len());
                return Ok(false);
            }
            _ => {
                warn!("unused MUS event type {action} (status {b:#04x}), skipped");
                None
            }
        };

        if let Some(event) = event {
            debug!("+{} {:?}", self.track.pending(), event);
            self.track.push(event)?;
        }

        if b & 0x80 != 0 {
            let ticks = read_var_len(&mut self.reader)?;
            self.track.delay(ticks)?;
        }
        Ok(true)
    }

    /// Decode until the finish event. Running out of input first is an error.
    pub fn run(mut self) -> Result<TrackWriter> {
        while self.step()? {}
        Ok(self.track)
    }
}

/// Result of one MUS to MIDI conversion.
#[derive(Clone, Debug)]
pub struct Conversion {
    pub header: MusHeader,
    pub instruments: Vec<u16>,
    /// Complete Standard MIDI File bytes.
    pub midi: Vec<u8>,
}

/// Convert a MUS stream into a Format-0 Standard MIDI File held in memory.
pub fn mus_to_midi<R: Read + Seek>(mut r: R) -> Result<Conversion> {
    let header = MusHeader::read(&mut r)?;
    let instruments = read_instruments(&mut r, header.instrument_count)?;

    // Events start at the header's offset, not necessarily right after the patch table
    let table_end = HEADER_LEN + 2 * u64::from(header.instrument_count);
    let song_start = u64::from(header.song_offset);
    if song_start < table_end {
        warn!("song offset {song_start} lies inside the header/instrument table (ends at {table_end})");
    }
    r.seek(SeekFrom::Start(song_start))?;

    let track = Decoder::new(&mut r).run()?;

    let mut out = Vec::with_capacity(track.as_bytes().len() + 22);
    midi::write_smf(&mut out, track.as_bytes())?;

    Ok(Conversion { header, instruments, midi: out })
}
