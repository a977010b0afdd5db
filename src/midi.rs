//! midi.rs
//!
//! The writing half of the converter. Decoded MUS events arrive here as [`MidiEvent`]s and
//! are appended to a [`TrackWriter`], which owns the growing track payload and the number
//! of ticks still to wait before the next event.
//!
//! ### Quick primer on the wire format
//! - Every track event is prefixed by a delta-time: the ticks since the previous event,
//!   stored as a variable-length quantity (7 bits per byte, high bit set on all but the last).
//! - Channel messages are a status byte (`kind | channel`) plus one or two data bytes.
//! - A Format-0 file is one `MThd` chunk followed by exactly one `MTrk` chunk.
//!
//! We write the bytes by hand rather than through `midly`'s writer so the output layout is
//! exactly what is described above (no running status). `midly` is still used to read the
//! result back for the post-conversion [`Summary`].

use byteorder::{BigEndian, WriteBytesExt};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::io::Write;

use crate::error::{Error, Result};

/// Ticks per quarter note. With no tempo event players assume 120 BPM.
pub const DIVISION: u16 = 70;

/// Largest delta-time a 4-byte variable-length quantity can hold.
pub const MAX_DELTA: u32 = 0x0FFF_FFFF;

/// Note-off velocity; MUS release events carry none.
pub const RELEASE_VELOCITY: u8 = 64;

/// Microseconds per quarter note at the assumed 120 BPM.
const DEFAULT_US_PER_QN: u64 = 500_000;

/// A single channel or meta event ready to be put on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOff { channel: u8, key: u8 },
    NoteOn { channel: u8, key: u8, vel: u8 },
    /// 14-bit bend, 8192 is centre.
    PitchBend { channel: u8, bend: u16 },
    Controller { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    EndOfTrack,
}

impl MidiEvent {
    /// Append the status and data bytes (no delta-time).
    pub fn encode(&self, out: &mut Vec<u8>) {
        match *self {
            MidiEvent::NoteOff { channel, key } => {
                out.extend_from_slice(&[0x80 | channel, key, RELEASE_VELOCITY])
            }
            MidiEvent::NoteOn { channel, key, vel } => {
                out.extend_from_slice(&[0x90 | channel, key, vel])
            }
            MidiEvent::PitchBend { channel, bend } => out.extend_from_slice(&[
                0xE0 | channel,
                (bend & 0x7F) as u8,
                ((bend >> 7) & 0x7F) as u8,
            ]),
            MidiEvent::Controller { channel, controller, value } => {
                out.extend_from_slice(&[0xB0 | channel, controller, value])
            }
            MidiEvent::ProgramChange { channel, program } => {
                out.extend_from_slice(&[0xC0 | channel, program])
            }
            MidiEvent::EndOfTrack => out.extend_from_slice(&[0xFF, 0x2F, 0x00]),
        }
    }
}

/// Append `value` as a MIDI variable-length quantity.
///
/// Values above [`MAX_DELTA`] need more than four bytes, which MIDI does not allow.
pub fn write_var_len(out: &mut Vec<u8>, value: u32) -> Result<()> {
    if value > MAX_DELTA {
        return Err(Error::DelayTooLong(value));
    }

    // Highest non-empty 7-bit group first
    let mut shift = 21;
    while shift > 0 && value >> shift == 0 {
        shift -= 7;
    }
    while shift > 0 {
        out.push(((value >> shift) & 0x7F) as u8 | 0x80);
        shift -= 7;
    }
    out.push((value & 0x7F) as u8);
    Ok(())
}

/// Track payload under construction.
#[derive(Debug, Default)]
pub struct TrackWriter {
    data: Vec<u8>,
    pending: u32,
    events: usize,
}

impl TrackWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add ticks to wait before the next event.
    pub fn delay(&mut self, ticks: u32) -> Result<()> {
        self.pending = self
            .pending
            .checked_add(ticks)
            .ok_or(Error::DelayTooLong(u32::MAX))?;
        Ok(())
    }

    pub fn pending(&self) -> u32 {
        self.pending
    }

    /// Flush the pending delay as a delta-time, then the event itself.
    pub fn push(&mut self, event: MidiEvent) -> Result<()> {
        write_var_len(&mut self.data, self.pending)?;
        self.pending = 0;
        event.encode(&mut self.data);
        self.events += 1;
        Ok(())
    }

    /// Number of events written so far.
    pub fn len(&self) -> usize {
        self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Wrap a track payload in the `MThd`/`MTrk` framing of a Format-0 file.
pub fn write_smf<W: Write>(w: &mut W, track: &[u8]) -> Result<()> {
    w.write_all(b"MThd")?;
    w.write_u32::<BigEndian>(6)?;
    w.write_u16::<BigEndian>(0)?; // format 0
    w.write_u16::<BigEndian>(1)?; // one track
    w.write_u16::<BigEndian>(DIVISION)?;

    w.write_all(b"MTrk")?;
    w.write_u32::<BigEndian>(track.len() as u32)?;
    w.write_all(track)?;
    Ok(())
}

/// What a converted file contains, read back through `midly`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Summary {
    pub division: u16,
    pub events: usize,
    /// Note-ons with non-zero velocity, per MIDI channel
    pub note_ons: [usize; 16],
    pub ticks: u64,
    pub duration_us: u64,
}

/// Parse a Standard MIDI File and tally its contents.
///
/// Duration honours tempo events if any are present, otherwise assumes 120 BPM.
pub fn summarize(bytes: &[u8]) -> std::result::Result<Summary, midly::Error> {
    let smf = Smf::parse(bytes)?;
    let division = match smf.header.timing {
        Timing::Metrical(t) => t.as_int(),
        Timing::Timecode(..) => DIVISION,
    };

    let mut summary = Summary {
        division,
        events: 0,
        note_ons: [0; 16],
        ticks: 0,
        duration_us: 0,
    };

    for track in &smf.tracks {
        let mut ticks: u64 = 0;
        let mut us: u64 = 0;
        let mut us_per_qn = DEFAULT_US_PER_QN;
        // Start of the current tempo segment
        let (mut seg_ticks, mut seg_us) = (0u64, 0u64);

        for ev in track {
            ticks += ev.delta.as_int() as u64;
            us = seg_us + (ticks - seg_ticks) * us_per_qn / division.max(1) as u64;
            summary.events += 1;

            match ev.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(tp)) => {
                    (seg_ticks, seg_us) = (ticks, us);
                    us_per_qn = tp.as_int() as u64;
                }
                TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOn { vel, .. },
                } if vel.as_int() > 0 => summary.note_ons[channel.as_int() as usize] += 1,
                _ => {}
            }
        }

        summary.ticks = summary.ticks.max(ticks);
        summary.duration_us = summary.duration_us.max(us);
    }

    Ok(summary)
}

/// Format a microsecond duration as MM:SS.
pub fn format_duration(us: u64) -> String {
    let total_secs = us / 1_000_000;
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}
