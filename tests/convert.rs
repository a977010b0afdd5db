//! End-to-end conversions through the file API, checked byte for byte and read back with midly.

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use tempfile::tempdir;

use musparser::{Error, convert_bytes, convert_file};

const MIDI_HEADER: [u8; 14] = [b'M', b'T', b'h', b'd', 0, 0, 0, 6, 0, 0, 0, 1, 0, 70];

/// MUS image with no instruments and the song right after the header.
fn mus(stream: &[u8]) -> Vec<u8> {
    let mut v = b"MUS\x1A".to_vec();
    for f in [0u16, 16, 1, 0, 0, 0] {
        v.extend_from_slice(&f.to_le_bytes());
    }
    v.extend_from_slice(stream);
    v
}

#[test]
fn finish_only_song() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("song.mus");
    let output = dir.path().join("song.mid");
    std::fs::write(&input, mus(&[0x60])).unwrap();

    let conv = convert_file(&input, &output).unwrap();
    assert_eq!(conv.header.song_offset, 16);
    assert!(conv.instruments.is_empty());

    let data = std::fs::read(&output).unwrap();
    let mut expected = MIDI_HEADER.to_vec();
    expected.extend_from_slice(b"MTrk");
    expected.extend_from_slice(&[0, 0, 0, 4, 0x00, 0xFF, 0x2F, 0x00]);
    assert_eq!(data, expected);
}

#[test]
fn short_song_reads_back() {
    let midi = convert_bytes(&mus(&[
        0x4F, 0x00, 0x00, // percussion program 0
        0x11, 0x81, 0x64, // ch 1 note 1 vol 100
        0x9F, 0xA4, 0x46, 0x23, // percussion note 36 vol 70, then 35 ticks
        0x81, 0x01, 0x81, 0x00, // ch 1 release note 1, then 128 ticks
        0x0F, 0x24, // percussion release 36
        0x60,
    ]))
    .unwrap();

    let smf = Smf::parse(&midi).unwrap();
    assert_eq!(smf.tracks.len(), 1);
    assert!(matches!(smf.header.timing, Timing::Metrical(t) if t.as_int() == 70));

    let track = &smf.tracks[0];
    let deltas: Vec<u32> = track.iter().map(|e| e.delta.as_int()).collect();
    assert_eq!(deltas, [0, 0, 0, 35, 128, 0]);

    match track[1].kind {
        TrackEventKind::Midi { channel, message: MidiMessage::NoteOn { key, vel } } => {
            assert_eq!(channel.as_int(), 0);
            assert_eq!(key.as_int(), 1);
            assert_eq!(vel.as_int(), 100);
        }
        ref other => panic!("unexpected {other:?}"),
    }
    match track[2].kind {
        TrackEventKind::Midi { channel, message: MidiMessage::NoteOn { key, vel } } => {
            assert_eq!(channel.as_int(), 9);
            assert_eq!(key.as_int(), 36);
            assert_eq!(vel.as_int(), 70);
        }
        ref other => panic!("unexpected {other:?}"),
    }
    match track[3].kind {
        TrackEventKind::Midi { channel, message: MidiMessage::NoteOff { key, vel } } => {
            assert_eq!(channel.as_int(), 0);
            assert_eq!(key.as_int(), 1);
            assert_eq!(vel.as_int(), 64);
        }
        ref other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(track[5].kind, TrackEventKind::Meta(MetaMessage::EndOfTrack)));
}

#[test]
fn truncated_input_writes_nothing() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("cut.mus");
    let output = dir.path().join("cut.mid");
    std::fs::write(&input, mus(&[0x10, 0x3C])).unwrap();

    let err = convert_file(&input, &output).unwrap_err();
    assert!(matches!(err, Error::Truncated { .. }));
    assert!(!output.exists());
}

#[test]
fn missing_input_is_reported() {
    let dir = tempdir().unwrap();
    let err = convert_file(dir.path().join("nope.mus"), dir.path().join("out.mid")).unwrap_err();
    assert!(matches!(err, Error::InputOpen { .. }));
}

#[test]
fn uncreatable_output_is_reported() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("song.mus");
    std::fs::write(&input, mus(&[0x60])).unwrap();

    let output = dir.path().join("missing-dir").join("song.mid");
    let err = convert_file(&input, &output).unwrap_err();
    assert!(matches!(err, Error::OutputCreation { .. }));
}

#[test]
fn signature_is_not_checked() {
    let mut image = mus(&[0x60]);
    image[..4].copy_from_slice(b"XXXX");
    let midi = convert_bytes(&image).unwrap();
    assert_eq!(&midi[..14], MIDI_HEADER);
}
